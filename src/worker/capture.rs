/// Retains the first `n` and last `n` bytes written, counting whatever falls
/// in between. Memory use stays at 2×`n` no matter how much is written:
/// an explicit prefix buffer plus a fixed-capacity suffix ring, never a
/// growable buffer truncated after the fact.
#[derive(Debug)]
pub struct PrefixSuffixSaver {
    n: usize,
    prefix: Vec<u8>,
    suffix: Vec<u8>,
    suffix_off: usize,
    skipped: u64,
}

impl PrefixSuffixSaver {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            prefix: Vec::new(),
            suffix: Vec::new(),
            suffix_off: 0,
            skipped: 0,
        }
    }

    /// Total bytes dropped between the retained prefix and suffix so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn write(&mut self, mut data: &[u8]) {
        // The prefix fills first and is never overwritten.
        if self.prefix.len() < self.n {
            let take = (self.n - self.prefix.len()).min(data.len());
            self.prefix.extend_from_slice(&data[..take]);
            data = &data[take..];
        }
        if data.is_empty() {
            return;
        }
        // Only the last `n` bytes of a single oversized write can survive.
        if data.len() > self.n {
            self.skipped += (data.len() - self.n) as u64;
            data = &data[data.len() - self.n..];
        }
        // Grow the suffix until it reaches capacity.
        if self.suffix.len() < self.n {
            let take = (self.n - self.suffix.len()).min(data.len());
            self.suffix.extend_from_slice(&data[..take]);
            data = &data[take..];
        }
        // Overwrite the suffix ring in place; every overwritten byte is one
        // more byte dropped from the middle of the stream.
        while !data.is_empty() {
            let take = (self.n - self.suffix_off).min(data.len());
            self.suffix[self.suffix_off..self.suffix_off + take].copy_from_slice(&data[..take]);
            data = &data[take..];
            self.skipped += take as u64;
            self.suffix_off += take;
            if self.suffix_off == self.n {
                self.suffix_off = 0;
            }
        }
    }

    /// Materialize the captured stream: the prefix, an omission marker when
    /// bytes were dropped, then the suffix in chronological order.
    pub fn into_bytes(self) -> Vec<u8> {
        if self.suffix.is_empty() {
            return self.prefix;
        }
        if self.skipped == 0 {
            let mut out = self.prefix;
            out.extend_from_slice(&self.suffix);
            return out;
        }
        let marker = format!("\n... omitting {} bytes ...\n", self.skipped);
        let mut out = Vec::with_capacity(self.prefix.len() + marker.len() + self.suffix.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(marker.as_bytes());
        out.extend_from_slice(&self.suffix[self.suffix_off..]);
        out.extend_from_slice(&self.suffix[..self.suffix_off]);
        out
    }
}
