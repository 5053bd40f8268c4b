use std::collections::HashMap;

/// A shell command with `$name` / `${name}` placeholders, bound to a task
/// name at configuration time and resolved once per invocation.
///
/// Resolution substitutes values in single quotes so the shell sees each
/// value as one literal word. A value that itself contains a single quote
/// will break the resulting command; callers that need such values must
/// pre-encode them. The resolved string is handed to the shell unvalidated,
/// so malformed syntax surfaces as a shell error at run time, not here.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    template: String,
}

impl CommandTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Resolve placeholders against the argument map. Missing arguments
    /// substitute the empty string. Deterministic: the same template and
    /// arguments always produce byte-identical output.
    pub fn resolve(&self, args: &HashMap<String, String>) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos + 1..];
            match parse_placeholder(rest) {
                Some((name, consumed)) => {
                    let value = args.get(name).map(String::as_str).unwrap_or_default();
                    out.push('\'');
                    out.push_str(value);
                    out.push('\'');
                    rest = &rest[consumed..];
                }
                // A `$` followed by nothing placeholder-shaped stays literal.
                None => out.push('$'),
            }
        }
        out.push_str(rest);
        out
    }
}

/// Returns the placeholder name starting at `rest` and the number of bytes
/// it occupies, or `None` if `rest` does not begin with one.
fn parse_placeholder(rest: &str) -> Option<(&str, usize)> {
    let first = rest.chars().next()?;
    if first == '{' {
        // Unterminated `${` is not a placeholder.
        let close = rest.find('}')?;
        return Some((&rest[1..close], close + 1));
    }
    if first.is_ascii_digit() {
        return Some((&rest[..1], 1));
    }
    if first.is_ascii_alphabetic() || first == '_' {
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(rest.len());
        return Some((&rest[..end], end));
    }
    None
}
