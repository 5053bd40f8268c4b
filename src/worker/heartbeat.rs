use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

use crate::proto::dispatch_client::DispatchClient;
use crate::proto::HeartbeatRequest;

/// Periodically announces the worker's host task queue to the dispatch
/// service so the runtime keeps routing session work to this instance.
pub struct HeartbeatSender {
    interval: Duration,
}

impl HeartbeatSender {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
        }
    }

    /// Run the heartbeat loop until the shutdown token fires. Failures are
    /// logged and the loop keeps going.
    pub async fn run(
        &self,
        mut client: DispatchClient<Channel>,
        request: HeartbeatRequest,
        shutdown: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(status) = client.record_heartbeat(request.clone()).await {
                        tracing::warn!(error = %status, "heartbeat failed");
                    }
                }
                () = shutdown.cancelled() => break,
            }
        }
    }
}
