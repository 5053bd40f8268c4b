//! Worker runtime: polls the dispatch service and executes tasks.
//!
//! A worker serves two queues at once, mirroring how sessions are routed:
//!
//! - the **route loop** polls the shared task queue and serves only `Begin`,
//!   so any worker may open a session;
//! - the **host loop** polls the worker-unique host task queue and serves the
//!   full task table, so everything that touches a session lands on the
//!   worker that owns its directory.
//!
//! # Components
//!
//! - [`executor::ShellExecutor`]: runs one configured command template
//! - [`capture::PrefixSuffixSaver`]: bounded stderr capture
//! - [`heartbeat::HeartbeatSender`]: worker liveness announcements
//!
//! Each poll loop is bounded by the configured concurrency limit; task bodies
//! run as spawned tasks and report their outcome through `CompleteTask`.

pub mod capture;
pub mod executor;
pub mod heartbeat;

pub use executor::ShellExecutor;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tonic::transport::Channel;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::proto::complete_task_request::Outcome;
use crate::proto::dispatch_client::DispatchClient;
use crate::proto::{CompleteTaskRequest, HeartbeatRequest, PollTaskRequest, TaskFailure};
use crate::session::SessionSandbox;
use crate::task::TaskRegistry;
use crate::tls;
use heartbeat::HeartbeatSender;

/// Delay before re-polling after a transport error.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Connect to the dispatch service and serve tasks until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the connection cannot be established, if a configured
/// command shadows a reserved task name, or if a poll loop fails fatally.
pub async fn run(config: WorkerConfig, shutdown: CancellationToken) -> Result<()> {
    let channel = connect(&config).await?;

    let host_task_queue = format!("{}-{}", config.task_queue, Uuid::now_v7());
    let sandbox = SessionSandbox::new(&host_task_queue);
    let route_registry = Arc::new(TaskRegistry::route(sandbox.clone()));
    let host_registry = Arc::new(TaskRegistry::host(sandbox, &config.commands)?);

    tracing::info!(
        address = %config.address,
        namespace = %config.namespace,
        task_queue = %config.task_queue,
        host_task_queue = %host_task_queue,
        tasks = ?host_registry.task_names().collect::<Vec<_>>(),
        "worker starting"
    );

    let heartbeat = HeartbeatSender::new(config.heartbeat_interval_ms);
    let heartbeat_request = HeartbeatRequest {
        namespace: config.namespace.clone(),
        host_task_queue: host_task_queue.clone(),
        worker_identity: host_task_queue.clone(),
    };
    let heartbeat_client = DispatchClient::new(channel.clone());
    let heartbeat_shutdown = shutdown.clone();
    tokio::spawn(async move {
        heartbeat
            .run(heartbeat_client, heartbeat_request, heartbeat_shutdown)
            .await;
    });

    let route = poll_loop(
        DispatchClient::new(channel.clone()),
        config.namespace.clone(),
        config.task_queue.clone(),
        host_task_queue.clone(),
        route_registry,
        config.concurrency,
        shutdown.clone(),
    );
    let host = poll_loop(
        DispatchClient::new(channel),
        config.namespace,
        host_task_queue.clone(),
        host_task_queue,
        host_registry,
        config.concurrency,
        shutdown,
    );

    let (route_result, host_result) = tokio::join!(route, host);
    route_result?;
    host_result
}

/// Poll one queue for task invocations and run them against `registry`.
///
/// Runs until the shutdown token fires, then waits for in-flight tasks to
/// report their completions before returning.
async fn poll_loop(
    mut client: DispatchClient<Channel>,
    namespace: String,
    task_queue: String,
    identity: String,
    registry: Arc<TaskRegistry>,
    concurrency: usize,
    shutdown: CancellationToken,
) -> Result<()> {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let tracker = TaskTracker::new();

    loop {
        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => {
                permit.expect("semaphore is never closed")
            }
            () = shutdown.cancelled() => break,
        };

        let request = PollTaskRequest {
            namespace: namespace.clone(),
            task_queue: task_queue.clone(),
            worker_identity: identity.clone(),
        };
        let response = tokio::select! {
            response = client.poll_task(request) => response,
            () = shutdown.cancelled() => break,
        };

        let task = match response {
            Ok(response) => response.into_inner(),
            Err(status) => {
                tracing::warn!(task_queue = %task_queue, error = %status, "poll failed");
                drop(permit);
                tokio::select! {
                    () = tokio::time::sleep(POLL_RETRY_DELAY) => continue,
                    () = shutdown.cancelled() => break,
                }
            }
        };
        if task.task_token.is_empty() {
            // The poll timed out with no work.
            continue;
        }

        let registry = registry.clone();
        let mut complete_client = client.clone();
        let task_shutdown = shutdown.child_token();
        let queue = task_queue.clone();
        tracker.spawn(async move {
            let _permit = permit;
            let name = task.task_name;
            tracing::info!(task_queue = %queue, task = %name, "task started");

            let outcome = match registry.dispatch(&name, &task.input, &task_shutdown).await {
                Ok(result) => Outcome::Result(result),
                Err(err) => {
                    tracing::warn!(task_queue = %queue, task = %name, error = %err, "task failed");
                    Outcome::Failure(TaskFailure {
                        message: err.to_string(),
                        non_retryable: err.is_non_retryable(),
                    })
                }
            };

            let request = CompleteTaskRequest {
                task_token: task.task_token,
                outcome: Some(outcome),
            };
            if let Err(status) = complete_client.complete_task(request).await {
                tracing::warn!(
                    task_queue = %queue,
                    task = %name,
                    error = %status,
                    "failed to report task completion"
                );
            }
        });
    }

    tracker.close();
    tracker.wait().await;
    Ok(())
}

/// Open the channel to the dispatch service, with TLS when configured.
async fn connect(config: &WorkerConfig) -> Result<Channel> {
    let endpoint = Channel::from_shared(config.address.clone())
        .map_err(|_| WorkerError::InvalidAddress(config.address.clone()))?;
    let endpoint = if config.tls.enabled {
        let tls_config = tls::client_tls_config(&config.tls).await?;
        endpoint.tls_config(tls_config)?
    } else {
        endpoint
    };
    Ok(endpoint.connect().await?)
}
