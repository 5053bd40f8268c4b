use std::collections::HashMap;
use std::path::PathBuf;

/// TLS settings for the dispatch connection.
///
/// With no CA certificate configured the system trust roots apply. Providing
/// a client certificate and key enables mutual TLS, for runtimes that require
/// workers to authenticate with cluster-issued certificates.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Enable TLS. If false, all other TLS settings are ignored.
    pub enabled: bool,

    /// Path to a CA certificate (PEM format) to trust instead of the system
    /// roots.
    pub ca_cert_path: Option<PathBuf>,

    /// Path to the client certificate (PEM format) for mutual TLS.
    pub cert_path: Option<PathBuf>,

    /// Path to the client private key (PEM format).
    /// Must match the certificate.
    pub key_path: Option<PathBuf>,

    /// Expected server name when it differs from the dialed host, e.g. when
    /// connecting by IP address.
    pub domain_name: Option<String>,
}

/// Worker configuration, read once at startup and handed to
/// [`crate::worker::run`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Address of the dispatch service, e.g. `http://127.0.0.1:7233`.
    pub address: String,
    /// Namespace the worker polls in.
    pub namespace: String,
    /// Shared task queue. The worker derives its unique host task queue from
    /// it at startup.
    pub task_queue: String,
    /// Maximum number of concurrently executing tasks per poll loop.
    pub concurrency: usize,
    /// Milliseconds between worker heartbeats.
    pub heartbeat_interval_ms: u64,
    /// Mapping from task name to shell command template.
    pub commands: HashMap<String, String>,
    pub tls: TlsConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:7233".to_string(),
            namespace: "default".to_string(),
            task_queue: String::new(),
            concurrency: 8,
            heartbeat_interval_ms: 30_000,
            commands: HashMap::new(),
            tls: TlsConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn new(task_queue: impl Into<String>) -> Self {
        Self {
            task_queue: task_queue.into(),
            ..Default::default()
        }
    }

    pub fn with_command(mut self, name: impl Into<String>, command: impl Into<String>) -> Self {
        self.commands.insert(name.into(), command.into());
        self
    }
}
