use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("invalid session directory")]
    InvalidSessionDir,

    #[error("blob too large")]
    BlobTooLarge,

    #[error("stdout data is too large: blob too large")]
    StdoutTooLarge,

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("task name {0:?} is reserved")]
    ReservedTaskName(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid dispatch address: {0}")]
    InvalidAddress(String),

    #[error("TLS error: {0}")]
    Tls(#[from] crate::tls::TlsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

impl WorkerError {
    /// Whether the runtime should give up instead of retrying: repeating the
    /// invocation with the same input cannot succeed.
    pub fn is_non_retryable(&self) -> bool {
        matches!(
            self,
            WorkerError::InvalidSessionDir
                | WorkerError::BlobTooLarge
                | WorkerError::StdoutTooLarge
                | WorkerError::UnknownTask(_)
                | WorkerError::ReservedTaskName(_)
                | WorkerError::Payload(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
