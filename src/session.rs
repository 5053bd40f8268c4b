use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;

use crate::error::{Result, WorkerError};
use crate::task::{BeginOutput, BLOB_SIZE_MAX};

/// Scopes temporary file storage to a single worker instance.
///
/// Sessions are directories named `{temp-root}/{host-task-queue}-{random}`.
/// Every session-scoped operation validates its directory argument against
/// that shape before touching the filesystem. The check covers only the
/// containing directory; file names joined below it are taken as given.
#[derive(Debug, Clone)]
pub struct SessionSandbox {
    temp_root: PathBuf,
    host_task_queue: String,
}

impl SessionSandbox {
    pub fn new(host_task_queue: impl Into<String>) -> Self {
        Self {
            temp_root: std::env::temp_dir(),
            host_task_queue: host_task_queue.into(),
        }
    }

    pub fn host_task_queue(&self) -> &str {
        &self.host_task_queue
    }

    /// Create a fresh session directory under the system temp root.
    pub fn begin(&self) -> Result<BeginOutput> {
        let session_dir = tempfile::Builder::new()
            .prefix(&format!("{}-", self.host_task_queue))
            .tempdir_in(&self.temp_root)?
            .into_path();
        tracing::info!(session_dir = %session_dir.display(), "session started");
        Ok(BeginOutput {
            host_task_queue: self.host_task_queue.clone(),
            session_dir,
        })
    }

    /// Check that `dir` is a directory this sandbox could have issued: a
    /// direct child of the temp root named `{host-task-queue}-*`.
    pub fn validate_scope(&self, dir: &Path) -> Result<()> {
        let prefix = format!("{}-", self.host_task_queue);
        let in_scope = dir.parent() == Some(self.temp_root.as_path())
            && dir
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix));
        if in_scope {
            Ok(())
        } else {
            Err(WorkerError::InvalidSessionDir)
        }
    }

    /// Tear down a session, removing its directory tree. A directory that is
    /// already gone counts as removed; any other removal failure propagates.
    pub async fn end(&self, session_dir: &Path) -> Result<()> {
        self.validate_scope(session_dir)?;
        match tokio::fs::remove_dir_all(session_dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        tracing::info!(session_dir = %session_dir.display(), "session ended");
        Ok(())
    }

    /// Read a file from inside a session directory, up to [`BLOB_SIZE_MAX`]
    /// bytes. Larger files fail without returning partial contents.
    pub async fn read_file(&self, session_dir: &Path, file_name: &str) -> Result<Vec<u8>> {
        self.validate_scope(session_dir)?;
        let path = session_dir.join(file_name);
        let file = tokio::fs::File::open(&path).await?;
        let mut data = Vec::new();
        file.take(BLOB_SIZE_MAX as u64 + 1)
            .read_to_end(&mut data)
            .await?;
        if data.len() > BLOB_SIZE_MAX {
            return Err(WorkerError::BlobTooLarge);
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_sandbox() -> SessionSandbox {
        SessionSandbox::new(format!("taskshell-test-{}", uuid::Uuid::now_v7()))
    }

    #[test]
    fn begin_creates_prefixed_directory() {
        let sandbox = test_sandbox();
        let output = sandbox.begin().unwrap();

        assert_eq!(output.host_task_queue, sandbox.host_task_queue());
        assert!(output.session_dir.is_dir());
        assert_eq!(
            output.session_dir.parent(),
            Some(std::env::temp_dir().as_path())
        );
        let name = output.session_dir.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(&format!("{}-", sandbox.host_task_queue())));

        std::fs::remove_dir_all(&output.session_dir).unwrap();
    }

    #[test]
    fn begin_issues_distinct_directories() {
        let sandbox = test_sandbox();
        let first = sandbox.begin().unwrap();
        let second = sandbox.begin().unwrap();
        assert_ne!(first.session_dir, second.session_dir);

        std::fs::remove_dir_all(&first.session_dir).unwrap();
        std::fs::remove_dir_all(&second.session_dir).unwrap();
    }

    #[test]
    fn validate_scope_accepts_issued_directory() {
        let sandbox = test_sandbox();
        let output = sandbox.begin().unwrap();
        assert!(sandbox.validate_scope(&output.session_dir).is_ok());
        std::fs::remove_dir_all(&output.session_dir).unwrap();
    }

    #[test]
    fn validate_scope_rejects_out_of_scope_paths() {
        let sandbox = test_sandbox();
        let temp_root = std::env::temp_dir();

        for path in [
            PathBuf::from("/etc/passwd"),
            temp_root.clone(),
            temp_root.join("other-prefix-abc"),
            temp_root
                .join(format!("{}-abc", sandbox.host_task_queue()))
                .join("nested"),
        ] {
            let result = sandbox.validate_scope(&path);
            assert!(
                matches!(result, Err(WorkerError::InvalidSessionDir)),
                "expected rejection for {}",
                path.display()
            );
        }
    }

    #[test]
    fn validate_scope_rejects_other_host_prefix() {
        let sandbox = test_sandbox();
        let foreign = std::env::temp_dir().join("taskshell-test-other-abc123");
        assert!(matches!(
            sandbox.validate_scope(&foreign),
            Err(WorkerError::InvalidSessionDir)
        ));
    }

    #[tokio::test]
    async fn end_removes_directory_tree() {
        let sandbox = test_sandbox();
        let output = sandbox.begin().unwrap();
        std::fs::write(output.session_dir.join("artifact"), b"data").unwrap();

        sandbox.end(&output.session_dir).await.unwrap();
        assert!(!output.session_dir.exists());

        // A second end on the now-absent directory still succeeds.
        sandbox.end(&output.session_dir).await.unwrap();
    }

    #[tokio::test]
    async fn end_rejects_foreign_directory() {
        let sandbox = test_sandbox();
        let result = sandbox.end(Path::new("/etc")).await;
        assert!(matches!(result, Err(WorkerError::InvalidSessionDir)));
    }

    #[tokio::test]
    async fn read_file_returns_exact_contents() {
        let sandbox = test_sandbox();
        let output = sandbox.begin().unwrap();
        std::fs::write(output.session_dir.join("greeting"), b"hello world").unwrap();

        let data = sandbox
            .read_file(&output.session_dir, "greeting")
            .await
            .unwrap();
        assert_eq!(data, b"hello world");

        sandbox.end(&output.session_dir).await.unwrap();
    }

    #[tokio::test]
    async fn read_file_accepts_exactly_blob_size_max() {
        let sandbox = test_sandbox();
        let output = sandbox.begin().unwrap();
        std::fs::write(output.session_dir.join("full"), vec![7u8; BLOB_SIZE_MAX]).unwrap();

        let data = sandbox.read_file(&output.session_dir, "full").await.unwrap();
        assert_eq!(data.len(), BLOB_SIZE_MAX);

        sandbox.end(&output.session_dir).await.unwrap();
    }

    #[tokio::test]
    async fn read_file_rejects_oversized_file() {
        let sandbox = test_sandbox();
        let output = sandbox.begin().unwrap();
        std::fs::write(
            output.session_dir.join("oversized"),
            vec![7u8; BLOB_SIZE_MAX + 1],
        )
        .unwrap();

        let result = sandbox.read_file(&output.session_dir, "oversized").await;
        assert!(matches!(result, Err(WorkerError::BlobTooLarge)));

        sandbox.end(&output.session_dir).await.unwrap();
    }

    #[tokio::test]
    async fn read_file_missing_file_is_an_io_error() {
        let sandbox = test_sandbox();
        let output = sandbox.begin().unwrap();

        let result = sandbox.read_file(&output.session_dir, "absent").await;
        match result {
            Err(WorkerError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::NotFound),
            other => panic!("expected not-found I/O error, got {other:?}"),
        }

        sandbox.end(&output.session_dir).await.unwrap();
    }

    #[tokio::test]
    async fn read_file_after_end_is_an_io_error() {
        let sandbox = test_sandbox();
        let output = sandbox.begin().unwrap();
        std::fs::write(output.session_dir.join("artifact"), b"data").unwrap();
        sandbox.end(&output.session_dir).await.unwrap();

        let result = sandbox.read_file(&output.session_dir, "artifact").await;
        assert!(matches!(result, Err(WorkerError::Io(_))));
    }
}
