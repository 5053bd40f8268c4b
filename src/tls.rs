//! Client TLS for the dispatch connection.
//!
//! The worker only dials out, so this module builds a tonic client TLS
//! configuration: optional custom CA root, optional client identity for
//! mutual TLS, optional server-name override for deployments that connect
//! by IP address.

use std::path::PathBuf;

use tokio::fs;
use tonic::transport::{Certificate, ClientTlsConfig, Identity};

use crate::config::TlsConfig;

/// Error type for TLS configuration issues.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("CA certificate not found: {0}")]
    CaCertNotFound(PathBuf),

    #[error("client certificate not found: {0}")]
    CertNotFound(PathBuf),

    #[error("private key not found: {0}")]
    KeyNotFound(PathBuf),

    #[error("client certificate and key must be provided together")]
    IncompleteIdentity,

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the tonic client TLS configuration from `config`.
///
/// # Errors
///
/// Returns an error if a configured file does not exist or cannot be read,
/// or if only one half of the client certificate/key pair is configured.
pub async fn client_tls_config(config: &TlsConfig) -> Result<ClientTlsConfig, TlsError> {
    let mut tls = ClientTlsConfig::new().with_native_roots();

    if let Some(domain) = &config.domain_name {
        tls = tls.domain_name(domain);
    }

    if let Some(ca_path) = &config.ca_cert_path {
        if !ca_path.exists() {
            return Err(TlsError::CaCertNotFound(ca_path.clone()));
        }
        let ca_pem = fs::read(ca_path).await?;
        tls = tls.ca_certificate(Certificate::from_pem(ca_pem));
    }

    match (&config.cert_path, &config.key_path) {
        (Some(cert_path), Some(key_path)) => {
            if !cert_path.exists() {
                return Err(TlsError::CertNotFound(cert_path.clone()));
            }
            if !key_path.exists() {
                return Err(TlsError::KeyNotFound(key_path.clone()));
            }
            let cert_pem = fs::read(cert_path).await?;
            let key_pem = fs::read(key_path).await?;
            tls = tls.identity(Identity::from_pem(cert_pem, key_pem));
        }
        (None, None) => {}
        _ => return Err(TlsError::IncompleteIdentity),
    }

    Ok(tls)
}
