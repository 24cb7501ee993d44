//! TLS configuration and certificate loading.

use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

use crate::config::TlsConfig;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("certificate file not found: {0}")]
    MissingCertificate(String),

    #[error("private key file not found: {0}")]
    MissingKey(String),

    #[error("failed to load TLS material: {0}")]
    Load(#[from] std::io::Error),
}

/// Load the PEM certificate chain and key named in the listener config.
pub async fn load_tls_config(tls: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    if !Path::new(&tls.cert_path).exists() {
        return Err(TlsError::MissingCertificate(tls.cert_path.clone()));
    }
    if !Path::new(&tls.key_path).exists() {
        return Err(TlsError::MissingKey(tls.key_path.clone()));
    }
    Ok(RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?)
}
