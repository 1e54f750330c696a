//! TLS certificate loading and self-signed generation.
//!
//! The listener serves the certificate and key named in the config. When
//! they are not configured (or not present yet) a self-signed localhost
//! certificate is generated under the data dir so a dev server runs out of
//! the box.

use std::{
    io::BufReader,
    path::{Path, PathBuf},
};

use {
    anyhow::{Context, Result},
    rcgen::{CertificateParams, DnType, KeyPair, SanType},
    rustls::ServerConfig,
    time::OffsetDateTime,
    tracing::info,
};

use comcore_config::TlsConfig;

/// Resolve the certificate pair for the listener, generating a self-signed
/// one when nothing usable is configured.
pub fn ensure_certs(config: &TlsConfig, data_dir: &Path) -> Result<(PathBuf, PathBuf)> {
    if let (Some(cert), Some(key)) = (&config.cert_file, &config.key_file) {
        return Ok((cert.clone(), key.clone()));
    }

    let cert_dir = data_dir.join("certs");
    let cert_path = cert_dir.join("server.pem");
    let key_path = cert_dir.join("server-key.pem");
    if !cert_path.exists() || !key_path.exists() {
        info!(dir = %cert_dir.display(), "generating self-signed TLS certificate");
        std::fs::create_dir_all(&cert_dir).context("create certs directory")?;
        let (cert_pem, key_pem) = generate_self_signed()?;
        std::fs::write(&cert_path, cert_pem).context("write server cert")?;
        std::fs::write(&key_path, key_pem).context("write server key")?;
    }
    Ok((cert_path, key_path))
}

/// Generate a 1-year self-signed localhost certificate. Returns
/// (cert, key) PEM strings.
fn generate_self_signed() -> Result<(String, String)> {
    let now = OffsetDateTime::now_utc();
    let key = KeyPair::generate()?;
    let mut params = CertificateParams::new(vec!["localhost".to_string()])?;
    params
        .distinguished_name
        .push(DnType::CommonName, "localhost");
    params.subject_alt_names = vec![
        SanType::DnsName("localhost".try_into()?),
        SanType::IpAddress(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST)),
        SanType::IpAddress(std::net::IpAddr::V6(std::net::Ipv6Addr::LOCALHOST)),
    ];
    params.not_before = now;
    params.not_after = now + time::Duration::days(365);
    let cert = params.self_signed(&key)?;
    Ok((cert.pem(), key.serialize_pem()))
}

/// Load cert + key PEM files into a `rustls::ServerConfig`.
pub fn load_rustls_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig> {
    // Ensure a crypto provider is installed (ring via feature flag).
    let _ = rustls::crypto::ring::default_provider().install_default();
    let cert_file = std::fs::File::open(cert_path).context("open server cert")?;
    let key_file = std::fs::File::open(key_path).context("open server key")?;

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("parse certs")?;

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_file))
        .context("parse private key")?
        .context("no private key found")?;

    ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("build rustls ServerConfig")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn generates_and_loads_certs() {
        let dir = tempfile::tempdir().unwrap();
        let config = TlsConfig::default();
        let (cert, key) = ensure_certs(&config, dir.path()).unwrap();
        assert!(cert.exists());
        assert!(key.exists());
        load_rustls_config(&cert, &key).unwrap();

        // A second call reuses the generated pair.
        let (cert2, _) = ensure_certs(&config, dir.path()).unwrap();
        assert_eq!(cert, cert2);
    }

    #[test]
    fn configured_paths_win() {
        let config = TlsConfig {
            cert_file: Some("/etc/comcore/cert.pem".into()),
            key_file: Some("/etc/comcore/key.pem".into()),
        };
        let (cert, key) = ensure_certs(&config, Path::new("/tmp")).unwrap();
        assert_eq!(cert, PathBuf::from("/etc/comcore/cert.pem"));
        assert_eq!(key, PathBuf::from("/etc/comcore/key.pem"));
    }
}
