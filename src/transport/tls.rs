use crate::base::neterror::NetError;
use boring::ssl::{ConnectConfiguration, SslConnector, SslMethod, SslVerifyMode, SslVersion};
use boring::x509::X509;
use std::path::Path;

/// ALPN wire format for HTTP/1.1 only; the transport speaks HTTP/1.1.
const ALPN_HTTP11: &[u8] = b"\x08http/1.1";

/// Build a client connector.
///
/// `ca_bundle` may name either a PEM bundle file or a hashed certificate
/// directory; without it the BoringSSL default roots are used.
pub fn build_connector(verify_peer: bool, ca_bundle: Option<&Path>) -> Result<SslConnector, NetError> {
    let mut builder =
        SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;

    builder
        .set_min_proto_version(Some(SslVersion::TLS1_2))
        .map_err(|_| NetError::SslProtocolError)?;
    builder
        .set_max_proto_version(Some(SslVersion::TLS1_3))
        .map_err(|_| NetError::SslProtocolError)?;
    builder
        .set_alpn_protos(ALPN_HTTP11)
        .map_err(|_| NetError::SslProtocolError)?;

    if let Some(path) = ca_bundle {
        if path.is_dir() {
            for cert in load_certificate_dir(path)? {
                builder
                    .cert_store_mut()
                    .add_cert(cert)
                    .map_err(|_| NetError::CertAuthorityInvalid)?;
            }
        } else {
            builder.set_ca_file(path).map_err(|e| {
                tracing::warn!(path = %path.display(), error = %e, "failed to load CA bundle");
                NetError::CertAuthorityInvalid
            })?;
        }
    }

    builder.set_verify(if verify_peer {
        SslVerifyMode::PEER
    } else {
        SslVerifyMode::NONE
    });

    Ok(builder.build())
}

/// Read every PEM certificate in a directory. Unreadable entries are skipped.
fn load_certificate_dir(dir: &Path) -> Result<Vec<X509>, NetError> {
    let entries = std::fs::read_dir(dir).map_err(|_| NetError::CertAuthorityInvalid)?;
    let mut certs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(pem) = std::fs::read(&path) else {
            continue;
        };
        match X509::stack_from_pem(&pem) {
            Ok(stack) => certs.extend(stack),
            Err(_) => tracing::debug!(path = %path.display(), "skipping non-PEM file in CA directory"),
        }
    }
    if certs.is_empty() {
        tracing::warn!(dir = %dir.display(), "CA directory contains no certificates");
        return Err(NetError::CertAuthorityInvalid);
    }
    Ok(certs)
}

/// Per-connection configuration with hostname verification and SNI applied.
pub fn configure_for_host(
    connector: &SslConnector,
    host: &str,
    verify_host: bool,
) -> Result<ConnectConfiguration, NetError> {
    let mut config = connector
        .configure()
        .map_err(|_| NetError::SslProtocolError)?;
    config.set_verify_hostname(verify_host);
    config.set_use_server_name_indication(should_set_sni(host));
    Ok(config)
}

/// Per RFC 6066, SNI MUST NOT be set for raw IP addresses.
pub fn should_set_sni(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<std::net::IpAddr>()
        .is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sni_skipped_for_ip_literals() {
        assert!(should_set_sni("example.com"));
        assert!(!should_set_sni("127.0.0.1"));
        assert!(!should_set_sni("[::1]"));
    }

    #[test]
    fn test_default_connector_builds() {
        assert!(build_connector(true, None).is_ok());
    }

    #[test]
    fn test_empty_ca_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = build_connector(true, Some(dir.path()));
        assert_eq!(result.err(), Some(NetError::CertAuthorityInvalid));
    }

    #[test]
    fn test_missing_ca_bundle_is_rejected() {
        let result = build_connector(true, Some(Path::new("/nonexistent/ca-bundle.pem")));
        assert_eq!(result.err(), Some(NetError::CertAuthorityInvalid));
    }
}
