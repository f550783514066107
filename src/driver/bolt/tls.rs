//! TLS transport for encrypted schemes (`+s`, `+ssc`).

use std::sync::Arc;
use std::time::SystemTime;

use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::{ServerCertVerified, ServerCertVerifier};
use tokio_rustls::rustls::{
    self, Certificate, ClientConfig, OwnedTrustAnchor, RootCertStore, ServerName,
};
use tokio_rustls::TlsConnector;

use super::super::driver::TrustStrategy;
use super::super::error::{DriverError, DriverResult};

/// Accepts any server certificate. Only reachable through `TrustStrategy::TrustAll`.
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }
}

/// Build the rustls client configuration for a trust strategy.
pub(crate) fn client_config(trust: &TrustStrategy) -> DriverResult<ClientConfig> {
    let builder = ClientConfig::builder().with_safe_defaults();

    let config = match trust {
        TrustStrategy::TrustAll => builder
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth(),
        TrustStrategy::SystemCas => {
            let mut roots = RootCertStore::empty();
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TrustStrategy::CustomCas(certificates) => {
            if certificates.is_empty() {
                return Err(DriverError::configuration(
                    "CustomCas trust strategy needs at least one certificate",
                ));
            }
            let mut roots = RootCertStore::empty();
            for der in certificates {
                roots.add(&Certificate(der.clone())).map_err(|e| {
                    DriverError::configuration(format!("Invalid CA certificate: {}", e))
                })?;
            }
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };

    Ok(config)
}

/// Run the TLS handshake over an established TCP stream.
pub(crate) async fn connect(
    stream: TcpStream,
    host: &str,
    trust: &TrustStrategy,
) -> DriverResult<TlsStream<TcpStream>> {
    let connector = TlsConnector::from(Arc::new(client_config(trust)?));
    let server_name = ServerName::try_from(host)
        .map_err(|_| DriverError::configuration(format!("Invalid TLS server name: {}", host)))?;

    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| DriverError::connection(format!("TLS handshake with {} failed: {}", host, e)))
}
