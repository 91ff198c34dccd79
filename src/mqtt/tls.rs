//! TLS client configuration for the mutual-TLS security broker.
//!
//! The broker population behind the vendor's regional hostnames includes
//! hosts whose certificate chains do not verify against the issued root CA.
//! The observed client connects with server verification relaxed, so the
//! same trust relaxation is applied here deliberately; the client still
//! authenticates itself with the per-session certificate.

use std::sync::Arc;

use rumqttc::tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rumqttc::tokio_rustls::rustls::pki_types::{
    CertificateDer, PrivateKeyDer, ServerName, UnixTime,
};
use rumqttc::tokio_rustls::rustls::{
    ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme,
};

use crate::auth::MqttCertInfo;
use crate::mqtt::error::MqttError;

/// Build a rustls client config from the issued certificate bundle.
pub fn client_config(cert: &MqttCertInfo) -> Result<ClientConfig, MqttError> {
    let mut roots = RootCertStore::empty();
    for ca in rustls_pemfile::certs(&mut cert.ca_pem.as_bytes()) {
        let ca = ca.map_err(|err| MqttError::Tls(format!("parse root CA: {err}")))?;
        roots
            .add(ca)
            .map_err(|err| MqttError::Tls(format!("add root CA: {err}")))?;
    }

    let chain: Vec<CertificateDer<'static>> =
        rustls_pemfile::certs(&mut cert.certificate_pem.as_bytes())
            .collect::<Result<_, _>>()
            .map_err(|err| MqttError::Tls(format!("parse client certificate: {err}")))?;
    if chain.is_empty() {
        return Err(MqttError::Tls("empty client certificate chain".into()));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut cert.private_key.as_bytes())
        .map_err(|err| MqttError::Tls(format!("parse private key: {err}")))?
        .ok_or_else(|| MqttError::Tls("no private key in bundle".into()))?;

    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)
        .map_err(|err| MqttError::Tls(format!("client auth setup: {err}")))?;

    config
        .dangerous()
        .set_certificate_verifier(Arc::new(VendorBrokerVerifier));

    Ok(config)
}

/// Accepts any server certificate the vendor broker presents.
#[derive(Debug)]
struct VendorBrokerVerifier;

impl ServerCertVerifier for VendorBrokerVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
            SignatureScheme::ED448,
        ]
    }
}
