//
// Copyright 2025-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! TLS context loading

use crate::config::TlsConfig;
use crate::error::{NetworkError, Result};
use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::{certs, private_key};
use std::io::BufReader;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Builds a server-side TLS acceptor from the configured PEM files.
pub fn load_tls_acceptor(config: &TlsConfig) -> Result<TlsAcceptor> {
    let cert_chain = read_certificates(config.cert_path())?;
    let key = read_private_key(config.key_path())?;
    tls_acceptor(cert_chain, key)
}

/// Builds a server-side TLS acceptor from PEM text.
pub fn tls_acceptor_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<TlsAcceptor> {
    let cert_chain = parse_certificates(&mut BufReader::new(cert_pem))?;
    let key = parse_private_key(&mut BufReader::new(key_pem))?;
    tls_acceptor(cert_chain, key)
}

fn tls_acceptor(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<TlsAcceptor> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let tls_config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| NetworkError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| NetworkError::Tls(e.to_string()))?;
    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

fn read_certificates(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path)
        .map_err(|e| NetworkError::Tls(format!("Unable to open certificate '{}': {}", path, e)))?;
    parse_certificates(&mut BufReader::new(file))
}

fn read_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)
        .map_err(|e| NetworkError::Tls(format!("Unable to open private key '{}': {}", path, e)))?;
    parse_private_key(&mut BufReader::new(file))
}

fn parse_certificates(reader: &mut dyn std::io::BufRead) -> Result<Vec<CertificateDer<'static>>> {
    let chain = certs(reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| NetworkError::Tls(format!("Certificate parsing failed: {}", e)))?;
    if chain.is_empty() {
        return Err(NetworkError::Tls("No certificates found".to_string()));
    }
    Ok(chain)
}

fn parse_private_key(reader: &mut dyn std::io::BufRead) -> Result<PrivateKeyDer<'static>> {
    private_key(reader)
        .map_err(|e| NetworkError::Tls(format!("Private key parsing failed: {}", e)))?
        .ok_or_else(|| NetworkError::Tls("No private key found".to_string()))
}
