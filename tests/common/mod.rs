//! Shared fixtures for gateway integration tests

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::{EncodePublicKey, LineEnding};
use rand_core::OsRng;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Generate a P-256 key pair and drop the public half into the key
/// directory as `<CALLSIGN>.pem`
pub fn provision_operator(keys_dir: &Path, callsign: &str) -> SigningKey {
    let signing = SigningKey::random(&mut OsRng);
    let pem = signing
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap();
    std::fs::write(keys_dir.join(format!("{}.pem", callsign)), pem).unwrap();
    signing
}

/// Current wall clock as fractional Unix seconds
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

/// Build the JSON command payload the RX chain would deliver
pub fn json_payload(operator: &str, command: &str, timestamp: f64) -> Vec<u8> {
    format!(
        r#"{{"operator":"{}","command":"{}","timestamp":{}}}"#,
        operator, command, timestamp
    )
    .into_bytes()
}

/// DER-encode a signature over the payload bytes
pub fn sign(signing: &SigningKey, payload: &[u8]) -> Vec<u8> {
    let sig: Signature = signing.sign(payload);
    sig.to_der().as_bytes().to_vec()
}

/// Minimal stand-in for the SVXLink TCP control port: reads one line,
/// answers with a fixed response, forever
pub async fn spawn_mock_controller(response: &'static str) -> (String, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(response.as_bytes()).await;
        }
    });

    ("127.0.0.1".to_string(), port)
}
