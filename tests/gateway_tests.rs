//! End-to-end gateway tests: real transports, real key material, a mock
//! controller on a loopback TCP port, and a scratch controller config
//! file for the fallback path.

mod common;

use common::*;
use parking_lot::RwLock;
use rfgate::{
    ControlMode, Gateway, GatewayConfig, IpcMechanism, KeyStore, ReplyStatus, ShutdownFlag,
    UnixSocketSource,
};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

fn encode_record(payload: &[u8], signature: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&(signature.len() as u32).to_be_bytes());
    out.extend_from_slice(signature);
    out
}

fn gateway(config: GatewayConfig) -> Gateway {
    let store = KeyStore::load(&config.authorized_keys_dir).unwrap();
    store.ensure_nonempty().unwrap();
    Gateway::new(config.clone(), Arc::new(RwLock::new(store)))
}

#[tokio::test]
async fn signed_command_over_unix_socket() {
    let keys = tempfile::tempdir().unwrap();
    let signing = provision_operator(keys.path(), "LA1ABC");
    let (host, port) = spawn_mock_controller("Squelch threshold set to -24 dB\n").await;

    let dir = tempfile::tempdir().unwrap();
    let config = GatewayConfig {
        ipc_mechanism: IpcMechanism::Socket,
        socket_path: dir.path().join("gw.sock"),
        authorized_keys_dir: keys.path().to_path_buf(),
        svxlink_tcp_host: host,
        svxlink_tcp_port: port,
        repeater_callsign: "LD5RPT".to_string(),
        poll_interval: 1,
        ..GatewayConfig::default()
    };

    let transport = UnixSocketSource::bind(&config).unwrap();
    let shutdown = ShutdownFlag::new();
    let socket_path = config.socket_path.clone();
    let gw = gateway(config);

    let loop_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        let mut transport = transport;
        gw.run(&mut transport, &loop_shutdown).await.unwrap();
    });

    let mut client = UnixStream::connect(&socket_path).await.unwrap();
    let payload = json_payload("LA1ABC", "SET_SQUELCH -24", now());
    let signature = sign(&signing, &payload);
    client
        .write_all(&encode_record(&payload, &signature))
        .await
        .unwrap();

    // Reply comes back as one framed text line
    let mut len_buf = [0u8; 4];
    client.read_exact(&mut len_buf).await.unwrap();
    let mut body = vec![0u8; u32::from_be_bytes(len_buf) as usize];
    client.read_exact(&mut body).await.unwrap();

    let text = String::from_utf8(body).unwrap();
    let mut parts = text.splitn(3, ':');
    let timestamp: f64 = parts.next().unwrap().parse().unwrap();
    assert!(timestamp > 1_600_000_000.0);
    assert_eq!(parts.next().unwrap(), "LD5RPT");
    assert_eq!(parts.next().unwrap(), "squelch = -24 dB");

    shutdown.trigger();
    server.await.unwrap();
}

#[tokio::test]
async fn forged_signature_gets_failure_reply() {
    let keys = tempfile::tempdir().unwrap();
    provision_operator(keys.path(), "LA1ABC");
    // Signature from a key the gateway never saw
    let rogue = provision_operator(tempfile::tempdir().unwrap().path(), "LA1ABC");

    let config = GatewayConfig {
        authorized_keys_dir: keys.path().to_path_buf(),
        ..GatewayConfig::default()
    };
    let gw = gateway(config);

    let payload = json_payload("LA1ABC", "RESTART", now());
    let signature = sign(&rogue, &payload);
    let outcome = gw.handle_frame(&payload, &signature).await.unwrap();

    assert_eq!(outcome.reply.status, ReplyStatus::Failure);
    assert_eq!(
        outcome.reply.error.as_deref(),
        Some("Signature verification failed")
    );
    assert!(outcome.update.is_none());
}

#[tokio::test]
async fn squelch_falls_back_to_config_edit() {
    let keys = tempfile::tempdir().unwrap();
    let signing = provision_operator(keys.path(), "LA1ABC");

    let dir = tempfile::tempdir().unwrap();
    let conf_path = dir.path().join("svxlink.conf");
    std::fs::write(
        &conf_path,
        "[GLOBAL]\nLOGICS=RepeaterLogic\n\n[RX_MAIN]\nSQL_OPEN_THRESH=-30\n",
    )
    .unwrap();

    let config = GatewayConfig {
        authorized_keys_dir: keys.path().to_path_buf(),
        svxlink_control: ControlMode::Config,
        svxlink_config: conf_path.clone(),
        ..GatewayConfig::default()
    };
    let gw = gateway(config);

    let payload = json_payload("LA1ABC", "SET_SQUELCH -24", now());
    let signature = sign(&signing, &payload);
    let outcome = gw.handle_frame(&payload, &signature).await.unwrap();

    assert_eq!(outcome.reply.status, ReplyStatus::Success);

    let rewritten = std::fs::read_to_string(&conf_path).unwrap();
    assert!(rewritten.contains("SQL_OPEN_THRESH=-24"));
    assert!(!rewritten.contains("SQL_OPEN_THRESH=-30"));

    // The original survives as a backup
    let backup = std::fs::read_to_string(conf_path.with_extension("bak")).unwrap();
    assert!(backup.contains("SQL_OPEN_THRESH=-30"));
}

#[tokio::test]
async fn rate_limit_refuses_the_excess_command() {
    let keys = tempfile::tempdir().unwrap();
    let signing = provision_operator(keys.path(), "LA1ABC");
    let (host, port) = spawn_mock_controller("OK\n").await;

    let config = GatewayConfig {
        authorized_keys_dir: keys.path().to_path_buf(),
        svxlink_tcp_host: host,
        svxlink_tcp_port: port,
        max_commands_per_minute: 2,
        ..GatewayConfig::default()
    };
    let gw = gateway(config);

    for i in 0..2 {
        let payload = json_payload("LA1ABC", &format!("SET_POWER {}", 10 + i), now());
        let signature = sign(&signing, &payload);
        let outcome = gw.handle_frame(&payload, &signature).await.unwrap();
        assert_eq!(outcome.reply.status, ReplyStatus::Success, "command {}", i);
    }

    let payload = json_payload("LA1ABC", "SET_POWER 99", now());
    let signature = sign(&signing, &payload);
    let outcome = gw.handle_frame(&payload, &signature).await.unwrap();

    assert_eq!(outcome.reply.status, ReplyStatus::Failure);
    assert!(outcome
        .reply
        .error
        .as_ref()
        .unwrap()
        .contains("Rate limit"));
}

#[tokio::test]
async fn stale_command_is_refused_before_execution() {
    let keys = tempfile::tempdir().unwrap();
    let signing = provision_operator(keys.path(), "LA1ABC");

    let config = GatewayConfig {
        authorized_keys_dir: keys.path().to_path_buf(),
        ..GatewayConfig::default()
    };
    let gw = gateway(config);

    // Six minutes old, outside the default 300 s window
    let payload = json_payload("LA1ABC", "RESTART", now() - 360.0);
    let signature = sign(&signing, &payload);
    let outcome = gw.handle_frame(&payload, &signature).await.unwrap();

    assert_eq!(outcome.reply.status, ReplyStatus::Failure);
    assert!(outcome
        .reply
        .error
        .as_ref()
        .unwrap()
        .contains("replay window"));
}

#[tokio::test]
async fn unknown_command_passes_through_to_the_controller() {
    let keys = tempfile::tempdir().unwrap();
    let signing = provision_operator(keys.path(), "LA1ABC");
    let (host, port) = spawn_mock_controller("node 9999 linked\n").await;

    let config = GatewayConfig {
        authorized_keys_dir: keys.path().to_path_buf(),
        svxlink_tcp_host: host,
        svxlink_tcp_port: port,
        ..GatewayConfig::default()
    };
    let gw = gateway(config);

    let payload = json_payload("LA1ABC", "CONNECT 9999", now());
    let signature = sign(&signing, &payload);
    let outcome = gw.handle_frame(&payload, &signature).await.unwrap();

    assert_eq!(outcome.reply.status, ReplyStatus::Success);
    let update = outcome.update.unwrap();
    assert_eq!(update.command, "CONNECT 9999");
}

#[tokio::test]
async fn legacy_text_frame_is_accepted() {
    let keys = tempfile::tempdir().unwrap();
    let signing = provision_operator(keys.path(), "LA1ABC");
    let (host, port) = spawn_mock_controller("timeout set to 120\n").await;

    let config = GatewayConfig {
        authorized_keys_dir: keys.path().to_path_buf(),
        svxlink_tcp_host: host,
        svxlink_tcp_port: port,
        ..GatewayConfig::default()
    };
    let gw = gateway(config);

    let payload = format!("{}:la1abc-2:SET_TIMEOUT 120", now()).into_bytes();
    let signature = sign(&signing, &payload);
    let outcome = gw.handle_frame(&payload, &signature).await.unwrap();

    assert_eq!(outcome.reply.status, ReplyStatus::Success);
    assert_eq!(outcome.reply.destination, "LA1ABC-2");
    assert_eq!(outcome.reply.message, "timeout = 120 s");
}
