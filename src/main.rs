//! rfgate daemon: load configuration and keys, bind the configured
//! transport, and run the command pipeline until SIGINT/SIGTERM.
//! SIGHUP reloads the authorized key store without dropping the loop.

use clap::Parser;
use parking_lot::RwLock;
use rfgate::{
    Gateway, GatewayConfig, IpcMechanism, KeyStore, PipeSource, ShutdownFlag, UnixSocketSource,
    ZmqTransport,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "rfgate",
    version,
    about = "Authenticated command gateway for amateur radio repeater control"
)]
struct Args {
    /// Path of the gateway configuration file
    #[arg(
        short,
        long,
        env = "RFGATE_CONFIG",
        default_value = "/etc/rfgate/rfgate.yaml"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The subscriber may not be up yet, so report on stderr too
            eprintln!("rfgate: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> rfgate::Result<()> {
    let config = GatewayConfig::load(&args.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!(config = %args.config.display(), "Configuration loaded");

    let keystore = KeyStore::load(&config.authorized_keys_dir)?;
    keystore.ensure_nonempty()?;
    let keystore = Arc::new(RwLock::new(keystore));

    let shutdown = ShutdownFlag::new();
    spawn_shutdown_task(shutdown.clone());
    spawn_reload_task(Arc::clone(&keystore));

    let gateway = Gateway::new(config.clone(), keystore);
    match config.ipc_mechanism {
        IpcMechanism::Zmq => {
            let mut transport = ZmqTransport::bind(&config).await?;
            gateway.run(&mut transport, &shutdown).await
        }
        IpcMechanism::Fifo => {
            let mut transport = PipeSource::open(&config)?;
            gateway.run(&mut transport, &shutdown).await
        }
        IpcMechanism::Socket => {
            let mut transport = UnixSocketSource::bind(&config)?;
            gateway.run(&mut transport, &shutdown).await
        }
    }
}

/// SIGINT or SIGTERM requests a graceful stop; the transport loop
/// notices within one poll interval
fn spawn_shutdown_task(shutdown: ShutdownFlag) {
    tokio::spawn(async move {
        let mut term = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "Cannot install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down"),
            _ = term.recv() => info!("SIGTERM received, shutting down"),
        }
        shutdown.trigger();
    });
}

/// SIGHUP swaps in a freshly loaded key store; a reload that fails or
/// comes back empty keeps the current keys
fn spawn_reload_task(keystore: Arc<RwLock<KeyStore>>) {
    tokio::spawn(async move {
        let mut hup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "Cannot install SIGHUP handler");
                return;
            }
        };

        while hup.recv().await.is_some() {
            let directory = keystore.read().directory().to_path_buf();
            match KeyStore::load(&directory) {
                Ok(fresh) if !fresh.is_empty() => {
                    info!(count = fresh.len(), "Authorized key store reloaded");
                    *keystore.write() = fresh;
                }
                Ok(_) => {
                    warn!(directory = %directory.display(), "Reload found no keys; keeping the current store");
                }
                Err(e) => {
                    warn!(error = %e, "Key store reload failed; keeping the current store");
                }
            }
        }
    });
}
