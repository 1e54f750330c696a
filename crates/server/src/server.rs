//! The TLS listener and graceful shutdown.

use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    anyhow::{Context, Result},
    tokio::{net::TcpListener, sync::watch, task::JoinSet},
    tokio_rustls::TlsAcceptor,
    tracing::{debug, error, info, warn},
};

use {comcore_config::ComcoreConfig, comcore_mail::Mailer, comcore_store::Store};

use crate::{conn, state::ServerState, tls};

/// How long draining connections may take before they are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct Server {
    config: ComcoreConfig,
    state: Arc<ServerState>,
}

impl Server {
    pub fn new(config: ComcoreConfig, store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
        let data_dir = data_dir(&config);
        let state = ServerState::new(store, mailer, data_dir.join("uploads"));
        Self { config, state }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Initialize the store, accept TLS connections until `SIGINT`, then
    /// shut down: refuse new connections, tell every live connection the
    /// session is ending, drain, and close the store.
    pub async fn run(self) -> Result<()> {
        self.state
            .store
            .initialize()
            .await
            .map_err(|e| anyhow::anyhow!("store initialization failed: {e}"))?;

        let data = data_dir(&self.config);
        let (cert, key) = tls::ensure_certs(&self.config.tls, &data)?;
        let tls_config = tls::load_rustls_config(&cert, &key)?;
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let addr = format!("{}:{}", self.config.server.bind, self.config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("bind {addr}"))?;
        info!(%addr, "listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        },
                    };
                    let acceptor = acceptor.clone();
                    let state = Arc::clone(&self.state);
                    let shutdown = shutdown_rx.clone();
                    connections.spawn(async move {
                        match acceptor.accept(socket).await {
                            Ok(stream) => conn::run_connection(stream, state, shutdown).await,
                            Err(e) => debug!(peer = %peer, error = %e, "tls handshake failed"),
                        }
                    });
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                },
            }
        }

        // Stop accepting, then signal and drain the connections.
        drop(listener);
        let _ = shutdown_tx.send(true);
        let drain = async {
            while connections.join_next().await.is_some() {}
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "connections did not drain in time, aborting"
            );
            connections.shutdown().await;
        }

        if let Err(e) = self.state.store.close().await {
            error!(error = %e, "store close failed");
        }
        info!("shutdown complete");
        Ok(())
    }
}

/// The directory for server-written files (generated certs, uploads).
fn data_dir(config: &ComcoreConfig) -> PathBuf {
    if let Some(dir) = &config.data.dir {
        return dir.clone();
    }
    directories::ProjectDirs::from("", "", "comcore")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".comcore"))
}
