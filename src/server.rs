//! Server assembly and lifecycle.

use crate::api::{self, AppState, TokenRegistry};
use crate::clock::{Clock, SystemClock};
use crate::config::GateConfig;
use crate::error::{Error, Result};
use crate::event::{create_event_channel, GateEvent, GateEventsChannel, GateEventsSender};
use crate::payment::{AccessGate, HttpOracle, Oracle, SessionManager, StaticCatalog, VerificationEngine};
use crate::qr::QrPipeline;
use crate::store::{FileStore, SessionStore};
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{info, warn};

/// Builder for constructing a gate server.
pub struct ServerBuilder {
    config: GateConfig,
}

impl ServerBuilder {
    /// Create a new server builder with the given configuration.
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Build the server with the durable ledger and the HTTP oracle.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the ledger cannot be
    /// opened, or the listen address cannot be bound.
    pub async fn build(self) -> Result<RunningServer> {
        std::fs::create_dir_all(&self.config.data_dir)?;

        let store = Arc::new(FileStore::open(self.config.ledger_path())?);
        let oracle = HttpOracle::new(self.config.oracle.clone())?;
        self.build_with(store, oracle, Arc::new(SystemClock)).await
    }

    /// Build the server around explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the listen address
    /// cannot be bound.
    pub async fn build_with<O: Oracle + 'static>(
        self,
        store: Arc<dyn SessionStore>,
        oracle: O,
        clock: Arc<dyn Clock>,
    ) -> Result<RunningServer> {
        let config = self.config;
        config.validate()?;
        info!(
            "Building bankpay-gate (listen={}, data_dir={}, {} buyers, {} items)",
            config.listen,
            config.data_dir.display(),
            config.buyers.len(),
            config.items.len()
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = create_event_channel();

        let catalog = Arc::new(StaticCatalog::from_config(&config));
        let manager = SessionManager::new(
            Arc::clone(&store),
            catalog,
            Arc::clone(&clock),
            events_tx.clone(),
            config.payment.window(),
        );
        let engine = VerificationEngine::new(
            Arc::clone(&store),
            oracle,
            Arc::clone(&clock),
            events_tx.clone(),
            config.payment.clone(),
        );
        let gate = AccessGate::new(store, clock, events_tx.clone(), config.access.cache_capacity);

        let router = api::router(AppState {
            manager: Arc::new(manager),
            engine: Arc::new(engine),
            gate: Arc::new(gate),
            tokens: Arc::new(TokenRegistry::from_config(&config)),
            qr: Arc::new(QrPipeline::new(&config.qr)),
        });

        let listener = TcpListener::bind(config.listen).await?;
        let local_addr = listener.local_addr()?;

        Ok(RunningServer {
            config,
            router,
            listener: Some(listener),
            local_addr,
            shutdown_tx,
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
        })
    }
}

/// Handle that stops a running server from another task.
#[derive(Clone)]
pub struct ShutdownHandle(watch::Sender<bool>);

impl ShutdownHandle {
    /// Request shutdown.
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

/// A bound gate server.
pub struct RunningServer {
    config: GateConfig,
    router: Router,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: GateEventsSender,
    events_rx: Option<GateEventsChannel>,
}

impl RunningServer {
    /// Address the server is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Directory holding the session ledger.
    #[must_use]
    pub fn data_dir(&self) -> &PathBuf {
        &self.config.data_dir
    }

    /// Get a receiver for gate events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<GateEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to gate events.
    #[must_use]
    pub fn subscribe_events(&self) -> GateEventsChannel {
        self.events_tx.subscribe()
    }

    /// Handle for stopping the server once `run` owns it.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    /// Serve requests until shutdown is requested or Ctrl-C is received.
    ///
    /// # Errors
    ///
    /// Returns an error if the server was already run or the listener fails.
    pub async fn run(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Config("server has already been run".to_string()))?;

        spawn_audit_log(self.events_tx.subscribe(), self.shutdown_rx.clone());

        info!("bankpay-gate listening on {}", self.local_addr);
        let _ = self.events_tx.send(GateEvent::Started);

        let shutdown_rx = self.shutdown_rx.clone();
        let shutdown_tx = self.shutdown_tx.clone();
        let signal = async move {
            tokio::select! {
                () = shutdown_requested(shutdown_rx) => {
                    info!("Shutdown signal received");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, initiating shutdown");
                    let _ = shutdown_tx.send(true);
                }
            }
        };

        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(signal)
            .await?;

        let _ = self.events_tx.send(GateEvent::ShuttingDown);
        self.shutdown();
        info!("Server shutdown complete");
        Ok(())
    }

    /// Request the server to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn shutdown_requested(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Drain lifecycle events into the audit log until shutdown.
fn spawn_audit_log(mut events: GateEventsChannel, mut shutdown_rx: watch::Receiver<bool>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => audit(&event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(target: "bankpay::audit", "Audit log lagged, {missed} events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });
}

fn audit(event: &GateEvent) {
    match event {
        GateEvent::Started => info!(target: "bankpay::audit", "gate started"),
        GateEvent::ShuttingDown => info!(target: "bankpay::audit", "gate shutting down"),
        GateEvent::SessionCreated {
            session_id,
            buyer_id,
            item_id,
            reference_code,
        } => info!(
            target: "bankpay::audit",
            "session {session_id} created for buyer {buyer_id} item {item_id} ref {reference_code}"
        ),
        GateEvent::SessionReused { session_id } => {
            info!(target: "bankpay::audit", "session {session_id} reused");
        }
        GateEvent::SessionExpired { session_id } => {
            info!(target: "bankpay::audit", "session {session_id} expired");
        }
        GateEvent::PaymentVerified {
            session_id,
            transaction_id,
        } => info!(
            target: "bankpay::audit",
            "session {session_id} verified by transaction {transaction_id}"
        ),
        GateEvent::PaymentFailed { session_id, reason } => {
            info!(target: "bankpay::audit", "session {session_id} failed: {reason}");
        }
    }
}
