//! Shared fixtures for integration tests.
//!
//! `TestGate` wires the real session manager, verification engine and access
//! gate around an in-memory store, a manual clock and a scripted oracle, with
//! buyer 42 and item 7 priced at 500.00.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use bankpay_gate::api::{self, AppState, TokenRegistry};
use bankpay_gate::clock::ManualClock;
use bankpay_gate::config::{GateConfig, QrConfig};
use bankpay_gate::event::{create_event_channel, GateEventsChannel};
use bankpay_gate::payment::{
    AccessGate, Oracle, OracleReport, OracleRequest, SessionKey, SessionManager, StaticCatalog,
    VerificationEngine,
};
use bankpay_gate::qr::QrPipeline;
use bankpay_gate::store::MemoryStore;
use bankpay_gate::{Error, Result};
use chrono::Utc;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use parking_lot::Mutex;
use qrcode::{Color, QrCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

/// Buyer used throughout the scenarios.
pub const BUYER: u64 = 42;
/// Item used throughout the scenarios.
pub const ITEM: u64 = 7;
/// Bearer token of [`BUYER`].
pub const TOKEN: &str = "token-42";
/// Payee account of [`ITEM`].
pub const PAYEE_ACCOUNT: &str = "1000123456789";

/// Price of [`ITEM`].
pub fn price() -> Decimal {
    Decimal::new(50000, 2)
}

/// One scripted oracle answer.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Respond with this body.
    Report(Value),
    /// Fail as if the oracle were unreachable.
    Down,
}

/// Oracle that replays queued replies and records every request.
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<OracleRequest>>,
    calls: AtomicUsize,
    barrier: Option<Arc<Barrier>>,
}

impl ScriptedOracle {
    /// Oracle with an empty script; unscripted calls behave as [`Reply::Down`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call until `barrier` releases.
    pub fn gated(barrier: Arc<Barrier>) -> Self {
        Self {
            barrier: Some(barrier),
            ..Self::default()
        }
    }

    /// Queue a reply.
    pub fn push(&self, reply: Reply) {
        self.replies.lock().push_back(reply);
    }

    /// Number of calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().clone()
    }
}

impl Oracle for ScriptedOracle {
    async fn verify(&self, request: &OracleRequest) -> Result<OracleReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Reply::Report(body)) => OracleReport::from_value(body),
            Some(Reply::Down) | None => Err(Error::ProviderUnavailable(
                "connection refused".to_string(),
            )),
        }
    }
}

/// The oracle's answer for a correct 500.00 transfer carrying `reference`.
pub fn good_report(reference: &str) -> Value {
    json!({
        "success": true,
        "amount": "500.00 ETB",
        "reason": format!("Transfer ref {reference}"),
        "receiverAccount": PAYEE_ACCOUNT,
    })
}

/// Payment components around an in-memory store.
pub struct TestGate {
    /// Session manager.
    pub manager: Arc<SessionManager>,
    /// Verification engine.
    pub engine: Arc<VerificationEngine<ScriptedOracle>>,
    /// Access gate.
    pub gate: Arc<AccessGate>,
    /// Backing store.
    pub store: Arc<MemoryStore>,
    /// Clock shared by every component.
    pub clock: ManualClock,
    /// Lifecycle events.
    pub events: GateEventsChannel,
}

impl TestGate {
    /// Standard setup with an ungated oracle.
    pub fn setup() -> Self {
        Self::with_oracle(ScriptedOracle::new())
    }

    /// Standard setup around `oracle`.
    pub fn with_oracle(oracle: ScriptedOracle) -> Self {
        let config = config();
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(Utc::now());
        let (events_tx, events) = create_event_channel();

        let manager = SessionManager::new(
            store.clone(),
            Arc::new(StaticCatalog::from_config(&config)),
            Arc::new(clock.clone()),
            events_tx.clone(),
            config.payment.window(),
        );
        let engine = VerificationEngine::new(
            store.clone(),
            oracle,
            Arc::new(clock.clone()),
            events_tx.clone(),
            config.payment.clone(),
        );
        let gate = AccessGate::new(
            store.clone(),
            Arc::new(clock.clone()),
            events_tx,
            config.access.cache_capacity,
        );

        Self {
            manager: Arc::new(manager),
            engine: Arc::new(engine),
            gate: Arc::new(gate),
            store,
            clock,
            events,
        }
    }

    /// The scripted oracle.
    pub fn oracle(&self) -> &ScriptedOracle {
        self.engine.oracle()
    }

    /// Open a session for buyer 42 / item 7 and return its reference.
    pub fn open_session(&self) -> String {
        self.manager
            .create_or_reuse(BUYER, ITEM)
            .expect("session")
            .view()
            .reference_code
            .clone()
    }

    /// Router over these components.
    pub fn router(&self) -> axum::Router {
        self.router_with_qr(QrPipeline::new(&QrConfig::default()))
    }

    /// Router over these components with a custom receipt decoder chain.
    pub fn router_with_qr(&self, qr: QrPipeline) -> axum::Router {
        api::router(AppState {
            manager: self.manager.clone(),
            engine: self.engine.clone(),
            gate: self.gate.clone(),
            tokens: Arc::new(TokenRegistry::from_config(&config())),
            qr: Arc::new(qr),
        })
    }
}

/// Lookup key for buyer 42 / item 7.
pub fn key(reference: &str) -> SessionKey {
    SessionKey {
        buyer_id: BUYER,
        item_id: ITEM,
        reference_code: reference.to_string(),
    }
}

/// Configuration with one buyer and one item.
pub fn config() -> GateConfig {
    toml::from_str(&format!(
        r#"
        [[buyers]]
        id = {BUYER}
        token = "{TOKEN}"

        [[items]]
        id = {ITEM}
        price = "500.00"
        payee_account = "{PAYEE_ACCOUNT}"
        "#
    ))
    .expect("test config")
}

/// Render `payload` as a QR code, dark on light unless `inverted`.
pub fn render_qr(payload: &str, module_px: u32, inverted: bool) -> DynamicImage {
    const QUIET_ZONE: u32 = 4;
    let code = QrCode::new(payload.as_bytes()).expect("encodable payload");
    let width = u32::try_from(code.width()).expect("small code");
    let colors = code.to_colors();
    let side = (width + 2 * QUIET_ZONE) * module_px;

    let gray = GrayImage::from_fn(side, side, |x, y| {
        let (mx, my) = (x / module_px, y / module_px);
        let inside = (QUIET_ZONE..QUIET_ZONE + width).contains(&mx)
            && (QUIET_ZONE..QUIET_ZONE + width).contains(&my);
        let dark = inside
            && colors[((my - QUIET_ZONE) * width + (mx - QUIET_ZONE)) as usize] == Color::Dark;
        Luma([if dark == inverted { 255 } else { 0 }])
    });
    DynamicImage::ImageLuma8(gray)
}

/// Encode an image in `format`.
pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("encode image");
    bytes
}
