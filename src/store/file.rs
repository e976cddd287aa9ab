//! Durable session store backed by a single ledger file.
//!
//! The whole ledger is re-encoded with MessagePack after each mutation,
//! written to a temp file in the same directory and renamed over the previous
//! snapshot. If the write fails the in-memory ledger is rolled back, so a
//! caller never observes a session that is not on disk.
//!
//! Writes happen on the calling thread. Inside a multi-threaded tokio runtime
//! they go through `block_in_place`, so other tasks keep running on the
//! remaining workers while the snapshot is flushed.

use super::{CasOutcome, InsertOutcome, Ledger, SessionStore};
use crate::error::{Error, Result};
use crate::session::{BuyerId, ItemId, NewSession, PaymentSession, SessionId, Transition};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

/// Session store persisted to disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    inner: Mutex<Ledger>,
}

impl FileStore {
    /// Open the ledger at `path`, creating an empty one if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// ledger cannot be decoded.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let ledger = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let ledger: Ledger = rmp_serde::from_slice(&bytes).map_err(|e| {
                Error::Storage(format!("corrupt ledger {}: {e}", path.display()))
            })?;
            info!(
                "Loaded {} payment sessions from {}",
                ledger.len(),
                path.display()
            );
            ledger
        } else {
            info!("Starting new payment ledger at {}", path.display());
            Ledger::new()
        };

        Ok(Self {
            path,
            inner: Mutex::new(ledger),
        })
    }

    /// Location of the ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Run a mutation and persist the result, rolling back if the write fails.
    fn mutate<T>(&self, op: impl FnOnce(&mut Ledger) -> Result<T>) -> Result<T> {
        let mut ledger = self.inner.lock();
        let before = ledger.clone();
        let revision = ledger.revision();

        let value = op(&mut ledger)?;
        if ledger.revision() == revision {
            return Ok(value);
        }

        if let Err(e) = blocking_io(|| self.persist(&ledger)) {
            warn!("Ledger write failed, rolling back: {e}");
            *ledger = before;
            return Err(e);
        }
        Ok(value)
    }

    fn persist(&self, ledger: &Ledger) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(ledger)
            .map_err(|e| Error::Storage(format!("encode ledger: {e}")))?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| Error::Storage(format!("create temp ledger: {e}")))?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| Error::Storage(format!("write temp ledger: {e}")))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::Storage(format!("replace ledger: {e}")))?;

        debug!(
            "Persisted ledger revision {} ({} bytes)",
            ledger.revision(),
            bytes.len()
        );
        Ok(())
    }
}

/// Run disk I/O, handing the worker thread over to the runtime first when
/// that is possible.
fn blocking_io<T>(io: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(io)
        }
        _ => io(),
    }
}

impl SessionStore for FileStore {
    fn insert_if_no_active(
        &self,
        draft: NewSession,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome> {
        self.mutate(|ledger| Ok(ledger.insert_if_no_active(draft, now)))
    }

    fn latest_verified(
        &self,
        buyer_id: BuyerId,
        item_id: ItemId,
    ) -> Result<Option<PaymentSession>> {
        Ok(self.inner.lock().latest_verified(buyer_id, item_id))
    }

    fn find_by_reference(
        &self,
        buyer_id: BuyerId,
        item_id: ItemId,
        reference_code: &str,
    ) -> Result<Option<PaymentSession>> {
        Ok(self
            .inner
            .lock()
            .find_by_reference(buyer_id, item_id, reference_code))
    }

    fn sessions_for(&self, buyer_id: BuyerId, item_id: ItemId) -> Result<Vec<PaymentSession>> {
        Ok(self.inner.lock().sessions_for(buyer_id, item_id))
    }

    fn get(&self, id: SessionId) -> Result<Option<PaymentSession>> {
        Ok(self.inner.lock().get(id))
    }

    fn compare_and_set(
        &self,
        id: SessionId,
        expected_version: u64,
        transition: Transition,
    ) -> Result<CasOutcome> {
        self.mutate(|ledger| ledger.compare_and_set(id, expected_version, transition))
    }

    fn expire_stale(
        &self,
        buyer_id: BuyerId,
        item_id: ItemId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentSession>> {
        self.mutate(|ledger| Ok(ledger.expire_stale(buyer_id, item_id, now)))
    }
}
