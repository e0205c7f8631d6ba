//! Registry of active billing meters, one per session.
//!
//! The registry enforces the at-most-one invariant: opening a meter for a
//! session id that already has one is rejected. Each entry is an
//! `Arc<Mutex<BillingMeter>>` -- that mutex is the per-session serialization
//! point for billing cycles, end requests, and forced terminations.
//!
//! Retired entries linger for a grace window before removal so a late
//! duplicate "end" call observes an inactive meter rather than an unknown
//! session.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use counsel_types::money::Amount;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::meter::BillingMeter;

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A meter already exists for this session id.
    #[error("billing already active for session {0}")]
    AlreadyActive(Uuid),
}

/// Shared handle to one session's metering state.
pub type MeterHandle = Arc<Mutex<BillingMeter>>;

/// Concurrent map of session id to billing meter.
///
/// Clone-cheap: clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct BillingRegistry {
    meters: Arc<DashMap<Uuid, MeterHandle>>,
}

impl BillingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a meter for a session, failing if one already exists.
    ///
    /// The vacancy check and insert happen under the shard lock, so two
    /// concurrent opens for the same id cannot both succeed.
    pub fn open(
        &self,
        session_id: Uuid,
        rate_per_minute: Amount,
        now: DateTime<Utc>,
    ) -> Result<MeterHandle, RegistryError> {
        match self.meters.entry(session_id) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyActive(session_id)),
            Entry::Vacant(vacant) => {
                let handle = Arc::new(Mutex::new(BillingMeter::start(rate_per_minute, now)));
                vacant.insert(Arc::clone(&handle));
                Ok(handle)
            }
        }
    }

    /// Look up the meter for a session, if one exists (active or retired
    /// within the grace window).
    pub fn get(&self, session_id: &Uuid) -> Option<MeterHandle> {
        self.meters.get(session_id).map(|entry| Arc::clone(&entry))
    }

    /// Schedule removal of a settled meter after the grace window.
    ///
    /// The entry stays resolvable until then; the caller must already have
    /// deactivated the meter.
    pub fn retire(&self, session_id: Uuid, grace: Duration) {
        let meters = Arc::clone(&self.meters);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            meters.remove(&session_id);
        });
    }

    /// Number of meters currently held (active plus grace-window retired).
    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }
}
