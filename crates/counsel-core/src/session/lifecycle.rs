//! Session lifecycle controller: the state machine governing session status.
//!
//! States: `pending_approval -> {in_progress, cancelled}`,
//! `in_progress -> {completed, cancelled}`; `completed` and `cancelled` are
//! terminal. Every transition goes through the session store's
//! compare-and-swap, which is the sole arbiter of races: whichever actor's
//! transition commits first wins, and the loser's stale result degrades to
//! a logged no-op where the contract says so.

use std::sync::Arc;

use chrono::Utc;
use counsel_types::config::BillingConfig;
use counsel_types::error::SessionError;
use counsel_types::event::SessionEvent;
use counsel_types::money::Amount;
use counsel_types::session::{DeclineReason, EndedBy, Modality, Session, SessionStatus};
use tracing::{info, warn};
use uuid::Uuid;

use crate::billing::engine::{BillingEngine, ForcedEndHook};
use crate::event::EventBus;
use crate::wallet::Wallet;

use super::rates::RateCard;
use super::store::{SessionStore, TransitionError};

/// Orchestrates session lifecycle transitions and billing start/stop.
///
/// Generic over the store, wallet, and rate card ports so counsel-core
/// never depends on counsel-infra.
pub struct LifecycleController<S, W, R> {
    store: Arc<S>,
    wallet: Arc<W>,
    rates: Arc<R>,
    engine: Arc<BillingEngine<W>>,
    events: EventBus,
    config: BillingConfig,
}

impl<S, W, R> LifecycleController<S, W, R>
where
    S: SessionStore + 'static,
    W: Wallet + 'static,
    R: RateCard + 'static,
{
    pub fn new(
        store: Arc<S>,
        wallet: Arc<W>,
        rates: Arc<R>,
        engine: Arc<BillingEngine<W>>,
        events: EventBus,
        config: BillingConfig,
    ) -> Self {
        Self {
            store,
            wallet,
            rates,
            engine,
            events,
            config,
        }
    }

    /// Access the billing engine (used by tests and state introspection).
    pub fn engine(&self) -> &Arc<BillingEngine<W>> {
        &self.engine
    }

    /// The configured minimum funding threshold.
    pub fn minimum_funding(&self) -> Amount {
        self.config.minimum_funding()
    }

    /// Fetch a session, mapping "unknown id" to a validation error.
    pub async fn get_session(&self, session_id: &Uuid) -> Result<Session, SessionError> {
        self.store
            .get(session_id)
            .await?
            .ok_or_else(|| SessionError::Validation(format!("unknown session {session_id}")))
    }

    /// Admission check shared by request and accept: the client balance
    /// must meet the minimum funding threshold.
    async fn check_minimum_funding(&self, client_id: &Uuid) -> Result<(), SessionError> {
        let required = self.config.minimum_funding();
        let available = self.wallet.balance(client_id).await?;
        if !available.covers(required) {
            return Err(SessionError::InsufficientFunds {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Create a pending session request.
    ///
    /// Fails with `InsufficientFunds` (the session is never created) when
    /// the client balance is below the minimum funding threshold.
    pub async fn request_session(
        &self,
        client_id: Uuid,
        advisor_id: Uuid,
        modality: Modality,
    ) -> Result<Session, SessionError> {
        if client_id.is_nil() || advisor_id.is_nil() {
            return Err(SessionError::Validation(
                "client and advisor ids are required".to_string(),
            ));
        }
        if client_id == advisor_id {
            return Err(SessionError::Validation(
                "client and advisor must be distinct".to_string(),
            ));
        }

        self.check_minimum_funding(&client_id).await?;

        let session = Session::request(client_id, advisor_id, modality);
        self.store.create(&session).await?;
        info!(session_id = %session.id, %client_id, %advisor_id, "session requested");
        Ok(session)
    }

    /// Accept a pending session: re-validate funding, snapshot the
    /// advisor's current rate, transition to in-progress, and start billing.
    ///
    /// Fails with `StaleState` when the session is no longer pending --
    /// the expected outcome when accept races decline or a concurrent
    /// accept.
    pub async fn accept_session(self: &Arc<Self>, session_id: Uuid) -> Result<Session, SessionError> {
        let session = self.get_session(&session_id).await?;

        // Balance may have changed since the request was admitted.
        self.check_minimum_funding(&session.client_id).await?;

        let rate = self.rates.rate_per_minute(&session.advisor_id).await?;

        self.store
            .transition(
                &session_id,
                SessionStatus::PendingApproval,
                SessionStatus::InProgress,
            )
            .await
            .map_err(map_transition)?;

        // We won the CAS; the snapshot and engine start are unraced.
        let started_at = Utc::now();
        self.store
            .snapshot_rate(&session_id, rate, started_at)
            .await?;

        let hook = self.forced_end_hook();
        let mut session = session;
        session.status = SessionStatus::InProgress;
        session.rate_per_minute = Some(rate);
        session.started_at = Some(started_at);

        self.engine
            .start(&session, rate, hook)
            .map_err(|e| SessionError::Persistence(e.to_string()))?;

        self.events.publish(SessionEvent::ChatResponse {
            session_id,
            accepted: true,
        });
        info!(%session_id, rate = %rate, "session accepted");
        Ok(session)
    }

    /// Decline a pending session.
    ///
    /// A no-op (not an error) when the session is already terminal.
    pub async fn decline_session(
        &self,
        session_id: Uuid,
        reason: Option<DeclineReason>,
    ) -> Result<(), SessionError> {
        match self
            .store
            .transition(
                &session_id,
                SessionStatus::PendingApproval,
                SessionStatus::Cancelled,
            )
            .await
        {
            Ok(()) => {
                self.events.publish(SessionEvent::ChatResponse {
                    session_id,
                    accepted: false,
                });
                self.events.publish(SessionEvent::ChatRejected { session_id, reason });
                info!(%session_id, ?reason, "session declined");
                Ok(())
            }
            Err(TransitionError::Stale { actual, .. }) if actual.is_terminal() => {
                warn!(%session_id, %actual, "decline on terminal session, ignoring");
                Ok(())
            }
            Err(err) => Err(map_transition(err)),
        }
    }

    /// End an in-progress session on behalf of a participant.
    ///
    /// Settles any in-flight billing cycle first, bills the final partial
    /// minute, transitions to completed, and finalizes totals. Idempotent:
    /// a repeat call on a terminal session is a no-op with no second
    /// finalize write.
    pub async fn end_session(&self, session_id: Uuid, actor_id: Uuid) -> Result<(), SessionError> {
        let session = self.get_session(&session_id).await?;
        let ended_by = session.role_of(actor_id).ok_or(SessionError::Unauthorized)?;

        if session.status.is_terminal() {
            return Ok(());
        }
        if session.status != SessionStatus::InProgress {
            return Err(SessionError::StaleState {
                expected: SessionStatus::InProgress,
                actual: session.status,
            });
        }

        let totals = self.engine.settle(&session, true).await;

        match self
            .store
            .transition(
                &session_id,
                SessionStatus::InProgress,
                SessionStatus::Completed,
            )
            .await
        {
            Ok(()) => {}
            Err(TransitionError::Stale { actual, .. }) if actual.is_terminal() => {
                // The other actor (or a forced end) committed first.
                warn!(%session_id, %actual, "end lost the race, ignoring");
                return Ok(());
            }
            Err(err) => return Err(map_transition(err)),
        }

        self.finalize(&session, totals, ended_by).await
    }

    /// Forcibly terminate an in-progress session because a billing cycle
    /// could not be covered. Finalizes with the totals accumulated up to
    /// the last successful charge; the uncoverable cycle is never billed.
    pub async fn force_end(&self, session_id: Uuid) -> Result<(), SessionError> {
        let session = self.get_session(&session_id).await?;
        if session.status.is_terminal() {
            return Ok(());
        }

        let totals = self.engine.settle(&session, false).await;

        match self
            .store
            .transition(
                &session_id,
                SessionStatus::InProgress,
                SessionStatus::Cancelled,
            )
            .await
        {
            Ok(()) => {}
            Err(TransitionError::Stale { actual, .. }) if actual.is_terminal() => {
                warn!(%session_id, %actual, "forced end lost the race, ignoring");
                return Ok(());
            }
            Err(err) => return Err(map_transition(err)),
        }

        self.events
            .publish(SessionEvent::InsufficientFunds { session_id });
        info!(%session_id, "session force-ended: insufficient funds");
        self.finalize(&session, totals, EndedBy::System).await
    }

    /// Write final totals and fan out the terminal event. Called only by
    /// the actor that won the terminal CAS, so the finalize write happens
    /// exactly once.
    async fn finalize(
        &self,
        session: &Session,
        totals: Option<crate::billing::meter::FinalTotals>,
        ended_by: EndedBy,
    ) -> Result<(), SessionError> {
        let (duration, amount) = match totals {
            Some(t) => (t.duration_minutes, t.amount),
            None => {
                // No meter was ever started (ended before accept completed
                // engine start, or meter retired past grace). Nothing was
                // billed through the engine.
                warn!(session_id = %session.id, "finalizing without billing meter");
                (0, Amount::ZERO)
            }
        };

        self.store
            .finalize(&session.id, duration, amount, Utc::now())
            .await?;

        self.events.publish(SessionEvent::SessionEnded {
            session_id: session.id,
            ended_by,
        });
        info!(
            session_id = %session.id,
            duration_minutes = duration,
            amount = %amount,
            %ended_by,
            "session finalized"
        );
        Ok(())
    }

    /// Build the hook the engine invokes when a cycle cannot be covered.
    fn forced_end_hook(self: &Arc<Self>) -> ForcedEndHook {
        let controller = Arc::clone(self);
        Arc::new(move |session_id| {
            let controller = Arc::clone(&controller);
            Box::pin(async move {
                if let Err(err) = controller.force_end(session_id).await {
                    warn!(%session_id, error = %err, "forced end failed");
                }
            })
        })
    }
}

fn map_transition(err: TransitionError) -> SessionError {
    match err {
        TransitionError::NotFound => SessionError::Validation("unknown session".to_string()),
        TransitionError::Stale { expected, actual } => {
            SessionError::StaleState { expected, actual }
        }
        TransitionError::Repository(e) => e.into(),
    }
}
