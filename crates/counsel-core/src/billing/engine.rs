//! Per-session billing engine: converts elapsed time into wallet debits.
//!
//! Each active session gets its own metering task driven by a
//! `tokio::time::interval` at the configured cadence. Sessions never contend
//! with each other; within one session, cycles and settlement serialize on
//! the registry's meter mutex, so "end" issued while a charge is mid-flight
//! waits for that charge to commit or abort.
//!
//! Cancellation is cooperative and tied to the session's terminal
//! transition: `settle` cancels the task's token, the loop observes it
//! between cycles, and a settled session never produces a further charge.
//!
//! When a cycle cannot be covered, the engine invokes the injected
//! forced-end hook instead of reaching back into the lifecycle controller
//! directly -- the controller injects the hook at start, keeping the
//! dependency one-way.

use std::sync::Arc;

use chrono::Utc;
use counsel_types::config::BillingConfig;
use counsel_types::event::SessionEvent;
use counsel_types::money::Amount;
use counsel_types::session::Session;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::event::EventBus;
use crate::wallet::Wallet;

use super::meter::{CyclePlan, FinalTotals};
use super::registry::{BillingRegistry, RegistryError};

/// Callback invoked when a billing cycle cannot be covered.
///
/// The lifecycle controller injects this at engine start; it performs the
/// forced termination (transition to cancelled, finalize, event fan-out).
pub type ForcedEndHook = Arc<dyn Fn(Uuid) -> BoxFuture<'static, ()> + Send + Sync>;

/// Result of one billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Under a minute accrued; duration updated, no charge.
    Accrued,
    /// A charge committed.
    Charged { amount: Amount },
    /// The client balance could not cover the cycle. Nothing was mutated.
    InsufficientFunds { required: Amount, available: Amount },
    /// A collaborator failed; the cycle aborted without mutating totals and
    /// the next tick retries from the same base.
    Retry,
    /// The meter is gone or inactive; the task should exit.
    Stopped,
}

/// Metering and charging for active sessions.
///
/// One instance serves all sessions; per-session state lives in the
/// registry and in the spawned tasks.
pub struct BillingEngine<W> {
    wallet: Arc<W>,
    registry: BillingRegistry,
    tickers: DashMap<Uuid, CancellationToken>,
    events: EventBus,
    config: BillingConfig,
}

impl<W: Wallet + 'static> BillingEngine<W> {
    pub fn new(wallet: Arc<W>, events: EventBus, config: BillingConfig) -> Self {
        Self {
            wallet,
            registry: BillingRegistry::new(),
            tickers: DashMap::new(),
            events,
            config,
        }
    }

    /// Access the meter registry (used by the coordinator and tests).
    pub fn registry(&self) -> &BillingRegistry {
        &self.registry
    }

    /// Whether a metering task is currently running for this session.
    pub fn is_metering(&self, session_id: &Uuid) -> bool {
        self.tickers.contains_key(session_id)
    }

    /// Start metering an accepted session.
    ///
    /// Creates the meter (rejecting a duplicate), spawns the cycle task,
    /// and emits `billing_start`.
    pub fn start(
        self: &Arc<Self>,
        session: &Session,
        rate_per_minute: Amount,
        on_insufficient: ForcedEndHook,
    ) -> Result<(), RegistryError> {
        self.registry.open(session.id, rate_per_minute, Utc::now())?;

        let token = CancellationToken::new();
        self.tickers.insert(session.id, token.clone());

        self.events.publish(SessionEvent::BillingStart {
            session_id: session.id,
            advisor_id: session.advisor_id,
            client_id: session.client_id,
        });
        info!(session_id = %session.id, rate = %rate_per_minute, "billing started");

        tokio::spawn(Arc::clone(self).run_loop(
            session.id,
            session.client_id,
            session.advisor_id,
            token,
            on_insufficient,
        ));
        Ok(())
    }

    async fn run_loop(
        self: Arc<Self>,
        session_id: Uuid,
        client_id: Uuid,
        advisor_id: Uuid,
        token: CancellationToken,
        on_insufficient: ForcedEndHook,
    ) {
        let mut interval = tokio::time::interval(self.config.cycle_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick resolves immediately; consume it so the first
        // cycle fires one full interval after start.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    match self.cycle(session_id, client_id, advisor_id).await {
                        TickOutcome::InsufficientFunds { required, available } => {
                            info!(
                                %session_id,
                                required = %required,
                                available = %available,
                                "cycle not covered, forcing session end"
                            );
                            on_insufficient(session_id).await;
                            break;
                        }
                        TickOutcome::Stopped => break,
                        TickOutcome::Accrued
                        | TickOutcome::Charged { .. }
                        | TickOutcome::Retry => {}
                    }
                }
            }
        }
        debug!(%session_id, "billing task exited");
    }

    /// Run one billing cycle now.
    async fn cycle(&self, session_id: Uuid, client_id: Uuid, advisor_id: Uuid) -> TickOutcome {
        self.cycle_at(session_id, client_id, advisor_id, Utc::now())
            .await
    }

    /// One billing cycle at an explicit timestamp.
    ///
    /// Holds the meter lock across the wallet call: that lock is the
    /// per-session serialization point, so settlement observes either the
    /// pre-cycle or post-cycle state, never a half-applied charge.
    pub(crate) async fn cycle_at(
        &self,
        session_id: Uuid,
        client_id: Uuid,
        advisor_id: Uuid,
        now: chrono::DateTime<Utc>,
    ) -> TickOutcome {
        let Some(handle) = self.registry.get(&session_id) else {
            return TickOutcome::Stopped;
        };
        let mut meter = handle.lock().await;
        if !meter.is_active() {
            return TickOutcome::Stopped;
        }

        match meter.plan_cycle(now) {
            CyclePlan::Accrue => {
                meter.accrue(now);
                TickOutcome::Accrued
            }
            CyclePlan::Charge { minutes, amount } => {
                match self
                    .wallet
                    .apply_charge(&session_id, &client_id, &advisor_id, amount)
                    .await
                {
                    Ok(outcome) if outcome.committed => {
                        meter.commit(amount, now);
                        debug!(
                            %session_id,
                            minutes,
                            amount = %amount,
                            balance = %outcome.balance_after,
                            "cycle charged"
                        );
                        self.events.publish(SessionEvent::BillingUpdate {
                            session_id,
                            duration_seconds: meter.accumulated_seconds(),
                            amount_billed: meter.total_billed(),
                            current_balance: outcome.balance_after,
                        });
                        TickOutcome::Charged { amount }
                    }
                    Ok(outcome) => TickOutcome::InsufficientFunds {
                        required: amount,
                        available: outcome.balance_after,
                    },
                    Err(err) => {
                        // Abort this cycle only; totals untouched, so the
                        // next tick re-plans from the same base.
                        warn!(%session_id, error = %err, "billing cycle aborted, will retry");
                        TickOutcome::Retry
                    }
                }
            }
        }
    }

    /// Stop metering and compute final totals.
    ///
    /// Cancels the cycle task, waits for any in-flight cycle to settle
    /// (commit or abort), and deactivates the meter. With `bill_remainder`,
    /// time accrued since the last cycle is billed as one final
    /// rounded-up charge (voluntary end); without it the remainder is
    /// forfeited (forced end -- the uncoverable cycle is never billed).
    ///
    /// Idempotent: a repeat call returns the same totals without a second
    /// deactivation, billing stop event, or remainder charge. Returns
    /// `None` only when no meter exists for the session (never started, or
    /// retired past the grace window).
    pub async fn settle(&self, session: &Session, bill_remainder: bool) -> Option<FinalTotals> {
        if let Some((_, token)) = self.tickers.remove(&session.id) {
            token.cancel();
        }

        let handle = self.registry.get(&session.id)?;
        let mut meter = handle.lock().await;

        if meter.deactivate() {
            let now = Utc::now();
            if bill_remainder {
                if let Some((minutes, amount)) = meter.plan_remainder(now) {
                    match self
                        .wallet
                        .apply_charge(&session.id, &session.client_id, &session.advisor_id, amount)
                        .await
                    {
                        Ok(outcome) if outcome.committed => {
                            meter.commit(amount, now);
                            debug!(
                                session_id = %session.id,
                                minutes,
                                amount = %amount,
                                "final partial cycle charged"
                            );
                            self.events.publish(SessionEvent::BillingUpdate {
                                session_id: session.id,
                                duration_seconds: meter.accumulated_seconds(),
                                amount_billed: meter.total_billed(),
                                current_balance: outcome.balance_after,
                            });
                        }
                        Ok(_) => {
                            debug!(session_id = %session.id, "final cycle not covered, forfeited");
                        }
                        Err(err) => {
                            warn!(session_id = %session.id, error = %err, "final cycle aborted, forfeited");
                        }
                    }
                }
                // Duration reflects wall-clock time on a voluntary end; a
                // forced end keeps the duration as of the last successful
                // charge.
                meter.accrue(now);
            }

            self.registry.retire(session.id, self.config.retention_grace());
            self.events.publish(SessionEvent::BillingStop {
                session_id: session.id,
            });
            info!(session_id = %session.id, total = %meter.total_billed(), "billing settled");
        }

        Some(meter.final_totals())
    }
}

impl<W> std::fmt::Debug for BillingEngine<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingEngine")
            .field("meters", &self.registry.len())
            .field("tickers", &self.tickers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{ChargeOutcome, InMemoryWallet};
    use chrono::Duration;
    use counsel_types::error::RepositoryError;
    use counsel_types::session::Modality;

    use std::sync::atomic::{AtomicBool, Ordering};

    fn engine_with(
        wallet: Arc<InMemoryWallet>,
    ) -> (Arc<BillingEngine<InMemoryWallet>>, EventBus) {
        let events = EventBus::new(64);
        let engine = Arc::new(BillingEngine::new(
            wallet,
            events.clone(),
            BillingConfig::default(),
        ));
        (engine, events)
    }

    fn noop_hook() -> ForcedEndHook {
        Arc::new(|_| Box::pin(async {}))
    }

    fn session_with_funds(wallet: &InMemoryWallet, units: u64) -> Session {
        let session = Session::request(Uuid::now_v7(), Uuid::now_v7(), Modality::Chat);
        wallet.deposit(session.client_id, Amount::from_units(units));
        session
    }

    #[tokio::test]
    async fn covered_cycle_charges_and_emits_update() {
        // Scenario A: rate $2/min, balance $5, cycle at 61s -> $4 charged.
        let wallet = Arc::new(InMemoryWallet::new());
        let (engine, events) = engine_with(Arc::clone(&wallet));
        let session = session_with_funds(&wallet, 5);
        let mut rx = events.subscribe();

        engine
            .start(&session, Amount::from_units(2), noop_hook())
            .unwrap();
        let t0 = {
            let handle = engine.registry().get(&session.id).unwrap();
            let meter = handle.lock().await;
            meter.started_at()
        };

        let outcome = engine
            .cycle_at(
                session.id,
                session.client_id,
                session.advisor_id,
                t0 + Duration::seconds(61),
            )
            .await;

        assert_eq!(
            outcome,
            TickOutcome::Charged {
                amount: Amount::from_units(4)
            }
        );
        assert_eq!(
            wallet.balance(&session.client_id).await.unwrap(),
            Amount::from_units(1)
        );

        // billing_start, then the cycle's billing_update
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::BillingStart { .. }
        ));
        let update = rx.recv().await.unwrap();
        assert_eq!(
            update,
            SessionEvent::BillingUpdate {
                session_id: session.id,
                duration_seconds: 61,
                amount_billed: Amount::from_units(4),
                current_balance: Amount::from_units(1),
            }
        );
    }

    #[tokio::test]
    async fn uncovered_cycle_mutates_nothing() {
        // Scenario B: balance $1 cannot cover a $6 cycle; totals stay at $4.
        let wallet = Arc::new(InMemoryWallet::new());
        let (engine, _events) = engine_with(Arc::clone(&wallet));
        let session = session_with_funds(&wallet, 5);

        engine
            .start(&session, Amount::from_units(2), noop_hook())
            .unwrap();
        let t0 = {
            let handle = engine.registry().get(&session.id).unwrap();
            handle.lock().await.started_at()
        };

        let t1 = t0 + Duration::seconds(61);
        engine
            .cycle_at(session.id, session.client_id, session.advisor_id, t1)
            .await;

        let outcome = engine
            .cycle_at(
                session.id,
                session.client_id,
                session.advisor_id,
                t1 + Duration::seconds(121),
            )
            .await;

        assert_eq!(
            outcome,
            TickOutcome::InsufficientFunds {
                required: Amount::from_units(6),
                available: Amount::from_units(1),
            }
        );

        // Balance and meter untouched by the failed cycle
        assert_eq!(
            wallet.balance(&session.client_id).await.unwrap(),
            Amount::from_units(1)
        );
        let handle = engine.registry().get(&session.id).unwrap();
        assert_eq!(handle.lock().await.total_billed(), Amount::from_units(4));
    }

    /// Wallet wrapper that fails the next charge with a persistence error.
    struct FlakyWallet {
        inner: InMemoryWallet,
        fail_next: AtomicBool,
    }

    impl Wallet for FlakyWallet {
        async fn balance(&self, user_id: &Uuid) -> Result<Amount, RepositoryError> {
            self.inner.balance(user_id).await
        }

        async fn apply_charge(
            &self,
            session_id: &Uuid,
            client_id: &Uuid,
            advisor_id: &Uuid,
            amount: Amount,
        ) -> Result<ChargeOutcome, RepositoryError> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(RepositoryError::Connection);
            }
            self.inner
                .apply_charge(session_id, client_id, advisor_id, amount)
                .await
        }
    }

    #[tokio::test]
    async fn persistence_failure_aborts_cycle_and_retries_from_same_base() {
        let wallet = Arc::new(FlakyWallet {
            inner: InMemoryWallet::new(),
            fail_next: AtomicBool::new(false),
        });
        let events = EventBus::new(64);
        let engine = Arc::new(BillingEngine::new(
            Arc::clone(&wallet),
            events,
            BillingConfig::default(),
        ));

        let session = Session::request(Uuid::now_v7(), Uuid::now_v7(), Modality::Chat);
        wallet.inner.deposit(session.client_id, Amount::from_units(10));

        engine
            .start(&session, Amount::from_units(2), noop_hook())
            .unwrap();
        let t0 = {
            let handle = engine.registry().get(&session.id).unwrap();
            handle.lock().await.started_at()
        };

        wallet.fail_next.store(true, Ordering::SeqCst);
        let outcome = engine
            .cycle_at(
                session.id,
                session.client_id,
                session.advisor_id,
                t0 + Duration::seconds(61),
            )
            .await;
        assert_eq!(outcome, TickOutcome::Retry);
        assert_eq!(
            wallet.balance(&session.client_id).await.unwrap(),
            Amount::from_units(10)
        );

        // Retry covers the full span since start: ceil(125/60) = 3 min = $6
        let outcome = engine
            .cycle_at(
                session.id,
                session.client_id,
                session.advisor_id,
                t0 + Duration::seconds(125),
            )
            .await;
        assert_eq!(
            outcome,
            TickOutcome::Charged {
                amount: Amount::from_units(6)
            }
        );
        assert_eq!(
            wallet.balance(&session.client_id).await.unwrap(),
            Amount::from_units(4)
        );
    }

    #[tokio::test]
    async fn settle_is_idempotent_and_stops_metering() {
        let wallet = Arc::new(InMemoryWallet::new());
        let (engine, events) = engine_with(Arc::clone(&wallet));
        let session = session_with_funds(&wallet, 5);
        let mut rx = events.subscribe();

        engine
            .start(&session, Amount::from_units(2), noop_hook())
            .unwrap();
        assert!(engine.is_metering(&session.id));

        let first = engine.settle(&session, false).await.unwrap();
        assert!(!engine.is_metering(&session.id));

        let second = engine.settle(&session, false).await.unwrap();
        assert_eq!(first, second);

        // Exactly one billing_stop among the emitted events
        let mut stops = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, SessionEvent::BillingStop { .. }) {
                stops += 1;
            }
        }
        assert_eq!(stops, 1);

        // A cycle after settlement reports stopped and charges nothing
        let outcome = engine
            .cycle_at(
                session.id,
                session.client_id,
                session.advisor_id,
                Utc::now() + Duration::seconds(120),
            )
            .await;
        assert_eq!(outcome, TickOutcome::Stopped);
        assert_eq!(
            wallet.balance(&session.client_id).await.unwrap(),
            Amount::from_units(5)
        );
    }

    #[tokio::test]
    async fn settle_without_meter_returns_none() {
        let wallet = Arc::new(InMemoryWallet::new());
        let (engine, _events) = engine_with(wallet);
        let session = Session::request(Uuid::now_v7(), Uuid::now_v7(), Modality::Chat);
        assert!(engine.settle(&session, true).await.is_none());
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected() {
        let wallet = Arc::new(InMemoryWallet::new());
        let (engine, _events) = engine_with(Arc::clone(&wallet));
        let session = session_with_funds(&wallet, 5);

        engine
            .start(&session, Amount::from_units(2), noop_hook())
            .unwrap();
        assert!(engine
            .start(&session, Amount::from_units(2), noop_hook())
            .is_err());
    }
}
