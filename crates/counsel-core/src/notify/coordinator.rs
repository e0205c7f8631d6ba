//! Advisor-side notification dedup and accept/decline arbitration.
//!
//! Several transport channels can report the same pending session (a direct
//! push, a database-change feed, a locally re-emitted event). All of them
//! funnel into `announce`, which is the single dedup point: the first call
//! for a session id raises the alert, every later one is a no-op.
//!
//! The alert repeats on an interval until answered or muted; its
//! cancellation token is held per announced session. Accept and decline are
//! arbitrated downstream by the lifecycle controller's compare-and-swap,
//! never here.

use std::sync::Arc;

use counsel_types::config::NotifyConfig;
use counsel_types::error::SessionError;
use counsel_types::event::SessionEvent;
use counsel_types::session::{DeclineReason, Session, SessionStatus};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::event::EventBus;
use crate::session::lifecycle::LifecycleController;
use crate::session::rates::RateCard;
use crate::session::store::SessionStore;
use crate::wallet::Wallet;

/// Deduplicates pending-session alerts and funnels accept/decline through
/// the lifecycle controller.
pub struct NotificationCoordinator<S, W, R> {
    controller: Arc<LifecycleController<S, W, R>>,
    wallet: Arc<W>,
    events: EventBus,
    config: NotifyConfig,
    /// Session ids already alerted, each with its alert-cancellation handle.
    announced: DashMap<Uuid, CancellationToken>,
}

impl<S, W, R> NotificationCoordinator<S, W, R>
where
    S: SessionStore + 'static,
    W: Wallet + 'static,
    R: RateCard + 'static,
{
    pub fn new(
        controller: Arc<LifecycleController<S, W, R>>,
        wallet: Arc<W>,
        events: EventBus,
        config: NotifyConfig,
    ) -> Self {
        Self {
            controller,
            wallet,
            events,
            config,
            announced: DashMap::new(),
        }
    }

    /// Whether an alert is currently live (announced and not muted).
    pub fn is_alerting(&self, session_id: &Uuid) -> bool {
        self.announced
            .get(session_id)
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Surface a pending session to its advisor, exactly once.
    ///
    /// No-op when the session was already announced or is no longer
    /// pending. Performs an advisory balance pre-check on the client: an
    /// underfunded request is silently auto-declined without ever alerting
    /// the advisor.
    pub async fn announce(&self, session: &Session) -> Result<(), SessionError> {
        // Channels deliver snapshots that may be stale; the store is the
        // authority on whether the session is still pending.
        let session = match self.controller.get_session(&session.id).await {
            Ok(current) => current,
            Err(SessionError::Validation(_)) => {
                debug!(session_id = %session.id, "announce for unknown session, ignoring");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if session.status != SessionStatus::PendingApproval {
            debug!(session_id = %session.id, status = %session.status, "announce on non-pending session, ignoring");
            return Ok(());
        }

        // The entry reservation is the dedup point: concurrent announces
        // for the same id race on the shard lock and only one proceeds.
        let token = match self.announced.entry(session.id) {
            Entry::Occupied(_) => {
                debug!(session_id = %session.id, "already announced, ignoring");
                return Ok(());
            }
            Entry::Vacant(vacant) => {
                let token = CancellationToken::new();
                vacant.insert(token.clone());
                token
            }
        };

        let balance = self.wallet.balance(&session.client_id).await?;
        if !balance.covers(self.controller.minimum_funding()) {
            // Never alert the advisor for a request that cannot be funded.
            self.announced.remove(&session.id);
            token.cancel();
            info!(session_id = %session.id, %balance, "underfunded request, auto-declining");
            return self
                .controller
                .decline_session(session.id, Some(DeclineReason::InsufficientFunds))
                .await;
        }

        self.alert(&session);
        self.spawn_realert(&session, token);
        info!(session_id = %session.id, advisor_id = %session.advisor_id, "session announced");
        Ok(())
    }

    /// Silence the alert for a pending session without resolving it.
    pub fn mute(&self, session_id: &Uuid) {
        if let Some(token) = self.announced.get(session_id) {
            token.cancel();
            debug!(%session_id, "alert muted");
        }
    }

    /// Accept a pending session on the advisor's behalf.
    ///
    /// Re-verifies the client balance first; a drained wallet converts the
    /// accept into an auto-decline. Clears the alert regardless of outcome.
    pub async fn accept(self: &Arc<Self>, session_id: Uuid) -> Result<Session, SessionError> {
        self.clear(&session_id);

        let session = self.controller.get_session(&session_id).await?;
        let balance = self.wallet.balance(&session.client_id).await?;
        let required = self.controller.minimum_funding();
        if !balance.covers(required) {
            info!(%session_id, %balance, "balance drained before accept, auto-declining");
            self.controller
                .decline_session(session_id, Some(DeclineReason::InsufficientFunds))
                .await?;
            return Err(SessionError::InsufficientFunds {
                required,
                available: balance,
            });
        }

        self.controller().accept_session(session_id).await
    }

    /// Decline a pending session. Clears the alert unconditionally.
    pub async fn decline(
        &self,
        session_id: Uuid,
        reason: Option<DeclineReason>,
    ) -> Result<(), SessionError> {
        self.clear(&session_id);
        self.controller.decline_session(session_id, reason).await
    }

    fn controller(&self) -> &Arc<LifecycleController<S, W, R>> {
        &self.controller
    }

    /// Cancel and forget the alert for a session.
    fn clear(&self, session_id: &Uuid) {
        if let Some((_, token)) = self.announced.remove(session_id) {
            token.cancel();
        }
    }

    fn alert(&self, session: &Session) {
        self.events.publish(SessionEvent::SessionRequested {
            session_id: session.id,
            client_id: session.client_id,
            advisor_id: session.advisor_id,
        });
    }

    /// Repeat the alert on an interval until answered or muted.
    fn spawn_realert(&self, session: &Session, token: CancellationToken) {
        let events = self.events.clone();
        let session_id = session.id;
        let client_id = session.client_id;
        let advisor_id = session.advisor_id;
        let period = self.config.realert_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick resolves immediately; the initial alert was
            // already raised by announce.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        events.publish(SessionEvent::SessionRequested {
                            session_id,
                            client_id,
                            advisor_id,
                        });
                    }
                }
            }
            debug!(%session_id, "alert loop exited");
        });
    }
}

impl<S, W, R> std::fmt::Debug for NotificationCoordinator<S, W, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCoordinator")
            .field("announced", &self.announced.len())
            .finish()
    }
}
