//! Per-session metering state and billing-cycle arithmetic.
//!
//! `BillingMeter` is pure bookkeeping: it plans cycles and records committed
//! charges, but never touches the wallet or the clock itself. The engine
//! feeds it timestamps, which keeps every rounding rule unit-testable
//! without sleeping.
//!
//! Billing granularity is the whole minute: a cycle bills
//! `ceil(elapsed / 60)` minutes of the snapshotted rate, and elapsed time
//! under one minute accrues without a charge. A failed cycle mutates
//! nothing, so a retry re-plans from the same `last_billing_time` -- no
//! double-count and no lost time.

use chrono::{DateTime, Utc};
use counsel_types::money::Amount;

const SECONDS_PER_MINUTE: u64 = 60;

/// Round seconds up to whole minutes.
fn ceil_minutes(seconds: u64) -> u32 {
    seconds.div_ceil(SECONDS_PER_MINUTE) as u32
}

/// What the next billing cycle should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePlan {
    /// Less than a full minute has elapsed since the last charge; update
    /// accumulated duration only.
    Accrue,
    /// Bill `minutes` whole minutes for `amount`.
    Charge { minutes: u32, amount: Amount },
}

/// Final duration and amount for a settled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalTotals {
    /// Accumulated seconds rounded up to whole minutes.
    pub duration_minutes: u32,
    /// Sum of committed cycle charges.
    pub amount: Amount,
}

/// Ephemeral metering state for one active session.
///
/// Created when a session transitions to in-progress, retired a short grace
/// period after settlement. The registry entry wrapping this meter is the
/// per-session lock: a cycle, an end request, and a forced termination all
/// serialize on it.
#[derive(Debug, Clone)]
pub struct BillingMeter {
    started_at: DateTime<Utc>,
    rate_per_minute: Amount,
    accumulated_seconds: u64,
    total_billed: Amount,
    last_billing_time: DateTime<Utc>,
    active: bool,
}

impl BillingMeter {
    /// Start metering at `now` with the session's snapshotted rate.
    pub fn start(rate_per_minute: Amount, now: DateTime<Utc>) -> Self {
        Self {
            started_at: now,
            rate_per_minute,
            accumulated_seconds: 0,
            total_billed: Amount::ZERO,
            last_billing_time: now,
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn rate_per_minute(&self) -> Amount {
        self.rate_per_minute
    }

    pub fn total_billed(&self) -> Amount {
        self.total_billed
    }

    pub fn accumulated_seconds(&self) -> u64 {
        self.accumulated_seconds
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds since the last successful charge (clamped at zero).
    fn elapsed_since_last(&self, now: DateTime<Utc>) -> u64 {
        (now - self.last_billing_time).num_seconds().max(0) as u64
    }

    /// Plan the next cycle: accrue only if under a minute, otherwise bill
    /// the elapsed time rounded up to whole minutes.
    pub fn plan_cycle(&self, now: DateTime<Utc>) -> CyclePlan {
        let elapsed = self.elapsed_since_last(now);
        if elapsed < SECONDS_PER_MINUTE {
            return CyclePlan::Accrue;
        }
        let minutes = ceil_minutes(elapsed);
        CyclePlan::Charge {
            minutes,
            amount: self.rate_per_minute.times_minutes(minutes),
        }
    }

    /// Plan the settlement charge for time accrued since the last
    /// successful cycle. A partial final minute rounds up, matching the
    /// periodic rounding policy. `None` when no time has accrued.
    pub fn plan_remainder(&self, now: DateTime<Utc>) -> Option<(u32, Amount)> {
        let elapsed = self.elapsed_since_last(now);
        if elapsed == 0 {
            return None;
        }
        let minutes = ceil_minutes(elapsed);
        Some((minutes, self.rate_per_minute.times_minutes(minutes)))
    }

    /// Update accumulated duration to the wall-clock elapsed time. Issues
    /// no charge.
    pub fn accrue(&mut self, now: DateTime<Utc>) {
        let since_start = (now - self.started_at).num_seconds().max(0) as u64;
        self.accumulated_seconds = self.accumulated_seconds.max(since_start);
    }

    /// Record a committed charge: advance the billing base to `now` so a
    /// later cycle meters only time after this one.
    ///
    /// Must be called only after the wallet reported the charge committed.
    /// On any failure the caller leaves the meter untouched.
    pub fn commit(&mut self, amount: Amount, now: DateTime<Utc>) {
        self.total_billed += amount;
        self.last_billing_time = now;
        self.accrue(now);
    }

    /// Stop metering. Idempotent; returns whether this call deactivated.
    pub fn deactivate(&mut self) -> bool {
        let was_active = self.active;
        self.active = false;
        was_active
    }

    /// Final duration (rounded up to whole minutes) and billed amount.
    pub fn final_totals(&self) -> FinalTotals {
        FinalTotals {
            duration_minutes: ceil_minutes(self.accumulated_seconds),
            amount: self.total_billed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn meter_at(rate_units: u64) -> (BillingMeter, DateTime<Utc>) {
        let t0 = Utc::now();
        (BillingMeter::start(Amount::from_units(rate_units), t0), t0)
    }

    #[test]
    fn sub_minute_elapsed_accrues_without_charge() {
        let (meter, t0) = meter_at(2);
        assert_eq!(meter.plan_cycle(t0 + Duration::seconds(59)), CyclePlan::Accrue);
    }

    #[test]
    fn exactly_one_minute_bills_one_minute() {
        let (meter, t0) = meter_at(2);
        assert_eq!(
            meter.plan_cycle(t0 + Duration::seconds(60)),
            CyclePlan::Charge {
                minutes: 1,
                amount: Amount::from_units(2)
            }
        );
    }

    #[test]
    fn sixty_one_seconds_bills_two_minutes() {
        // Scenario A: rate $2/min, elapsed 61s -> ceil(61/60) = 2 min = $4
        let (meter, t0) = meter_at(2);
        assert_eq!(
            meter.plan_cycle(t0 + Duration::seconds(61)),
            CyclePlan::Charge {
                minutes: 2,
                amount: Amount::from_units(4)
            }
        );
    }

    #[test]
    fn cycles_meter_from_last_commit_not_start() {
        // Scenario B: after committing at t0+61, the next cycle fires 121s
        // later -> ceil(121/60) = 3 min = $6
        let (mut meter, t0) = meter_at(2);
        let t1 = t0 + Duration::seconds(61);
        meter.commit(Amount::from_units(4), t1);

        let t2 = t1 + Duration::seconds(121);
        assert_eq!(
            meter.plan_cycle(t2),
            CyclePlan::Charge {
                minutes: 3,
                amount: Amount::from_units(6)
            }
        );
        assert_eq!(meter.total_billed(), Amount::from_units(4));
    }

    #[test]
    fn failed_cycle_replans_from_same_base() {
        // A persistence failure mutates nothing: planning again at a later
        // time covers the full span since the last successful charge.
        let (meter, t0) = meter_at(2);
        let first = meter.plan_cycle(t0 + Duration::seconds(61));
        assert!(matches!(first, CyclePlan::Charge { minutes: 2, .. }));

        // Nothing committed; the retry sees more elapsed time, not less.
        assert_eq!(
            meter.plan_cycle(t0 + Duration::seconds(125)),
            CyclePlan::Charge {
                minutes: 3,
                amount: Amount::from_units(6)
            }
        );
    }

    #[test]
    fn remainder_bills_partial_final_minute() {
        // Session ended 30s after the last charge: the partial minute is
        // billed, rounded up to one whole minute.
        let (mut meter, t0) = meter_at(2);
        let t1 = t0 + Duration::seconds(61);
        meter.commit(Amount::from_units(4), t1);

        assert_eq!(
            meter.plan_remainder(t1 + Duration::seconds(30)),
            Some((1, Amount::from_units(2)))
        );
    }

    #[test]
    fn remainder_is_none_when_no_time_accrued() {
        let (mut meter, t0) = meter_at(2);
        assert_eq!(meter.plan_remainder(t0), None);

        let t1 = t0 + Duration::seconds(61);
        meter.commit(Amount::from_units(4), t1);
        assert_eq!(meter.plan_remainder(t1), None);
    }

    #[test]
    fn commit_updates_totals_and_duration() {
        let (mut meter, t0) = meter_at(2);
        let t1 = t0 + Duration::seconds(61);
        meter.commit(Amount::from_units(4), t1);

        assert_eq!(meter.total_billed(), Amount::from_units(4));
        assert_eq!(meter.accumulated_seconds(), 61);
    }

    #[test]
    fn accrue_never_shrinks_duration() {
        let (mut meter, t0) = meter_at(2);
        meter.accrue(t0 + Duration::seconds(45));
        assert_eq!(meter.accumulated_seconds(), 45);
        meter.accrue(t0 + Duration::seconds(30));
        assert_eq!(meter.accumulated_seconds(), 45);
    }

    #[test]
    fn final_totals_round_duration_up() {
        let (mut meter, t0) = meter_at(2);
        let t1 = t0 + Duration::seconds(61);
        meter.commit(Amount::from_units(4), t1);
        meter.accrue(t0 + Duration::seconds(90));

        let totals = meter.final_totals();
        assert_eq!(totals.duration_minutes, 2); // ceil(90/60)
        assert_eq!(totals.amount, Amount::from_units(4));
    }

    #[test]
    fn final_totals_of_unticked_meter_are_zero() {
        let (meter, _) = meter_at(2);
        let totals = meter.final_totals();
        assert_eq!(totals.duration_minutes, 0);
        assert_eq!(totals.amount, Amount::ZERO);
    }

    #[test]
    fn deactivate_is_idempotent() {
        let (mut meter, _) = meter_at(2);
        assert!(meter.deactivate());
        assert!(!meter.deactivate());
        assert!(!meter.is_active());
    }

    #[test]
    fn clock_going_backwards_clamps_to_zero() {
        let (meter, t0) = meter_at(2);
        assert_eq!(meter.plan_cycle(t0 - Duration::seconds(5)), CyclePlan::Accrue);
    }
}
