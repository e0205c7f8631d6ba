//! RateCard port: where the advisor's current per-minute rate comes from.
//!
//! Advisor profile management is out of scope for the core; only the rate
//! lookup crosses the boundary, so `accept` can snapshot the advisor's
//! current rate into the session.

use std::collections::HashMap;
use std::sync::Mutex;

use counsel_types::error::RepositoryError;
use counsel_types::money::Amount;
use uuid::Uuid;

/// Port for looking up an advisor's current per-minute rate.
pub trait RateCard: Send + Sync {
    /// The advisor's current rate. `RepositoryError::NotFound` for unknown
    /// advisors.
    fn rate_per_minute(
        &self,
        advisor_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Amount, RepositoryError>> + Send;
}

/// In-memory `RateCard` for tests and demo wiring.
#[derive(Debug, Default)]
pub struct InMemoryRateCard {
    rates: Mutex<HashMap<Uuid, Amount>>,
}

impl InMemoryRateCard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(&self, advisor_id: Uuid, rate: Amount) {
        self.rates
            .lock()
            .expect("rate lock poisoned")
            .insert(advisor_id, rate);
    }
}

impl RateCard for InMemoryRateCard {
    async fn rate_per_minute(&self, advisor_id: &Uuid) -> Result<Amount, RepositoryError> {
        self.rates
            .lock()
            .expect("rate lock poisoned")
            .get(advisor_id)
            .copied()
            .ok_or(RepositoryError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_lookup_rate() {
        let rates = InMemoryRateCard::new();
        let advisor = Uuid::now_v7();
        rates.set_rate(advisor, Amount::from_units(2));

        assert_eq!(
            rates.rate_per_minute(&advisor).await.unwrap(),
            Amount::from_units(2)
        );
    }

    #[tokio::test]
    async fn unknown_advisor_is_not_found() {
        let rates = InMemoryRateCard::new();
        assert!(matches!(
            rates.rate_per_minute(&Uuid::now_v7()).await,
            Err(RepositoryError::NotFound)
        ));
    }
}
