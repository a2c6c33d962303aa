//! In-memory `RiskRepository` fake, for pipeline and coordinator tests
//! that shouldn't need a live Postgres instance.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spot_core::model::RiskEvent;
use spot_core::{Error, PoolId};

use crate::RiskRepository;

#[derive(Default)]
pub struct InMemoryRiskRepository {
    events: Mutex<Vec<RiskEvent>>,
}

#[async_trait]
impl RiskRepository for InMemoryRiskRepository {
    async fn insert(&self, event: &RiskEvent) -> Result<(), Error> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn active_events(&self, pool: &PoolId) -> Result<Vec<RiskEvent>, Error> {
        let now = Utc::now();
        let pool_id = pool.to_string();
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.pool_id == pool_id && e.is_active(now))
            .cloned()
            .collect())
    }

    async fn cleanup(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| e.expires_at > now);
        Ok((before - events.len()) as u64)
    }
}
