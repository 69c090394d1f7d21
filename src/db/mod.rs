pub mod postgres;

pub use postgres::PostgresStore;

use crate::models::{Action, Position, RiskColor};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Persisted position store
///
/// The only shared resource coordinated across instances; every writer runs
/// under the scheduler's distributed lock.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// All positions across all users
    async fn load_positions(&self) -> Result<Vec<Position>>;

    /// Overwrite the market-derived fields of one position
    async fn update_market_state(
        &self,
        id: Uuid,
        price: f64,
        action: Action,
        reason: &str,
        color: RiskColor,
    ) -> Result<()>;
}

/// In-memory store for tests and keyless local runs
#[derive(Default)]
pub struct MemoryPositionStore {
    positions: Mutex<HashMap<Uuid, Position>>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positions(positions: Vec<Position>) -> Self {
        let store = Self::new();
        {
            let mut map = store.positions.lock().unwrap();
            for position in positions {
                map.insert(position.id, position);
            }
        }
        store
    }

    pub fn insert(&self, position: Position) {
        self.positions.lock().unwrap().insert(position.id, position);
    }

    pub fn get(&self, id: Uuid) -> Option<Position> {
        self.positions.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl PositionStore for MemoryPositionStore {
    async fn load_positions(&self) -> Result<Vec<Position>> {
        let mut positions: Vec<Position> =
            self.positions.lock().unwrap().values().cloned().collect();
        positions.sort_by_key(|p| p.id);
        Ok(positions)
    }

    async fn update_market_state(
        &self,
        id: Uuid,
        price: f64,
        action: Action,
        reason: &str,
        color: RiskColor,
    ) -> Result<()> {
        let mut positions = self.positions.lock().unwrap();
        let position = positions
            .get_mut(&id)
            .ok_or_else(|| format!("position {} not found", id))?;

        position.current_price = price;
        position.action = action;
        position.reason = reason.to_string();
        position.risk_color = color;
        position.updated_at = chrono::Utc::now();
        Ok(())
    }
}
