use crate::db::PositionStore;
use crate::models::{Action, Position, RiskColor};
use crate::Result;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

/// Postgres-backed position store
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to Postgres and run migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres at {}", database_url);

        Ok(Self { pool })
    }

    /// Insert or replace a position (holding added or amended)
    pub async fn save_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                id, user_id, ticker, entry_price, current_price, shares,
                stop_loss, take_profit, action, reason, risk_color, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                entry_price = EXCLUDED.entry_price,
                current_price = EXCLUDED.current_price,
                shares = EXCLUDED.shares,
                stop_loss = EXCLUDED.stop_loss,
                take_profit = EXCLUDED.take_profit,
                action = EXCLUDED.action,
                reason = EXCLUDED.reason,
                risk_color = EXCLUDED.risk_color,
                updated_at = NOW()
            "#,
        )
        .bind(position.id)
        .bind(position.user_id)
        .bind(&position.ticker)
        .bind(position.entry_price)
        .bind(position.current_price)
        .bind(position.shares)
        .bind(position.stop_loss)
        .bind(position.take_profit)
        .bind(position.action.as_str())
        .bind(&position.reason)
        .bind(position.risk_color.as_str())
        .bind(position.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a position (holding removed)
    pub async fn delete_position(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM positions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_position(row: &sqlx::postgres::PgRow) -> Result<Position> {
        let action_str: String = row.get("action");
        let color_str: String = row.get("risk_color");

        Ok(Position {
            id: row.get("id"),
            user_id: row.get("user_id"),
            ticker: row.get("ticker"),
            entry_price: row.get("entry_price"),
            current_price: row.get("current_price"),
            shares: row.get("shares"),
            stop_loss: row.get("stop_loss"),
            take_profit: row.get("take_profit"),
            action: Action::parse(&action_str)
                .ok_or_else(|| format!("unknown action '{}' in positions row", action_str))?,
            reason: row.get("reason"),
            risk_color: RiskColor::parse(&color_str)
                .ok_or_else(|| format!("unknown risk color '{}' in positions row", color_str))?,
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl PositionStore for PostgresStore {
    async fn load_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions ORDER BY user_id, ticker")
            .fetch_all(&self.pool)
            .await?;

        let mut positions = Vec::with_capacity(rows.len());
        for row in &rows {
            positions.push(Self::row_to_position(row)?);
        }

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
        sqlx::query(
            r#"
            UPDATE positions
            SET current_price = $2, action = $3, reason = $4, risk_color = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(price)
        .bind(action.as_str())
        .bind(reason)
        .bind(color.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_position() -> Position {
        Position {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            ticker: "AAPL".to_string(),
            entry_price: 150.0,
            current_price: 150.0,
            shares: 4.0,
            stop_loss: Some(130.0),
            take_profit: Some(200.0),
            action: Action::Hold,
            reason: "neutral signals".to_string(),
            risk_color: RiskColor::Yellow,
            updated_at: Utc::now(),
        }
    }

    async fn connect() -> PostgresStore {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/stockbot".to_string());
        PostgresStore::new(&url).await.expect("Postgres running")
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_save_load_update_delete() {
        let store = connect().await;
        let position = sample_position();
        let id = position.id;

        store.save_position(&position).await.unwrap();

        let loaded = store.load_positions().await.unwrap();
        let found = loaded.iter().find(|p| p.id == id).unwrap();
        assert_eq!(found.ticker, "AAPL");
        assert_eq!(found.action, Action::Hold);

        store
            .update_market_state(id, 145.0, Action::Sell, "below entry", RiskColor::Red)
            .await
            .unwrap();

        let loaded = store.load_positions().await.unwrap();
        let found = loaded.iter().find(|p| p.id == id).unwrap();
        assert_eq!(found.current_price, 145.0);
        assert_eq!(found.action, Action::Sell);
        assert_eq!(found.risk_color, RiskColor::Red);

        store.delete_position(id).await.unwrap();
        let loaded = store.load_positions().await.unwrap();
        assert!(loaded.iter().all(|p| p.id != id));
    }
}
