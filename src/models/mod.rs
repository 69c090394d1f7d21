use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Point-in-time price snapshot for one ticker
///
/// Produced exclusively by the gateway. Immutable once created - the next
/// fetch supersedes it rather than mutating it. `stale` is only set when the
/// gateway serves an expired cache entry because every provider failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: f64,
    pub high_30d: f64,
    pub high_60d: f64,
    pub percent_change_this_month: f64,
    pub percent_change_last_month: f64,
    /// Annualized volatility as a decimal fraction (0.25 = 25%)
    pub volatility: f64,
    pub market_cap: f64,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
}

/// BUY/HOLD/SELL classification for a position
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Hold => "HOLD",
            Action::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Action> {
        match s {
            "BUY" => Some(Action::Buy),
            "HOLD" => Some(Action::Hold),
            "SELL" => Some(Action::Sell),
            _ => None,
        }
    }
}

/// Traffic-light color attached to a decision
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskColor {
    Green,
    Yellow,
    Red,
}

impl RiskColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskColor::Green => "green",
            RiskColor::Yellow => "yellow",
            RiskColor::Red => "red",
        }
    }

    pub fn parse(s: &str) -> Option<RiskColor> {
        match s {
            "green" => Some(RiskColor::Green),
            "yellow" => Some(RiskColor::Yellow),
            "red" => Some(RiskColor::Red),
            _ => None,
        }
    }
}

/// One ticker holding within a user's portfolio
///
/// `current_price`, `action` and `reason` are overwritten on every scheduler
/// cycle or interactive recompute; everything else is set when the holding
/// is added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticker: String,
    pub entry_price: f64,
    pub current_price: f64,
    pub shares: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub action: Action,
    pub reason: String,
    pub risk_color: RiskColor,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Market value at the given price
    pub fn market_value(&self, price: f64) -> f64 {
        price * self.shares
    }

    /// Unrealized return relative to entry, as a percentage
    pub fn pnl_percent(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * 100.0
    }
}

/// Output of the decision engine for one position
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub reason: String,
    pub color: RiskColor,
    pub score: i32,
}

/// Risk condition category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlertKind {
    StopLoss,
    TakeProfit,
    PositionSize,
    PortfolioRisk,
    MarketCondition,
}

/// Alert severity, ordered from Low to Critical
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// What the risk engine suggests doing about an alert
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Recommended {
    Sell,
    Hold,
    Reduce,
    Monitor,
}

/// Immutable event describing a detected risk condition
///
/// Generated fresh on each analysis pass; deduplication is the caller's
/// concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAlert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub ticker: Option<String>,
    pub message: String,
    pub recommended: Recommended,
    pub at: DateTime<Utc>,
}
