use crate::analytics::{self, VolRiskLevel, VolatilityMetrics};
use crate::models::{
    AlertKind, AlertSeverity, Position, PriceQuote, Recommended, RiskAlert,
};
use chrono::Utc;
use std::collections::HashMap;

// Position-level score components
const BASE_CRITICAL: f64 = 90.0;
const BASE_HIGH: f64 = 70.0;
const BASE_MEDIUM: f64 = 40.0;
const BASE_LOW: f64 = 20.0;
const MAX_SCORE: f64 = 100.0;

// Portfolio weight thresholds
const OVERSIZED_WEIGHT: f64 = 0.20;
const LARGE_WEIGHT: f64 = 0.15;
const CONCENTRATION_WEIGHT: f64 = 0.30;

// Take-profit proximity: alert from 90% of target upward
const TAKE_PROFIT_ZONE: f64 = 0.90;

/// Risk assessment for one position
#[derive(Debug, Clone)]
pub struct PositionRisk {
    pub ticker: String,
    pub level: AlertSeverity,
    /// 0-100, additive and capped
    pub score: f64,
    /// Share of portfolio value, 0-1
    pub weight: f64,
    pub alerts: Vec<RiskAlert>,
}

/// Aggregate risk assessment for a whole portfolio
#[derive(Debug, Clone)]
pub struct PortfolioRisk {
    /// Value-share weighted sum of position scores
    pub score: f64,
    pub level: AlertSeverity,
    pub position_risks: Vec<PositionRisk>,
    pub alerts: Vec<RiskAlert>,
    /// Positions excluded from aggregates (no quote data)
    pub warnings: Vec<String>,
}

/// Stop-distance / performance heuristic for the base risk level
///
/// Critical strictly means the stop is breached. This scale is independent
/// of the decision engine's momentum scoring.
fn position_risk_level(
    position: &Position,
    price: f64,
    metrics: Option<&VolatilityMetrics>,
) -> AlertSeverity {
    if let Some(stop_loss) = position.stop_loss {
        if price <= stop_loss {
            return AlertSeverity::Critical;
        }
    }

    let pnl = position.pnl_percent(price);
    let near_stop = position
        .stop_loss
        .map(|stop| price <= stop * 1.05)
        .unwrap_or(false);
    if near_stop || pnl <= -15.0 {
        return AlertSeverity::High;
    }

    let volatile = metrics
        .map(|m| matches!(m.risk_level, VolRiskLevel::High | VolRiskLevel::Extreme))
        .unwrap_or(false);
    if pnl <= -5.0 || volatile {
        return AlertSeverity::Medium;
    }

    AlertSeverity::Low
}

fn base_score(level: AlertSeverity) -> f64 {
    match level {
        AlertSeverity::Critical => BASE_CRITICAL,
        AlertSeverity::High => BASE_HIGH,
        AlertSeverity::Medium => BASE_MEDIUM,
        AlertSeverity::Low => BASE_LOW,
    }
}

/// Score one position and collect its alerts
///
/// `price` is the caller's freshest price for the ticker; `portfolio_value`
/// the total market value it belongs to.
pub fn analyze_position(
    position: &Position,
    price: f64,
    portfolio_value: f64,
    metrics: Option<&VolatilityMetrics>,
) -> PositionRisk {
    let now = Utc::now();
    let ticker = position.ticker.clone();

    let weight = if portfolio_value > 0.0 {
        position.market_value(price) / portfolio_value
    } else {
        0.0
    };

    let level = position_risk_level(position, price, metrics);

    let mut score = base_score(level);
    if weight > OVERSIZED_WEIGHT {
        score += 20.0;
    } else if weight > LARGE_WEIGHT {
        score += 10.0;
    }
    score = score.min(MAX_SCORE);

    let mut alerts = Vec::new();

    if let Some(stop_loss) = position.stop_loss {
        if price <= stop_loss {
            alerts.push(RiskAlert {
                kind: AlertKind::StopLoss,
                severity: AlertSeverity::Critical,
                ticker: Some(ticker.clone()),
                message: format!("{} at {:.2} breached stop loss {:.2}", ticker, price, stop_loss),
                recommended: Recommended::Sell,
                at: now,
            });
        }
    }

    if let Some(take_profit) = position.take_profit {
        if price >= take_profit * TAKE_PROFIT_ZONE {
            alerts.push(RiskAlert {
                kind: AlertKind::TakeProfit,
                severity: AlertSeverity::High,
                ticker: Some(ticker.clone()),
                message: format!(
                    "{} at {:.2} is in the take profit zone (target {:.2})",
                    ticker, price, take_profit
                ),
                recommended: Recommended::Sell,
                at: now,
            });
        }
    }

    if weight > OVERSIZED_WEIGHT {
        alerts.push(RiskAlert {
            kind: AlertKind::PositionSize,
            severity: AlertSeverity::High,
            ticker: Some(ticker.clone()),
            message: format!("{} is {:.1}% of portfolio value", ticker, weight * 100.0),
            recommended: Recommended::Reduce,
            at: now,
        });
    } else if weight > LARGE_WEIGHT {
        alerts.push(RiskAlert {
            kind: AlertKind::PositionSize,
            severity: AlertSeverity::Medium,
            ticker: Some(ticker.clone()),
            message: format!("{} is {:.1}% of portfolio value", ticker, weight * 100.0),
            recommended: Recommended::Monitor,
            at: now,
        });
    }

    if let Some(metrics) = metrics {
        if metrics.risk_level == VolRiskLevel::Extreme {
            alerts.push(RiskAlert {
                kind: AlertKind::MarketCondition,
                severity: AlertSeverity::Medium,
                ticker: Some(ticker.clone()),
                message: format!(
                    "{} annualized volatility {:.1}% is extreme",
                    ticker, metrics.annualized_pct
                ),
                recommended: Recommended::Monitor,
                at: now,
            });
        }
    }

    PositionRisk {
        ticker,
        level,
        score,
        weight,
        alerts,
    }
}

fn threshold_level(score: f64) -> AlertSeverity {
    if score > 80.0 {
        AlertSeverity::Critical
    } else if score > 60.0 {
        AlertSeverity::High
    } else if score > 40.0 {
        AlertSeverity::Medium
    } else {
        AlertSeverity::Low
    }
}

/// Score a whole portfolio
///
/// Positions without quote data are excluded from the aggregates (never
/// treated as zero risk) and reported through `warnings`; the analysis
/// itself never aborts.
pub fn analyze_portfolio(
    positions: &[Position],
    quotes: &HashMap<String, PriceQuote>,
) -> PortfolioRisk {
    let now = Utc::now();
    let mut warnings = Vec::new();

    let mut included: Vec<(&Position, &PriceQuote)> = Vec::new();
    for position in positions {
        match quotes.get(&position.ticker) {
            Some(quote) => included.push((position, quote)),
            None => warnings.push(format!(
                "no quote data for {}, excluded from portfolio risk",
                position.ticker
            )),
        }
    }

    let total_value: f64 = included
        .iter()
        .map(|(p, q)| p.market_value(q.price))
        .sum();

    let mut position_risks = Vec::with_capacity(included.len());
    let mut score = 0.0;
    for &(position, quote) in &included {
        let metrics = analytics::metrics_for_quote(quote, now);
        let risk = analyze_position(position, quote.price, total_value, Some(&metrics));
        score += risk.score * risk.weight;
        position_risks.push(risk);
    }

    let mut alerts = Vec::new();

    let level_by_score = threshold_level(score);
    if level_by_score > AlertSeverity::Low {
        let recommended = match level_by_score {
            AlertSeverity::Medium => Recommended::Monitor,
            _ => Recommended::Reduce,
        };
        alerts.push(RiskAlert {
            kind: AlertKind::PortfolioRisk,
            severity: level_by_score,
            ticker: None,
            message: format!("portfolio risk score {:.1}", score),
            recommended,
            at: now,
        });
    }

    for risk in &position_risks {
        if risk.weight > CONCENTRATION_WEIGHT {
            alerts.push(RiskAlert {
                kind: AlertKind::PortfolioRisk,
                severity: AlertSeverity::High,
                ticker: Some(risk.ticker.clone()),
                message: format!(
                    "{} concentrates {:.1}% of portfolio value",
                    risk.ticker,
                    risk.weight * 100.0
                ),
                recommended: Recommended::Reduce,
                at: now,
            });
        }
    }

    // Overall level: weighted-score threshold or the worst alert anywhere,
    // whichever is more severe
    let worst_alert = position_risks
        .iter()
        .flat_map(|r| r.alerts.iter())
        .chain(alerts.iter())
        .map(|a| a.severity)
        .max()
        .unwrap_or(AlertSeverity::Low);

    PortfolioRisk {
        score,
        level: level_by_score.max(worst_alert),
        position_risks,
        alerts,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, RiskColor};
    use uuid::Uuid;

    fn position(ticker: &str, entry: f64, shares: f64, stop_loss: Option<f64>) -> Position {
        Position {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            entry_price: entry,
            current_price: entry,
            shares,
            stop_loss,
            take_profit: None,
            action: Action::Hold,
            reason: String::new(),
            risk_color: RiskColor::Yellow,
            updated_at: Utc::now(),
        }
    }

    fn quote(symbol: &str, price: f64, volatility: f64) -> PriceQuote {
        PriceQuote {
            symbol: symbol.to_string(),
            price,
            high_30d: price * 1.05,
            high_60d: price * 1.1,
            percent_change_this_month: 0.0,
            percent_change_last_month: 0.0,
            volatility,
            market_cap: 1_000_000.0,
            fetched_at: Utc::now(),
            stale: false,
        }
    }

    #[test]
    fn test_stop_breach_is_critical_with_alert() {
        let p = position("AAPL", 100.0, 10.0, Some(60.0));
        let risk = analyze_position(&p, 55.0, 10_000.0, None);

        assert_eq!(risk.level, AlertSeverity::Critical);
        assert!(risk.score >= 90.0);
        assert!(risk
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::StopLoss && a.severity == AlertSeverity::Critical));
    }

    #[test]
    fn test_oversized_position_bumps_score_and_alerts() {
        let p = position("AAPL", 100.0, 30.0, None);
        // 30 shares at 100 = 3000 of a 10k portfolio: 30% weight
        let risk = analyze_position(&p, 100.0, 10_000.0, None);

        assert_eq!(risk.level, AlertSeverity::Low);
        assert_eq!(risk.score, BASE_LOW + 20.0);
        let size_alert = risk
            .alerts
            .iter()
            .find(|a| a.kind == AlertKind::PositionSize)
            .unwrap();
        assert_eq!(size_alert.severity, AlertSeverity::High);
        assert_eq!(size_alert.recommended, Recommended::Reduce);
    }

    #[test]
    fn test_large_position_gets_medium_size_alert() {
        let p = position("AAPL", 100.0, 18.0, None);
        // 18% weight
        let risk = analyze_position(&p, 100.0, 10_000.0, None);

        assert_eq!(risk.score, BASE_LOW + 10.0);
        let size_alert = risk
            .alerts
            .iter()
            .find(|a| a.kind == AlertKind::PositionSize)
            .unwrap();
        assert_eq!(size_alert.severity, AlertSeverity::Medium);
    }

    #[test]
    fn test_take_profit_zone_alert() {
        let mut p = position("AAPL", 100.0, 1.0, None);
        p.take_profit = Some(200.0);

        // 185 >= 0.9 * 200
        let risk = analyze_position(&p, 185.0, 10_000.0, None);
        assert!(risk
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::TakeProfit && a.severity == AlertSeverity::High));

        // 175 < 180: no alert yet
        let risk = analyze_position(&p, 175.0, 10_000.0, None);
        assert!(!risk.alerts.iter().any(|a| a.kind == AlertKind::TakeProfit));
    }

    #[test]
    fn test_extreme_volatility_emits_market_condition() {
        let p = position("TSLA", 100.0, 1.0, None);
        let q = quote("TSLA", 100.0, 0.40);
        let metrics = analytics::metrics_for_quote(&q, Utc::now());

        let risk = analyze_position(&p, 100.0, 10_000.0, Some(&metrics));

        assert!(risk
            .alerts
            .iter()
            .any(|a| a.kind == AlertKind::MarketCondition));
        // Extreme volatility alone is a Medium base level
        assert_eq!(risk.level, AlertSeverity::Medium);
    }

    #[test]
    fn test_alert_severity_overrides_weighted_score() {
        // A is only 10% of value but carries a stop breach; the weighted
        // score stays far below every threshold
        let a = position("AAPL", 100.0, 1.0, Some(110.0));
        let b = position("MSFT", 100.0, 9.0, None);

        let mut quotes = HashMap::new();
        quotes.insert("AAPL".to_string(), quote("AAPL", 100.0, 0.10));
        quotes.insert("MSFT".to_string(), quote("MSFT", 100.0, 0.10));

        let portfolio = analyze_portfolio(&[a, b], &quotes);

        // 90 * 0.1 + 40 * 0.9 = 45: below the High and Critical thresholds
        assert!(portfolio.score < 60.0);
        assert_eq!(portfolio.level, AlertSeverity::Critical);
    }

    #[test]
    fn test_dominant_critical_position_is_critical_both_ways() {
        // A holds 90% of value with a breached stop
        let a = position("AAPL", 100.0, 9.0, Some(110.0));
        let b = position("MSFT", 100.0, 1.0, None);

        let mut quotes = HashMap::new();
        quotes.insert("AAPL".to_string(), quote("AAPL", 100.0, 0.10));
        quotes.insert("MSFT".to_string(), quote("MSFT", 100.0, 0.10));

        let portfolio = analyze_portfolio(&[a, b], &quotes);

        assert!(portfolio.score > 80.0);
        assert_eq!(portfolio.level, AlertSeverity::Critical);
    }

    #[test]
    fn test_missing_quote_skips_position_with_warning() {
        let a = position("AAPL", 100.0, 1.0, None);
        let b = position("GHOST", 100.0, 50.0, Some(200.0));

        let mut quotes = HashMap::new();
        quotes.insert("AAPL".to_string(), quote("AAPL", 100.0, 0.10));

        let portfolio = analyze_portfolio(&[a, b], &quotes);

        assert_eq!(portfolio.position_risks.len(), 1);
        assert_eq!(portfolio.warnings.len(), 1);
        assert!(portfolio.warnings[0].contains("GHOST"));
        // The skipped breach must not leak into the aggregate
        assert!(portfolio
            .position_risks
            .iter()
            .flat_map(|r| r.alerts.iter())
            .all(|a| a.kind != AlertKind::StopLoss));
        assert_eq!(portfolio.score, 40.0); // AAPL alone: Low base + full-weight bump
    }

    #[test]
    fn test_concentration_alert_over_30_percent() {
        let a = position("AAPL", 100.0, 4.0, None);
        let b = position("MSFT", 100.0, 6.0, None);

        let mut quotes = HashMap::new();
        quotes.insert("AAPL".to_string(), quote("AAPL", 100.0, 0.10));
        quotes.insert("MSFT".to_string(), quote("MSFT", 100.0, 0.10));

        let portfolio = analyze_portfolio(&[a, b], &quotes);

        let concentration: Vec<_> = portfolio
            .alerts
            .iter()
            .filter(|alert| alert.kind == AlertKind::PortfolioRisk && alert.ticker.is_some())
            .collect();
        assert_eq!(concentration.len(), 2); // both exceed 30%
    }

    #[test]
    fn test_empty_portfolio() {
        let portfolio = analyze_portfolio(&[], &HashMap::new());

        assert_eq!(portfolio.score, 0.0);
        assert_eq!(portfolio.level, AlertSeverity::Low);
        assert!(portfolio.alerts.is_empty());
    }
}
