use crate::models::PriceQuote;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trading days per year, for de-annualizing volatility
const TRADING_DAYS: f64 = 252.0;
/// Hours after which quote data no longer contributes confidence
const RECENCY_WINDOW_HOURS: f64 = 4.0;

/// Volatility bucket for a single instrument
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VolRiskLevel {
    Low,
    Medium,
    High,
    Extreme,
}

/// Derived volatility statistics for one position
///
/// Never persisted - always recomputable from the latest quote.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityMetrics {
    pub annualized_pct: f64,
    pub risk_level: VolRiskLevel,
    pub daily_pct: f64,
    pub monthly_pct: f64,
    /// 0-100 blend of data recency and volatility
    pub confidence: f64,
}

/// Portfolio-level volatility aggregates
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioVolatility {
    pub weighted_avg_pct: f64,
    pub simple_avg_pct: f64,
    pub diversification_ratio: f64,
    /// Herfindahl-Hirschman index of position weights, scaled to 0-100
    pub concentration_hhi: f64,
}

/// One position's contribution to portfolio volatility
#[derive(Debug, Clone, Copy)]
pub struct PortfolioEntry {
    pub market_value: f64,
    pub annualized_pct: f64,
}

/// Bucket an annualized volatility percentage
///
/// Boundaries are exclusive on the upper bound: 15.0 is already Medium.
pub fn risk_level(annualized_pct: f64) -> VolRiskLevel {
    if annualized_pct < 15.0 {
        VolRiskLevel::Low
    } else if annualized_pct < 25.0 {
        VolRiskLevel::Medium
    } else if annualized_pct < 35.0 {
        VolRiskLevel::High
    } else {
        VolRiskLevel::Extreme
    }
}

/// Derive volatility metrics from a quote
///
/// The quote's volatility is already annualized upstream, as a decimal
/// fraction.
pub fn metrics_for_quote(quote: &PriceQuote, now: DateTime<Utc>) -> VolatilityMetrics {
    let annualized_pct = quote.volatility * 100.0;

    VolatilityMetrics {
        annualized_pct,
        risk_level: risk_level(annualized_pct),
        daily_pct: annualized_pct / TRADING_DAYS.sqrt(),
        monthly_pct: annualized_pct / 12.0_f64.sqrt(),
        confidence: confidence(quote.fetched_at, now, annualized_pct),
    }
}

/// Confidence score in [0, 100]
///
/// Mean of a recency term (100 fresh, linearly decaying to 0 at four hours)
/// and a volatility term (calmer instruments score higher).
pub fn confidence(fetched_at: DateTime<Utc>, now: DateTime<Utc>, annualized_pct: f64) -> f64 {
    let age_hours = (now - fetched_at).num_milliseconds() as f64 / 3_600_000.0;

    let recency = if age_hours <= 0.0 {
        100.0
    } else if age_hours >= RECENCY_WINDOW_HOURS {
        0.0
    } else {
        100.0 * (1.0 - age_hours / RECENCY_WINDOW_HOURS)
    };

    let vol_term = (100.0 - annualized_pct).max(0.0);

    ((recency + vol_term) / 2.0).clamp(0.0, 100.0)
}

/// Aggregate position volatilities into portfolio statistics
///
/// Weights are normalized to sum to 1 regardless of the caller's inputs.
/// Returns None for an empty portfolio or one with no market value.
pub fn portfolio_volatility(entries: &[PortfolioEntry]) -> Option<PortfolioVolatility> {
    if entries.is_empty() {
        return None;
    }

    let total_value: f64 = entries.iter().map(|e| e.market_value).sum();
    if total_value <= 0.0 {
        return None;
    }

    let mut weighted_avg_pct = 0.0;
    let mut hhi = 0.0;
    for entry in entries {
        let weight = entry.market_value / total_value;
        weighted_avg_pct += weight * entry.annualized_pct;
        hhi += weight * weight;
    }

    let simple_avg_pct =
        entries.iter().map(|e| e.annualized_pct).sum::<f64>() / entries.len() as f64;

    let diversification_ratio = if weighted_avg_pct > 0.0 {
        simple_avg_pct / weighted_avg_pct
    } else {
        1.0
    };

    Some(PortfolioVolatility {
        weighted_avg_pct,
        simple_avg_pct,
        diversification_ratio,
        concentration_hhi: hhi * 100.0,
    })
}

/// Annualized realized volatility (%) from a daily close series
///
/// Standard deviation of daily log returns, annualized over 252 trading
/// days. Needs at least three closes to say anything.
pub fn realized_volatility(closes: &[f64]) -> Option<f64> {
    if closes.len() < 3 {
        return None;
    }

    let mut returns = Vec::with_capacity(closes.len() - 1);
    for window in closes.windows(2) {
        if window[0] <= 0.0 || window[1] <= 0.0 {
            return None;
        }
        returns.push((window[1] / window[0]).ln());
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
        / (returns.len() - 1) as f64;

    Some(variance.sqrt() * TRADING_DAYS.sqrt() * 100.0)
}
