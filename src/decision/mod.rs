use crate::models::{Action, Decision, Position, PriceQuote, RiskColor};

const STRONG_HIGH_RATIO: f64 = 0.9;
const WEAK_HIGH_RATIO: f64 = 0.7;
const MONTH_MOMENTUM_PCT: f64 = 10.0;
const BUY_SCORE: i32 = 2;
const SELL_SCORE: i32 = -2;

/// Classify a position against its latest quote
///
/// Fully deterministic, no I/O. Hard rules (stop-loss, take-profit) always
/// outrank the soft momentum score.
pub fn decide(position: &Position, quote: &PriceQuote) -> Decision {
    let price = quote.price;

    // Hard rule 1: stop-loss breach
    if let Some(stop_loss) = position.stop_loss {
        if price <= stop_loss {
            return Decision {
                action: Action::Sell,
                reason: "stop loss triggered".to_string(),
                color: RiskColor::Red,
                score: 0,
            };
        }
    }

    // Hard rule 2: take-profit reached
    if let Some(take_profit) = position.take_profit {
        if price >= take_profit {
            return Decision {
                action: Action::Sell,
                reason: "take profit reached".to_string(),
                color: RiskColor::Green,
                score: 0,
            };
        }
    }

    // Soft rules: signed momentum score
    let mut score = 0;
    let mut reasons: Vec<&'static str> = Vec::new();

    if quote.high_60d > 0.0 {
        let ratio = price / quote.high_60d;
        if ratio > STRONG_HIGH_RATIO {
            score += 1;
            reasons.push("strong vs 60-day high");
        } else if ratio < WEAK_HIGH_RATIO {
            score -= 1;
            reasons.push("weak vs 60-day high");
        }
    }

    if quote.percent_change_this_month > MONTH_MOMENTUM_PCT {
        score += 1;
        reasons.push("strong month");
    } else if quote.percent_change_this_month < -MONTH_MOMENTUM_PCT {
        score -= 1;
        reasons.push("weak month");
    }

    if quote.percent_change_last_month > MONTH_MOMENTUM_PCT {
        score += 1;
        reasons.push("strong last month");
    } else if quote.percent_change_last_month < -MONTH_MOMENTUM_PCT {
        score -= 1;
        reasons.push("weak last month");
    }

    if price > position.entry_price {
        score += 1;
        reasons.push("above entry");
    } else {
        score -= 1;
        reasons.push("below entry");
    }

    let (action, color) = if score >= BUY_SCORE {
        (Action::Buy, RiskColor::Green)
    } else if score <= SELL_SCORE {
        (Action::Sell, RiskColor::Red)
    } else {
        (Action::Hold, RiskColor::Yellow)
    };

    let reason = if reasons.is_empty() {
        "neutral signals".to_string()
    } else {
        reasons.join(", ")
    };

    Decision {
        action,
        reason,
        color,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn position(entry: f64, stop_loss: Option<f64>, take_profit: Option<f64>) -> Position {
        Position {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            ticker: "AAPL".to_string(),
            entry_price: entry,
            current_price: entry,
            shares: 10.0,
            stop_loss,
            take_profit,
            action: Action::Hold,
            reason: String::new(),
            risk_color: RiskColor::Yellow,
            updated_at: Utc::now(),
        }
    }

    fn quote(
        price: f64,
        high_60d: f64,
        this_month: f64,
        last_month: f64,
    ) -> PriceQuote {
        PriceQuote {
            symbol: "AAPL".to_string(),
            price,
            high_30d: high_60d * 0.95,
            high_60d,
            percent_change_this_month: this_month,
            percent_change_last_month: last_month,
            volatility: 0.2,
            market_cap: 1_000_000.0,
            fetched_at: Utc::now(),
            stale: false,
        }
    }

    #[test]
    fn test_bullish_example_scores_four() {
        // entry=100, current=150, high=160, +15% this month, +12% last month
        let p = position(100.0, None, None);
        let q = quote(150.0, 160.0, 15.0, 12.0);

        let decision = decide(&p, &q);

        assert_eq!(decision.score, 4);
        assert_eq!(decision.action, Action::Buy);
        assert_eq!(decision.color, RiskColor::Green);
        assert_eq!(
            decision.reason,
            "strong vs 60-day high, strong month, strong last month, above entry"
        );
    }

    #[test]
    fn test_stop_loss_outranks_bullish_score() {
        // Otherwise bullish setup, but price sits at the stop
        let p = position(40.0, Some(50.0), None);
        let q = quote(50.0, 52.0, 15.0, 12.0);

        let decision = decide(&p, &q);

        assert_eq!(decision.action, Action::Sell);
        assert_eq!(decision.reason, "stop loss triggered");
        assert_eq!(decision.color, RiskColor::Red);
    }

    #[test]
    fn test_immediate_sell_below_stop() {
        let p = position(80.0, Some(60.0), None);
        let q = quote(50.0, 100.0, 0.0, 0.0);

        let decision = decide(&p, &q);
        assert_eq!(decision.action, Action::Sell);
        assert_eq!(decision.reason, "stop loss triggered");
    }

    #[test]
    fn test_take_profit_is_green_sell() {
        let p = position(100.0, Some(90.0), Some(140.0));
        let q = quote(141.0, 150.0, 5.0, 5.0);

        let decision = decide(&p, &q);
        assert_eq!(decision.action, Action::Sell);
        assert_eq!(decision.reason, "take profit reached");
        assert_eq!(decision.color, RiskColor::Green);
    }

    #[test]
    fn test_stop_loss_checked_before_take_profit() {
        // Degenerate config where both would fire
        let p = position(100.0, Some(120.0), Some(110.0));
        let q = quote(115.0, 150.0, 0.0, 0.0);

        let decision = decide(&p, &q);
        assert_eq!(decision.reason, "stop loss triggered");
    }

    #[test]
    fn test_bearish_score_sells() {
        // 50/100 = 0.5 < 0.7, both months weak, below entry: score -4
        let p = position(80.0, None, None);
        let q = quote(50.0, 100.0, -12.0, -11.0);

        let decision = decide(&p, &q);

        assert_eq!(decision.score, -4);
        assert_eq!(decision.action, Action::Sell);
        assert_eq!(decision.color, RiskColor::Red);
        assert_eq!(
            decision.reason,
            "weak vs 60-day high, weak month, weak last month, below entry"
        );
    }

    #[test]
    fn test_mixed_signals_hold() {
        // Above entry (+1) but mid-range vs high and quiet months: score +1
        let p = position(100.0, None, None);
        let q = quote(110.0, 140.0, 5.0, -5.0);

        let decision = decide(&p, &q);

        assert_eq!(decision.score, 1);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.color, RiskColor::Yellow);
        assert_eq!(decision.reason, "above entry");
    }

    #[test]
    fn test_momentum_thresholds_are_strict() {
        // Exactly +10 / -10 does not trigger either direction
        let p = position(100.0, None, None);
        let q = quote(110.0, 140.0, 10.0, -10.0);

        let decision = decide(&p, &q);
        assert_eq!(decision.score, 1);
        assert_eq!(decision.reason, "above entry");
    }

    #[test]
    fn test_deterministic() {
        let p = position(100.0, Some(92.0), Some(150.0));
        let q = quote(120.0, 130.0, 11.0, -11.0);

        assert_eq!(decide(&p, &q), decide(&p, &q));
    }

    #[test]
    fn test_zero_high_skips_ratio_contribution() {
        let p = position(100.0, None, None);
        let q = quote(110.0, 0.0, 0.0, 0.0);

        let decision = decide(&p, &q);
        assert_eq!(decision.score, 1);
        assert_eq!(decision.reason, "above entry");
    }
}
