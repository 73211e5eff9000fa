use crate::utils::time::elapsed_fraction;

/// Composite urgency score for the adaptive strategy.
///
/// Combines how far the current price sits below the rule ceiling with how
/// much of the auction has elapsed. Returns `None` for degenerate inputs
/// (non-positive ceiling or duration, non-finite price) so callers can treat
/// those as a no-fire instead of propagating an error.
pub fn adaptive_score(
    current_price: f64,
    max_amount: f64,
    remaining_secs: i64,
    total_secs: i64,
    price_weight: f64,
    time_weight: f64,
) -> Option<f64> {
    if !current_price.is_finite() || max_amount <= 0.0 || total_secs <= 0 {
        return None;
    }

    let price_ratio = (current_price / max_amount).clamp(0.0, 1.0);
    let time_ratio = elapsed_fraction(total_secs, remaining_secs);

    let score = (1.0 - price_ratio) * price_weight + time_ratio * time_weight;
    score.is_finite().then_some(score)
}

/// Next bid amount: one increment above the current price, two under high
/// contention. Callers clamp against the rule ceiling.
pub fn proposed_bid(current_price: f64, increment: f64, high_contention: bool) -> f64 {
    let step = if high_contention {
        increment * 2.0
    } else {
        increment
    };
    current_price + step
}
