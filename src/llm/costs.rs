//! Per-model token pricing (USD per token).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Look up (input, output) cost per token for a model.
///
/// Unknown models fall back to a mid-tier default so estimates stay conservative.
pub fn model_cost(model: &str) -> (Decimal, Decimal) {
    // Prices are per million tokens; strip any "vendor/" gateway prefix.
    let name = model.rsplit('/').next().unwrap_or(model);
    let (input_per_m, output_per_m) = match name {
        m if m.starts_with("gpt-4o-mini") => (dec!(0.15), dec!(0.60)),
        m if m.starts_with("gpt-4o") => (dec!(2.50), dec!(10.00)),
        m if m.starts_with("gpt-4.1-mini") => (dec!(0.40), dec!(1.60)),
        m if m.starts_with("claude-3-5-haiku") => (dec!(0.80), dec!(4.00)),
        m if m.starts_with("claude-3-5-sonnet") || m.starts_with("claude-sonnet-4") => {
            (dec!(3.00), dec!(15.00))
        }
        m if m.starts_with("gemini-2.5-flash") => (dec!(0.30), dec!(2.50)),
        m if m.starts_with("gemini-2.5-pro") => (dec!(1.25), dec!(10.00)),
        _ => (dec!(1.00), dec!(3.00)),
    };
    let per_token = dec!(1_000_000);
    (input_per_m / per_token, output_per_m / per_token)
}
