use rust_decimal::{Decimal, RoundingStrategy};

pub const NULL_TOKEN: &str = "{NULL}";

const FIXED_PLACES: u32 = 4;

/// Fixed four-place rendering, rounding half to even. Digits come straight
/// from the mantissa so wide values keep all four places and the sign of a
/// negative value survives rounding to zero.
pub fn format_fixed(value: Decimal) -> String {
    let rounded =
        value.round_dp_with_strategy(FIXED_PLACES, RoundingStrategy::MidpointNearestEven);
    let places = FIXED_PLACES as usize;
    let scale = rounded.scale() as usize;
    let mut digits = rounded.mantissa().unsigned_abs().to_string();
    if digits.len() <= scale {
        digits.insert_str(0, &"0".repeat(scale + 1 - digits.len()));
    }
    let (whole, fraction) = digits.split_at(digits.len() - scale);
    let sign = if value.is_sign_negative() { "-" } else { "" };
    format!("{}{}.{:0<places$}", sign, whole, fraction, places = places)
}

/// Whole numbers too wide for `Decimal`.
pub fn format_wide_integer(value: i128) -> String {
    format!("{}.{}", value, "0".repeat(FIXED_PLACES as usize))
}

/// Floats go through their exact decimal expansion before rounding, so
/// `3.14159` renders as `3.1416` and never picks up binary noise.
pub fn format_float(value: f64) -> String {
    if value.is_infinite() {
        return if value.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }
    match Decimal::from_f64_retain(value) {
        Some(exact) => format_fixed(exact),
        None => format!("{:.4}", value),
    }
}
