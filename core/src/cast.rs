//! Cast and comparison semantics of the block language.
//!
//! These mirror the host language's loose coercions where scripts depend on them (string inputs
//! that look numeric behave as numbers, comparisons fall back to case-insensitive text) while
//! pinning down the edge cases: `NaN` always coerces to `0`, whitespace-only strings are not
//! numeric for comparison purposes, and modulo takes the sign of the divisor.

use std::cmp::Ordering;

use crate::Value;

// NUMERIC CASTS
// ================================================================================================

/// Casts a value to a number. Anything non-numeric becomes `0`.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        },
        Value::Num(n) => {
            if n.is_nan() {
                0.0
            } else {
                *n
            }
        },
        Value::Str(s) => {
            let n = parse_number(s).unwrap_or(0.0);
            if n.is_nan() { 0.0 } else { n }
        },
        Value::Named(named) => parse_number(&named.name).unwrap_or(0.0),
    }
}

/// Returns the numeric reading of a value for comparison purposes, or `None` when the value
/// should compare as text (non-numeric strings, whitespace-only strings, `NaN`).
pub fn number_for_compare(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Num(n) => {
            if n.is_nan() {
                None
            } else {
                Some(*n)
            }
        },
        Value::Str(s) => {
            if s.trim().is_empty() {
                return None;
            }
            parse_number(s).filter(|n| !n.is_nan())
        },
        Value::Named(_) => None,
    }
}

fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    // Hexadecimal literals coerce the way the host language coerces them.
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).ok().map(|n| n as f64);
    }
    trimmed.parse::<f64>().ok()
}

// BOOLEAN AND TEXT CASTS
// ================================================================================================

/// Casts a value to a boolean. The strings `""`, `"0"` and `"false"` (any case) are false.
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Num(n) => *n != 0.0 && !n.is_nan(),
        Value::Str(s) => !(s.is_empty() || &**s == "0" || s.eq_ignore_ascii_case("false")),
        Value::Named(_) => true,
    }
}

/// Casts a value to its text form.
///
/// Integral numbers print without a fractional part so that `10` round-trips as `"10"`.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Bool(b) => {
            if *b {
                "true".to_string()
            } else {
                "false".to_string()
            }
        },
        Value::Num(n) => number_to_text(*n),
        Value::Str(s) => s.to_string(),
        Value::Named(named) => named.name.to_string(),
    }
}

/// Formats a number the way reported values print.
pub fn number_to_text(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    // 2^53 bounds the integers representable exactly; beyond it the float form is the truth.
    if n == n.trunc() && n.abs() < 9_007_199_254_740_992.0 {
        return format!("{}", n as i64);
    }
    format!("{n}")
}

// COMPARISON
// ================================================================================================

/// The canonical comparison between two values: numeric when both sides read as numbers,
/// case-insensitive text otherwise.
pub fn compare(a: &Value, b: &Value) -> Ordering {
    if let (Some(na), Some(nb)) = (number_for_compare(a), number_for_compare(b)) {
        return na.partial_cmp(&nb).unwrap_or(Ordering::Equal);
    }
    let sa = to_text(a).to_lowercase();
    let sb = to_text(b).to_lowercase();
    sa.cmp(&sb)
}

// SHADOW CANONICALIZATION
// ================================================================================================

/// Canonicalizes a shadow input's text at cache-build time: the value is stored as a number only
/// when it parses as one and round-trips through a trim, so dispatch never re-parses it.
pub fn canonicalize_shadow_text(s: &str) -> Value {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Value::text(s);
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        if !n.is_nan() && number_to_text(n) == trimmed {
            return Value::Num(n);
        }
    }
    Value::text(s)
}

// ARITHMETIC HELPERS
// ================================================================================================

/// Rounds half-up: ties go toward positive infinity, so `round(-2.5)` is `-2`.
pub fn round_half_up(n: f64) -> f64 {
    if n.is_nan() {
        return 0.0;
    }
    (n + 0.5).floor()
}

/// Rounds to ten decimal places. Trigonometric and logarithmic results pass through this so that
/// e.g. `sin(180°)` reports `0` rather than float dust.
pub fn round10(n: f64) -> f64 {
    (n * 1e10).round() / 1e10
}

/// Modulo whose result takes the sign of the divisor.
pub fn modulo(n: f64, modulus: f64) -> f64 {
    let mut result = n % modulus;
    if result / modulus < 0.0 {
        result += modulus;
    }
    result
}

/// The math-operator menu. Trigonometry works in degrees; `tan` pins the poles to infinities
/// instead of float dust, and the transcendental results go through [`round10`].
pub fn mathop(operator: &str, n: f64) -> f64 {
    match operator {
        "abs" => n.abs(),
        "floor" => n.floor(),
        "ceiling" => n.ceil(),
        "sqrt" => n.sqrt(),
        "sin" => round10((n % 360.0).to_radians().sin()),
        "cos" => round10((n % 360.0).to_radians().cos()),
        "tan" => tan_degrees(n),
        "asin" => n.asin().to_degrees(),
        "acos" => n.acos().to_degrees(),
        "atan" => n.atan().to_degrees(),
        "ln" => n.ln(),
        "log" => n.log10(),
        "e ^" => n.exp(),
        "10 ^" => 10f64.powf(n),
        _ => 0.0,
    }
}

fn tan_degrees(n: f64) -> f64 {
    let angle = modulo(n, 360.0);
    if angle == 90.0 {
        f64::INFINITY
    } else if angle == 270.0 {
        f64::NEG_INFINITY
    } else {
        round10(angle.to_radians().tan())
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn numeric_casts() {
        assert_eq!(to_number(&Value::text(" 10 ")), 10.0);
        assert_eq!(to_number(&Value::text("3.5")), 3.5);
        assert_eq!(to_number(&Value::text("banana")), 0.0);
        assert_eq!(to_number(&Value::text("0x10")), 16.0);
        assert_eq!(to_number(&Value::text("")), 0.0);
        assert_eq!(to_number(&Value::Bool(true)), 1.0);
        assert_eq!(to_number(&Value::Num(f64::NAN)), 0.0);
    }

    #[test]
    fn boolean_casts() {
        assert!(!to_boolean(&Value::text("")));
        assert!(!to_boolean(&Value::text("0")));
        assert!(!to_boolean(&Value::text("FALSE")));
        assert!(to_boolean(&Value::text("true")));
        assert!(to_boolean(&Value::text("banana")));
        assert!(!to_boolean(&Value::Num(0.0)));
        assert!(!to_boolean(&Value::Num(f64::NAN)));
    }

    #[test]
    fn text_casts() {
        assert_eq!(to_text(&Value::Num(10.0)), "10");
        assert_eq!(to_text(&Value::Num(0.5)), "0.5");
        assert_eq!(to_text(&Value::Num(-0.0)), "0");
        assert_eq!(to_text(&Value::Num(f64::INFINITY)), "Infinity");
        assert_eq!(to_text(&Value::Bool(false)), "false");
    }

    #[test]
    fn comparisons() {
        assert_eq!(compare(&Value::text("10"), &Value::Num(9.5)), Ordering::Greater);
        assert_eq!(compare(&Value::text("apple"), &Value::text("APPLE")), Ordering::Equal);
        // Whitespace-only strings compare as text, not as zero.
        assert_eq!(compare(&Value::text(" "), &Value::Num(0.0)), compare(&Value::text(" "), &Value::text("0")));
        assert_eq!(compare(&Value::Bool(true), &Value::Num(1.0)), Ordering::Equal);
    }

    #[test]
    fn shadow_canonicalization() {
        assert_eq!(canonicalize_shadow_text("10"), Value::Num(10.0));
        assert_eq!(canonicalize_shadow_text("-2.5"), Value::Num(-2.5));
        assert_eq!(canonicalize_shadow_text("10.0"), Value::text("10.0"));
        assert_eq!(canonicalize_shadow_text("007"), Value::text("007"));
        assert_eq!(canonicalize_shadow_text("banana"), Value::text("banana"));
    }

    #[test]
    fn rounding_and_modulo() {
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(-2.5), -2.0);
        assert_eq!(modulo(-7.0, 3.0), 2.0);
        assert_eq!(modulo(7.0, -3.0), -2.0);
        assert_eq!(modulo(7.0, 3.0), 1.0);
    }

    proptest! {
        // A canonicalized shadow never changes what dispatch-time numeric casting would see.
        #[test]
        fn canonicalization_preserves_numeric_cast(s in "\\PC{0,12}") {
            let raw = Value::text(&s);
            let canonical = canonicalize_shadow_text(&s);
            prop_assert_eq!(to_number(&raw).to_bits(), to_number(&canonical).to_bits());
        }

        // Comparison is antisymmetric.
        #[test]
        fn compare_antisymmetric(a in -1.0e6..1.0e6f64, b in "\\PC{0,8}") {
            let va = Value::Num(a);
            let vb = Value::text(&b);
            prop_assert_eq!(compare(&va, &vb), compare(&vb, &va).reverse());
        }
    }
}
