use serde::{Deserialize, Serialize};

/// Raw `minval` value that switches comparisons to absolute differences.
pub const ABSOLUTE_SENTINEL: f64 = -1.0;

/// How deviations are measured and which magnitudes are negligible.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", content = "floor", rename_all = "snake_case")]
pub enum MinimumMagnitude {
    /// `|n1 - n2|`, nothing is negligible.
    Absolute,
    /// `|n1 - n2| / max(|n1|, floor)` when `|n1| > floor`, zero otherwise.
    Relative(f64),
}

impl MinimumMagnitude {
    pub fn from_raw(minval: f64) -> Self {
        if minval == ABSOLUTE_SENTINEL {
            Self::Absolute
        } else {
            Self::Relative(minval)
        }
    }

    pub const fn raw(self) -> f64 {
        match self {
            Self::Absolute => ABSOLUTE_SENTINEL,
            Self::Relative(floor) => floor,
        }
    }

    pub const fn is_absolute(self) -> bool {
        matches!(self, Self::Absolute)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Absolute => "Absolute error:",
            Self::Relative(_) => "Relative error:",
        }
    }
}

/// Deviation of `candidate` from `reference` under `minimum`.
///
/// Matching non-finite values (both NaN, same-signed infinities) deviate by
/// zero; any other non-finite pairing deviates infinitely.
pub fn field_deviation(reference: f64, candidate: f64, minimum: MinimumMagnitude) -> f64 {
    if !reference.is_finite() || !candidate.is_finite() {
        return if non_finite_values_match(reference, candidate) {
            0.0
        } else {
            f64::INFINITY
        };
    }

    match minimum {
        MinimumMagnitude::Absolute => (reference - candidate).abs(),
        MinimumMagnitude::Relative(floor) => {
            let magnitude = reference.abs();
            if magnitude > floor {
                (reference - candidate).abs() / magnitude.max(floor)
            } else {
                0.0
            }
        }
    }
}

/// Parses a numeric token, accepting Fortran `D` exponents.
pub fn parse_number(token: &str) -> Option<f64> {
    if token.contains(['D', 'd']) {
        let normalized = token.replace('D', "E").replace('d', "e");
        return normalized.parse::<f64>().ok();
    }
    token.parse::<f64>().ok()
}

/// `true` when the token is written as a real number: it has a decimal point
/// or an exponent.
pub fn has_real_notation(token: &str) -> bool {
    token.contains(['.', 'e', 'E', 'D', 'd'])
}

/// Integral fields (grid indices, counts, level numbers) are exempt from
/// tolerance checks. A value counts as integral when its token has no real
/// notation or when it is a nonzero whole number; zero stays real.
pub fn is_integral_field(token: &str, value: f64) -> bool {
    if !value.is_finite() {
        return false;
    }
    if !has_real_notation(token) {
        return true;
    }
    value != 0.0 && value.fract() == 0.0
}

pub fn format_deviation(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }

    if value == f64::INFINITY {
        return "inf".to_string();
    }

    if value == f64::NEG_INFINITY {
        return "-inf".to_string();
    }

    format!("{value:.2e}")
}

fn non_finite_values_match(left: f64, right: f64) -> bool {
    if left.is_nan() || right.is_nan() {
        return left.is_nan() && right.is_nan();
    }

    if left.is_infinite() || right.is_infinite() {
        return left.is_infinite() && right.is_infinite() && left.signum() == right.signum();
    }

    true
}
