//! Ordering regimes and the curved metric transform.

use std::f64::consts::PI;
use std::str::FromStr;

/// Ordering regime for finite values.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    /// Strict IEEE numeric order.
    #[default]
    Strict,
    /// Order induced by the monotone perturbation `n + eps*cos(pi*n)` of
    /// min-max normalized values.
    Curved,
}

impl SortMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Curved => "curved",
        }
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "curved" => Ok(Self::Curved),
            other => Err(format!("unknown mode {other:?} (expected strict or curved)")),
        }
    }
}

/// Apply the curved perturbation to a batch of finite values.
///
/// Values are min-max normalized to `[0, 1]`; a span at or below the
/// smallest positive normal collapses the whole batch to zeros. The caller
/// must have checked `pi * epsilon < 1`, which keeps the derivative
/// `1 - pi*eps*sin(pi*n)` positive and the map monotone on `[0, 1]`.
#[must_use]
pub fn curved_metric(vals: &[f64], epsilon: f64) -> Vec<f64> {
    let lo = vals.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = vals.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;
    if !(span > f64::MIN_POSITIVE) {
        return vec![0.0; vals.len()];
    }
    vals.iter()
        .map(|&v| {
            let n = (v - lo) / span;
            n + epsilon * (PI * n).cos()
        })
        .collect()
}
