use serde::{Deserialize, Serialize};

const NORMALIZED_TOLERANCE: f64 = 1e-9;

/// Relative importance of cost, evidence, and availability. Every instance handed to
/// scoring sums to one; [`Weights::renormalized`] restores that after any change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Weights {
    pub const DEFAULT: Weights = Weights {
        alpha: 0.35,
        beta: 0.45,
        gamma: 0.20,
    };

    pub const fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }

    pub fn sum(&self) -> f64 {
        self.alpha + self.beta + self.gamma
    }

    pub fn is_normalized(&self) -> bool {
        [self.alpha, self.beta, self.gamma]
            .iter()
            .all(|weight| weight.is_finite() && *weight >= 0.0)
            && (self.sum() - 1.0).abs() <= NORMALIZED_TOLERANCE
    }

    /// Non-negative weights summing to one. Negative or non-finite components count as
    /// zero; an all-zero vector becomes equal thirds.
    pub fn renormalized(&self) -> Self {
        let sanitize = |weight: f64| {
            if weight.is_finite() && weight > 0.0 {
                weight
            } else {
                0.0
            }
        };
        let mut parts = [
            sanitize(self.alpha),
            sanitize(self.beta),
            sanitize(self.gamma),
        ];

        let largest = parts.iter().copied().fold(0.0_f64, f64::max);
        if largest == 0.0 {
            return Self::new(1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0);
        }
        if !parts.iter().sum::<f64>().is_finite() {
            for part in &mut parts {
                *part /= largest;
            }
        }

        let total: f64 = parts.iter().sum();
        Self::new(parts[0] / total, parts[1] / total, parts[2] / total)
    }

    /// `confidence * learned + (1 - confidence) * default`, renormalized. Zero confidence
    /// returns `default` untouched.
    pub fn blend(default: Weights, learned: Weights, confidence: f64) -> Weights {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if confidence == 0.0 {
            return default;
        }

        let keep = 1.0 - confidence;
        Weights::new(
            confidence * learned.alpha + keep * default.alpha,
            confidence * learned.beta + keep * default.beta,
            confidence * learned.gamma + keep * default.gamma,
        )
        .renormalized()
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self::DEFAULT
    }
}
