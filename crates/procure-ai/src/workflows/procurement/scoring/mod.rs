mod weights;

pub use weights::Weights;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::config::ProcurementConfig;
use super::domain::{Candidate, CandidateId, ProcurementRequest};

/// Shape applied to the clamped evidence score before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "exponent", rename_all = "snake_case")]
pub enum EvidenceCurve {
    Linear,
    Sqrt,
    Power(f64),
}

impl EvidenceCurve {
    /// Accepts `linear`, `sqrt`, or `power:<exponent>` with a positive exponent.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "linear" => Some(Self::Linear),
            "sqrt" => Some(Self::Sqrt),
            other => {
                let exponent = other.strip_prefix("power:")?.trim().parse::<f64>().ok()?;
                (exponent.is_finite() && exponent > 0.0).then_some(Self::Power(exponent))
            }
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        match self {
            EvidenceCurve::Linear => value,
            EvidenceCurve::Sqrt => value.sqrt(),
            EvidenceCurve::Power(exponent) => value.powf(*exponent),
        }
    }
}

/// Per-request inputs the scoring function needs besides the candidate and weights.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringParams {
    pub budget: f64,
    pub deadline_days: u32,
    pub preferred_vendors: Vec<String>,
    pub vendor_bonus: f64,
    pub score_ceiling: f64,
    pub availability_margin_days: f64,
    pub evidence_curve: EvidenceCurve,
}

impl ScoringParams {
    pub fn from_request(config: &ProcurementConfig, request: &ProcurementRequest) -> Self {
        let mut preferred_vendors: Vec<String> = config
            .preferred_vendors
            .iter()
            .chain(request.preferred_vendors.iter())
            .map(|vendor| vendor.trim().to_lowercase())
            .filter(|vendor| !vendor.is_empty())
            .collect();
        preferred_vendors.sort();
        preferred_vendors.dedup();

        Self {
            budget: request.budget,
            deadline_days: request.deadline_days,
            preferred_vendors,
            vendor_bonus: config.vendor_bonus,
            score_ceiling: config.score_ceiling,
            availability_margin_days: config.availability_margin_days,
            evidence_curve: config.evidence_curve,
        }
    }

    pub fn is_preferred(&self, vendor: &str) -> bool {
        let vendor = vendor.trim().to_lowercase();
        self.preferred_vendors.iter().any(|preferred| *preferred == vendor)
    }
}

/// Transparent per-candidate score; immutable once computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub candidate: CandidateId,
    pub cost_fitness: f64,
    pub evidence_fitness: f64,
    pub availability_fitness: f64,
    /// Fractional bonus applied to the weighted total (zero for other vendors).
    pub vendor_bonus: f64,
    pub weighted_total: f64,
    pub rationale: Vec<String>,
}

/// Relative cost position: `1 - price / budget`, clamped to `0..=1`.
pub fn cost_fitness(price: f64, budget: f64) -> f64 {
    if !(budget.is_finite() && budget > 0.0) || !price.is_finite() {
        return 0.0;
    }
    (1.0 - price / budget).clamp(0.0, 1.0)
}

/// Pure weighted multi-criteria scoring.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    params: ScoringParams,
}

impl ScoringEngine {
    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    pub fn score(&self, candidate: &Candidate, weights: &Weights) -> ScoreBreakdown {
        let params = &self.params;
        let mut rationale = Vec::new();

        let cost = cost_fitness(candidate.price, params.budget);
        if candidate.price > params.budget {
            rationale.push(format!(
                "price {:.2} exceeds budget {:.2} by {:.2}; cost fitness 0",
                candidate.price,
                params.budget,
                candidate.price - params.budget
            ));
        } else {
            rationale.push(format!(
                "within budget ({:.2}/{:.2}); cost fitness {:.2}",
                candidate.price, params.budget, cost
            ));
        }

        let evidence = match candidate.evidence {
            Some(score) => {
                let shaped = params.evidence_curve.apply(score.clamp(0.0, 1.0));
                rationale.push(format!(
                    "evidence {:.2}; evidence fitness {:.2}",
                    score, shaped
                ));
                shaped
            }
            None => {
                rationale.push("evidence missing; evidence fitness 0".to_string());
                0.0
            }
        };

        let availability = self.availability_fitness(candidate);
        if !candidate.availability.in_stock {
            rationale.push("out of stock; availability fitness 0".to_string());
        } else {
            rationale.push(format!(
                "lead time {}d vs deadline {}d; availability fitness {:.2}",
                candidate.availability.lead_time_days, params.deadline_days, availability
            ));
        }

        let weights = if weights.is_normalized() {
            *weights
        } else {
            let adjusted = weights.renormalized();
            rationale.push(format!(
                "weights renormalized to {:.3}/{:.3}/{:.3}",
                adjusted.alpha, adjusted.beta, adjusted.gamma
            ));
            adjusted
        };

        let base = weights.alpha * cost + weights.beta * evidence + weights.gamma * availability;
        let (vendor_bonus, weighted_total) = if params.is_preferred(&candidate.vendor) {
            let boosted = (base * (1.0 + params.vendor_bonus)).min(params.score_ceiling);
            rationale.push(format!(
                "preferred vendor {}: +{:.0}% bonus",
                candidate.vendor,
                params.vendor_bonus * 100.0
            ));
            (params.vendor_bonus, boosted)
        } else {
            (0.0, base.min(params.score_ceiling))
        };

        ScoreBreakdown {
            candidate: candidate.id.clone(),
            cost_fitness: cost,
            evidence_fitness: evidence,
            availability_fitness: availability,
            vendor_bonus,
            weighted_total,
            rationale,
        }
    }

    /// Score every candidate and order the breakdowns best first.
    pub fn rank(&self, candidates: &[Candidate], weights: &Weights) -> Vec<ScoreBreakdown> {
        let scored = candidates
            .iter()
            .map(|candidate| self.score(candidate, weights))
            .collect();
        rank_breakdowns(scored)
    }

    fn availability_fitness(&self, candidate: &Candidate) -> f64 {
        if !candidate.availability.in_stock {
            return 0.0;
        }
        let lead_time = candidate.availability.lead_time_days;
        if lead_time <= self.params.deadline_days {
            return 1.0;
        }
        let margin = self.params.availability_margin_days;
        if !(margin.is_finite() && margin > 0.0) {
            return 0.0;
        }
        let overrun = f64::from(lead_time - self.params.deadline_days);
        (1.0 - overrun / margin).max(0.0)
    }
}

/// Descending weighted total, then evidence fitness, then candidate id ascending.
pub fn rank_breakdowns(mut breakdowns: Vec<ScoreBreakdown>) -> Vec<ScoreBreakdown> {
    breakdowns.sort_by(compare_breakdowns);
    breakdowns
}

fn compare_breakdowns(left: &ScoreBreakdown, right: &ScoreBreakdown) -> Ordering {
    right
        .weighted_total
        .total_cmp(&left.weighted_total)
        .then_with(|| right.evidence_fitness.total_cmp(&left.evidence_fitness))
        .then_with(|| left.candidate.cmp(&right.candidate))
}
