use serde::{Deserialize, Serialize};

use super::goal::GoalThresholds;
use super::inference::InferenceMode;
use super::scoring::{EvidenceCurve, Weights};

/// What happens to candidates priced above the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverBudgetPolicy {
    /// Keep the candidate with zero cost fitness.
    Penalize,
    /// Drop the candidate from the ranking and record why.
    Exclude,
}

impl OverBudgetPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "penalize" | "penalise" => Some(Self::Penalize),
            "exclude" => Some(Self::Exclude),
            _ => None,
        }
    }
}

/// Immutable pipeline configuration handed to every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcurementConfig {
    pub default_weights: Weights,
    pub goal_thresholds: GoalThresholds,
    pub inference_mode: InferenceMode,
    pub top_k: usize,
    pub max_results_per_query: usize,
    pub preferred_vendors: Vec<String>,
    pub vendor_bonus: f64,
    pub score_ceiling: f64,
    pub iteration_cap: usize,
    pub budget_tolerance: f64,
    pub min_evidence: f64,
    pub availability_margin_days: f64,
    pub over_budget: OverBudgetPolicy,
    pub evidence_curve: EvidenceCurve,
    /// Number of decisions at which learned weights reach full confidence.
    pub feedback_saturation: u32,
    pub collaborator_timeout_ms: u64,
    pub evidence_cache_ttl_hours: u32,
    pub max_query_variants: usize,
}

impl Default for ProcurementConfig {
    fn default() -> Self {
        Self {
            default_weights: Weights::DEFAULT,
            goal_thresholds: GoalThresholds::default(),
            inference_mode: InferenceMode::Hybrid,
            top_k: 3,
            max_results_per_query: 10,
            preferred_vendors: Vec::new(),
            vendor_bonus: 0.10,
            score_ceiling: 1.0,
            iteration_cap: 10,
            budget_tolerance: 0.0,
            min_evidence: 0.2,
            availability_margin_days: 20.0,
            over_budget: OverBudgetPolicy::Penalize,
            evidence_curve: EvidenceCurve::Linear,
            feedback_saturation: 10,
            collaborator_timeout_ms: 5_000,
            evidence_cache_ttl_hours: 24,
            max_query_variants: 4,
        }
    }
}

impl ProcurementConfig {
    pub fn collaborator_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.collaborator_timeout_ms)
    }
}
