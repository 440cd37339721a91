use serde::{Deserialize, Serialize};

use super::scoring::cost_fitness;

/// Minimum aggregate metrics a recommendation must reach.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalThresholds {
    pub theta_cost: f64,
    pub theta_evidence: f64,
    pub theta_quotation: f64,
}

impl Default for GoalThresholds {
    fn default() -> Self {
        Self {
            theta_cost: 0.2,
            theta_evidence: 0.5,
            theta_quotation: 0.8,
        }
    }
}

/// Aggregate metrics over the recommended candidates and quotation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GoalMetrics {
    /// Relative cost headroom of the recommended set.
    pub rc: f64,
    /// Mean evidence fitness of the recommended set.
    pub re: f64,
    /// Share of requested line items the quotation covers.
    pub rq: f64,
}

impl GoalMetrics {
    /// Build metrics from the recommended candidates' prices and evidence fitness.
    /// An empty recommendation scores zero everywhere.
    pub fn aggregate(
        prices: &[f64],
        evidence_fitness: &[f64],
        budget: f64,
        matched_line_items: usize,
        requested_line_items: usize,
    ) -> Self {
        if prices.is_empty() {
            return Self::default();
        }

        let average_price = prices.iter().sum::<f64>() / prices.len() as f64;
        let re = if evidence_fitness.is_empty() {
            0.0
        } else {
            evidence_fitness.iter().sum::<f64>() / evidence_fitness.len() as f64
        };
        let rq = if requested_line_items == 0 {
            0.0
        } else {
            (matched_line_items as f64 / requested_line_items as f64).min(1.0)
        };

        Self {
            rc: cost_fitness(average_price, budget),
            re,
            rq,
        }
    }
}

/// One conjunct of the goal test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalCheck {
    pub value: f64,
    pub threshold: f64,
    pub passed: bool,
}

impl GoalCheck {
    fn new(value: f64, threshold: f64) -> Self {
        Self {
            value,
            threshold,
            passed: value >= threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalState {
    pub thresholds: GoalThresholds,
    pub metrics: GoalMetrics,
    pub cost: GoalCheck,
    pub evidence: GoalCheck,
    pub quotation: GoalCheck,
    pub achieved: bool,
}

impl GoalState {
    pub fn summary(&self) -> String {
        let mark = |check: &GoalCheck| if check.passed { "met" } else { "missed" };
        format!(
            "goal {}: cost {:.2}/{:.2} {}, evidence {:.2}/{:.2} {}, quotation {:.2}/{:.2} {}",
            if self.achieved { "achieved" } else { "not achieved" },
            self.cost.value,
            self.cost.threshold,
            mark(&self.cost),
            self.evidence.value,
            self.evidence.threshold,
            mark(&self.evidence),
            self.quotation.value,
            self.quotation.threshold,
            mark(&self.quotation),
        )
    }
}

pub fn evaluate(metrics: GoalMetrics, thresholds: &GoalThresholds) -> GoalState {
    let cost = GoalCheck::new(metrics.rc, thresholds.theta_cost);
    let evidence = GoalCheck::new(metrics.re, thresholds.theta_evidence);
    let quotation = GoalCheck::new(metrics.rq, thresholds.theta_quotation);

    GoalState {
        thresholds: *thresholds,
        metrics,
        cost,
        evidence,
        quotation,
        achieved: cost.passed && evidence.passed && quotation.passed,
    }
}
