use std::collections::BTreeMap;

use serde::Serialize;

use super::super::scoring::Weights;
use super::FeedbackRecord;

/// Aggregate state derived from the feedback log. Rebuilt by folding records in order, so
/// it never needs to be persisted on its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearningState {
    decisions: u64,
    agreements: u64,
    rating_sum: u64,
    rating_count: u64,
    signal: [f64; 3],
    signal_weight: f64,
    vendors: BTreeMap<String, VendorTally>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct VendorTally {
    selections: u64,
    rating_sum: u64,
    rating_count: u64,
}

/// Per-vendor performance derived from recorded decisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorStats {
    pub vendor: String,
    pub selections: u64,
    pub selection_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
}

/// Snapshot of what the feedback loop has learned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearningSummary {
    pub decisions: u64,
    pub agreement_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    pub confidence: f64,
    pub default_weights: Weights,
    pub learned_weights: Weights,
    pub effective_weights: Weights,
    pub vendors: Vec<VendorStats>,
}

impl LearningState {
    pub fn replay<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a FeedbackRecord>,
    {
        records
            .into_iter()
            .fold(Self::default(), |state, record| state.apply(record))
    }

    pub fn apply(mut self, record: &FeedbackRecord) -> Self {
        self.decisions += 1;
        if record.agreed_with_top {
            self.agreements += 1;
        }

        let influence = match record.rating {
            Some(rating) => {
                self.rating_sum += u64::from(rating);
                self.rating_count += 1;
                f64::from(rating) / 5.0
            }
            None => 1.0,
        };

        let scores = record.sub_scores.sanitized();
        self.signal[0] += influence * scores.cost;
        self.signal[1] += influence * scores.evidence;
        self.signal[2] += influence * scores.availability;
        self.signal_weight += influence;

        let tally = self
            .vendors
            .entry(record.vendor.trim().to_string())
            .or_default();
        tally.selections += 1;
        if let Some(rating) = record.rating {
            tally.rating_sum += u64::from(rating);
            tally.rating_count += 1;
        }

        self
    }

    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    /// Confidence in the learned weights: `min(1, decisions / saturation)`.
    pub fn confidence(&self, saturation: u32) -> f64 {
        if saturation == 0 {
            return if self.decisions > 0 { 1.0 } else { 0.0 };
        }
        (self.decisions as f64 / f64::from(saturation)).min(1.0)
    }

    /// Normalized rating-weighted mean sub-scores of chosen candidates; `default` when
    /// the log carries no usable signal.
    pub fn learned_weights(&self, default: Weights) -> Weights {
        if self.signal_weight <= 0.0 {
            return default;
        }
        let means = self.signal.map(|sum| sum / self.signal_weight);
        if means.iter().sum::<f64>() <= 0.0 {
            return default;
        }
        Weights::new(means[0], means[1], means[2]).renormalized()
    }

    pub fn effective_weights(&self, default: Weights, saturation: u32) -> Weights {
        Weights::blend(
            default,
            self.learned_weights(default),
            self.confidence(saturation),
        )
    }

    pub fn vendor_stats(&self) -> Vec<VendorStats> {
        let mut stats: Vec<VendorStats> = self
            .vendors
            .iter()
            .map(|(vendor, tally)| VendorStats {
                vendor: vendor.clone(),
                selections: tally.selections,
                selection_rate: if self.decisions == 0 {
                    0.0
                } else {
                    tally.selections as f64 / self.decisions as f64
                },
                average_rating: (tally.rating_count > 0)
                    .then(|| tally.rating_sum as f64 / tally.rating_count as f64),
            })
            .collect();
        stats.sort_by(|left, right| {
            right
                .selections
                .cmp(&left.selections)
                .then_with(|| left.vendor.cmp(&right.vendor))
        });
        stats
    }

    pub fn summary(&self, default: Weights, saturation: u32) -> LearningSummary {
        LearningSummary {
            decisions: self.decisions,
            agreement_rate: if self.decisions == 0 {
                0.0
            } else {
                self.agreements as f64 / self.decisions as f64
            },
            average_rating: (self.rating_count > 0)
                .then(|| self.rating_sum as f64 / self.rating_count as f64),
            confidence: self.confidence(saturation),
            default_weights: default,
            learned_weights: self.learned_weights(default),
            effective_weights: self.effective_weights(default, saturation),
            vendors: self.vendor_stats(),
        }
    }
}
