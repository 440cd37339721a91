mod learning;
mod store;

pub use learning::{LearningState, LearningSummary, VendorStats};
pub use store::{
    FeedbackStore, FeedbackStoreError, JsonlFeedbackStore, LearnedSnapshot, LoadedLog,
    MemoryFeedbackStore,
};

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{CandidateId, RunId};
use super::scoring::Weights;

/// Sub-scores of the candidate a user actually chose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub cost: f64,
    pub evidence: f64,
    pub availability: f64,
}

impl SubScores {
    /// Missing or out-of-range components default to zero.
    pub fn sanitized(&self) -> Self {
        let clean = |value: f64| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        Self {
            cost: clean(self.cost),
            evidence: clean(self.evidence),
            availability: clean(self.availability),
        }
    }
}

/// One recorded decision; the log is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub run_id: RunId,
    pub query: String,
    pub chosen: CandidateId,
    pub vendor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    pub agreed_with_top: bool,
    pub sub_scores: SubScores,
    pub recorded_at: DateTime<Utc>,
}

/// Raised once when the log could not be read cleanly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistenceWarning {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub corrupt_lines: Vec<usize>,
}

struct LoopState {
    learning: LearningState,
    pending_warning: Option<PersistenceWarning>,
}

/// Cross-run owner of the feedback log and the learning state folded from it.
pub struct FeedbackLoop<S> {
    store: Arc<S>,
    default_weights: Weights,
    saturation: u32,
    state: Mutex<LoopState>,
}

impl<S: FeedbackStore> FeedbackLoop<S> {
    /// Replay the stored log. An unreadable log starts from defaults and leaves a
    /// warning for the next caller of [`FeedbackLoop::take_warning`].
    pub fn open(store: Arc<S>, default_weights: Weights, saturation: u32) -> Self {
        let (learning, pending_warning) = match store.load() {
            Ok(log) => {
                let learning = LearningState::replay(&log.records);
                let warning = if log.corrupt_lines.is_empty() {
                    None
                } else {
                    warn!(
                        lines = ?log.corrupt_lines,
                        "skipped corrupt feedback log lines"
                    );
                    Some(PersistenceWarning {
                        message: format!(
                            "skipped {} corrupt feedback log line(s)",
                            log.corrupt_lines.len()
                        ),
                        corrupt_lines: log.corrupt_lines,
                    })
                };
                if log.torn_tail {
                    warn!("ignored partially written trailing feedback record");
                }
                info!(decisions = learning.decisions(), "feedback log replayed");
                (learning, warning)
            }
            Err(err) => {
                warn!(error = %err, "feedback log unreadable; using default weights");
                (
                    LearningState::default(),
                    Some(PersistenceWarning {
                        message: format!("feedback log unreadable, defaults in use: {err}"),
                        corrupt_lines: Vec::new(),
                    }),
                )
            }
        };

        Self {
            store,
            default_weights,
            saturation,
            state: Mutex::new(LoopState {
                learning,
                pending_warning,
            }),
        }
    }

    /// Append a decision, fold it into the learning state, and refresh the snapshot.
    pub fn record(&self, record: FeedbackRecord) -> Result<LearningSummary, FeedbackStoreError> {
        let mut state = self.state.lock().expect("feedback state mutex poisoned");
        self.store.append(&record)?;

        let learning = std::mem::take(&mut state.learning).apply(&record);
        state.learning = learning;

        let snapshot = LearnedSnapshot {
            decisions: state.learning.decisions(),
            confidence: state.learning.confidence(self.saturation),
            learned_weights: state.learning.learned_weights(self.default_weights),
            effective_weights: state
                .learning
                .effective_weights(self.default_weights, self.saturation),
            updated_at: Utc::now(),
        };
        if let Err(err) = self.store.write_snapshot(&snapshot) {
            warn!(error = %err, "learned weight snapshot not written");
            state.pending_warning = Some(PersistenceWarning {
                message: format!("learned weight snapshot not written: {err}"),
                corrupt_lines: Vec::new(),
            });
        }

        info!(
            run_id = %record.run_id,
            chosen = %record.chosen,
            decisions = snapshot.decisions,
            confidence = snapshot.confidence,
            "feedback recorded"
        );
        Ok(state.learning.summary(self.default_weights, self.saturation))
    }

    pub fn learned_weights(&self) -> Weights {
        self.with_state(|learning| learning.learned_weights(self.default_weights))
    }

    pub fn confidence(&self) -> f64 {
        self.with_state(|learning| learning.confidence(self.saturation))
    }

    pub fn effective_weights(&self) -> Weights {
        self.with_state(|learning| learning.effective_weights(self.default_weights, self.saturation))
    }

    pub fn decisions(&self) -> u64 {
        self.with_state(LearningState::decisions)
    }

    pub fn summary(&self) -> LearningSummary {
        self.with_state(|learning| learning.summary(self.default_weights, self.saturation))
    }

    /// The pending persistence warning, handed out at most once.
    pub fn take_warning(&self) -> Option<PersistenceWarning> {
        self.state
            .lock()
            .expect("feedback state mutex poisoned")
            .pending_warning
            .take()
    }

    pub fn default_weights(&self) -> Weights {
        self.default_weights
    }

    fn with_state<T>(&self, read: impl FnOnce(&LearningState) -> T) -> T {
        let state = self.state.lock().expect("feedback state mutex poisoned");
        read(&state.learning)
    }
}
