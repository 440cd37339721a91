use serde::Serialize;

use super::super::domain::CandidateId;
use super::facts::Predicate;

/// Chaining direction that produced a trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Fired,
    Warning,
    Needed,
}

/// One step of the inference audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub step: usize,
    pub direction: Direction,
    pub kind: TraceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<CandidateId>,
    pub matched: Vec<Predicate>,
    pub asserted: Vec<Predicate>,
    pub note: String,
}

impl TraceEntry {
    pub fn is_warning(&self) -> bool {
        self.kind == TraceKind::Warning
    }

    pub fn summary(&self) -> String {
        let rule = self.rule.unwrap_or("engine");
        match &self.candidate {
            Some(candidate) => format!("[{rule}] {candidate}: {}", self.note),
            None => format!("[{rule}] {}", self.note),
        }
    }
}
