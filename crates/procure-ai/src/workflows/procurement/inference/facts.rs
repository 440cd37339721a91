use std::collections::HashSet;

use serde::Serialize;

use super::super::domain::CandidateId;
use super::super::scoring::Weights;

/// Vocabulary of the fact base. Percepts come from the request and retrieval; the rest are
/// asserted by rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    BudgetSet,
    DeadlineSet,
    PreferredVendorsSet,
    FeedbackReceived,
    CandidateRetrieved,
    PriceAvailable,
    EvidenceRetrieved,
    StockChecked,
    SpecValid,
    SpecInvalid,
    SpecMissing,
    WithinBudget,
    OverBudget,
    EvidenceAdequate,
    EvidenceLow,
    Available,
    DeliveryLate,
    OutOfStock,
    AdaptiveWeights,
    Excluded,
}

impl Predicate {
    pub fn label(&self) -> &'static str {
        match self {
            Predicate::BudgetSet => "budget_set",
            Predicate::DeadlineSet => "deadline_set",
            Predicate::PreferredVendorsSet => "preferred_vendors_set",
            Predicate::FeedbackReceived => "feedback_received",
            Predicate::CandidateRetrieved => "candidate_retrieved",
            Predicate::PriceAvailable => "price_available",
            Predicate::EvidenceRetrieved => "evidence_retrieved",
            Predicate::StockChecked => "stock_checked",
            Predicate::SpecValid => "spec_valid",
            Predicate::SpecInvalid => "spec_invalid",
            Predicate::SpecMissing => "spec_missing",
            Predicate::WithinBudget => "within_budget",
            Predicate::OverBudget => "over_budget",
            Predicate::EvidenceAdequate => "evidence_adequate",
            Predicate::EvidenceLow => "evidence_low",
            Predicate::Available => "available",
            Predicate::DeliveryLate => "delivery_late",
            Predicate::OutOfStock => "out_of_stock",
            Predicate::AdaptiveWeights => "adaptive_weights",
            Predicate::Excluded => "excluded",
        }
    }
}

/// Typed argument carried by a fact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FactValue {
    Candidate(CandidateId),
    Decimal(f64),
    Count(u32),
    Boolean(bool),
    Text(String),
    Weights(Weights),
}

/// Where a fact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "rule", rename_all = "snake_case")]
pub enum FactSource {
    Percept,
    Rule(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fact {
    pub predicate: Predicate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<CandidateId>,
    pub args: Vec<FactValue>,
    pub confidence: f64,
    pub source: FactSource,
}

impl Fact {
    pub fn percept(predicate: Predicate, subject: Option<CandidateId>, args: Vec<FactValue>) -> Self {
        Self {
            predicate,
            subject,
            args,
            confidence: 1.0,
            source: FactSource::Percept,
        }
    }

    pub fn derived(
        rule: &'static str,
        predicate: Predicate,
        subject: Option<CandidateId>,
        args: Vec<FactValue>,
    ) -> Self {
        Self {
            predicate,
            subject,
            args,
            confidence: 1.0,
            source: FactSource::Rule(rule),
        }
    }

    pub fn decimal_arg(&self) -> Option<f64> {
        self.args.iter().find_map(|arg| match arg {
            FactValue::Decimal(value) => Some(*value),
            _ => None,
        })
    }

    pub fn count_arg(&self) -> Option<u32> {
        self.args.iter().find_map(|arg| match arg {
            FactValue::Count(value) => Some(*value),
            _ => None,
        })
    }

    pub fn boolean_arg(&self) -> Option<bool> {
        self.args.iter().find_map(|arg| match arg {
            FactValue::Boolean(value) => Some(*value),
            _ => None,
        })
    }

    pub fn text_arg(&self) -> Option<&str> {
        self.args.iter().find_map(|arg| match arg {
            FactValue::Text(value) => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn weights_arg(&self) -> Option<Weights> {
        self.args.iter().find_map(|arg| match arg {
            FactValue::Weights(value) => Some(*value),
            _ => None,
        })
    }
}

/// Append-only fact store for one run. A (predicate, subject) pair is held at most once.
#[derive(Debug, Clone, Default)]
pub struct FactBase {
    facts: Vec<Fact>,
    index: HashSet<(Predicate, Option<CandidateId>)>,
}

impl FactBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when an equivalent fact was already present.
    pub fn assert(&mut self, fact: Fact) -> bool {
        if !self
            .index
            .insert((fact.predicate, fact.subject.clone()))
        {
            return false;
        }
        self.facts.push(fact);
        true
    }

    pub fn contains(&self, predicate: Predicate, subject: Option<&CandidateId>) -> bool {
        self.index.contains(&(predicate, subject.cloned()))
    }

    pub fn holds_for(&self, predicate: Predicate, candidate: &CandidateId) -> bool {
        self.contains(predicate, Some(candidate))
    }

    pub fn has_predicate(&self, predicate: Predicate) -> bool {
        self.facts.iter().any(|fact| fact.predicate == predicate)
    }

    pub fn with_predicate(&self, predicate: Predicate) -> impl Iterator<Item = &Fact> + '_ {
        self.facts
            .iter()
            .filter(move |fact| fact.predicate == predicate)
    }

    pub fn get(&self, predicate: Predicate, subject: Option<&CandidateId>) -> Option<&Fact> {
        self.facts
            .iter()
            .find(|fact| fact.predicate == predicate && fact.subject.as_ref() == subject)
    }

    /// Subjects of every fact with `predicate`, in assertion order.
    pub fn subjects(&self, predicate: Predicate) -> Vec<CandidateId> {
        self.with_predicate(predicate)
            .filter_map(|fact| fact.subject.clone())
            .collect()
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}
