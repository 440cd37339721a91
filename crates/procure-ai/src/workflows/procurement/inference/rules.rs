use serde::Serialize;

use super::super::config::OverBudgetPolicy;
use super::super::domain::{Candidate, CandidateId};
use super::super::normalizer::normalize_key;
use super::super::scoring::Weights;
use super::facts::{Fact, FactBase, FactValue, Predicate};

/// Read-only view handed to rule conditions and actions.
pub struct RuleContext<'a> {
    pub facts: &'a FactBase,
    pub candidates: &'a [Candidate],
    pub params: &'a RuleParams,
}

impl RuleContext<'_> {
    pub fn candidate(&self, id: &CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|candidate| &candidate.id == id)
    }
}

/// Request and policy inputs consulted by the standard rules.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuleParams {
    pub required_attributes: Vec<String>,
    pub budget_tolerance: f64,
    pub min_evidence: f64,
    pub over_budget: Option<OverBudgetPolicy>,
    pub adaptive: Option<AdaptiveInput>,
}

/// Weight vector published by the feedback module for the current run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveInput {
    pub weights: Weights,
    pub confidence: f64,
    pub decisions: u64,
}

/// A single instantiation of a rule condition. Refraction keys on (rule, match).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleMatch {
    pub subject: Option<CandidateId>,
    pub matched: Vec<Predicate>,
}

impl RuleMatch {
    pub fn candidate(subject: &CandidateId, matched: &[Predicate]) -> Self {
        Self {
            subject: Some(subject.clone()),
            matched: matched.to_vec(),
        }
    }

    pub fn global(matched: &[Predicate]) -> Self {
        Self {
            subject: None,
            matched: matched.to_vec(),
        }
    }
}

/// Facts a firing asserts plus the note recorded in the trace.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEffect {
    pub assertions: Vec<Fact>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum RuleFault {
    #[error("required fact {} is missing", .0.label())]
    MissingFact(Predicate),
    #[error("condition failed: {0}")]
    Condition(String),
}

pub type Condition = fn(&RuleContext<'_>) -> Result<Vec<RuleMatch>, RuleFault>;
pub type Action = fn(&RuleContext<'_>, &RuleMatch) -> RuleEffect;

/// Static production rule.
#[derive(Clone, Copy)]
pub struct Rule {
    pub id: &'static str,
    /// Higher priorities fire first; ties keep declaration order.
    pub priority: i32,
    pub description: &'static str,
    pub requires: &'static [Predicate],
    pub produces: &'static [Predicate],
    pub condition: Condition,
    pub action: Action,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("requires", &self.requires)
            .field("produces", &self.produces)
            .finish()
    }
}

pub fn standard_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "R1",
            priority: 10,
            description: "required specification attributes are present",
            requires: &[Predicate::CandidateRetrieved],
            produces: &[
                Predicate::SpecValid,
                Predicate::SpecInvalid,
                Predicate::SpecMissing,
                Predicate::Excluded,
            ],
            condition: spec_condition,
            action: spec_action,
        },
        Rule {
            id: "R2",
            priority: 9,
            description: "price within budget",
            requires: &[
                Predicate::BudgetSet,
                Predicate::SpecValid,
                Predicate::PriceAvailable,
            ],
            produces: &[
                Predicate::WithinBudget,
                Predicate::OverBudget,
                Predicate::Excluded,
            ],
            condition: budget_condition,
            action: budget_action,
        },
        Rule {
            id: "R3",
            priority: 7,
            description: "evidence meets the minimum threshold",
            requires: &[Predicate::SpecValid],
            produces: &[Predicate::EvidenceAdequate, Predicate::EvidenceLow],
            condition: evidence_condition,
            action: evidence_action,
        },
        Rule {
            id: "R4",
            priority: 8,
            description: "deliverable before the deadline",
            requires: &[
                Predicate::DeadlineSet,
                Predicate::SpecValid,
                Predicate::StockChecked,
            ],
            produces: &[
                Predicate::Available,
                Predicate::DeliveryLate,
                Predicate::OutOfStock,
            ],
            condition: availability_condition,
            action: availability_action,
        },
        Rule {
            id: "R5",
            priority: 5,
            description: "adaptive weights from recorded feedback",
            requires: &[],
            produces: &[Predicate::AdaptiveWeights],
            condition: adaptive_condition,
            action: adaptive_action,
        },
    ]
}

fn known_candidates(
    ctx: &RuleContext<'_>,
    predicate: Predicate,
) -> Result<Vec<CandidateId>, RuleFault> {
    let subjects = ctx.facts.subjects(predicate);
    if let Some(unknown) = subjects.iter().find(|id| ctx.candidate(id).is_none()) {
        return Err(RuleFault::Condition(format!(
            "{} refers to unknown candidate {unknown}",
            predicate.label()
        )));
    }
    Ok(subjects)
}

fn spec_condition(ctx: &RuleContext<'_>) -> Result<Vec<RuleMatch>, RuleFault> {
    Ok(known_candidates(ctx, Predicate::CandidateRetrieved)?
        .iter()
        .map(|id| RuleMatch::candidate(id, &[Predicate::CandidateRetrieved]))
        .collect())
}

fn spec_action(ctx: &RuleContext<'_>, matched: &RuleMatch) -> RuleEffect {
    let (Some(id), Some(candidate)) = (
        matched.subject.as_ref(),
        matched.subject.as_ref().and_then(|id| ctx.candidate(id)),
    ) else {
        return RuleEffect {
            assertions: Vec::new(),
            note: "candidate no longer present".to_string(),
        };
    };

    let required: Vec<String> = ctx
        .params
        .required_attributes
        .iter()
        .map(|attribute| normalize_key(attribute))
        .filter(|attribute| !attribute.is_empty())
        .collect();

    if required.is_empty() {
        if candidate.attributes.is_empty() {
            return RuleEffect {
                assertions: vec![
                    Fact::derived("R1", Predicate::SpecMissing, Some(id.clone()), Vec::new()),
                    Fact::derived("R1", Predicate::SpecValid, Some(id.clone()), Vec::new()),
                ],
                note: "no specification attributes; flagged spec_missing for clarification"
                    .to_string(),
            };
        }
        return RuleEffect {
            assertions: vec![Fact::derived(
                "R1",
                Predicate::SpecValid,
                Some(id.clone()),
                vec![FactValue::Count(candidate.attributes.len() as u32)],
            )],
            note: format!(
                "{} specification attributes, none required",
                candidate.attributes.len()
            ),
        };
    }

    let missing: Vec<&str> = required
        .iter()
        .filter(|attribute| {
            candidate
                .attributes
                .get(attribute.as_str())
                .map_or(true, |value| value.trim().is_empty())
        })
        .map(String::as_str)
        .collect();

    if missing.is_empty() {
        RuleEffect {
            assertions: vec![Fact::derived(
                "R1",
                Predicate::SpecValid,
                Some(id.clone()),
                vec![FactValue::Count(required.len() as u32)],
            )],
            note: format!("all {} required attributes present", required.len()),
        }
    } else {
        let reason = format!("missing required attributes: {}", missing.join(", "));
        RuleEffect {
            assertions: vec![
                Fact::derived(
                    "R1",
                    Predicate::SpecInvalid,
                    Some(id.clone()),
                    vec![FactValue::Text(missing.join(", "))],
                ),
                Fact::derived(
                    "R1",
                    Predicate::Excluded,
                    Some(id.clone()),
                    vec![FactValue::Text(reason.clone())],
                ),
            ],
            note: format!("{reason}; candidate rejected"),
        }
    }
}

fn spec_valid_with(
    ctx: &RuleContext<'_>,
    percept: Predicate,
    extra: &[Predicate],
) -> Result<Vec<RuleMatch>, RuleFault> {
    let mut matched = vec![Predicate::SpecValid, percept];
    matched.extend_from_slice(extra);
    Ok(known_candidates(ctx, Predicate::SpecValid)?
        .iter()
        .filter(|id| ctx.facts.holds_for(percept, id))
        .filter(|id| !ctx.facts.holds_for(Predicate::Excluded, id))
        .map(|id| RuleMatch::candidate(id, &matched))
        .collect())
}

fn budget_condition(ctx: &RuleContext<'_>) -> Result<Vec<RuleMatch>, RuleFault> {
    spec_valid_with(ctx, Predicate::PriceAvailable, &[Predicate::BudgetSet])
}

fn budget_action(ctx: &RuleContext<'_>, matched: &RuleMatch) -> RuleEffect {
    let Some(id) = matched.subject.as_ref() else {
        return RuleEffect {
            assertions: Vec::new(),
            note: "budget check without a candidate".to_string(),
        };
    };
    let budget = ctx
        .facts
        .get(Predicate::BudgetSet, None)
        .and_then(Fact::decimal_arg)
        .unwrap_or_default();
    let price = ctx
        .facts
        .get(Predicate::PriceAvailable, Some(id))
        .and_then(Fact::decimal_arg)
        .unwrap_or_default();
    let limit = budget * (1.0 + ctx.params.budget_tolerance.max(0.0));

    if price <= limit {
        return RuleEffect {
            assertions: vec![Fact::derived(
                "R2",
                Predicate::WithinBudget,
                Some(id.clone()),
                vec![FactValue::Decimal(price)],
            )],
            note: format!("price {price:.2} within budget {budget:.2}"),
        };
    }

    let overage = price - budget;
    let mut assertions = vec![Fact::derived(
        "R2",
        Predicate::OverBudget,
        Some(id.clone()),
        vec![FactValue::Decimal(overage)],
    )];
    let note = match ctx.params.over_budget {
        Some(OverBudgetPolicy::Exclude) => {
            assertions.push(Fact::derived(
                "R2",
                Predicate::Excluded,
                Some(id.clone()),
                vec![FactValue::Text(format!(
                    "price {price:.2} exceeds budget {budget:.2}"
                ))],
            ));
            format!("price {price:.2} exceeds budget {budget:.2} by {overage:.2}; excluded")
        }
        _ => format!(
            "price {price:.2} exceeds budget {budget:.2} by {overage:.2}; substitute recommended"
        ),
    };

    RuleEffect { assertions, note }
}

fn evidence_condition(ctx: &RuleContext<'_>) -> Result<Vec<RuleMatch>, RuleFault> {
    Ok(known_candidates(ctx, Predicate::SpecValid)?
        .iter()
        .filter(|id| !ctx.facts.holds_for(Predicate::Excluded, id))
        .map(|id| {
            if ctx.facts.holds_for(Predicate::EvidenceRetrieved, id) {
                RuleMatch::candidate(id, &[Predicate::SpecValid, Predicate::EvidenceRetrieved])
            } else {
                RuleMatch::candidate(id, &[Predicate::SpecValid])
            }
        })
        .collect())
}

fn evidence_action(ctx: &RuleContext<'_>, matched: &RuleMatch) -> RuleEffect {
    let Some(id) = matched.subject.as_ref() else {
        return RuleEffect {
            assertions: Vec::new(),
            note: "evidence check without a candidate".to_string(),
        };
    };
    let threshold = ctx.params.min_evidence;

    match ctx
        .facts
        .get(Predicate::EvidenceRetrieved, Some(id))
        .and_then(Fact::decimal_arg)
    {
        Some(score) if score >= threshold => RuleEffect {
            assertions: vec![Fact::derived(
                "R3",
                Predicate::EvidenceAdequate,
                Some(id.clone()),
                vec![FactValue::Decimal(score)],
            )],
            note: format!("evidence {score:.2} meets threshold {threshold:.2}"),
        },
        Some(score) => RuleEffect {
            assertions: vec![Fact::derived(
                "R3",
                Predicate::EvidenceLow,
                Some(id.clone()),
                vec![FactValue::Decimal(score)],
            )],
            note: format!("evidence {score:.2} below threshold {threshold:.2}; penalized"),
        },
        None => RuleEffect {
            assertions: vec![Fact::derived(
                "R3",
                Predicate::EvidenceLow,
                Some(id.clone()),
                vec![FactValue::Text("missing".to_string())],
            )],
            note: "no evidence retrieved; treated as low evidence".to_string(),
        },
    }
}

fn availability_condition(ctx: &RuleContext<'_>) -> Result<Vec<RuleMatch>, RuleFault> {
    spec_valid_with(ctx, Predicate::StockChecked, &[Predicate::DeadlineSet])
}

fn availability_action(ctx: &RuleContext<'_>, matched: &RuleMatch) -> RuleEffect {
    let Some(id) = matched.subject.as_ref() else {
        return RuleEffect {
            assertions: Vec::new(),
            note: "availability check without a candidate".to_string(),
        };
    };
    let deadline = ctx
        .facts
        .get(Predicate::DeadlineSet, None)
        .and_then(Fact::count_arg)
        .unwrap_or_default();
    let stock = ctx.facts.get(Predicate::StockChecked, Some(id));
    let in_stock = stock.and_then(Fact::boolean_arg).unwrap_or(false);
    let lead_time = stock.and_then(Fact::count_arg).unwrap_or_default();

    if !in_stock {
        return RuleEffect {
            assertions: vec![Fact::derived(
                "R4",
                Predicate::OutOfStock,
                Some(id.clone()),
                Vec::new(),
            )],
            note: "out of stock; substitute suggested".to_string(),
        };
    }

    if lead_time <= deadline {
        RuleEffect {
            assertions: vec![Fact::derived(
                "R4",
                Predicate::Available,
                Some(id.clone()),
                vec![FactValue::Count(lead_time)],
            )],
            note: format!("in stock, delivery in {lead_time}d within {deadline}d deadline"),
        }
    } else {
        RuleEffect {
            assertions: vec![Fact::derived(
                "R4",
                Predicate::DeliveryLate,
                Some(id.clone()),
                vec![FactValue::Count(lead_time - deadline)],
            )],
            note: format!(
                "in stock, delivery in {lead_time}d misses {deadline}d deadline by {}d",
                lead_time - deadline
            ),
        }
    }
}

fn adaptive_condition(ctx: &RuleContext<'_>) -> Result<Vec<RuleMatch>, RuleFault> {
    if ctx.params.adaptive.is_none() {
        return Err(RuleFault::Condition(
            "no adaptive weights supplied by the feedback module".to_string(),
        ));
    }
    if ctx.facts.has_predicate(Predicate::FeedbackReceived) {
        Ok(vec![RuleMatch::global(&[Predicate::FeedbackReceived])])
    } else {
        Ok(vec![RuleMatch::global(&[])])
    }
}

fn adaptive_action(ctx: &RuleContext<'_>, _matched: &RuleMatch) -> RuleEffect {
    let Some(adaptive) = ctx.params.adaptive else {
        return RuleEffect {
            assertions: Vec::new(),
            note: "adaptive weights unavailable".to_string(),
        };
    };
    let weights = adaptive.weights;
    RuleEffect {
        assertions: vec![Fact::derived(
            "R5",
            Predicate::AdaptiveWeights,
            None,
            vec![
                FactValue::Weights(weights),
                FactValue::Decimal(adaptive.confidence),
            ],
        )],
        note: format!(
            "weights {:.3}/{:.3}/{:.3} at confidence {:.2} from {} decisions",
            weights.alpha, weights.beta, weights.gamma, adaptive.confidence, adaptive.decisions
        ),
    }
}
