use tracing::{debug, warn};

use super::super::config::ProcurementConfig;
use super::super::domain::{Candidate, ProcurementRequest};
use super::super::inference::{
    AdaptiveInput, Fact, FactBase, FactValue, InferenceEngine, InferenceGoal, InferenceOutcome,
    NeededFact, Predicate, RuleParams,
};
use super::super::scoring::{ScoreBreakdown, ScoringEngine, ScoringParams, Weights};
use super::outcome::{AcquisitionAction, AcquisitionRequest, Exclusion, PipelineWarning};

pub(crate) struct Evaluation {
    pub inference: InferenceOutcome,
    pub ranking: Vec<ScoreBreakdown>,
    pub excluded: Vec<Exclusion>,
    pub acquisitions: Vec<AcquisitionRequest>,
    pub weights: Weights,
    pub warnings: Vec<PipelineWarning>,
}

/// Percepts for one run: request constraints first, then one group per candidate.
pub(crate) fn percepts(
    request: &ProcurementRequest,
    candidates: &[Candidate],
    feedback_decisions: u64,
) -> FactBase {
    let mut facts = FactBase::new();

    if request.budget_is_valid() {
        facts.assert(Fact::percept(
            Predicate::BudgetSet,
            None,
            vec![FactValue::Decimal(request.budget)],
        ));
    }
    facts.assert(Fact::percept(
        Predicate::DeadlineSet,
        None,
        vec![FactValue::Count(request.deadline_days)],
    ));
    if !request.preferred_vendors.is_empty() {
        facts.assert(Fact::percept(
            Predicate::PreferredVendorsSet,
            None,
            vec![FactValue::Text(request.preferred_vendors.join(", "))],
        ));
    }
    if feedback_decisions > 0 {
        facts.assert(Fact::percept(
            Predicate::FeedbackReceived,
            None,
            vec![FactValue::Count(
                u32::try_from(feedback_decisions).unwrap_or(u32::MAX),
            )],
        ));
    }

    for candidate in candidates {
        let subject = Some(candidate.id.clone());
        facts.assert(Fact::percept(
            Predicate::CandidateRetrieved,
            subject.clone(),
            vec![FactValue::Candidate(candidate.id.clone())],
        ));
        facts.assert(Fact::percept(
            Predicate::PriceAvailable,
            subject.clone(),
            vec![FactValue::Decimal(candidate.price)],
        ));
        if let Some(evidence) = candidate.evidence {
            facts.assert(Fact::percept(
                Predicate::EvidenceRetrieved,
                subject.clone(),
                vec![FactValue::Decimal(evidence)],
            ));
        }
        facts.assert(Fact::percept(
            Predicate::StockChecked,
            subject,
            vec![
                FactValue::Boolean(candidate.availability.in_stock),
                FactValue::Count(candidate.availability.lead_time_days),
            ],
        ));
    }

    facts
}

pub(crate) fn rule_params(
    config: &ProcurementConfig,
    request: &ProcurementRequest,
    adaptive: Option<AdaptiveInput>,
) -> RuleParams {
    RuleParams {
        required_attributes: request.required_attributes.clone(),
        budget_tolerance: config.budget_tolerance,
        min_evidence: config.min_evidence,
        over_budget: Some(config.over_budget),
        adaptive,
    }
}

fn acquisition_for(needed: &NeededFact) -> AcquisitionRequest {
    let (action, note) = match needed.predicate {
        Predicate::WithinBudget => (
            AcquisitionAction::RequestSubstitutes,
            "no candidate fits the budget; search for cheaper substitutes",
        ),
        Predicate::Available => (
            AcquisitionAction::RequestSubstitutes,
            "no candidate can be delivered in time; search for stocked substitutes",
        ),
        Predicate::EvidenceAdequate => (
            AcquisitionAction::RequestLiterature,
            "no candidate has adequate evidence; query further literature sources",
        ),
        Predicate::AdaptiveWeights => (
            AcquisitionAction::CollectFeedback,
            "no adaptive weights available; collect feedback on recommendations",
        ),
        Predicate::BudgetSet => (
            AcquisitionAction::ClarifyRequest,
            "request carries no usable budget",
        ),
        _ => (
            AcquisitionAction::ClarifyRequest,
            "candidates lack the requested specification; clarify the request",
        ),
    };
    AcquisitionRequest {
        goal: needed.goal,
        predicate: needed.predicate,
        action,
        note: note.to_string(),
    }
}

/// Run inference over the percepts, drop excluded candidates, and rank the rest. Scoring
/// is skipped when the budget is unusable; inference always runs so the trace survives.
pub(crate) fn evaluate(
    engine: &InferenceEngine,
    config: &ProcurementConfig,
    request: &ProcurementRequest,
    candidates: &[Candidate],
    adaptive: AdaptiveInput,
) -> Evaluation {
    let facts = percepts(request, candidates, adaptive.decisions);
    let params = rule_params(config, request, Some(adaptive));

    let mut acquisitions = Vec::new();
    let inference = engine.infer(
        facts,
        candidates,
        &params,
        &InferenceGoal::ALL,
        config.inference_mode,
        &mut |needed: &NeededFact| acquisitions.push(acquisition_for(needed)),
    );

    let mut warnings = Vec::new();

    let excluded: Vec<Exclusion> = inference
        .facts
        .with_predicate(Predicate::Excluded)
        .filter_map(|fact| {
            fact.subject.clone().map(|candidate| Exclusion {
                candidate,
                reason: fact.text_arg().unwrap_or("excluded by rule").to_string(),
            })
        })
        .collect();

    let weights = match inference
        .facts
        .get(Predicate::AdaptiveWeights, None)
        .and_then(Fact::weights_arg)
    {
        Some(weights) => weights,
        None => {
            warn!("adaptive weights not asserted; scoring with configured defaults");
            warnings.push(PipelineWarning::ScoringPrecondition {
                detail: "adaptive weights not asserted; configured defaults used".to_string(),
            });
            config.default_weights
        }
    };

    let ranking = if request.budget_is_valid() {
        let eligible: Vec<Candidate> = candidates
            .iter()
            .filter(|candidate| {
                !inference
                    .facts
                    .holds_for(Predicate::Excluded, &candidate.id)
            })
            .cloned()
            .collect();
        ScoringEngine::new(ScoringParams::from_request(config, request)).rank(&eligible, &weights)
    } else {
        Vec::new()
    };

    debug!(
        candidates = candidates.len(),
        excluded = excluded.len(),
        ranked = ranking.len(),
        acquisitions = acquisitions.len(),
        "evaluation finished"
    );

    Evaluation {
        inference,
        ranking,
        excluded,
        acquisitions,
        weights,
        warnings,
    }
}
