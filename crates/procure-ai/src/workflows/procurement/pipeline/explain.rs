use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::super::collaborators::{bounded, ExplanationRequest, ReasoningCollaborator};
use super::super::domain::Candidate;
use super::super::inference::{InferenceOutcome, Predicate};
use super::super::scoring::ScoreBreakdown;
use super::outcome::{ExplainedCandidate, ExplanationSource, PipelineWarning, Stage};

/// Derived predicates surfaced to the user as caveats on a candidate.
const FLAG_PREDICATES: [Predicate; 5] = [
    Predicate::SpecMissing,
    Predicate::OverBudget,
    Predicate::EvidenceLow,
    Predicate::DeliveryLate,
    Predicate::OutOfStock,
];

pub(crate) fn flags_for(inference: &InferenceOutcome, candidate: &Candidate) -> Vec<&'static str> {
    FLAG_PREDICATES
        .iter()
        .filter(|predicate| inference.facts.holds_for(**predicate, &candidate.id))
        .map(Predicate::label)
        .collect()
}

/// Deterministic explanation used whenever the reasoning collaborator is absent or fails.
pub(crate) fn template_explanation(
    rank: usize,
    candidate: &Candidate,
    breakdown: &ScoreBreakdown,
    flags: &[&str],
) -> String {
    let opening = if rank == 1 {
        "This is our top recommendation".to_string()
    } else {
        format!("This is option #{rank}")
    };

    let aspects = [
        ("cost-effectiveness", breakdown.cost_fitness),
        ("scientific evidence", breakdown.evidence_fitness),
        ("availability", breakdown.availability_fitness),
    ];
    // Ties keep the earlier aspect.
    let (aspect, value) = aspects
        .iter()
        .copied()
        .fold(aspects[0], |best, next| if next.1 > best.1 { next } else { best });

    let mut text = format!(
        "{opening}: {} from {} at {:.2} {}, with excellent {aspect} (score: {value:.2}).",
        candidate.name, candidate.vendor, candidate.price, candidate.currency
    );
    if !flags.is_empty() {
        text.push_str(&format!(" Note: {}.", flags.join(", ")));
    }
    text
}

pub(crate) struct ExplainPlan<'a> {
    pub query: &'a str,
    pub top_k: usize,
    pub reasoning: Option<&'a Arc<dyn ReasoningCollaborator>>,
    pub timeout: Duration,
}

/// Justify the top-k ranked candidates. A failing reasoning collaborator is reported once
/// and the remaining candidates go straight to the template.
pub(crate) async fn explain(
    plan: &ExplainPlan<'_>,
    ranking: &[ScoreBreakdown],
    candidates: &[Candidate],
    inference: &InferenceOutcome,
    warnings: &mut Vec<PipelineWarning>,
) -> Vec<ExplainedCandidate> {
    let mut reasoning = plan.reasoning.cloned();
    let mut explained = Vec::new();

    for (index, breakdown) in ranking.iter().take(plan.top_k.max(1)).enumerate() {
        let Some(candidate) = candidates
            .iter()
            .find(|candidate| candidate.id == breakdown.candidate)
        else {
            continue;
        };
        let rank = index + 1;
        let flags = flags_for(inference, candidate);
        let trace = inference.trace_for(&candidate.id);

        let mut generated = None;
        if let Some(collaborator) = reasoning.clone() {
            let request = ExplanationRequest {
                query: plan.query.to_string(),
                rank,
                candidate: candidate.clone(),
                breakdown: breakdown.clone(),
                trace: trace.clone(),
            };
            match bounded(plan.timeout, move || collaborator.explain(request)).await {
                Ok(text) if !text.trim().is_empty() => generated = Some(text.trim().to_string()),
                Ok(_) => {}
                Err(err) => {
                    warn!(candidate = %candidate.id, error = %err, "explanation fell back to template");
                    warnings.push(PipelineWarning::CollaboratorUnavailable {
                        collaborator: "reasoning".to_string(),
                        stage: Stage::Explain,
                        detail: err.to_string(),
                    });
                    reasoning = None;
                }
            }
        }

        let (explanation, explanation_source) = match generated {
            Some(text) => (text, ExplanationSource::Reasoning),
            None => (
                template_explanation(rank, candidate, breakdown, &flags),
                ExplanationSource::Template,
            ),
        };

        explained.push(ExplainedCandidate {
            rank,
            candidate: candidate.clone(),
            breakdown: breakdown.clone(),
            flags,
            trace,
            explanation,
            explanation_source,
        });
    }

    explained
}
