use crate::infra::{build_pipeline, load_catalog, parse_mode};
use clap::Args;
use procure_ai::config::AppConfig;
use procure_ai::error::AppError;
use procure_ai::workflows::procurement::{
    CandidateId, FeedbackError, FeedbackLoop, FeedbackReceipt, FeedbackSubmission,
    InferenceMode, JsonlFeedbackStore, LearningSummary, NoRecommendation, ProcurementRequest,
    Recommendation, RecommendationOutcome, Weights,
};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct RecommendArgs {
    /// What to buy, in free text
    pub(crate) query: String,
    /// Maximum acceptable unit price
    #[arg(long, allow_negative_numbers = true)]
    pub(crate) budget: f64,
    /// Currency offers must be quoted in (defaults to EUR)
    #[arg(long)]
    pub(crate) currency: Option<String>,
    /// Days until the goods are needed (defaults to 14)
    #[arg(long)]
    pub(crate) deadline_days: Option<u32>,
    /// Separate line item to quote; repeat for several
    #[arg(long = "item")]
    pub(crate) items: Vec<String>,
    /// Preferred vendors, comma separated
    #[arg(long, value_delimiter = ',')]
    pub(crate) prefer: Vec<String>,
    /// Attributes every candidate must state, comma separated
    #[arg(long = "require", value_delimiter = ',')]
    pub(crate) required: Vec<String>,
    /// Inference mode override (forward, backward, hybrid)
    #[arg(long, value_parser = parse_mode)]
    pub(crate) mode: Option<InferenceMode>,
    /// Supplier catalog CSV (defaults to PROCURE_CATALOG or the bundled sample)
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
    /// Record a decision right away: a rank from the ranking or a candidate id
    #[arg(long)]
    pub(crate) choose: Option<String>,
    /// Satisfaction rating (1-5) for the chosen candidate
    #[arg(long, requires = "choose", value_parser = clap::value_parser!(u8).range(1..=5))]
    pub(crate) rating: Option<u8>,
    /// Print the full outcome as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct LearningArgs {
    /// Print the learning summary as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

pub(crate) async fn run_recommend(args: RecommendArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;
    if let Some(mode) = args.mode {
        config.procurement.inference_mode = mode;
    }

    let catalog = load_catalog(&config, args.catalog.as_deref())?;
    let pipeline = build_pipeline(&config, catalog);
    let request = build_request(&args);
    let outcome = pipeline.recommend(request).await;

    if args.json {
        println!("{}", to_json(&outcome)?);
    } else {
        match &outcome {
            RecommendationOutcome::Recommended(recommendation) => {
                print!(
                    "{}",
                    render_recommendation(recommendation, pipeline.feedback().confidence())
                );
            }
            RecommendationOutcome::NoRecommendation(outcome) => {
                print!("{}", render_no_recommendation(outcome));
            }
        }
    }

    let Some(choice) = args.choose.as_deref() else {
        return Ok(());
    };
    let RecommendationOutcome::Recommended(recommendation) = &outcome else {
        eprintln!("No recommendation was produced, so no decision was recorded.");
        return Ok(());
    };

    let chosen = resolve_choice(recommendation, choice)?;
    let receipt = pipeline.learn(
        recommendation,
        FeedbackSubmission {
            chosen,
            rating: args.rating,
        },
    )?;

    if args.json {
        println!("{}", to_json(&receipt)?);
    } else {
        print!("{}", render_receipt(&receipt));
    }
    Ok(())
}

pub(crate) fn run_learning(args: LearningArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let feedback = FeedbackLoop::open(
        Arc::new(JsonlFeedbackStore::new(config.storage.feedback_dir.clone())),
        config.procurement.default_weights,
        config.procurement.feedback_saturation,
    );
    if let Some(warning) = feedback.take_warning() {
        eprintln!("warning: {}", warning.message);
    }

    let summary = feedback.summary();
    if args.json {
        println!("{}", to_json(&summary)?);
    } else {
        print!("{}", render_learning(&summary));
    }
    Ok(())
}

fn build_request(args: &RecommendArgs) -> ProcurementRequest {
    let mut request = ProcurementRequest::new(args.query.clone(), args.budget);
    if let Some(currency) = &args.currency {
        request.currency = currency.trim().to_uppercase();
    }
    if let Some(days) = args.deadline_days {
        request.deadline_days = days;
    }
    request.line_items = args.items.clone();
    request.preferred_vendors = args.prefer.clone();
    request.required_attributes = args.required.clone();
    request
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value).map_err(|err| AppError::Io(err.into()))
}

/// A one-based rank into the full ranking, or a candidate id.
pub(crate) fn resolve_choice(
    recommendation: &Recommendation,
    choice: &str,
) -> Result<CandidateId, FeedbackError> {
    let choice = choice.trim();
    if let Ok(rank) = choice.parse::<usize>() {
        return rank
            .checked_sub(1)
            .and_then(|index| recommendation.ranking.get(index))
            .map(|breakdown| breakdown.candidate.clone())
            .ok_or_else(|| FeedbackError::UnknownCandidate(CandidateId(choice.to_string())));
    }
    Ok(CandidateId(choice.to_string()))
}

fn format_weights(weights: &Weights) -> String {
    format!(
        "cost {:.2} | evidence {:.2} | availability {:.2}",
        weights.alpha, weights.beta, weights.gamma
    )
}

pub(crate) fn render_recommendation(recommendation: &Recommendation, confidence: f64) -> String {
    let request = &recommendation.request;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Recommendation {} for \"{}\" (budget {:.2} {})",
        recommendation.run_id, request.query, request.budget, request.currency
    );
    let _ = writeln!(
        out,
        "Weights: {} (feedback confidence {:.2})",
        format_weights(&recommendation.weights),
        confidence
    );

    let _ = writeln!(out, "\nRanking");
    for (index, breakdown) in recommendation.ranking.iter().enumerate() {
        let Some(candidate) = recommendation.candidate(&breakdown.candidate) else {
            continue;
        };
        let _ = writeln!(
            out,
            "{:>3}. {} ({}) {:.2} {} | score {:.3} | id {}",
            index + 1,
            candidate.name,
            candidate.vendor,
            candidate.price,
            candidate.currency,
            breakdown.weighted_total,
            candidate.id
        );
    }

    let _ = writeln!(out, "\nTop picks");
    for entry in &recommendation.recommended {
        let flags = if entry.flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", entry.flags.join(", "))
        };
        let _ = writeln!(out, "- #{} {}{}", entry.rank, entry.candidate.name, flags);
        let _ = writeln!(out, "  {}", entry.explanation);
    }

    let quotation = &recommendation.quotation;
    let _ = writeln!(
        out,
        "\nQuotation ({}/{} line items matched)",
        quotation.matched, quotation.requested
    );
    for line in &quotation.lines {
        match (&line.product, line.unit_price) {
            (Some(product), Some(price)) => {
                let _ = writeln!(
                    out,
                    "- {}: {} {:.2} {}",
                    line.line_item, product, price, quotation.currency
                );
            }
            _ => {
                let _ = writeln!(out, "- {}: no offer", line.line_item);
            }
        }
    }
    let _ = writeln!(out, "Total: {:.2} {}", quotation.total, quotation.currency);

    let goal = &recommendation.goal;
    let _ = writeln!(
        out,
        "\nGoal {}: {}",
        if goal.achieved { "achieved" } else { "not met" },
        goal.summary()
    );

    if !recommendation.warnings.is_empty() {
        let _ = writeln!(out, "\nWarnings");
        for warning in &recommendation.warnings {
            let _ = writeln!(out, "- {}", warning.summary());
        }
    }
    out
}

pub(crate) fn render_no_recommendation(outcome: &NoRecommendation) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "No recommendation for run {}: {}",
        outcome.run_id,
        outcome.reason.summary()
    );
    let _ = writeln!(out, "{}", outcome.detail);
    for acquisition in &outcome.acquisitions {
        let _ = writeln!(out, "- next step: {}", acquisition.note);
    }
    for warning in &outcome.warnings {
        let _ = writeln!(out, "- warning: {}", warning.summary());
    }
    out
}

fn render_receipt(receipt: &FeedbackReceipt) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\nRecorded {} for {} ({} the top pick); {} decision(s) learned so far.",
        receipt.chosen,
        receipt.run_id,
        if receipt.agreed_with_top {
            "agrees with"
        } else {
            "differs from"
        },
        receipt.learning.decisions
    );
    out
}

pub(crate) fn render_learning(summary: &LearningSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Decisions recorded: {}", summary.decisions);
    let _ = writeln!(out, "Agreement with top pick: {:.0}%", summary.agreement_rate * 100.0);
    if let Some(rating) = summary.average_rating {
        let _ = writeln!(out, "Average rating: {rating:.1}");
    }
    let _ = writeln!(out, "Confidence: {:.2}", summary.confidence);
    let _ = writeln!(out, "Default weights:   {}", format_weights(&summary.default_weights));
    let _ = writeln!(out, "Learned weights:   {}", format_weights(&summary.learned_weights));
    let _ = writeln!(out, "Effective weights: {}", format_weights(&summary.effective_weights));

    if !summary.vendors.is_empty() {
        let _ = writeln!(out, "Vendors");
        for vendor in &summary.vendors {
            let rating = vendor
                .average_rating
                .map(|rating| format!(", avg rating {rating:.1}"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "- {}: {} selection(s), {:.0}%{}",
                vendor.vendor,
                vendor.selections,
                vendor.selection_rate * 100.0,
                rating
            );
        }
    }
    out
}
