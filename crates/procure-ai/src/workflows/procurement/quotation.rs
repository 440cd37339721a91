use serde::Serialize;

use super::domain::{Candidate, CandidateId};
use super::scoring::ScoreBreakdown;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotationLine {
    pub line_item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<CandidateId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
}

/// Best-ranked offer for each requested line item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quotation {
    pub currency: String,
    pub lines: Vec<QuotationLine>,
    pub total: f64,
    pub matched: usize,
    pub requested: usize,
}

impl Quotation {
    pub fn build(
        line_items: &[String],
        ranking: &[ScoreBreakdown],
        candidates: &[Candidate],
        currency: &str,
    ) -> Self {
        let lines: Vec<QuotationLine> = line_items
            .iter()
            .map(|line_item| {
                let chosen = ranking.iter().find_map(|breakdown| {
                    candidates.iter().find(|candidate| {
                        candidate.id == breakdown.candidate && candidate.line_item == *line_item
                    })
                });
                match chosen {
                    Some(candidate) => QuotationLine {
                        line_item: line_item.clone(),
                        candidate: Some(candidate.id.clone()),
                        vendor: Some(candidate.vendor.clone()),
                        product: Some(candidate.name.clone()),
                        unit_price: Some(candidate.price),
                    },
                    None => QuotationLine {
                        line_item: line_item.clone(),
                        candidate: None,
                        vendor: None,
                        product: None,
                        unit_price: None,
                    },
                }
            })
            .collect();

        let matched = lines.iter().filter(|line| line.candidate.is_some()).count();
        let total = lines.iter().filter_map(|line| line.unit_price).sum();

        Self {
            currency: currency.to_string(),
            requested: lines.len(),
            matched,
            total,
            lines,
        }
    }
}
