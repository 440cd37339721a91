use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a normalized offer, derived from vendor and SKU.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub String);

impl CandidateId {
    pub fn from_parts(vendor: &str, sku: &str) -> Self {
        let vendor = vendor
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_ascii_lowercase();
        Self(format!("{vendor}:{}", sku.trim()))
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned to each pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Offer exactly as a search collaborator returned it. Prices stay textual until normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProductRecord {
    pub sku: String,
    pub vendor: String,
    pub name: String,
    #[serde(default)]
    pub spec_text: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub pack_size: Option<f64>,
    pub price: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub stock: Option<i64>,
    #[serde(default)]
    pub eta_days: Option<u32>,
    #[serde(default)]
    pub evidence: Option<f64>,
    pub source: String,
}

/// Stock position of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub in_stock: bool,
    pub lead_time_days: u32,
}

/// Normalized, read-only product offer evaluated by the rules and scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub sku: String,
    pub vendor: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub currency: String,
    pub attributes: BTreeMap<String, String>,
    pub availability: Availability,
    pub evidence: Option<f64>,
    pub source: String,
    pub line_item: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pack_volume_litres: Option<f64>,
}

impl Candidate {
    /// Search terms used for literature lookups.
    pub fn evidence_terms(&self) -> Vec<String> {
        format!("{} {}", self.name, self.description)
            .split(|c: char| !c.is_alphanumeric())
            .filter(|term| term.len() > 1)
            .map(str::to_ascii_lowercase)
            .collect()
    }
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_deadline_days() -> u32 {
    14
}

/// Inbound procurement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcurementRequest {
    pub query: String,
    /// Maximum acceptable unit price per candidate.
    pub budget: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_deadline_days")]
    pub deadline_days: u32,
    #[serde(default)]
    pub preferred_vendors: Vec<String>,
    #[serde(default)]
    pub required_attributes: Vec<String>,
    #[serde(default)]
    pub line_items: Vec<String>,
}

impl ProcurementRequest {
    pub fn new(query: impl Into<String>, budget: f64) -> Self {
        Self {
            query: query.into(),
            budget,
            currency: default_currency(),
            deadline_days: default_deadline_days(),
            preferred_vendors: Vec::new(),
            required_attributes: Vec::new(),
            line_items: Vec::new(),
        }
    }

    /// Line items to quote; a request without explicit items quotes its query.
    pub fn requested_line_items(&self) -> Vec<String> {
        let items: Vec<String> = self
            .line_items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();

        if items.is_empty() {
            vec![self.query.trim().to_string()]
        } else {
            items
        }
    }

    pub fn budget_is_valid(&self) -> bool {
        self.budget.is_finite() && self.budget > 0.0
    }
}
