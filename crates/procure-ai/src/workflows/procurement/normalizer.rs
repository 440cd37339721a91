use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{Availability, Candidate, CandidateId, RawProductRecord};
use super::units::to_litres;

const DEFAULT_LEAD_TIME_DAYS: u32 = 7;

/// Why a raw record never became a candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DropReason {
    MissingVendor,
    MissingName,
    MissingSku,
    UnparseablePrice { raw: String },
    NonPositivePrice { price: f64 },
    CurrencyMismatch { expected: String, found: String },
    DuplicateOffer { candidate: CandidateId },
}

impl DropReason {
    pub fn summary(&self) -> String {
        match self {
            DropReason::MissingVendor => "vendor missing".to_string(),
            DropReason::MissingName => "product name missing".to_string(),
            DropReason::MissingSku => "sku missing".to_string(),
            DropReason::UnparseablePrice { raw } => format!("price '{raw}' could not be parsed"),
            DropReason::NonPositivePrice { price } => {
                format!("price {price:.2} is not positive")
            }
            DropReason::CurrencyMismatch { expected, found } => {
                format!("quoted in {found}, request expects {expected}")
            }
            DropReason::DuplicateOffer { candidate } => {
                format!("duplicate of {candidate}")
            }
        }
    }
}

/// A record rejected during normalization, kept for the outcome report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRecord {
    pub source: String,
    pub vendor: String,
    pub name: String,
    pub reason: DropReason,
}

impl DroppedRecord {
    pub(crate) fn new(record: &RawProductRecord, reason: DropReason) -> Self {
        Self {
            source: record.source.clone(),
            vendor: record.vendor.clone(),
            name: record.name.clone(),
            reason,
        }
    }
}

pub(crate) fn normalize_record(
    record: &RawProductRecord,
    line_item: &str,
    expected_currency: &str,
) -> Result<Candidate, DropReason> {
    let vendor = collapse_whitespace(&record.vendor);
    if vendor.is_empty() {
        return Err(DropReason::MissingVendor);
    }
    let name = collapse_whitespace(&record.name);
    if name.is_empty() {
        return Err(DropReason::MissingName);
    }
    let sku = record.sku.trim();
    if sku.is_empty() {
        return Err(DropReason::MissingSku);
    }

    let price = parse_price(&record.price).ok_or_else(|| DropReason::UnparseablePrice {
        raw: record.price.clone(),
    })?;
    if price <= 0.0 {
        return Err(DropReason::NonPositivePrice { price });
    }

    let currency = match record.currency.as_deref().map(str::trim) {
        Some(found) if !found.is_empty() => {
            if !found.eq_ignore_ascii_case(expected_currency.trim()) {
                return Err(DropReason::CurrencyMismatch {
                    expected: expected_currency.trim().to_ascii_uppercase(),
                    found: found.to_ascii_uppercase(),
                });
            }
            found.to_ascii_uppercase()
        }
        _ => expected_currency.trim().to_ascii_uppercase(),
    };

    let availability = Availability {
        in_stock: record.stock.is_some_and(|stock| stock > 0),
        lead_time_days: record.eta_days.unwrap_or(DEFAULT_LEAD_TIME_DAYS),
    };

    let pack_volume_litres = match (record.pack_size, record.unit.as_deref()) {
        (Some(size), Some(unit)) => to_litres(size, unit),
        _ => None,
    };

    Ok(Candidate {
        id: CandidateId::from_parts(&vendor, sku),
        sku: sku.to_string(),
        vendor,
        name,
        description: record.spec_text.trim().to_string(),
        price,
        currency,
        attributes: parse_spec_text(&record.spec_text),
        availability,
        evidence: record
            .evidence
            .filter(|score| score.is_finite())
            .map(|score| score.clamp(0.0, 1.0)),
        source: record.source.clone(),
        line_item: line_item.to_string(),
        pack_volume_litres,
    })
}

/// Parse free-form price text such as `"€ 1.234,50"`, `"EUR 89.50"` or `"1,299"`.
pub(crate) fn parse_price(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let negative = trimmed.starts_with('-');
    let kept: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_dot = kept.rfind('.');
    let last_comma = kept.rfind(',');
    let canonical = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => kept.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => kept.replace(',', ""),
        (None, Some(_)) => single_separator(&kept, ','),
        (Some(_), None) => single_separator(&kept, '.'),
        (None, None) => kept,
    };

    let value = canonical.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

// One separator with at most two trailing digits is a decimal point; anything else groups thousands.
fn single_separator(value: &str, separator: char) -> String {
    let occurrences = value.matches(separator).count();
    let trailing = value
        .rsplit(separator)
        .next()
        .map(str::len)
        .unwrap_or_default();
    if occurrences == 1 && trailing <= 2 {
        value.replace(separator, ".")
    } else {
        value.replace(separator, "")
    }
}

/// Split specification text into attributes. `key: value` (or `key=value`) segments keep
/// their value; bare feature phrases such as `sterile filtered` map to `"yes"`.
pub(crate) fn parse_spec_text(text: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    for segment in text.split([';', ',', '\n']) {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        match segment.split_once([':', '=']) {
            Some((key, value)) if !key.trim().is_empty() => {
                attributes.insert(normalize_key(key), value.trim().to_string());
            }
            _ => {
                attributes.insert(normalize_key(segment), "yes".to_string());
            }
        }
    }
    attributes
}

/// Key used to deduplicate offers across queries and sources.
pub(crate) fn dedupe_key(vendor: &str, name: &str) -> (String, String) {
    (normalize_name(vendor), normalize_name(name))
}

pub(crate) fn normalize_name(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    collapse_whitespace(&cleaned).to_lowercase()
}

pub(crate) fn normalize_key(value: &str) -> String {
    normalize_name(value)
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(price: &str) -> RawProductRecord {
        RawProductRecord {
            sku: "PBS-1L".to_string(),
            vendor: "Lonza".to_string(),
            name: "Phosphate Buffered Saline (PBS)".to_string(),
            spec_text: "Concentration: 1X; pH: 7.4; sterile filtered".to_string(),
            unit: Some("L".to_string()),
            pack_size: Some(1.0),
            price: price.to_string(),
            currency: Some("eur".to_string()),
            stock: Some(80),
            eta_days: Some(2),
            evidence: None,
            source: "catalog".to_string(),
        }
    }

    #[test]
    fn parse_price_handles_separators_and_symbols() {
        assert_eq!(parse_price("EUR 89.50"), Some(89.5));
        assert_eq!(parse_price("€ 1.234,50"), Some(1234.5));
        assert_eq!(parse_price("1,234.50 EUR"), Some(1234.5));
        assert_eq!(parse_price("89,5 €"), Some(89.5));
        assert_eq!(parse_price("1,299"), Some(1299.0));
        assert_eq!(parse_price("1.299.000"), Some(1_299_000.0));
        assert_eq!(parse_price("-5"), Some(-5.0));
        assert_eq!(parse_price("on request"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn parse_spec_text_keeps_values_and_flags() {
        let attributes = parse_spec_text("Concentration: 1X; pH=7.4, Sterile  Filtered");
        assert_eq!(attributes.get("concentration").map(String::as_str), Some("1X"));
        assert_eq!(attributes.get("ph").map(String::as_str), Some("7.4"));
        assert_eq!(
            attributes.get("sterile filtered").map(String::as_str),
            Some("yes")
        );
        assert!(parse_spec_text("   ").is_empty());
    }

    #[test]
    fn normalize_record_builds_candidate() {
        let candidate =
            normalize_record(&record("EUR 28.00"), "pbs buffer", "EUR").expect("valid record");
        assert_eq!(candidate.id, CandidateId("lonza:PBS-1L".to_string()));
        assert_eq!(candidate.price, 28.0);
        assert_eq!(candidate.currency, "EUR");
        assert!(candidate.availability.in_stock);
        assert_eq!(candidate.availability.lead_time_days, 2);
        assert_eq!(candidate.pack_volume_litres, Some(1.0));
        assert_eq!(candidate.line_item, "pbs buffer");
        assert_eq!(candidate.attributes.len(), 3);
    }

    #[test]
    fn normalize_record_reports_drop_reasons() {
        match normalize_record(&record("call us"), "pbs", "EUR") {
            Err(DropReason::UnparseablePrice { raw }) => assert_eq!(raw, "call us"),
            other => panic!("expected unparseable price, got {other:?}"),
        }

        assert_eq!(
            normalize_record(&record("0"), "pbs", "EUR"),
            Err(DropReason::NonPositivePrice { price: 0.0 })
        );

        let mut dollars = record("28");
        dollars.currency = Some("USD".to_string());
        assert!(matches!(
            normalize_record(&dollars, "pbs", "EUR"),
            Err(DropReason::CurrencyMismatch { .. })
        ));

        let mut anonymous = record("28");
        anonymous.vendor = "  ".to_string();
        assert_eq!(
            normalize_record(&anonymous, "pbs", "EUR"),
            Err(DropReason::MissingVendor)
        );
    }

    #[test]
    fn unknown_stock_is_treated_as_unavailable() {
        let mut unknown = record("28");
        unknown.stock = None;
        unknown.eta_days = None;
        let candidate = normalize_record(&unknown, "pbs", "EUR").expect("valid record");
        assert!(!candidate.availability.in_stock);
        assert_eq!(candidate.availability.lead_time_days, DEFAULT_LEAD_TIME_DAYS);
    }
}
