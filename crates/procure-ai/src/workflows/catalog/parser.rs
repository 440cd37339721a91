use serde::{Deserialize, Deserializer};
use std::io::Read;

use crate::workflows::procurement::RawProductRecord;

pub(crate) fn parse_records<R: Read>(
    reader: R,
    source: &str,
) -> Result<Vec<RawProductRecord>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for row in csv_reader.deserialize::<CatalogRow>() {
        records.push(row?.into_record(source));
    }

    Ok(records)
}

/// One supplier offer. Prices stay textual so normalization can report what it rejected.
#[derive(Debug, Deserialize)]
struct CatalogRow {
    sku: String,
    vendor: String,
    name: String,
    #[serde(default)]
    spec_text: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    unit: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pack_size: Option<String>,
    price: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    currency: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    stock: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    eta_days: Option<String>,
}

impl CatalogRow {
    fn into_record(self, source: &str) -> RawProductRecord {
        RawProductRecord {
            sku: self.sku,
            vendor: self.vendor,
            name: self.name,
            spec_text: self.spec_text,
            unit: self.unit,
            pack_size: self.pack_size.and_then(|value| value.parse().ok()),
            price: self.price,
            currency: self.currency,
            stock: self.stock.and_then(|value| value.parse().ok()),
            eta_days: self.eta_days.and_then(|value| value.parse().ok()),
            evidence: None,
            source: source.to_string(),
        }
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
