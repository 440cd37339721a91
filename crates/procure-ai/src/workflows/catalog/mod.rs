//! CSV-backed supplier catalog usable as a search collaborator.

mod parser;

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::workflows::procurement::{CollaboratorError, RawProductRecord, SearchCollaborator};

const BUNDLED_CATALOG: &str = include_str!("../../../data/sample_suppliers.csv");

#[derive(Debug)]
pub enum CatalogError {
    Io(std::io::Error),
    Csv(csv::Error),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Io(err) => write!(f, "failed to read supplier catalog: {}", err),
            CatalogError::Csv(err) => write!(f, "invalid supplier catalog CSV: {}", err),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Io(err) => Some(err),
            CatalogError::Csv(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// In-memory supplier catalog searched by keyword overlap.
#[derive(Debug, Clone)]
pub struct CatalogSearch {
    name: String,
    records: Vec<RawProductRecord>,
}

impl CatalogSearch {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let name = "catalog".to_string();
        let records = parser::parse_records(reader, &name)?;
        Ok(Self { name, records })
    }

    /// The sample supplier catalog shipped with the crate.
    pub fn bundled() -> Result<Self, CatalogError> {
        Ok(Self::from_reader(BUNDLED_CATALOG.as_bytes())?.with_name("sample-suppliers"))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        for record in &mut self.records {
            record.source = self.name.clone();
        }
        self
    }

    pub fn records(&self) -> &[RawProductRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Number of query words found in the record's name and specification text.
fn relevance(record: &RawProductRecord, words: &[String]) -> usize {
    let text = format!("{} {}", record.name, record.spec_text).to_lowercase();
    words
        .iter()
        .filter(|word| text.contains(word.as_str()))
        .count()
}

impl SearchCollaborator for CatalogSearch {
    fn name(&self) -> &str {
        &self.name
    }

    fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<RawProductRecord>, CollaboratorError> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<(usize, &RawProductRecord)> = self
            .records
            .iter()
            .map(|record| (relevance(record, &words), record))
            .filter(|(score, _)| *score > 0)
            .collect();
        // Stable sort keeps catalog order among equally relevant rows.
        matches.sort_by(|left, right| right.0.cmp(&left.0));

        let results: Vec<RawProductRecord> = matches
            .into_iter()
            .take(max_results)
            .map(|(_, record)| record.clone())
            .collect();
        debug!(catalog = %self.name, query, count = results.len(), "catalog searched");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CATALOG: &str = "sku,vendor,name,spec_text,unit,pack_size,price,currency,stock,eta_days\n\
TAQ-001,ThermoFisher Scientific,Taq DNA Polymerase,\"High fidelity, 5 U/µL, for PCR amplification\",mL,1.0,89.50,EUR,25,3\n\
POL-300,Promega,GoTaq DNA Polymerase,\"Standard Taq for routine PCR, 5 U/µL\",mL,1.0,65.00,EUR,40,5\n\
PBS-1L,Lonza,Phosphate Buffered Saline (PBS),\"1X, pH 7.4, sterile filtered\",L,1.0,28.00,EUR,80,\n";

    #[test]
    fn parses_rows_into_raw_records() {
        let catalog = CatalogSearch::from_reader(Cursor::new(CATALOG)).expect("catalog parses");
        assert_eq!(catalog.len(), 3);

        let pbs = &catalog.records()[2];
        assert_eq!(pbs.sku, "PBS-1L");
        assert_eq!(pbs.price, "28.00");
        assert_eq!(pbs.pack_size, Some(1.0));
        assert_eq!(pbs.stock, Some(80));
        assert_eq!(pbs.eta_days, None);
        assert_eq!(pbs.source, "catalog");
    }

    #[test]
    fn search_ranks_by_keyword_overlap() {
        let catalog = CatalogSearch::from_reader(Cursor::new(CATALOG))
            .expect("catalog parses")
            .with_name("mock-suppliers");

        let results = catalog.search("taq polymerase pcr", 10).expect("search");
        let skus: Vec<&str> = results.iter().map(|record| record.sku.as_str()).collect();
        assert_eq!(skus, vec!["TAQ-001", "POL-300"]);
        assert!(results.iter().all(|record| record.source == "mock-suppliers"));

        assert_eq!(catalog.search("taq", 1).expect("search").len(), 1);
        assert!(catalog.search("centrifuge", 10).expect("search").is_empty());
        assert!(catalog.search("   ", 10).expect("search").is_empty());
    }

    #[test]
    fn bundled_catalog_parses_every_row() {
        let catalog = CatalogSearch::bundled().expect("bundled catalog parses");
        assert_eq!(catalog.len(), 15);
        assert_eq!(catalog.name(), "sample-suppliers");
        assert!(catalog
            .records()
            .iter()
            .all(|record| record.currency.as_deref() == Some("EUR")));
    }

    #[test]
    fn from_path_propagates_io_errors() {
        let error = CatalogSearch::from_path("./does-not-exist.csv").expect_err("expected io error");
        match error {
            CatalogError::Io(_) => {}
            other => panic!("expected io error, got {other:?}"),
        }
    }
}
