//! ClinVar query construction.
//!
//! Phase 1 (esearch) looks up ClinVar record identifiers for a variant;
//! phase 2 (esummary) fetches the summaries for every identifier in one batch.
//! Builders are pure: they read record state and never touch the network.

use serde::{Deserialize, Serialize};

use crate::models::VariantRecord;

pub const CLINVAR_DB: &str = "clinvar";

/// Cap on identifiers returned by one esearch call.
pub const DEFAULT_RETMAX: usize = 500;

/// How the phase-1 search term is derived from a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPolicy {
    /// `(<chr>[chr]) AND (<pos>[chrpos37])`. Ignores the normalised tokens.
    #[default]
    Positional,
    /// `(<token>) OR (<token>) ...`, plus the SNP id when it carries a number.
    AnnotationTokens,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ESearch,
    ESummary,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::ESearch  => "esearch.fcgi",
            Endpoint::ESummary => "esummary.fcgi",
        }
    }
}

/// One request to the lookup service: an endpoint plus unencoded parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDescriptor {
    pub endpoint: Endpoint,
    pub params: Vec<(&'static str, String)>,
}

impl QueryDescriptor {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Phase-2 builder result. `Skip` is not an error: the record simply has
/// nothing to summarise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryQuery {
    Fetch(QueryDescriptor),
    Skip,
}

#[derive(Debug, Clone)]
pub struct QueryBuilder {
    policy: QueryPolicy,
    retmax: usize,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(QueryPolicy::default(), DEFAULT_RETMAX)
    }
}

impl QueryBuilder {
    pub fn new(policy: QueryPolicy, retmax: usize) -> Self {
        Self { policy, retmax }
    }

    pub fn policy(&self) -> QueryPolicy {
        self.policy
    }

    /// esearch descriptor for phase 1.
    pub fn identifier_query(&self, record: &VariantRecord) -> QueryDescriptor {
        let term = match self.policy {
            QueryPolicy::Positional       => positional_term(record),
            QueryPolicy::AnnotationTokens => annotation_term(record),
        };
        QueryDescriptor {
            endpoint: Endpoint::ESearch,
            params: vec![
                ("db", CLINVAR_DB.to_string()),
                ("term", term),
                ("retmax", self.retmax.to_string()),
            ],
        }
    }

    /// esummary descriptor for phase 2, or `Skip` when the record has no
    /// identifiers (absent or empty).
    pub fn summary_query(&self, record: &VariantRecord) -> SummaryQuery {
        match record.identifiers() {
            Some(ids) if !ids.is_empty() => SummaryQuery::Fetch(QueryDescriptor {
                endpoint: Endpoint::ESummary,
                params: vec![
                    ("db", CLINVAR_DB.to_string()),
                    ("id", ids.join(",")),
                ],
            }),
            _ => SummaryQuery::Skip,
        }
    }
}

fn conjunction(terms: &[String], op: &str) -> String {
    terms
        .iter()
        .map(|t| format!("({t})"))
        .collect::<Vec<_>>()
        .join(&format!(" {op} "))
}

fn positional_term(record: &VariantRecord) -> String {
    let v = &record.variant;
    conjunction(
        &[format!("{}[chr]", v.chromosome), format!("{}[chrpos37]", v.position)],
        "AND",
    )
}

fn annotation_term(record: &VariantRecord) -> String {
    let mut terms: Vec<String> = record
        .annotation_tokens()
        .iter()
        .filter(|t| !t.is_empty())
        .cloned()
        .collect();
    let snp = record.variant.snp.trim();
    if snp.chars().any(|c| c.is_ascii_digit()) {
        terms.push(snp.to_string());
    }
    conjunction(&terms, "OR")
}
