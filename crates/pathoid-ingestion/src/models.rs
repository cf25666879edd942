//! Data models for the enrichment pipeline.

use serde::{Deserialize, Serialize};

/// One variant row as supplied by the loader, before normalisation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantInput {
    /// Zero-based data row in the source file (header excluded).
    pub row: usize,
    pub gene: String,
    pub function_type: String,
    /// Detailed annotation, possibly several `|`-separated transcripts.
    pub raw_annotation: String,
    /// All SNP ids for the row, e.g. "rs80357382".
    pub snp: String,
    pub chromosome: String,
    pub position: String,
}

/// Phase-2 result for one ClinVar record.
///
/// `None` means the field's element path was absent from the summary,
/// which is distinct from an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSummary {
    pub clinical_significance: Option<String>,
    pub conditions: Option<Vec<String>>,
}

/// ClinVar identifier → summary, iterated in the order the service returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryMap {
    entries: Vec<(String, RecordSummary)>,
}

impl SummaryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a summary; a repeated identifier replaces the earlier entry in place.
    pub fn insert(&mut self, uid: String, summary: RecordSummary) {
        match self.entries.iter_mut().find(|(id, _)| *id == uid) {
            Some((_, existing)) => *existing = summary,
            None => self.entries.push((uid, summary)),
        }
    }

    pub fn get(&self, uid: &str) -> Option<&RecordSummary> {
        self.entries.iter().find(|(id, _)| id == uid).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RecordSummary)> {
        self.entries.iter().map(|(id, s)| (id.as_str(), s))
    }

    pub fn values(&self) -> impl Iterator<Item = &RecordSummary> {
        self.entries.iter().map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where a record is in the search lifecycle.
///
/// ```text
/// NotSearchable
/// Unsearched ──esearch──▶ IdentifiersFound ──esummary──▶ SummariesFound
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchState {
    /// Gene filtering removed every annotation token.
    NotSearchable,
    Unsearched,
    /// Phase 1 ran; an empty list means "searched, no hits".
    IdentifiersFound { identifiers: Vec<String> },
    SummariesFound {
        identifiers: Vec<String>,
        summaries: SummaryMap,
    },
}

/// A loaded variant plus its normalised tokens and search state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub variant: VariantInput,
    annotation_tokens: Vec<String>,
    state: SearchState,
}

impl VariantRecord {
    /// Builds a record from already-normalised tokens. No tokens means the
    /// record is not searchable.
    pub fn new(variant: VariantInput, annotation_tokens: Vec<String>) -> Self {
        let state = if annotation_tokens.is_empty() {
            SearchState::NotSearchable
        } else {
            SearchState::Unsearched
        };
        Self { variant, annotation_tokens, state }
    }

    pub fn annotation_tokens(&self) -> &[String] {
        &self.annotation_tokens
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn is_searchable(&self) -> bool {
        !matches!(self.state, SearchState::NotSearchable)
    }

    /// Phase-1 identifiers, `None` until the record has been searched.
    pub fn identifiers(&self) -> Option<&[String]> {
        match &self.state {
            SearchState::IdentifiersFound { identifiers }
            | SearchState::SummariesFound { identifiers, .. } => Some(identifiers),
            _ => None,
        }
    }

    /// Phase-2 summaries, `None` until they have been fetched.
    pub fn summaries(&self) -> Option<&SummaryMap> {
        match &self.state {
            SearchState::SummariesFound { summaries, .. } => Some(summaries),
            _ => None,
        }
    }

    /// Stores phase-1 identifiers. Only an `Unsearched` record accepts them;
    /// returns whether the transition happened.
    pub(crate) fn record_identifiers(&mut self, identifiers: Vec<String>) -> bool {
        if self.state != SearchState::Unsearched {
            return false;
        }
        self.state = SearchState::IdentifiersFound { identifiers };
        true
    }

    /// Stores phase-2 summaries. Only a record holding a non-empty identifier
    /// list accepts them; returns whether the transition happened.
    pub(crate) fn record_summaries(&mut self, summaries: SummaryMap) -> bool {
        let identifiers = match &mut self.state {
            SearchState::IdentifiersFound { identifiers } if !identifiers.is_empty() => {
                std::mem::take(identifiers)
            }
            _ => return false,
        };
        self.state = SearchState::SummariesFound { identifiers, summaries };
        true
    }
}
