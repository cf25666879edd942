//! Variant annotation normalisation.
//!
//! Rewrites free-text annotation strings such as
//! `BRCA1:NM_007294:exon10:c.A123G:p.K41R` into the transcript + coding-change
//! form ClinVar understands (`NM_007294.10:c.123A>G`).
//!
//! Normalisation is an ordered pipeline of total steps. Each step looks for
//! its pattern and is skipped when it is absent, so unparsable input comes
//! back as the longest recoverable substring instead of an error:
//!
//! 1. `:exon` → `.`
//! 2. a parenthesised group replaces the whole string
//! 3. otherwise, everything before the first `NM` is dropped
//! 4. everything from `:p` onward is dropped
//! 5. `:c.C123A` → `:c.123C>A`
//!
//! # Example
//! ```
//! use pathoid_ingestion::normalise::AnnotationNormaliser;
//!
//! let norm = AnnotationNormaliser::new();
//! assert_eq!(norm.normalise("NM_000059.3:c.A123G"), "NM_000059.3:c.123A>G");
//! ```

use regex::Regex;
use tracing::debug;

use crate::models::{VariantInput, VariantRecord};

const EXON_MARKER: &str = ":exon";
const TRANSCRIPT_PREFIX: &str = "NM";
const PROTEIN_MARKER: &str = ":p";
const CODING_MARKER: &str = ":c.";

/// Separator between per-transcript annotations in one field.
pub const TOKEN_SEPARATOR: char = '|';

/// Restricts tokens to those mentioning one of a set of gene symbols.
///
/// Matching is a plain substring test against the raw, pre-normalisation
/// token. An empty filter keeps everything.
#[derive(Debug, Clone, Default)]
pub struct GeneFilter {
    genes: Vec<String>,
}

impl GeneFilter {
    pub fn new<I, S>(genes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            genes: genes
                .into_iter()
                .map(Into::into)
                .filter(|g: &String| !g.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn retains(&self, raw_token: &str) -> bool {
        self.is_empty() || self.genes.iter().any(|g| raw_token.contains(g.as_str()))
    }
}

pub struct AnnotationNormaliser {
    /// `<refBase><position><varBase>`, e.g. A123G, A-12G, G123+1A
    re_coding: Regex,
}

impl AnnotationNormaliser {
    pub fn new() -> Self {
        Self {
            re_coding: Regex::new(r"^([A-Za-z])([-*]?\d+(?:[+-]\d+)?)([A-Za-z])$")
                .expect("coding-change pattern is valid"),
        }
    }

    /// Normalise a single annotation token.
    pub fn normalise(&self, raw: &str) -> String {
        let mut s = replace_exon(raw).unwrap_or_else(|| raw.to_string());

        s = match parenthesised_group(&s) {
            Some(inner) => inner,
            None => strip_before_transcript(&s).unwrap_or(s),
        };

        if let Some(truncated) = truncate_protein_change(&s) {
            s = truncated;
        }
        if let Some(rewritten) = self.rewrite_coding_change(&s) {
            s = rewritten;
        }
        s
    }

    /// Split a `|`-delimited annotation field and normalise each surviving
    /// token, preserving order.
    pub fn normalise_all(&self, raw_annotation: &str, filter: &GeneFilter) -> Vec<String> {
        raw_annotation
            .split(TOKEN_SEPARATOR)
            .filter(|token| filter.retains(token))
            .map(|token| self.normalise(token))
            .collect()
    }

    /// Turn a loaded row into a record ready for searching.
    pub fn prepare(&self, variant: VariantInput, filter: &GeneFilter) -> VariantRecord {
        let tokens = self.normalise_all(&variant.raw_annotation, filter);
        if tokens.is_empty() {
            debug!(row = variant.row, gene = %variant.gene, "No annotation survived gene filter; not searchable");
        }
        VariantRecord::new(variant, tokens)
    }

    pub fn prepare_all(&self, variants: Vec<VariantInput>, filter: &GeneFilter) -> Vec<VariantRecord> {
        variants.into_iter().map(|v| self.prepare(v, filter)).collect()
    }

    /// `:c.C123A` → `:c.123C>A`. Bodies that are not a single substitution
    /// (including ones already in canonical form) are left alone.
    fn rewrite_coding_change(&self, s: &str) -> Option<String> {
        let idx = s.find(CODING_MARKER)?;
        let (prefix, body) = s.split_at(idx + CODING_MARKER.len());
        let caps = self.re_coding.captures(body)?;
        let ref_base = caps.get(1)?.as_str();
        let position = caps.get(2)?.as_str();
        let var_base = caps.get(3)?.as_str();
        Some(format!("{prefix}{position}{ref_base}>{var_base}"))
    }
}

impl Default for AnnotationNormaliser {
    fn default() -> Self { Self::new() }
}

fn replace_exon(s: &str) -> Option<String> {
    s.contains(EXON_MARKER).then(|| s.replace(EXON_MARKER, "."))
}

/// Content between the first `(` and the first `)` after it.
fn parenthesised_group(s: &str) -> Option<String> {
    let open = s.find('(')?;
    let rest = &s[open + 1..];
    let close = rest.find(')')?;
    Some(rest[..close].to_string())
}

fn strip_before_transcript(s: &str) -> Option<String> {
    match s.find(TRANSCRIPT_PREFIX) {
        Some(0) | None => None,
        Some(idx) => Some(s[idx..].to_string()),
    }
}

fn truncate_protein_change(s: &str) -> Option<String> {
    s.find(PROTEIN_MARKER).map(|idx| s[..idx].to_string())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
