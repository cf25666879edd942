//! pathoid-ingestion: ClinVar enrichment pipeline.
//! - Variant loading from delimited files
//! - Annotation normalisation and gene filtering
//! - Two-phase (esearch → esummary) ClinVar lookup, rate limited
//! - Response aggregation
//! - Report rendering and output files

pub mod aggregate;
pub mod loader;
pub mod models;
pub mod normalise;
pub mod pipeline;
pub mod query;
pub mod rate_limit;
pub mod report;
pub mod sources;
