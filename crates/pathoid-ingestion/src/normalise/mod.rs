//! Annotation normalisation.
//!
//! `AnnotationNormaliser` rewrites raw annotation tokens into canonical
//! `transcript:c.<pos><ref>><alt>` form; `GeneFilter` optionally restricts
//! which tokens of a multi-gene annotation are kept.

pub mod annotation;

pub use annotation::{AnnotationNormaliser, GeneFilter, TOKEN_SEPARATOR};
