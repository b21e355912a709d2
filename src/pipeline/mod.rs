//! The document analysis pipeline.
//!
//! Module order follows the data flow: preprocess → model → analyzer →
//! confidence → rules → schema → review, with the verifier running as an
//! independent sibling of the analyzer and the processor orchestrating a
//! request end to end.

pub mod analyzer;
pub mod confidence;
pub mod model;
pub mod preprocess;
pub mod processor;
pub mod response;
pub mod review;
pub mod rules;
pub mod schema;
pub mod verifier;

pub use processor::{AnalyzeRequest, DocumentProcessor};
pub use response::AnalysisResponse;
