//! Template-free extraction-schema generation from scanned documents.
//!
//! Raw bytes go in; a versioned, confidence-scored extraction schema and an
//! authenticity report come out. Analysis runs against local vision models
//! through a fallback router, with no predefined document templates.

pub mod config;
pub mod pipeline;

pub use config::PipelineConfig;
pub use pipeline::{AnalysisResponse, AnalyzeRequest, DocumentProcessor};

use tracing_subscriber::EnvFilter;

/// Initialize structured logging. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
