//! Schema synthesis, versioning, and persistence seam.

pub mod repository;
pub mod synthesizer;
pub mod types;

pub use repository::{InMemorySchemaRepository, SchemaMetadata, SchemaRepository};
pub use synthesizer::SchemaSynthesizer;
pub use types::{
    GeneratedSchema, GenerationMethod, SchemaField, SemanticVersion, UserReviewStatus,
};

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SchemaError {
    /// Concurrent edits targeted the same base version. Never auto-merged;
    /// the caller resolves manually.
    #[error("version {version} already exists for schema {schema_id}")]
    VersionConflict {
        schema_id: Uuid,
        version: SemanticVersion,
    },

    #[error("schema store lock poisoned")]
    StorePoisoned,
}
