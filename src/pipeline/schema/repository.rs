//! Schema persistence seam.
//!
//! The store is an external collaborator; the pipeline only needs an
//! append-only version chain with atomic publish. `InMemorySchemaRepository`
//! backs tests and single-process deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::types::{GeneratedSchema, SemanticVersion};
use super::SchemaError;

/// Metadata row returned by [`SchemaRepository::list`].
#[derive(Debug, Clone)]
pub struct SchemaMetadata {
    pub id: Uuid,
    pub name: String,
    pub latest_version: SemanticVersion,
    pub version_count: usize,
}

/// Append-only schema store. Versions are published whole; a reader never
/// observes a partially written schema.
pub trait SchemaRepository: Send + Sync {
    /// Append a new version. Fails with [`SchemaError::VersionConflict`] if
    /// that version already exists for the schema id.
    fn save(&self, schema: &GeneratedSchema) -> Result<(), SchemaError>;

    /// Load a specific version, or the latest when `version` is `None`.
    fn load(&self, id: Uuid, version: Option<SemanticVersion>) -> Option<GeneratedSchema>;

    fn list(&self) -> Vec<SchemaMetadata>;
}

/// In-memory repository: a version chain per schema id behind one mutex.
#[derive(Default)]
pub struct InMemorySchemaRepository {
    chains: Mutex<HashMap<Uuid, Vec<GeneratedSchema>>>,
}

impl InMemorySchemaRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemaRepository for InMemorySchemaRepository {
    fn save(&self, schema: &GeneratedSchema) -> Result<(), SchemaError> {
        let mut chains = self.chains.lock().map_err(|_| SchemaError::StorePoisoned)?;
        let chain = chains.entry(schema.id).or_default();
        if chain.iter().any(|existing| existing.version == schema.version) {
            return Err(SchemaError::VersionConflict {
                schema_id: schema.id,
                version: schema.version,
            });
        }
        if let Some(latest) = chain.last() {
            if schema.version < latest.version {
                return Err(SchemaError::VersionConflict {
                    schema_id: schema.id,
                    version: schema.version,
                });
            }
        }
        chain.push(schema.clone());
        Ok(())
    }

    fn load(&self, id: Uuid, version: Option<SemanticVersion>) -> Option<GeneratedSchema> {
        let chains = self.chains.lock().ok()?;
        let chain = chains.get(&id)?;
        match version {
            Some(v) => chain.iter().find(|s| s.version == v).cloned(),
            None => chain.last().cloned(),
        }
    }

    fn list(&self) -> Vec<SchemaMetadata> {
        let chains = match self.chains.lock() {
            Ok(chains) => chains,
            Err(_) => return Vec::new(),
        };
        chains
            .values()
            .filter_map(|chain| {
                let latest = chain.last()?;
                Some(SchemaMetadata {
                    id: latest.id,
                    name: latest.name.clone(),
                    latest_version: latest.version,
                    version_count: chain.len(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::schema::types::{GenerationMethod, UserReviewStatus};
    use chrono::Utc;

    fn schema(id: Uuid, version: SemanticVersion) -> GeneratedSchema {
        GeneratedSchema {
            id,
            name: "invoice".into(),
            description: String::new(),
            version,
            fields: vec![],
            generation_method: GenerationMethod::AiGenerated,
            generation_confidence: 0.9,
            source_document_id: Uuid::new_v4(),
            analysis_result_id: Uuid::new_v4(),
            user_review_status: UserReviewStatus::Pending,
            generator_version: crate::config::APP_VERSION.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn save_then_load_latest() {
        let repo = InMemorySchemaRepository::new();
        let id = Uuid::new_v4();
        repo.save(&schema(id, SemanticVersion::INITIAL)).unwrap();
        repo.save(&schema(id, SemanticVersion::INITIAL.bump_minor()))
            .unwrap();

        let latest = repo.load(id, None).unwrap();
        assert_eq!(latest.version.to_string(), "1.1.0");
        let pinned = repo.load(id, Some(SemanticVersion::INITIAL)).unwrap();
        assert_eq!(pinned.version.to_string(), "1.0.0");
    }

    #[test]
    fn duplicate_version_is_a_conflict() {
        let repo = InMemorySchemaRepository::new();
        let id = Uuid::new_v4();
        repo.save(&schema(id, SemanticVersion::INITIAL)).unwrap();
        let err = repo.save(&schema(id, SemanticVersion::INITIAL)).unwrap_err();
        assert!(matches!(err, SchemaError::VersionConflict { .. }));
    }

    #[test]
    fn downgrade_append_is_a_conflict() {
        let repo = InMemorySchemaRepository::new();
        let id = Uuid::new_v4();
        repo.save(&schema(id, SemanticVersion::INITIAL.bump_major()))
            .unwrap();
        let err = repo.save(&schema(id, SemanticVersion::INITIAL)).unwrap_err();
        assert!(matches!(err, SchemaError::VersionConflict { .. }));
    }

    #[test]
    fn list_reports_version_counts() {
        let repo = InMemorySchemaRepository::new();
        let id = Uuid::new_v4();
        repo.save(&schema(id, SemanticVersion::INITIAL)).unwrap();
        repo.save(&schema(id, SemanticVersion::INITIAL.bump_minor()))
            .unwrap();
        let listing = repo.list();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].version_count, 2);
    }

    #[test]
    fn missing_schema_loads_none() {
        let repo = InMemorySchemaRepository::new();
        assert!(repo.load(Uuid::new_v4(), None).is_none());
    }
}
