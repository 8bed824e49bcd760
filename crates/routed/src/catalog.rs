//! Skill catalog: YAML discovery and import into storage.
//!
//! Each `*.yaml` / `*.yml` file in the catalog directory holds one skill
//! definition or a list of them. Files are read in sorted order; duplicate
//! keys keep the first definition seen.

use crate::embeddings::HashEmbedder;
use crate::storage::{Storage, StorageError};
use route_core::semantic::skill_embedding_text;
use route_core::skills::{parse_catalog_yaml, validate_definition, SkillDefinition, SkillError};
use route_core::Skill;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of catalog discovery with potential errors.
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    /// Valid, deduplicated definitions in file order.
    pub definitions: Vec<SkillDefinition>,
    /// Parse/validation errors encountered.
    pub errors: Vec<DiscoveryError>,
}

/// Parse/validation error for one catalog file or definition.
#[derive(Debug)]
pub struct DiscoveryError {
    pub path: PathBuf,
    /// Skill key, when the file parsed far enough to have one.
    pub key: Option<String>,
    pub error: SkillError,
}

/// Counts from one import pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Discover skill definitions in a catalog directory.
pub fn discover_definitions(dir: &Path, sequence_category: &str) -> DiscoveryResult {
    let mut result = DiscoveryResult::default();

    if !dir.is_dir() {
        debug!(path = %dir.display(), "catalog directory not found, skipping");
        return result;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "failed to read catalog directory");
            return result;
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml") | Some("yml")
                )
        })
        .collect();
    files.sort();

    let mut seen_keys: HashSet<String> = HashSet::new();
    for path in files {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read catalog file");
                result.errors.push(DiscoveryError {
                    path,
                    key: None,
                    error: SkillError::InvalidYaml(format!("IO error: {e}")),
                });
                continue;
            }
        };

        let definitions = match parse_catalog_yaml(&content) {
            Ok(defs) => defs,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse catalog file");
                result.errors.push(DiscoveryError {
                    path,
                    key: None,
                    error: e,
                });
                continue;
            }
        };

        for def in definitions {
            if let Err(e) = validate_definition(&def, sequence_category) {
                warn!(path = %path.display(), key = %def.key, error = %e, "invalid skill definition");
                result.errors.push(DiscoveryError {
                    path: path.clone(),
                    key: Some(def.key),
                    error: e,
                });
                continue;
            }
            if !seen_keys.insert(def.key.clone()) {
                debug!(key = %def.key, path = %path.display(), "duplicate skill key, skipping");
                continue;
            }
            result.definitions.push(def);
        }
    }

    debug!(
        count = result.definitions.len(),
        errors = result.errors.len(),
        "discovered skill definitions"
    );
    result
}

/// Upsert a definition and refresh its embedding.
///
/// An embedding failure is logged; the skill itself is still stored.
pub async fn store_definition(
    storage: &Storage,
    embedder: &HashEmbedder,
    def: &SkillDefinition,
) -> Result<Skill, StorageError> {
    let skill = storage.upsert_skill(def).await?;

    let text = skill_embedding_text(skill.display_name(), &skill.triggers, &skill.keywords);
    match embedder.embed_text(&text) {
        Ok(embedding) => storage.upsert_embedding(&skill.id, &embedding).await?,
        Err(e) => warn!(key = %skill.key, error = %e, "failed to embed skill"),
    }

    Ok(skill)
}

/// Import every definition in `dir`, skipping those whose content hash is unchanged.
pub async fn import_catalog(
    storage: &Storage,
    embedder: &HashEmbedder,
    dir: &Path,
    sequence_category: &str,
) -> ImportSummary {
    let discovery = discover_definitions(dir, sequence_category);
    let mut summary = ImportSummary {
        failed: discovery.errors.len(),
        ..Default::default()
    };

    for def in &discovery.definitions {
        match storage.skill_content_hash(&def.key).await {
            Ok(Some(hash)) if hash == def.content_hash() => {
                summary.unchanged += 1;
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(key = %def.key, error = %e, "failed to read stored skill hash");
            }
        }

        match store_definition(storage, embedder, def).await {
            Ok(_) => summary.imported += 1,
            Err(e) => {
                warn!(key = %def.key, error = %e, "failed to import skill");
                summary.failed += 1;
            }
        }
    }

    info!(
        path = %dir.display(),
        imported = summary.imported,
        unchanged = summary.unchanged,
        failed = summary.failed,
        "catalog import finished"
    );
    summary
}
