//! SQLite storage module for the router daemon.
//!
//! Persists the skill catalog, sequence links, skill embeddings and the
//! routing decision log. Also serves as the `SkillCatalog` and
//! `SimilarityIndex` the router consumes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use route_core::routing::{CatalogError, SkillCatalog};
use route_core::semantic::{cosine_similarity, IndexError, SimilarityIndex, SimilarityRow};
use route_core::skills::{validate_definition, SkillDefinition, SkillError, HITL_CATEGORY, SEQUENCE_CATEGORY};
use route_core::{DecisionRecord, Id, MatchCandidate, RoutingOutcome, Skill, TriggerSpec};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use thiserror::Error;

/// Explicit column list for skill queries, including the linked-skill count.
const SKILL_COLUMNS: &str = "s.id, s.key, s.name, s.description, s.category, s.is_active, \
    s.triggers_json, s.keywords_json, s.created_at, s.updated_at, \
    (SELECT COUNT(*) FROM sequence_links l WHERE l.sequence_id = s.id) AS linked_skill_count";

/// Catalog fetch order. Ties between equal confidences resolve in this order.
const SKILL_ORDER: &str = "ORDER BY s.created_at ASC, s.key ASC";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid skill definition: {0}")]
    InvalidDefinition(#[from] SkillError),
    #[error("skill not found: {0}")]
    SkillNotFound(String),
    #[error("not a sequence: {0}")]
    NotASequence(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage backend for the daemon.
#[derive(Debug)]
pub struct Storage {
    pool: Pool<Sqlite>,
    sequence_category: String,
    hitl_category: String,
}

impl Storage {
    /// Create a new storage instance with the given database path.
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            sequence_category: SEQUENCE_CATEGORY.to_string(),
            hitl_category: HITL_CATEGORY.to_string(),
        })
    }

    /// Override the category names that mark sequences and hitl skills.
    pub fn with_categories(mut self, sequence: &str, hitl: &str) -> Self {
        self.sequence_category = sequence.to_string();
        self.hitl_category = hitl.to_string();
        self
    }

    /// Run embedded migrations.
    pub async fn migrate_embedded(&self) -> Result<()> {
        let migrations = [include_str!("../../../migrations/0001_init.sql")];

        for migration_sql in migrations {
            // Remove comment lines before splitting.
            let cleaned: String = migration_sql
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n");

            for statement in cleaned.split(';') {
                let trimmed = statement.trim();
                if !trimmed.is_empty() {
                    if let Err(e) = sqlx::query(trimmed).execute(&self.pool).await {
                        let msg = e.to_string();
                        if !msg.contains("duplicate column") && !msg.contains("already exists") {
                            return Err(e.into());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // --- Skill operations ---

    /// Insert or update a skill from a definition. Keeps `id` and
    /// `created_at` of an existing skill with the same key.
    pub async fn upsert_skill(&self, def: &SkillDefinition) -> Result<Skill> {
        validate_definition(def, &self.sequence_category)?;

        let now = Utc::now().timestamp_millis();
        let triggers_json = serde_json::to_string(&def.triggers)?;
        let keywords_json = serde_json::to_string(&def.keywords)?;
        let content_hash = def.content_hash();

        let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM skills WHERE key = ?1")
            .bind(&def.key)
            .fetch_optional(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;
        let skill_id = match existing {
            Some((id,)) => {
                sqlx::query(
                    "UPDATE skills SET name = ?1, description = ?2, category = ?3, is_active = ?4, \
                     triggers_json = ?5, keywords_json = ?6, content_hash = ?7, updated_at = ?8 \
                     WHERE id = ?9",
                )
                .bind(&def.name)
                .bind(&def.description)
                .bind(&def.category)
                .bind(def.is_active)
                .bind(&triggers_json)
                .bind(&keywords_json)
                .bind(&content_hash)
                .bind(now)
                .bind(&id)
                .execute(&mut *tx)
                .await?;
                id
            }
            None => {
                let id = Id::new();
                sqlx::query(
                    r#"
                    INSERT INTO skills (id, key, name, description, category, is_active,
                                        triggers_json, keywords_json, content_hash, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    "#,
                )
                .bind(id.as_ref())
                .bind(&def.key)
                .bind(&def.name)
                .bind(&def.description)
                .bind(&def.category)
                .bind(def.is_active)
                .bind(&triggers_json)
                .bind(&keywords_json)
                .bind(&content_hash)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                id.0
            }
        };

        sqlx::query("DELETE FROM sequence_links WHERE sequence_id = ?1")
            .bind(&skill_id)
            .execute(&mut *tx)
            .await?;
        for (position, linked) in def.linked_skills.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO sequence_links (sequence_id, skill_key, position) VALUES (?1, ?2, ?3)",
            )
            .bind(&skill_id)
            .bind(linked)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        self.get_skill(&def.key).await
    }

    /// Content hash stored with a skill, if the skill exists.
    pub async fn skill_content_hash(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT content_hash FROM skills WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(hash,)| hash))
    }

    /// Get a skill by key.
    pub async fn get_skill(&self, key: &str) -> Result<Skill> {
        let query = format!("SELECT {SKILL_COLUMNS} FROM skills s WHERE s.key = ?1");
        let row = sqlx::query_as::<_, SkillRow>(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::SkillNotFound(key.to_string()))?;

        row.into_skill(&self.sequence_category)
    }

    /// List skills, optionally filtered by category and active flag.
    pub async fn list_skills(&self, category: Option<&str>, active: Option<bool>) -> Result<Vec<Skill>> {
        let query = format!(
            "SELECT {SKILL_COLUMNS} FROM skills s \
             WHERE (?1 IS NULL OR s.category = ?1) AND (?2 IS NULL OR s.is_active = ?2) {SKILL_ORDER}"
        );
        let rows = sqlx::query_as::<_, SkillRow>(&query)
            .bind(category)
            .bind(active)
            .fetch_all(&self.pool)
            .await?;

        self.rows_to_skills(rows)
    }

    /// Activate or deactivate a skill.
    pub async fn set_skill_active(&self, key: &str, active: bool) -> Result<Skill> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query("UPDATE skills SET is_active = ?1, updated_at = ?2 WHERE key = ?3")
            .bind(active)
            .bind(now)
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SkillNotFound(key.to_string()));
        }
        self.get_skill(key).await
    }

    /// Replace the linked skills of a sequence.
    pub async fn set_sequence_links(&self, key: &str, linked: &[String]) -> Result<Skill> {
        let sequence = self.get_skill(key).await?;
        if sequence.category != self.sequence_category {
            return Err(StorageError::NotASequence(key.to_string()));
        }
        for linked_key in linked {
            route_core::skills::validate_key(linked_key)?;
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM sequence_links WHERE sequence_id = ?1")
            .bind(sequence.id.as_ref())
            .execute(&mut *tx)
            .await?;
        for (position, linked_key) in linked.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO sequence_links (sequence_id, skill_key, position) VALUES (?1, ?2, ?3)",
            )
            .bind(sequence.id.as_ref())
            .bind(linked_key)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("UPDATE skills SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now().timestamp_millis())
            .bind(sequence.id.as_ref())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get_skill(key).await
    }

    /// Keys linked to a sequence, in orchestration order.
    pub async fn list_sequence_links(&self, key: &str) -> Result<Vec<String>> {
        let sequence = self.get_skill(key).await?;
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT skill_key FROM sequence_links WHERE sequence_id = ?1 ORDER BY position ASC",
        )
        .bind(sequence.id.as_ref())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    /// Active sequences with their linked-skill counts.
    pub async fn active_sequences(&self) -> Result<Vec<Skill>> {
        self.list_skills(Some(self.sequence_category.as_str()), Some(true))
            .await
    }

    /// Active skills outside the sequence and hitl categories.
    pub async fn active_individual_skills(&self) -> Result<Vec<Skill>> {
        let query = format!(
            "SELECT {SKILL_COLUMNS} FROM skills s \
             WHERE s.is_active = 1 AND s.category != ?1 AND s.category != ?2 {SKILL_ORDER}"
        );
        let rows = sqlx::query_as::<_, SkillRow>(&query)
            .bind(&self.sequence_category)
            .bind(&self.hitl_category)
            .fetch_all(&self.pool)
            .await?;

        self.rows_to_skills(rows)
    }

    fn rows_to_skills(&self, rows: Vec<SkillRow>) -> Result<Vec<Skill>> {
        rows.into_iter()
            .map(|r| r.into_skill(&self.sequence_category))
            .collect()
    }

    // --- Embedding operations ---

    /// Store (or replace) the embedding for a skill.
    pub async fn upsert_embedding(&self, skill_id: &Id, embedding: &[f32]) -> Result<()> {
        let vector_json = serde_json::to_string(embedding)?;
        sqlx::query(
            "INSERT INTO skill_embeddings (skill_id, dims, vector_json, updated_at) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(skill_id) DO UPDATE SET dims = excluded.dims, vector_json = excluded.vector_json, \
             updated_at = excluded.updated_at",
        )
        .bind(skill_id.as_ref())
        .bind(embedding.len() as i64)
        .bind(&vector_json)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cosine-similarity search over embeddings of active individual skills.
    ///
    /// Sequence and hitl skills are left out so they never take up `limit` slots.
    pub async fn similar_skills(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SimilarityRow>> {
        let rows = sqlx::query_as::<_, EmbeddingRow>(
            "SELECT s.id, s.key, s.name, s.category, e.vector_json FROM skill_embeddings e \
             JOIN skills s ON s.id = e.skill_id \
             WHERE s.is_active = 1 AND s.category NOT IN (?1, ?2) \
             ORDER BY s.created_at ASC, s.key ASC",
        )
        .bind(&self.sequence_category)
        .bind(&self.hitl_category)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let vector: Vec<f32> = serde_json::from_str(&row.vector_json)?;
            let similarity = cosine_similarity(embedding, &vector);
            if similarity >= threshold && similarity > 0.0 {
                scored.push(SimilarityRow {
                    skill_id: Id::from_string(row.id),
                    skill_key: row.key,
                    skill_name: row.name,
                    category: row.category,
                    similarity,
                });
            }
        }

        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(limit);
        Ok(scored)
    }

    // --- Decision log operations ---

    /// Append a routing decision to the log.
    pub async fn insert_decision(
        &self,
        record: &DecisionRecord,
        candidates: &[MatchCandidate],
    ) -> Result<()> {
        let candidates_json = serde_json::to_string(candidates)?;
        sqlx::query(
            r#"
            INSERT INTO routing_decisions (id, user_id, message_snippet, selected_skill_key, confidence,
                                           is_sequence_match, outcome, reason, candidate_count,
                                           candidates_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(record.id.as_ref())
        .bind(&record.user_id)
        .bind(&record.message_snippet)
        .bind(&record.selected_skill_key)
        .bind(record.confidence)
        .bind(record.is_sequence_match)
        .bind(record.outcome.as_str())
        .bind(&record.reason)
        .bind(i64::from(record.candidate_count))
        .bind(&candidates_json)
        .bind(record.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent decisions first, optionally for one user.
    pub async fn list_decisions(&self, user_id: Option<&str>, limit: u32) -> Result<Vec<DecisionRecord>> {
        let rows = sqlx::query_as::<_, DecisionRow>(
            "SELECT id, user_id, message_snippet, selected_skill_key, confidence, is_sequence_match, \
             outcome, reason, candidate_count, created_at FROM routing_decisions \
             WHERE (?1 IS NULL OR user_id = ?1) ORDER BY created_at DESC, id DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(DecisionRow::into_record).collect())
    }
}

#[async_trait]
impl SkillCatalog for Storage {
    async fn list_active_sequences(&self) -> std::result::Result<Vec<Skill>, CatalogError> {
        self.active_sequences()
            .await
            .map_err(|e| CatalogError::Backend(e.to_string()))
    }

    async fn list_active_individual_skills(&self) -> std::result::Result<Vec<Skill>, CatalogError> {
        self.active_individual_skills()
            .await
            .map_err(|e| CatalogError::Backend(e.to_string()))
    }
}

#[async_trait]
impl SimilarityIndex for Storage {
    async fn query(
        &self,
        embedding: &[f32],
        threshold: f64,
        limit: usize,
    ) -> std::result::Result<Vec<SimilarityRow>, IndexError> {
        self.similar_skills(embedding, threshold, limit)
            .await
            .map_err(|e| IndexError::Backend(e.to_string()))
    }
}

// --- Row types ---

#[derive(sqlx::FromRow)]
struct SkillRow {
    id: String,
    key: String,
    name: Option<String>,
    description: Option<String>,
    category: String,
    is_active: bool,
    triggers_json: String,
    keywords_json: String,
    created_at: i64,
    updated_at: i64,
    linked_skill_count: i64,
}

impl SkillRow {
    fn into_skill(self, sequence_category: &str) -> Result<Skill> {
        let triggers: Vec<TriggerSpec> = serde_json::from_str(&self.triggers_json)?;
        let keywords: Vec<String> = serde_json::from_str(&self.keywords_json)?;
        let linked_skill_count =
            (self.category == sequence_category).then_some(self.linked_skill_count as u32);

        Ok(Skill {
            id: Id::from_string(self.id),
            key: self.key,
            name: self.name,
            description: self.description,
            category: self.category,
            is_active: self.is_active,
            triggers,
            keywords,
            linked_skill_count,
            created_at: DateTime::from_timestamp_millis(self.created_at).unwrap_or_default(),
            updated_at: DateTime::from_timestamp_millis(self.updated_at).unwrap_or_default(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct EmbeddingRow {
    id: String,
    key: String,
    name: Option<String>,
    category: String,
    vector_json: String,
}

#[derive(sqlx::FromRow)]
struct DecisionRow {
    id: String,
    user_id: Option<String>,
    message_snippet: String,
    selected_skill_key: Option<String>,
    confidence: Option<f64>,
    is_sequence_match: bool,
    outcome: String,
    reason: String,
    candidate_count: i64,
    created_at: i64,
}

impl DecisionRow {
    fn into_record(self) -> DecisionRecord {
        DecisionRecord {
            id: Id::from_string(self.id),
            user_id: self.user_id,
            message_snippet: self.message_snippet,
            selected_skill_key: self.selected_skill_key,
            confidence: self.confidence,
            is_sequence_match: self.is_sequence_match,
            outcome: RoutingOutcome::parse(&self.outcome).unwrap_or(RoutingOutcome::NoMatch),
            reason: self.reason,
            candidate_count: self.candidate_count as u32,
            created_at: DateTime::from_timestamp_millis(self.created_at).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct TestStorage {
        storage: Storage,
        _dir: TempDir, // Keep alive to prevent cleanup
    }

    async fn create_test_storage() -> TestStorage {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = Storage::new(&db_path).await.unwrap();
        storage.migrate_embedded().await.unwrap();
        TestStorage { storage, _dir: dir }
    }

    fn make_def(key: &str, category: &str) -> SkillDefinition {
        SkillDefinition {
            key: key.to_string(),
            name: None,
            description: None,
            category: category.to_string(),
            is_active: true,
            triggers: vec![TriggerSpec::new("follow-up email").with_confidence(0.9)],
            keywords: vec!["follow-up".to_string()],
            linked_skills: Vec::new(),
        }
    }

    #[tokio::test]
    async fn upsert_and_get_skill() {
        let ts = create_test_storage().await;
        let skill = ts.storage.upsert_skill(&make_def("draft-email", "email")).await.unwrap();

        let retrieved = ts.storage.get_skill("draft-email").await.unwrap();
        assert_eq!(retrieved.id, skill.id);
        assert_eq!(retrieved.triggers.len(), 1);
        assert!((retrieved.triggers[0].confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(retrieved.keywords, vec!["follow-up"]);
        assert!(retrieved.is_active);
        assert!(retrieved.linked_skill_count.is_none());
    }

    #[tokio::test]
    async fn upsert_preserves_id_and_updates_fields() {
        let ts = create_test_storage().await;
        let first = ts.storage.upsert_skill(&make_def("draft-email", "email")).await.unwrap();

        let mut def = make_def("draft-email", "email");
        def.name = Some("Draft Email".to_string());
        def.keywords = vec!["reply".to_string()];
        let second = ts.storage.upsert_skill(&def).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name(), "Draft Email");
        assert_eq!(second.keywords, vec!["reply"]);
        assert_eq!(
            ts.storage.skill_content_hash("draft-email").await.unwrap(),
            Some(def.content_hash())
        );
    }

    #[tokio::test]
    async fn upsert_rejects_invalid_definition() {
        let ts = create_test_storage().await;
        let err = ts
            .storage
            .upsert_skill(&make_def("Bad Key", "email"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidDefinition(_)));
    }

    #[tokio::test]
    async fn get_missing_skill_is_not_found() {
        let ts = create_test_storage().await;
        let err = ts.storage.get_skill("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::SkillNotFound(_)));
    }

    #[tokio::test]
    async fn sequences_carry_linked_skill_counts() {
        let ts = create_test_storage().await;
        let mut def = make_def("follow-up-sequence", SEQUENCE_CATEGORY);
        def.linked_skills = vec!["draft-email".to_string(), "send-email".to_string()];
        ts.storage.upsert_skill(&def).await.unwrap();

        let sequences = ts.storage.active_sequences().await.unwrap();
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].linked_skill_count, Some(2));
        assert_eq!(
            ts.storage.list_sequence_links("follow-up-sequence").await.unwrap(),
            vec!["draft-email", "send-email"]
        );

        let updated = ts
            .storage
            .set_sequence_links("follow-up-sequence", &["log-call".to_string()])
            .await
            .unwrap();
        assert_eq!(updated.linked_skill_count, Some(1));
    }

    #[tokio::test]
    async fn links_rejected_for_individual_skill() {
        let ts = create_test_storage().await;
        ts.storage.upsert_skill(&make_def("draft-email", "email")).await.unwrap();
        let err = ts
            .storage
            .set_sequence_links("draft-email", &["send-email".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotASequence(_)));
    }

    #[tokio::test]
    async fn individual_listing_excludes_sequences_hitl_and_inactive() {
        let ts = create_test_storage().await;
        ts.storage.upsert_skill(&make_def("draft-email", "email")).await.unwrap();
        ts.storage.upsert_skill(&make_def("follow-up-sequence", SEQUENCE_CATEGORY)).await.unwrap();
        ts.storage.upsert_skill(&make_def("approve-discount", HITL_CATEGORY)).await.unwrap();
        let mut inactive = make_def("log-call", "activity");
        inactive.is_active = false;
        ts.storage.upsert_skill(&inactive).await.unwrap();

        let individuals = ts.storage.active_individual_skills().await.unwrap();
        let keys: Vec<_> = individuals.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["draft-email"]);

        let all = ts.storage.list_skills(None, None).await.unwrap();
        assert_eq!(all.len(), 4);
        let inactive = ts.storage.list_skills(None, Some(false)).await.unwrap();
        assert_eq!(inactive.len(), 1);
        let hitl = ts.storage.list_skills(Some(HITL_CATEGORY), None).await.unwrap();
        assert_eq!(hitl[0].key, "approve-discount");
    }

    #[tokio::test]
    async fn set_skill_active_toggles_flag() {
        let ts = create_test_storage().await;
        ts.storage.upsert_skill(&make_def("draft-email", "email")).await.unwrap();
        let skill = ts.storage.set_skill_active("draft-email", false).await.unwrap();
        assert!(!skill.is_active);
        assert!(ts.storage.active_individual_skills().await.unwrap().is_empty());
        assert!(matches!(
            ts.storage.set_skill_active("missing", true).await.unwrap_err(),
            StorageError::SkillNotFound(_)
        ));
    }

    #[tokio::test]
    async fn similarity_search_ranks_and_filters() {
        let ts = create_test_storage().await;
        let a = ts.storage.upsert_skill(&make_def("draft-email", "email")).await.unwrap();
        let b = ts.storage.upsert_skill(&make_def("log-call", "activity")).await.unwrap();
        let h = ts.storage.upsert_skill(&make_def("approve-discount", HITL_CATEGORY)).await.unwrap();
        ts.storage.upsert_embedding(&a.id, &[1.0, 0.0]).await.unwrap();
        ts.storage.upsert_embedding(&b.id, &[0.6, 0.8]).await.unwrap();
        ts.storage.upsert_embedding(&h.id, &[1.0, 0.0]).await.unwrap();

        let rows = ts.storage.similar_skills(&[1.0, 0.0], 0.5, 5).await.unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.skill_key.as_str()).collect();
        assert_eq!(keys, vec!["draft-email", "log-call"]);
        assert!((rows[0].similarity - 1.0).abs() < 1e-6);

        let rows = ts.storage.similar_skills(&[1.0, 0.0], 0.7, 5).await.unwrap();
        assert_eq!(rows.len(), 1);

        let rows = ts.storage.similar_skills(&[1.0, 0.0], 0.0, 1).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn similarity_search_leaves_out_sequences() {
        let ts = create_test_storage().await;
        let seq = ts
            .storage
            .upsert_skill(&make_def("follow-up-sequence", SEQUENCE_CATEGORY))
            .await
            .unwrap();
        let a = ts.storage.upsert_skill(&make_def("draft-email", "email")).await.unwrap();
        ts.storage.upsert_embedding(&seq.id, &[1.0, 0.0]).await.unwrap();
        ts.storage.upsert_embedding(&a.id, &[0.8, 0.6]).await.unwrap();

        let rows = ts.storage.similar_skills(&[1.0, 0.0], 0.5, 1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].skill_key, "draft-email");
    }

    #[tokio::test]
    async fn insert_and_list_decisions() {
        let ts = create_test_storage().await;
        for (i, user) in ["u1", "u2", "u1"].iter().enumerate() {
            let record = DecisionRecord {
                id: Id::new(),
                user_id: Some((*user).to_string()),
                message_snippet: format!("message {i}"),
                selected_skill_key: None,
                confidence: None,
                is_sequence_match: false,
                outcome: RoutingOutcome::NoMatch,
                reason: "No skills matched the message".to_string(),
                candidate_count: 0,
                created_at: Utc::now(),
            };
            ts.storage.insert_decision(&record, &[]).await.unwrap();
        }

        let all = ts.storage.list_decisions(None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        let u1 = ts.storage.list_decisions(Some("u1"), 10).await.unwrap();
        assert_eq!(u1.len(), 2);
        assert!(u1.iter().all(|d| d.outcome == RoutingOutcome::NoMatch));
        let limited = ts.storage.list_decisions(None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}
