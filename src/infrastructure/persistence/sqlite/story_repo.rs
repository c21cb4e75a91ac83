//! SQLite Story Repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::DbPool;
use crate::application::ports::{RepositoryError, StoryRepositoryPort};
use crate::domain::story::StoryParts;
use crate::domain::{ChapterDraft, ChapterNumber, Slug, StepContent, StepNumber, Story, StoryId};

/// SQLite Story Repository
pub struct SqliteStoryRepository {
    pool: DbPool,
}

impl SqliteStoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct StoryRow {
    id: String,
    slug: String,
    premise: String,
    current_step: i64,
    frontier_chapter: i64,
    writing_style: Option<String>,
    created_at: String,
    updated_at: String,
}

#[derive(FromRow)]
struct StepRow {
    step_number: i64,
    content: String,
}

#[derive(FromRow)]
struct ChapterRow {
    chapter_number: i64,
    content: String,
    word_count: i64,
    generated_at: String,
}

const STORY_COLUMNS: &str =
    "id, slug, premise, current_step, frontier_chapter, writing_style, created_at, updated_at";

fn db_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(e.to_string())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::SerializationError(e.to_string()))
}

fn step_number(value: i64) -> Result<StepNumber, RepositoryError> {
    u8::try_from(value)
        .ok()
        .and_then(|n| StepNumber::new(n).ok())
        .ok_or_else(|| RepositoryError::SerializationError(format!("invalid step: {}", value)))
}

fn chapter_number(value: i64) -> Result<ChapterNumber, RepositoryError> {
    u32::try_from(value)
        .ok()
        .and_then(|n| ChapterNumber::new(n).ok())
        .ok_or_else(|| RepositoryError::SerializationError(format!("invalid chapter: {}", value)))
}

impl SqliteStoryRepository {
    /// 加载步骤与章节，组装聚合
    async fn assemble(&self, row: StoryRow) -> Result<Story, RepositoryError> {
        let step_rows: Vec<StepRow> = sqlx::query_as(
            "SELECT step_number, content FROM story_steps WHERE story_id = ? ORDER BY step_number",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let chapter_rows: Vec<ChapterRow> = sqlx::query_as(
            "SELECT chapter_number, content, word_count, generated_at FROM story_chapters WHERE story_id = ? ORDER BY chapter_number",
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut steps = BTreeMap::new();
        for step in step_rows {
            let content: StepContent = serde_json::from_str(&step.content)
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;
            steps.insert(step_number(step.step_number)?, content);
        }

        let mut chapters = BTreeMap::new();
        for chapter in chapter_rows {
            let draft = ChapterDraft::restore(
                chapter.content,
                chapter.word_count.max(0) as usize,
                parse_time(&chapter.generated_at)?,
            );
            chapters.insert(chapter_number(chapter.chapter_number)?, draft);
        }

        let id = Uuid::parse_str(&row.id)
            .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;

        Ok(Story::restore(StoryParts {
            id: StoryId::from_uuid(id),
            slug: Slug::from_stored(row.slug),
            premise: row.premise,
            current_step: step_number(row.current_step)?,
            steps,
            chapters,
            frontier_chapter: row.frontier_chapter.max(0) as u32,
            writing_style: row.writing_style,
            created_at: parse_time(&row.created_at)?,
            updated_at: parse_time(&row.updated_at)?,
        }))
    }
}

#[async_trait]
impl StoryRepositoryPort for SqliteStoryRepository {
    async fn create(&self, story: &Story) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO stories (id, slug, premise, current_step, frontier_chapter, writing_style, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(story.id().to_string())
        .bind(story.slug().as_str())
        .bind(story.premise())
        .bind(story.current_step().get() as i64)
        .bind(story.frontier_chapter() as i64)
        .bind(story.writing_style())
        .bind(story.created_at().to_rfc3339())
        .bind(story.updated_at().to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(RepositoryError::Duplicate(format!(
                    "story slug already exists: {}",
                    story.slug()
                )));
            }
            Err(e) => return Err(db_error(e)),
        }

        // 新故事通常没有内容，仍走完整保存以保持一致
        if !story.steps().is_empty() || !story.chapters().is_empty() {
            self.save(story).await?;
        }
        Ok(())
    }

    async fn save(&self, story: &Story) -> Result<(), RepositoryError> {
        let story_id = story.id().to_string();

        // 使用事务确保账本与章节表一起落盘
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT INTO stories (id, slug, premise, current_step, frontier_chapter, writing_style, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                premise = excluded.premise,
                current_step = excluded.current_step,
                frontier_chapter = excluded.frontier_chapter,
                writing_style = excluded.writing_style,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&story_id)
        .bind(story.slug().as_str())
        .bind(story.premise())
        .bind(story.current_step().get() as i64)
        .bind(story.frontier_chapter() as i64)
        .bind(story.writing_style())
        .bind(story.created_at().to_rfc3339())
        .bind(story.updated_at().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        sqlx::query("DELETE FROM story_steps WHERE story_id = ?")
            .bind(&story_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        for (step, content) in story.steps() {
            let json = serde_json::to_string(content)
                .map_err(|e| RepositoryError::SerializationError(e.to_string()))?;
            sqlx::query("INSERT INTO story_steps (story_id, step_number, content) VALUES (?, ?, ?)")
                .bind(&story_id)
                .bind(step.get() as i64)
                .bind(json)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        sqlx::query("DELETE FROM story_chapters WHERE story_id = ?")
            .bind(&story_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        for (chapter, draft) in story.chapters() {
            sqlx::query(
                "INSERT INTO story_chapters (story_id, chapter_number, content, word_count, generated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&story_id)
            .bind(chapter.get() as i64)
            .bind(draft.content())
            .bind(draft.word_count() as i64)
            .bind(draft.generated_at().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;

        tracing::debug!(
            story_id = %story_id,
            steps = story.steps().len(),
            chapters = story.chapters().len(),
            "Story saved"
        );
        Ok(())
    }

    async fn find_by_id(&self, id: StoryId) -> Result<Option<Story>, RepositoryError> {
        let row: Option<StoryRow> =
            sqlx::query_as(&format!("SELECT {} FROM stories WHERE id = ?", STORY_COLUMNS))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        match row {
            Some(row) => self.assemble(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_by_slug(&self, slug: &Slug) -> Result<Option<Story>, RepositoryError> {
        let row: Option<StoryRow> =
            sqlx::query_as(&format!("SELECT {} FROM stories WHERE slug = ?", STORY_COLUMNS))
                .bind(slug.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;

        match row {
            Some(row) => self.assemble(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> Result<Vec<Story>, RepositoryError> {
        let rows: Vec<StoryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM stories ORDER BY created_at DESC",
            STORY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut stories = Vec::with_capacity(rows.len());
        for row in rows {
            stories.push(self.assemble(row).await?);
        }
        Ok(stories)
    }

    async fn delete(&self, id: StoryId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query("DELETE FROM story_chapters WHERE story_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        sqlx::query("DELETE FROM story_steps WHERE story_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        let result = sqlx::query("DELETE FROM stories WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }
}
