//! Story Context - Aggregate Root

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{ChapterDraft, ChapterNumber, LedgerError, Slug, StepContent, StepNumber, StoryId};
use crate::domain::schema;

/// Story 聚合根（步骤账本 + 章节表）
///
/// 不变量:
/// - 所有 `s < current_step` 的步骤都有非空内容
/// - 所有 `s > current_step` 的步骤都没有内容
/// - `current_step` 是第一个没有内容的步骤；回滚后停在回滚目标上，
///   目标内容保留直到重新生成或 Advance
/// - `chapters[k]` 存在时 `chapters[1..k-1]` 必须全部存在，`frontier_chapter` 为最大已完成章节
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    id: StoryId,
    slug: Slug,
    premise: String,
    current_step: StepNumber,
    steps: BTreeMap<StepNumber, StepContent>,
    chapters: BTreeMap<ChapterNumber, ChapterDraft>,
    frontier_chapter: u32,
    writing_style: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// 从持久化记录恢复 Story 所需的全部字段
#[derive(Debug, Clone)]
pub struct StoryParts {
    pub id: StoryId,
    pub slug: Slug,
    pub premise: String,
    pub current_step: StepNumber,
    pub steps: BTreeMap<StepNumber, StepContent>,
    pub chapters: BTreeMap<ChapterNumber, ChapterDraft>,
    pub frontier_chapter: u32,
    pub writing_style: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Story {
    /// 创建新故事，停在第一步
    pub fn new(slug: Slug, premise: impl Into<String>) -> Result<Self, LedgerError> {
        let premise = premise.into();
        if premise.trim().is_empty() {
            return Err(LedgerError::EmptyPremise);
        }
        let now = Utc::now();
        Ok(Self {
            id: StoryId::new(),
            slug,
            premise: premise.trim().to_string(),
            current_step: StepNumber::FIRST,
            steps: BTreeMap::new(),
            chapters: BTreeMap::new(),
            frontier_chapter: 0,
            writing_style: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// 从持久化记录恢复
    pub fn restore(parts: StoryParts) -> Self {
        Self {
            id: parts.id,
            slug: parts.slug,
            premise: parts.premise,
            current_step: parts.current_step,
            steps: parts.steps,
            chapters: parts.chapters,
            frontier_chapter: parts.frontier_chapter,
            writing_style: parts.writing_style,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    // ========================================================================
    // Step ledger
    // ========================================================================

    /// 提交步骤内容
    ///
    /// - `step <= current_step`：允许（重新提交当前步骤）
    /// - `step == current_step + 1`：前置步骤必须全部已提交
    /// - 提交 `current_step` 后，前沿推进到第一个没有内容的步骤
    pub fn commit(
        &mut self,
        step: StepNumber,
        content: StepContent,
    ) -> Result<StepNumber, LedgerError> {
        if step.is_final() {
            return Err(LedgerError::UnitStep(step));
        }
        if step.get() > self.current_step.get() + 1 {
            return Err(LedgerError::OutOfOrderCommit {
                step,
                current: self.current_step,
            });
        }
        self.check_prerequisites(step)?;
        if content.is_blank() {
            return Err(LedgerError::InvalidContent(format!(
                "step {} content is empty",
                step
            )));
        }

        self.steps.insert(step, content);
        if step >= self.current_step {
            self.current_step = self.first_open_step();
        }
        self.touch();

        tracing::debug!(
            story_id = %self.id,
            step = %step,
            current_step = %self.current_step,
            "Step committed"
        );
        Ok(self.current_step)
    }

    /// 回滚到指定步骤：删除其后所有步骤与全部章节
    ///
    /// 目标步骤本身的内容保留。已在目标步骤时为幂等操作。
    pub fn rollback_to(&mut self, step: StepNumber) -> Result<Vec<StepNumber>, LedgerError> {
        if step > self.current_step {
            return Err(LedgerError::RollbackAhead {
                target: step,
                current: self.current_step,
            });
        }
        if step == self.current_step {
            return Ok(Vec::new());
        }

        let removed: Vec<StepNumber> = match step.next() {
            Some(next) => self.steps.split_off(&next).into_keys().collect(),
            None => Vec::new(),
        };

        self.current_step = step;
        self.clear_chapters();
        self.touch();

        tracing::info!(
            story_id = %self.id,
            target = %step,
            removed = ?removed,
            "Story rolled back"
        );
        Ok(removed)
    }

    /// 接受前沿步骤的现有内容并推进前沿
    pub fn advance(&mut self) -> Result<StepNumber, LedgerError> {
        let ready = self
            .steps
            .get(&self.current_step)
            .map(|c| !c.is_blank())
            .unwrap_or(false);
        if !ready {
            return Err(LedgerError::StepNotReady(self.current_step));
        }
        self.current_step = self.first_open_step();
        self.touch();
        Ok(self.current_step)
    }

    /// 读取步骤内容
    pub fn peek(&self, step: StepNumber) -> Option<&StepContent> {
        self.steps.get(&step)
    }

    /// 第一个缺少内容的步骤；全部完成时为终止步骤
    fn first_open_step(&self) -> StepNumber {
        StepNumber::all()
            .find(|s| !self.steps.contains_key(s))
            .unwrap_or(StepNumber::FINAL)
    }

    /// 检查步骤的声明前置是否都已提交
    pub fn check_prerequisites(&self, step: StepNumber) -> Result<(), LedgerError> {
        for required in schema::slot(step).prerequisites() {
            if !self.steps.contains_key(&required) {
                return Err(LedgerError::PrerequisiteNotMet {
                    step,
                    missing: required,
                });
            }
        }
        Ok(())
    }

    /// 构建提示词上下文：原始创意 + 目标之前所有已提交步骤
    pub fn context_up_to(&self, target: StepNumber) -> String {
        let mut parts = vec![format!("Original story idea: {}", self.premise)];
        for (step, content) in self.steps.range(..target) {
            parts.push(format!("{}:\n{}", schema::slot(*step).name, content.render()));
        }
        parts.join("\n\n")
    }

    // ========================================================================
    // Chapters
    // ========================================================================

    /// 是否已进入逐章起草阶段
    pub fn ensure_chapter_stage(&self) -> Result<(), LedgerError> {
        if !self.current_step.is_final() {
            return Err(LedgerError::PrerequisiteNotMet {
                step: StepNumber::FINAL,
                missing: self.current_step,
            });
        }
        self.check_prerequisites(StepNumber::FINAL)
    }

    /// 提交章节
    ///
    /// 新章节只能是 `frontier + 1`；重新提交只能针对前沿章节
    pub fn commit_chapter(
        &mut self,
        chapter: ChapterNumber,
        draft: ChapterDraft,
    ) -> Result<(), LedgerError> {
        self.ensure_chapter_stage()?;
        if chapter.get() > self.frontier_chapter + 1 {
            return Err(LedgerError::ChapterOutOfOrder {
                chapter,
                frontier: self.frontier_chapter,
            });
        }
        if chapter.get() < self.frontier_chapter {
            return Err(LedgerError::NotFrontierChapter {
                chapter,
                frontier: self.frontier_chapter,
            });
        }

        self.chapters.insert(chapter, draft);
        self.frontier_chapter = chapter.get();
        self.touch();

        tracing::debug!(
            story_id = %self.id,
            chapter = %chapter,
            "Chapter committed"
        );
        Ok(())
    }

    /// 删除指定章节之后的所有章节
    pub fn truncate_chapters_after(&mut self, chapter: ChapterNumber) -> Vec<ChapterNumber> {
        let Some(next) = ChapterNumber::new(chapter.get() + 1).ok() else {
            return Vec::new();
        };
        let removed: Vec<ChapterNumber> = self.chapters.split_off(&next).into_keys().collect();
        if !removed.is_empty() {
            self.frontier_chapter = self.frontier_chapter.min(chapter.get());
            self.touch();
            tracing::info!(
                story_id = %self.id,
                chapter = %chapter,
                removed = ?removed,
                "Chapters truncated"
            );
        }
        removed
    }

    fn clear_chapters(&mut self) {
        self.chapters.clear();
        self.frontier_chapter = 0;
    }

    /// 步骤 9 中对应章节的场景扩展条目
    pub fn scene_for_chapter(&self, chapter: ChapterNumber) -> Option<&Value> {
        match self.steps.get(&StepNumber::FINAL.prev()?)? {
            StepContent::List(items) => items.get((chapter.get() - 1) as usize),
            _ => None,
        }
    }

    /// 计划章节数（步骤 9 的场景条目数）
    pub fn planned_chapters(&self) -> Option<usize> {
        self.steps
            .get(&StepNumber::FINAL.prev()?)
            .and_then(|c| c.entry_count())
    }

    // ========================================================================
    // Story settings
    // ========================================================================

    /// 设置全局文风（空白视为清除）
    pub fn set_writing_style(&mut self, style: Option<String>) {
        self.writing_style = style
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // Getters
    pub fn id(&self) -> StoryId {
        self.id
    }

    pub fn slug(&self) -> &Slug {
        &self.slug
    }

    pub fn premise(&self) -> &str {
        &self.premise
    }

    pub fn current_step(&self) -> StepNumber {
        self.current_step
    }

    pub fn steps(&self) -> &BTreeMap<StepNumber, StepContent> {
        &self.steps
    }

    pub fn chapters(&self) -> &BTreeMap<ChapterNumber, ChapterDraft> {
        &self.chapters
    }

    pub fn chapter(&self, chapter: ChapterNumber) -> Option<&ChapterDraft> {
        self.chapters.get(&chapter)
    }

    pub fn frontier_chapter(&self) -> u32 {
        self.frontier_chapter
    }

    pub fn writing_style(&self) -> Option<&str> {
        self.writing_style.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(n: u8) -> StepNumber {
        StepNumber::new(n).unwrap()
    }

    fn chapter(n: u32) -> ChapterNumber {
        ChapterNumber::new(n).unwrap()
    }

    fn text(s: &str) -> StepContent {
        StepContent::Text(s.to_string())
    }

    fn new_story() -> Story {
        Story::new(Slug::new("dragon").unwrap(), "A knight and a dragon").unwrap()
    }

    /// 依次提交 1..=n
    fn story_through(n: u8) -> Story {
        let mut story = new_story();
        for s in 1..=n {
            story.commit(step(s), text(&format!("content {}", s))).unwrap();
        }
        story
    }

    fn assert_frontier_invariant(story: &Story) {
        let current = story.current_step();
        for s in StepNumber::all() {
            if s < current {
                assert!(story.peek(s).is_some(), "step {} below frontier is empty", s);
            }
            if s > current {
                assert!(story.peek(s).is_none(), "step {} ahead of frontier has content", s);
            }
        }
    }

    #[test]
    fn test_commit_advances_frontier() {
        let mut story = new_story();
        assert_eq!(story.current_step(), step(1));

        let current = story.commit(step(1), text("AB")).unwrap();
        assert_eq!(current, step(2));
        assert_eq!(story.peek(step(1)), Some(&text("AB")));
        assert_frontier_invariant(&story);
    }

    #[test]
    fn test_frontier_invariant_over_sequence() {
        let mut story = new_story();
        for s in 1..=9 {
            story.commit(step(s), text("x")).unwrap();
            assert_frontier_invariant(&story);
            // 当前步骤是第一个空步骤
            assert_eq!(story.current_step(), StepNumber::new(s + 1).unwrap());
        }
        assert_eq!(story.current_step(), StepNumber::FINAL);

        story.rollback_to(step(4)).unwrap();
        assert_frontier_invariant(&story);
        story.commit(step(4), text("y")).unwrap();
        assert_eq!(story.current_step(), step(5));
        assert_frontier_invariant(&story);
    }

    #[test]
    fn test_no_skip_commit() {
        let mut story = story_through(2);
        let before = story.clone();

        let err = story.commit(step(5), text("skip")).unwrap_err();
        assert_eq!(
            err,
            LedgerError::OutOfOrderCommit {
                step: step(5),
                current: step(3)
            }
        );
        assert_eq!(story.steps(), before.steps());
        assert_eq!(story.current_step(), before.current_step());
    }

    #[test]
    fn test_next_step_requires_prerequisites() {
        let mut story = story_through(2);
        // 当前在 3（空），4 依赖 3
        let err = story.commit(step(4), text("plot")).unwrap_err();
        assert_eq!(
            err,
            LedgerError::PrerequisiteNotMet {
                step: step(4),
                missing: step(3)
            }
        );
        assert!(story.peek(step(4)).is_none());
    }

    #[test]
    fn test_commit_after_reopen_accepts_next_step() {
        let mut story = story_through(4);
        story.rollback_to(step(2)).unwrap();
        // 2 仍保留内容，可直接提交 3
        let current = story.commit(step(3), text("characters")).unwrap();
        assert_eq!(current, step(4));
        assert_frontier_invariant(&story);
    }

    #[test]
    fn test_blank_content_rejected() {
        let mut story = new_story();
        let err = story.commit(step(1), text("   ")).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidContent(_)));
        assert_eq!(story.current_step(), step(1));
    }

    #[test]
    fn test_final_step_has_no_content_of_its_own() {
        let mut story = story_through(9);
        let err = story.commit(StepNumber::FINAL, text("draft")).unwrap_err();
        assert_eq!(err, LedgerError::UnitStep(StepNumber::FINAL));
    }

    #[test]
    fn test_rollback_deletes_downstream_and_keeps_target() {
        let mut story = story_through(4);
        assert_eq!(story.current_step(), step(5));

        let removed = story.rollback_to(step(2)).unwrap();
        assert_eq!(removed, vec![step(3), step(4)]);
        assert_eq!(story.current_step(), step(2));
        assert!(story.peek(step(2)).is_some());
        assert!(story.peek(step(3)).is_none());
        assert!(story.peek(step(4)).is_none());
    }

    #[test]
    fn test_rollback_is_idempotent_at_target() {
        let mut story = story_through(4);
        story.rollback_to(step(2)).unwrap();
        let removed = story.rollback_to(step(2)).unwrap();
        assert!(removed.is_empty());
        assert_eq!(story.current_step(), step(2));
    }

    #[test]
    fn test_rollback_ahead_rejected() {
        let mut story = story_through(2);
        let err = story.rollback_to(step(5)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::RollbackAhead {
                target: step(5),
                current: step(3)
            }
        );
    }

    #[test]
    fn test_rollback_clears_chapters() {
        let mut story = story_through(9);
        story
            .commit_chapter(chapter(1), ChapterDraft::new("once").unwrap())
            .unwrap();
        story.rollback_to(step(8)).unwrap();
        assert!(story.chapters().is_empty());
        assert_eq!(story.frontier_chapter(), 0);
    }

    #[test]
    fn test_advance_requires_content_at_frontier() {
        let mut story = story_through(3);
        assert_eq!(
            story.advance().unwrap_err(),
            LedgerError::StepNotReady(step(4))
        );

        story.rollback_to(step(2)).unwrap();
        assert_eq!(story.advance().unwrap(), step(3));
        assert_frontier_invariant(&story);
    }

    #[test]
    fn test_chapters_require_planning_complete() {
        let mut story = story_through(8);
        let err = story
            .commit_chapter(chapter(1), ChapterDraft::new("x").unwrap())
            .unwrap_err();
        assert!(matches!(err, LedgerError::PrerequisiteNotMet { .. }));
    }

    #[test]
    fn test_chapter_ordering() {
        let mut story = story_through(9);
        let err = story
            .commit_chapter(chapter(2), ChapterDraft::new("x").unwrap())
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::ChapterOutOfOrder {
                chapter: chapter(2),
                frontier: 0
            }
        );

        for k in 1..=3 {
            story
                .commit_chapter(chapter(k), ChapterDraft::new("words here").unwrap())
                .unwrap();
        }
        assert_eq!(story.frontier_chapter(), 3);

        let err = story
            .commit_chapter(chapter(1), ChapterDraft::new("again").unwrap())
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFrontierChapter { .. }));

        // 前沿章节可以重新提交
        story
            .commit_chapter(chapter(3), ChapterDraft::new("again").unwrap())
            .unwrap();
    }

    #[test]
    fn test_truncate_chapters_moves_frontier() {
        let mut story = story_through(9);
        for k in 1..=3 {
            story
                .commit_chapter(chapter(k), ChapterDraft::new("text").unwrap())
                .unwrap();
        }
        let removed = story.truncate_chapters_after(chapter(1));
        assert_eq!(removed, vec![chapter(2), chapter(3)]);
        assert_eq!(story.frontier_chapter(), 1);
        assert!(story.truncate_chapters_after(chapter(1)).is_empty());
    }

    #[test]
    fn test_scene_lookup_and_planned_chapters() {
        let mut story = story_through(8);
        story
            .commit(
                step(9),
                StepContent::List(vec![json!({"title": "Arrival"}), json!({"title": "Siege"})]),
            )
            .unwrap();
        assert_eq!(story.planned_chapters(), Some(2));
        assert_eq!(
            story.scene_for_chapter(chapter(2)),
            Some(&json!({"title": "Siege"}))
        );
        assert_eq!(story.scene_for_chapter(chapter(3)), None);
    }

    #[test]
    fn test_context_only_includes_earlier_steps() {
        let story = story_through(3);
        let context = story.context_up_to(step(3));
        assert!(context.starts_with("Original story idea: A knight and a dragon"));
        assert!(context.contains("Paragraph summary:\ncontent 2"));
        assert!(!context.contains("content 3"));
    }

    #[test]
    fn test_writing_style_blank_clears() {
        let mut story = new_story();
        story.set_writing_style(Some("  terse, noir ".to_string()));
        assert_eq!(story.writing_style(), Some("terse, noir"));
        story.set_writing_style(Some("   ".to_string()));
        assert_eq!(story.writing_style(), None);
    }
}
