//! Story Context - Value Objects

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::LedgerError;
use crate::domain::schema::STEP_COUNT;

/// 故事唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryId(Uuid);

impl StoryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for StoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 故事短标识（URL 友好）
///
/// 规范化规则：转小写，`[a-z0-9_-]` 以外的连续字符替换为单个 `-`，去掉首尾 `-`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, LedgerError> {
        let mut sanitized = String::new();
        for ch in raw.as_ref().to_lowercase().chars() {
            let keep = ch.is_ascii_alphanumeric() || ch == '_' || ch == '-';
            let next = if keep { ch } else { '-' };
            if next == '-' && sanitized.ends_with('-') {
                continue;
            }
            sanitized.push(next);
        }
        let sanitized = sanitized.trim_matches('-').to_string();

        if sanitized.is_empty() {
            return Err(LedgerError::InvalidSlug(raw.as_ref().to_string()));
        }
        Ok(Self(sanitized))
    }

    /// 从已规范化的存储值恢复
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Slug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 步骤编号（1..=10）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct StepNumber(u8);

impl StepNumber {
    /// 第一步
    pub const FIRST: StepNumber = StepNumber(1);
    /// 终止步骤（逐章起草）
    pub const FINAL: StepNumber = StepNumber(STEP_COUNT);

    pub fn new(value: u8) -> Result<Self, LedgerError> {
        if value == 0 || value > STEP_COUNT {
            return Err(LedgerError::UnknownStep(value));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// 下一步（终止步骤返回 None）
    pub fn next(&self) -> Option<StepNumber> {
        (self.0 < STEP_COUNT).then(|| StepNumber(self.0 + 1))
    }

    /// 上一步（第一步返回 None）
    pub fn prev(&self) -> Option<StepNumber> {
        (self.0 > 1).then(|| StepNumber(self.0 - 1))
    }

    /// 全部步骤，升序
    pub fn all() -> impl Iterator<Item = StepNumber> {
        (1..=STEP_COUNT).map(StepNumber)
    }

    pub fn is_final(&self) -> bool {
        self.0 == STEP_COUNT
    }
}

impl TryFrom<u8> for StepNumber {
    type Error = LedgerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StepNumber> for u8 {
    fn from(step: StepNumber) -> Self {
        step.0
    }
}

impl std::fmt::Display for StepNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 章节编号（从 1 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ChapterNumber(u32);

impl ChapterNumber {
    pub fn new(value: u32) -> Result<Self, LedgerError> {
        if value == 0 {
            return Err(LedgerError::UnknownChapter(value));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn prev(&self) -> Option<ChapterNumber> {
        (self.0 > 1).then(|| ChapterNumber(self.0 - 1))
    }
}

impl TryFrom<u32> for ChapterNumber {
    type Error = LedgerError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChapterNumber> for u32 {
    fn from(chapter: ChapterNumber) -> Self {
        chapter.0
    }
}

impl std::fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 生成目标：某个步骤、终止步骤内的某一章，或对整个大纲的审阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTarget {
    Step(StepNumber),
    Chapter(ChapterNumber),
    Analysis,
}

impl std::fmt::Display for GenerationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationTarget::Step(step) => write!(f, "step-{}", step),
            GenerationTarget::Chapter(chapter) => write!(f, "chapter-{}", chapter),
            GenerationTarget::Analysis => write!(f, "analysis"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_sanitization() {
        let slug = Slug::new("  The Dragon's Quest!! ").unwrap();
        assert_eq!(slug.as_str(), "the-dragon-s-quest");

        let slug = Slug::new("snake_case-ok").unwrap();
        assert_eq!(slug.as_str(), "snake_case-ok");
    }

    #[test]
    fn test_slug_rejects_empty() {
        assert!(matches!(Slug::new("!!!"), Err(LedgerError::InvalidSlug(_))));
        assert!(Slug::new("").is_err());
    }

    #[test]
    fn test_step_number_bounds() {
        assert!(StepNumber::new(0).is_err());
        assert!(StepNumber::new(11).is_err());
        assert_eq!(StepNumber::new(10).unwrap(), StepNumber::FINAL);
        assert_eq!(StepNumber::FINAL.next(), None);
        assert_eq!(StepNumber::FIRST.prev(), None);
        assert_eq!(StepNumber::all().count(), 10);
    }

    #[test]
    fn test_target_serialization() {
        let target = GenerationTarget::Chapter(ChapterNumber::new(3).unwrap());
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, r#"{"chapter":3}"#);

        let back: GenerationTarget = serde_json::from_str(r#"{"step":2}"#).unwrap();
        assert_eq!(back, GenerationTarget::Step(StepNumber::new(2).unwrap()));

        assert!(serde_json::from_str::<GenerationTarget>(r#"{"step":0}"#).is_err());

        let json = serde_json::to_string(&GenerationTarget::Analysis).unwrap();
        assert_eq!(json, r#""analysis""#);
        assert_eq!(GenerationTarget::Analysis.to_string(), "analysis");
    }
}
