//! Repository Ports - 出站端口
//!
//! 定义故事持久化的抽象接口
//! 具体实现在 infrastructure 层（SQLite）

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Slug, Story, StoryId};

/// Repository 错误
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Story Repository Port
///
/// `save` 保存完整的故事状态（步骤账本 + 章节表）
#[async_trait]
pub trait StoryRepositoryPort: Send + Sync {
    /// 创建故事；slug 已存在时返回 Duplicate
    async fn create(&self, story: &Story) -> Result<(), RepositoryError>;

    /// 保存故事完整状态
    async fn save(&self, story: &Story) -> Result<(), RepositoryError>;

    /// 根据 ID 加载
    async fn find_by_id(&self, id: StoryId) -> Result<Option<Story>, RepositoryError>;

    /// 根据 slug 加载
    async fn find_by_slug(&self, slug: &Slug) -> Result<Option<Story>, RepositoryError>;

    /// 列出所有故事，按创建时间倒序
    async fn find_all(&self) -> Result<Vec<Story>, RepositoryError>;

    /// 删除故事
    async fn delete(&self, id: StoryId) -> Result<(), RepositoryError>;
}
