//! Story Commands

use crate::domain::StoryId;

/// 创建故事命令
#[derive(Debug, Clone)]
pub struct CreateStory {
    /// 原始短标识，保存前规范化
    pub slug: String,
    /// 一句话创意
    pub premise: String,
}

/// 删除故事命令
#[derive(Debug, Clone)]
pub struct DeleteStory {
    pub story_id: StoryId,
}

/// 设置全局文风命令（None 或空白表示清除）
#[derive(Debug, Clone)]
pub struct SetWritingStyle {
    pub story_id: StoryId,
    pub style: Option<String>,
}

/// 审阅大纲命令（只读，不修改账本）
#[derive(Debug, Clone)]
pub struct AnalyzeStory {
    pub story_id: StoryId,
}
