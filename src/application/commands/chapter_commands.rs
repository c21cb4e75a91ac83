//! Chapter Commands - 逐章起草写操作

use crate::domain::{ChapterNumber, StoryId};

/// 生成章节命令（前沿的下一章，或原地重写前沿章节）
#[derive(Debug, Clone)]
pub struct GenerateChapter {
    pub story_id: StoryId,
    pub chapter: ChapterNumber,
}

/// 精修前沿章节命令
#[derive(Debug, Clone)]
pub struct RefineChapter {
    pub story_id: StoryId,
    pub chapter: ChapterNumber,
    pub instructions: String,
}

/// 重新生成章节命令（删除其后所有章节）
#[derive(Debug, Clone)]
pub struct RegenerateChapter {
    pub story_id: StoryId,
    pub chapter: ChapterNumber,
}
