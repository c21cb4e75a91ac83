//! Step Schema - 固定的十步大纲结构
//!
//! 每一步声明内容类型与前置步骤。schema 在编译期固定，不随故事变化。

use serde::{Deserialize, Serialize};

use crate::domain::story::StepNumber;

/// 步骤总数
pub const STEP_COUNT: u8 = 10;

/// 步骤内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// 自由文本
    FreeText,
    /// 结构化列表（JSON 数组）
    StructuredList,
    /// 结构化表格（列 + 行）
    StructuredTable,
    /// 逐单元叙事（章节）
    NarrativePerUnit,
    /// 审阅报告（JSON 对象），不对应任何步骤
    Report,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::FreeText => "free_text",
            ContentKind::StructuredList => "structured_list",
            ContentKind::StructuredTable => "structured_table",
            ContentKind::NarrativePerUnit => "narrative_per_unit",
            ContentKind::Report => "report",
        }
    }
}

/// 步骤槽位定义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSlot {
    pub number: u8,
    pub name: &'static str,
    pub kind: ContentKind,
    /// 生成本步骤前必须已提交的步骤
    pub prerequisites: &'static [u8],
}

impl StepSlot {
    pub fn step(&self) -> StepNumber {
        // schema 中的编号都在 1..=STEP_COUNT
        StepNumber::new(self.number).unwrap_or(StepNumber::FIRST)
    }

    pub fn prerequisites(&self) -> impl Iterator<Item = StepNumber> + '_ {
        self.prerequisites
            .iter()
            .filter_map(|n| StepNumber::new(*n).ok())
    }
}

static STEP_SCHEMA: [StepSlot; STEP_COUNT as usize] = [
    StepSlot {
        number: 1,
        name: "One-sentence summary",
        kind: ContentKind::FreeText,
        prerequisites: &[],
    },
    StepSlot {
        number: 2,
        name: "Paragraph summary",
        kind: ContentKind::FreeText,
        prerequisites: &[1],
    },
    StepSlot {
        number: 3,
        name: "Character summaries",
        kind: ContentKind::StructuredList,
        prerequisites: &[2],
    },
    StepSlot {
        number: 4,
        name: "Plot summary",
        kind: ContentKind::FreeText,
        prerequisites: &[2, 3],
    },
    StepSlot {
        number: 5,
        name: "Character synopses",
        kind: ContentKind::StructuredList,
        prerequisites: &[3, 4],
    },
    StepSlot {
        number: 6,
        name: "Detailed plot synopsis",
        kind: ContentKind::FreeText,
        prerequisites: &[4, 5],
    },
    StepSlot {
        number: 7,
        name: "Character charts",
        kind: ContentKind::StructuredList,
        prerequisites: &[5, 6],
    },
    StepSlot {
        number: 8,
        name: "Scene breakdown",
        kind: ContentKind::StructuredTable,
        prerequisites: &[6, 7],
    },
    StepSlot {
        number: 9,
        name: "Scene expansions",
        kind: ContentKind::StructuredList,
        prerequisites: &[8],
    },
    StepSlot {
        number: 10,
        name: "Chapter drafts",
        kind: ContentKind::NarrativePerUnit,
        prerequisites: &[9],
    },
];

/// 获取步骤槽位
pub fn slot(step: StepNumber) -> &'static StepSlot {
    &STEP_SCHEMA[(step.get() - 1) as usize]
}

/// 全部槽位，按步骤编号升序
pub fn slots() -> &'static [StepSlot] {
    &STEP_SCHEMA
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_ordered() {
        for (index, slot) in slots().iter().enumerate() {
            assert_eq!(slot.number as usize, index + 1);
            // 前置步骤只能指向更早的步骤
            assert!(slot.prerequisites.iter().all(|p| *p < slot.number));
        }
    }

    #[test]
    fn test_final_step_is_per_unit() {
        assert_eq!(slot(StepNumber::FINAL).kind, ContentKind::NarrativePerUnit);
        let prereqs: Vec<_> = slot(StepNumber::FINAL).prerequisites().collect();
        assert_eq!(prereqs, vec![StepNumber::new(9).unwrap()]);
    }
}
