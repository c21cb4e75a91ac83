//! Story Context - Entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::LedgerError;
use crate::domain::schema::ContentKind;

/// 统计词数（按空白分割）
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// 去掉生成结果外层的 ```json 代码块标记
pub fn strip_json_fence(raw: &str) -> &str {
    let mut content = raw.trim();
    if let Some(rest) = content.strip_prefix("```json") {
        content = rest;
    } else if let Some(rest) = content.strip_prefix("```") {
        content = rest;
    }
    if let Some(rest) = content.strip_suffix("```") {
        content = rest;
    }
    content.trim()
}

/// 结构化表格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ContentTable {
    /// 从 JSON 解析表格
    ///
    /// 支持两种形式:
    /// - `{"columns": [...], "rows": [[...], ...]}`
    /// - 对象数组，列为首次出现顺序的键集合
    fn from_json(value: Value) -> Result<Self, LedgerError> {
        match value {
            Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| LedgerError::InvalidContent(format!("malformed table: {}", e))),
            Value::Array(items) => {
                let mut columns: Vec<String> = Vec::new();
                for item in &items {
                    let Value::Object(map) = item else {
                        return Err(LedgerError::InvalidContent(
                            "table rows must be objects".to_string(),
                        ));
                    };
                    for key in map.keys() {
                        if !columns.contains(key) {
                            columns.push(key.clone());
                        }
                    }
                }
                let rows = items
                    .iter()
                    .map(|item| {
                        columns
                            .iter()
                            .map(|c| item.get(c).cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect();
                Ok(Self { columns, rows })
            }
            other => Err(LedgerError::InvalidContent(format!(
                "expected table, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

/// 步骤内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StepContent {
    Text(String),
    List(Vec<Value>),
    Table(ContentTable),
}

fn report_is_not_step_content() -> LedgerError {
    LedgerError::InvalidContent("a report cannot be stored as step content".to_string())
}

impl StepContent {
    /// 按声明类型解析生成器返回的文本
    pub fn from_text(kind: ContentKind, raw: &str) -> Result<Self, LedgerError> {
        match kind {
            ContentKind::FreeText | ContentKind::NarrativePerUnit => {
                Ok(StepContent::Text(raw.to_string()))
            }
            ContentKind::StructuredList | ContentKind::StructuredTable => {
                let value: Value = serde_json::from_str(strip_json_fence(raw))
                    .map_err(|e| LedgerError::InvalidContent(format!("malformed JSON: {}", e)))?;
                Self::from_json(kind, value)
            }
            ContentKind::Report => Err(report_is_not_step_content()),
        }
    }

    /// 按声明类型转换结构化数据
    pub fn from_json(kind: ContentKind, value: Value) -> Result<Self, LedgerError> {
        match kind {
            ContentKind::FreeText | ContentKind::NarrativePerUnit => match value {
                Value::String(text) => Ok(StepContent::Text(text)),
                other => Err(LedgerError::InvalidContent(format!(
                    "expected text, got {}",
                    json_type_name(&other)
                ))),
            },
            ContentKind::StructuredList => match value {
                Value::Array(items) => Ok(StepContent::List(items)),
                // 部分生成结果是 {"1": {...}, "2": {...}} 形式，按数字键排序
                Value::Object(map) => {
                    let mut entries: Vec<(String, Value)> = map.into_iter().collect();
                    entries.sort_by_key(|(key, _)| key.parse::<u64>().unwrap_or(u64::MAX));
                    Ok(StepContent::List(entries.into_iter().map(|(_, v)| v).collect()))
                }
                Value::String(text) => Self::from_text(kind, &text),
                other => Err(LedgerError::InvalidContent(format!(
                    "expected list, got {}",
                    json_type_name(&other)
                ))),
            },
            ContentKind::StructuredTable => match value {
                Value::String(text) => Self::from_text(kind, &text),
                other => ContentTable::from_json(other).map(StepContent::Table),
            },
            ContentKind::Report => Err(report_is_not_step_content()),
        }
    }

    /// 内容是否为空（空白文本、空列表、空表格）
    pub fn is_blank(&self) -> bool {
        match self {
            StepContent::Text(text) => text.trim().is_empty(),
            StepContent::List(items) => items.is_empty(),
            StepContent::Table(table) => table.rows.is_empty(),
        }
    }

    pub fn kind(&self) -> ContentKind {
        match self {
            StepContent::Text(_) => ContentKind::FreeText,
            StepContent::List(_) => ContentKind::StructuredList,
            StepContent::Table(_) => ContentKind::StructuredTable,
        }
    }

    /// 渲染为提示词上下文使用的纯文本
    pub fn render(&self) -> String {
        match self {
            StepContent::Text(text) => text.clone(),
            StepContent::List(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => format!("- {}", s),
                    other => format!("- {}", other),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            StepContent::Table(table) => {
                let mut lines = vec![table.columns.join(" | ")];
                for row in &table.rows {
                    let cells: Vec<String> = row
                        .iter()
                        .map(|cell| match cell {
                            Value::String(s) => s.clone(),
                            Value::Null => String::new(),
                            other => other.to_string(),
                        })
                        .collect();
                    lines.push(cells.join(" | "));
                }
                lines.join("\n")
            }
        }
    }

    /// 结构化条目数（文本为 None）
    pub fn entry_count(&self) -> Option<usize> {
        match self {
            StepContent::Text(_) => None,
            StepContent::List(items) => Some(items.len()),
            StepContent::Table(table) => Some(table.rows.len()),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// 章节草稿
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterDraft {
    content: String,
    word_count: usize,
    generated_at: DateTime<Utc>,
}

impl ChapterDraft {
    pub fn new(content: impl Into<String>) -> Result<Self, LedgerError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(LedgerError::InvalidContent("chapter content is empty".to_string()));
        }
        Ok(Self {
            word_count: count_words(&content),
            content,
            generated_at: Utc::now(),
        })
    }

    /// 从持久化记录恢复
    pub fn restore(content: String, word_count: usize, generated_at: DateTime<Utc>) -> Self {
        Self {
            content,
            word_count,
            generated_at,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn word_count(&self) -> usize {
        self.word_count
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    /// 供下一章模仿文风的样本（前 2000 字符）
    pub fn style_sample(&self) -> String {
        const SAMPLE_CHARS: usize = 2000;
        match self.content.char_indices().nth(SAMPLE_CHARS) {
            Some((cut, _)) => format!("{}...", &self.content[..cut]),
            None => self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(strip_json_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_json_fence("  [1]  "), "[1]");
    }

    #[test]
    fn test_list_from_fenced_text() {
        let content =
            StepContent::from_text(ContentKind::StructuredList, "```json\n[\"Ann\", \"Bo\"]\n```")
                .unwrap();
        assert_eq!(content, StepContent::List(vec![json!("Ann"), json!("Bo")]));
        assert_eq!(content.render(), "- Ann\n- Bo");
    }

    #[test]
    fn test_malformed_structured_text_is_rejected() {
        let result = StepContent::from_text(ContentKind::StructuredList, "not json");
        assert!(matches!(result, Err(LedgerError::InvalidContent(_))));
    }

    #[test]
    fn test_report_kind_never_becomes_step_content() {
        assert!(StepContent::from_text(ContentKind::Report, "{}").is_err());
        assert!(StepContent::from_json(ContentKind::Report, json!({"pov_analysis": {}})).is_err());
    }

    #[test]
    fn test_table_from_object_rows() {
        let value = json!([
            {"scene": 1, "pov": "Ann"},
            {"scene": 2, "pov": "Bo", "setting": "Dock"}
        ]);
        let content = StepContent::from_json(ContentKind::StructuredTable, value).unwrap();
        let StepContent::Table(table) = &content else {
            panic!("expected table");
        };
        assert_eq!(table.columns, vec!["scene", "pov", "setting"]);
        assert_eq!(table.rows[0][2], Value::Null);
        assert_eq!(content.entry_count(), Some(2));
    }

    #[test]
    fn test_blank_detection() {
        assert!(StepContent::Text("   \n".to_string()).is_blank());
        assert!(StepContent::List(vec![]).is_blank());
        assert!(!StepContent::Text("x".to_string()).is_blank());
    }

    #[test]
    fn test_chapter_draft_word_count_and_sample() {
        let draft = ChapterDraft::new("one two  three\nfour").unwrap();
        assert_eq!(draft.word_count(), 4);
        assert_eq!(draft.style_sample(), "one two  three\nfour");

        let long = ChapterDraft::new("a".repeat(2500)).unwrap();
        assert_eq!(long.style_sample().chars().count(), 2003);
        assert!(ChapterDraft::new("  ").is_err());
    }
}
