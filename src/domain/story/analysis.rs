//! Story Context - Analysis
//!
//! 对完整大纲的结构化审阅结果。审阅不写入账本，只作为一次性报告返回。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entities::strip_json_fence;
use super::LedgerError;

/// 视角分布
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PovAnalysis {
    /// 角色名 -> 该角色视角的场景数
    pub distribution: BTreeMap<String, u32>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterAnalysis {
    pub main_characters: Vec<String>,
    pub forgotten_characters: Vec<String>,
    pub character_arc_issues: Vec<String>,
    pub relationship_tracking: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubplotAnalysis {
    pub identified_subplots: Vec<String>,
    pub incomplete_subplots: Vec<String>,
    pub missing_connections: Vec<String>,
    pub resolution_issues: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureAnalysis {
    pub pacing_issues: Vec<String>,
    pub plot_holes: Vec<String>,
    pub foreshadowing_analysis: Vec<String>,
    pub climax_buildup: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyChecks {
    pub timeline_issues: Vec<String>,
    pub setting_consistency: Vec<String>,
    pub character_voice: Vec<String>,
    pub tone_shifts: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletenessAnalysis {
    pub unresolved_threads: Vec<String>,
    pub missing_scenes: Vec<String>,
    pub character_motivations: Vec<String>,
    pub thematic_coherence: Vec<String>,
}

/// 针对单个场景的修改建议
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneImprovement {
    pub scene_number: u32,
    pub priority: String,
    pub issue: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recommendations {
    pub high_priority: Vec<String>,
    pub medium_priority: Vec<String>,
    pub low_priority: Vec<String>,
    pub scene_improvements: Vec<SceneImprovement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverallAssessment {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    /// 生成服务给出的可读性评分，原样保留（如 "7/10"）
    pub readiness_score: String,
    pub key_strengths: Vec<String>,
    pub improvement_areas: Vec<String>,
}

/// 故事审阅报告
///
/// 所有分节都可缺省；缺省的分节为空
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryAnalysis {
    pub pov_analysis: PovAnalysis,
    pub character_analysis: CharacterAnalysis,
    pub subplot_analysis: SubplotAnalysis,
    pub story_structure: StructureAnalysis,
    pub consistency_checks: ConsistencyChecks,
    pub completeness_analysis: CompletenessAnalysis,
    pub recommendations: Recommendations,
    pub overall_assessment: OverallAssessment,
}

impl StoryAnalysis {
    /// 从生成服务返回的文本解析（允许 ```json 代码块包裹）
    pub fn from_text(raw: &str) -> Result<Self, LedgerError> {
        let value: Value = serde_json::from_str(strip_json_fence(raw))
            .map_err(|e| LedgerError::InvalidContent(format!("malformed JSON: {}", e)))?;
        Self::from_json(value)
    }

    pub fn from_json(value: Value) -> Result<Self, LedgerError> {
        if !value.is_object() {
            return Err(LedgerError::InvalidContent(
                "story analysis must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| LedgerError::InvalidContent(format!("invalid story analysis: {}", e)))
    }

    /// 高优先级建议数，用于日志
    pub fn high_priority_count(&self) -> usize {
        self.recommendations.high_priority.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_partial_analysis() {
        let raw = r#"```json
{
  "pov_analysis": {"distribution": {"Mara": 3, "Ivo": 1}, "issues": ["Ivo underused"]},
  "recommendations": {
    "high_priority": ["Foreshadow the storm"],
    "scene_improvements": [
      {"scene_number": 2, "priority": "high", "issue": "Flat", "suggestion": "Raise the stakes"}
    ]
  },
  "overall_assessment": {"readiness_score": "7/10"}
}
```"#;
        let analysis = StoryAnalysis::from_text(raw).unwrap();
        assert_eq!(analysis.pov_analysis.distribution.get("Mara"), Some(&3));
        assert_eq!(analysis.high_priority_count(), 1);
        assert_eq!(analysis.recommendations.scene_improvements[0].scene_number, 2);
        assert_eq!(analysis.overall_assessment.readiness_score, "7/10");
        // 缺省分节为空
        assert!(analysis.subplot_analysis.identified_subplots.is_empty());
    }

    #[test]
    fn test_rejects_non_object_analysis() {
        assert!(matches!(
            StoryAnalysis::from_json(json!(["not", "a", "report"])),
            Err(LedgerError::InvalidContent(_))
        ));
        assert!(matches!(
            StoryAnalysis::from_text("The outline looks fine."),
            Err(LedgerError::InvalidContent(_))
        ));
    }

    #[test]
    fn test_wrong_section_shape_is_rejected() {
        let err = StoryAnalysis::from_json(json!({"pov_analysis": {"distribution": "many"}}))
            .unwrap_err();
        assert!(err.to_string().contains("invalid story analysis"));
    }
}
