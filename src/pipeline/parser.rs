use crate::pipeline::error::PipelineError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// AI 推断的相关表
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelatedTable {
    pub t: String,
    #[serde(default)]
    pub d: String,
}

/// AI 推断的相关列
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelatedColumn {
    pub t: String,
    pub c: String,
    #[serde(default)]
    pub d: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RelatedColumns {
    #[serde(default)]
    pub tables: Vec<RelatedTable>,
    #[serde(default)]
    pub columns: Vec<RelatedColumn>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnTable {
    pub table: String,
    #[serde(default)]
    pub desc: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnColumn {
    pub table: String,
    pub column: String,
    #[serde(default)]
    pub desc: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LearnRelation {
    pub table1: String,
    pub column1: String,
    pub table2: String,
    pub column2: String,
    pub relation_type: String,
}

/// 学习阶段的结构化结论
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LearnResult {
    #[serde(default)]
    pub tables: Vec<LearnTable>,
    #[serde(default)]
    pub columns: Vec<LearnColumn>,
    #[serde(default)]
    pub relations: Vec<LearnRelation>,
}

/// AI 给单个列建议的注释
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AiColumnComment {
    #[serde(rename = "c")]
    pub column: String,
    #[serde(rename = "v", default)]
    pub comment: String,
}

/// AI 给一张表及其列建议的注释
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AiTableComments {
    #[serde(rename = "t")]
    pub table: String,
    #[serde(rename = "v", default)]
    pub comment: String,
    #[serde(default)]
    pub cols: Vec<AiColumnComment>,
}

pub fn parse_ai_comments(text: &str) -> Result<AiTableComments, PipelineError> {
    let v = extract_json(text)?;
    let table = v
        .get("table")
        .cloned()
        .ok_or_else(|| PipelineError::Parse("missing table field".to_string()))?;
    serde_json::from_value(table).map_err(|e| PipelineError::Parse(format!("ai comments: {}", e)))
}

/// 从 AI 回复中提取 JSON 对象：优先 ```json 围栏，其次整体解析，最后截取首尾花括号
pub fn extract_json(text: &str) -> Result<Value, PipelineError> {
    let text = text.trim();

    let re = Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").unwrap();
    if let Some(caps) = re.captures(text) {
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        return serde_json::from_str(inner)
            .map_err(|e| PipelineError::Parse(format!("fenced json: {}", e)));
    }

    if let Ok(v) = serde_json::from_str::<Value>(text) {
        if v.is_object() {
            return Ok(v);
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&text[start..=end]) {
                if v.is_object() {
                    return Ok(v);
                }
            }
        }
    }

    Err(PipelineError::Parse(format!(
        "no json object in response: {}",
        truncate(text, 200)
    )))
}

pub fn parse_related_columns(text: &str) -> Result<RelatedColumns, PipelineError> {
    let v = extract_json(text)?;
    serde_json::from_value(v).map_err(|e| PipelineError::Parse(format!("related columns: {}", e)))
}

pub fn parse_sql_answer(text: &str) -> Result<String, PipelineError> {
    let v = extract_json(text)?;
    let sql = v
        .get("sql")
        .and_then(|s| s.as_str())
        .map(str::trim)
        .unwrap_or_default();
    if sql.is_empty() {
        return Err(PipelineError::Parse("missing sql field".to_string()));
    }
    Ok(sql.to_string())
}

pub fn parse_learn_result(text: &str) -> Result<LearnResult, PipelineError> {
    let v = extract_json(text)?;
    serde_json::from_value(v).map_err(|e| PipelineError::Parse(format!("learn result: {}", e)))
}

pub fn parse_optimized_question(text: &str) -> Result<String, PipelineError> {
    let v = extract_json(text)?;
    v.get("result")
        .and_then(|s| s.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PipelineError::Parse("missing result field".to_string()))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let text = "好的，结果如下：\n```json\n{\"sql\": \"SELECT 1\"}\n```\n";
        assert_eq!(parse_sql_answer(text).unwrap(), "SELECT 1");
    }

    #[test]
    fn extracts_bare_json() {
        let text = r#"{"sql": "SELECT count(*) FROM orders"}"#;
        assert_eq!(parse_sql_answer(text).unwrap(), "SELECT count(*) FROM orders");
    }

    #[test]
    fn extracts_json_embedded_in_prose() {
        let text = "以下是生成结果 {\"sql\": \"SELECT 1\"} 供参考";
        assert_eq!(parse_sql_answer(text).unwrap(), "SELECT 1");
    }

    #[test]
    fn malformed_response_is_parse_error() {
        let err = parse_sql_answer("抱歉，我无法回答这个问题").unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));

        let err = parse_sql_answer(r#"{"answer": "SELECT 1"}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[test]
    fn parses_related_columns_shape() {
        let text = r#"{"tables": [{"t": "orders", "d": "订单"}],
                       "columns": [{"t": "orders", "c": "amount", "d": "金额"}]}"#;
        let related = parse_related_columns(text).unwrap();
        assert_eq!(related.tables.len(), 1);
        assert_eq!(related.tables[0].t, "orders");
        assert_eq!(related.columns[0].c, "amount");
    }

    #[test]
    fn parses_learn_result_with_missing_sections() {
        let text = r#"{"tables": [{"table": "orders", "desc": "订单表"}]}"#;
        let learn = parse_learn_result(text).unwrap();
        assert_eq!(learn.tables.len(), 1);
        assert!(learn.columns.is_empty());
        assert!(learn.relations.is_empty());
    }
}
