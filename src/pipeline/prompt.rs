//! 各阶段 prompt 的拼装。统一要求模型只输出 JSON，便于 parser 提取

pub const SYSTEM: &str =
    "You are a data engineering assistant. Always reply with exactly the JSON object requested, nothing else.";

fn push_section(lines: &mut Vec<String>, title: &str, content: &str) {
    if content.trim().is_empty() {
        return;
    }
    lines.push(format!("# {}", title));
    lines.push(content.trim().to_string());
    lines.push(String::new());
}

fn push_question(lines: &mut Vec<String>, question: &str, supplement: Option<&str>) {
    lines.push("# Question".to_string());
    lines.push(question.trim().to_string());
    if let Some(supplement) = supplement {
        if !supplement.trim().is_empty() {
            lines.push(String::new());
            lines.push("Supplement:".to_string());
            lines.push(supplement.trim().to_string());
        }
    }
    lines.push(String::new());
}

/// 推断问题可能涉及的表和字段
pub fn gen_related_columns(
    question: &str,
    supplement: Option<&str>,
    doc_content: &str,
    sql_content: &str,
) -> String {
    let mut lines = Vec::new();
    lines.push(
        "You are a database analyst. Based on the question and reference material below, \
         list every table and column that might be involved in answering it."
            .to_string(),
    );
    lines.push(String::new());
    push_question(&mut lines, question, supplement);
    push_section(&mut lines, "Reference Documents", doc_content);
    push_section(&mut lines, "Similar SQL Examples", sql_content);
    lines.push("# Output".to_string());
    lines.push(
        "Return ONLY a JSON object, no markdown, no explanations:".to_string(),
    );
    lines.push(
        r#"{"tables": [{"t": "<table name>", "d": "<what the table stores>"}], "columns": [{"t": "<table name>", "c": "<column name>", "d": "<what the column means>"}]}"#
            .to_string(),
    );
    lines.push(
        "Guess generously: include synonyms and plausible alternatives, they are used for \
         semantic search, not as the final answer."
            .to_string(),
    );
    lines.join("\n")
}

/// 生成最终 SQL
#[allow(clippy::too_many_arguments)]
pub fn gen_sql(
    question: &str,
    supplement: Option<&str>,
    doc_content: &str,
    sql_content: &str,
    table_structure: &str,
    relation_structure: &str,
    rules: &str,
    db_type: &str,
    db_version: Option<&str>,
) -> String {
    let mut lines = Vec::new();
    let dialect = match db_version {
        Some(v) if !v.is_empty() => format!("{} {}", db_type, v),
        _ => db_type.to_string(),
    };
    lines.push(format!(
        "You are an expert {} engineer. Write one SQL statement that answers the question \
         below, using ONLY the tables and columns listed in Table Structure.",
        dialect
    ));
    lines.push(String::new());
    push_question(&mut lines, question, supplement);
    push_section(&mut lines, "Table Structure", table_structure);
    push_section(&mut lines, "Table Relationships", relation_structure);
    push_section(&mut lines, "Reference Documents", doc_content);
    push_section(&mut lines, "Similar SQL Examples", sql_content);
    push_section(&mut lines, "Rules", rules);
    lines.push("# Output".to_string());
    lines.push("Return ONLY a JSON object, no markdown, no explanations:".to_string());
    lines.push(r#"{"sql": "<the SQL statement>"}"#.to_string());
    lines.join("\n")
}

/// 从确认正确的 SQL 反推表/字段描述和表关系
pub fn learn(
    question: &str,
    supplement: Option<&str>,
    sql: &str,
    table_structure: &str,
    sql_structure: &str,
) -> String {
    let mut lines = Vec::new();
    lines.push(
        "The SQL below was confirmed to correctly answer the question. Study it and \
         summarize what can be learned about the schema."
            .to_string(),
    );
    lines.push(String::new());
    push_question(&mut lines, question, supplement);
    lines.push("# Confirmed SQL".to_string());
    lines.push("```sql".to_string());
    lines.push(sql.trim().to_string());
    lines.push("```".to_string());
    lines.push(String::new());
    push_section(&mut lines, "Table Structure", table_structure);
    push_section(&mut lines, "Similar SQL Examples", sql_structure);
    lines.push("# Output".to_string());
    lines.push("Return ONLY a JSON object, no markdown, no explanations:".to_string());
    lines.push(
        r#"{"tables": [{"table": "<name>", "desc": "<improved table description>"}], "columns": [{"table": "<name>", "column": "<name>", "desc": "<improved column description>"}], "relations": [{"table1": "<name>", "column1": "<name>", "table2": "<name>", "column2": "<name>", "relation_type": "<1-1|1-n|n-1|n-n>"}]}"#
            .to_string(),
    );
    lines.push(
        "Only include tables and columns the SQL actually touches. relation_type describes \
         table1 relative to table2."
            .to_string(),
    );
    lines.join("\n")
}

/// 改写用户问题，使其更明确、更利于检索
pub fn optimize_question(question: &str) -> String {
    let mut lines = Vec::new();
    lines.push(
        "Rewrite the question below so it is unambiguous and self-contained, keeping the \
         original language and intent. Do not answer it."
            .to_string(),
    );
    lines.push(String::new());
    push_question(&mut lines, question, None);
    lines.push("# Output".to_string());
    lines.push("Return ONLY a JSON object, no markdown, no explanations:".to_string());
    lines.push(r#"{"result": "<rewritten question>"}"#.to_string());
    lines.join("\n")
}

/// 为一张表的定义生成更好的中文描述
pub fn gen_ai_comments(table_markdown: &str) -> String {
    let mut lines = Vec::new();
    lines.push(
        "Below is the raw definition of one database table. Write a clear one-sentence \
         description for the table and for every column, in the same language as the \
         existing comments."
            .to_string(),
    );
    lines.push(String::new());
    push_section(&mut lines, "Table Definition", table_markdown);
    lines.push("# Output".to_string());
    lines.push("Return ONLY a JSON object, no markdown, no explanations:".to_string());
    lines.push(
        r#"{"table": {"t": "<table name>", "v": "<table description>", "cols": [{"c": "<column name>", "v": "<column description>"}]}}"#
            .to_string(),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gen_sql_includes_all_sections() {
        let prompt = gen_sql(
            "上月订单总额是多少",
            Some("按客户分组"),
            "docs",
            "examples",
            "## orders",
            "## Table Relationships",
            "金额单位为分",
            "mysql",
            Some("8.0"),
        );
        assert!(prompt.contains("mysql 8.0"));
        assert!(prompt.contains("上月订单总额是多少"));
        assert!(prompt.contains("按客户分组"));
        assert!(prompt.contains("## orders"));
        assert!(prompt.contains("金额单位为分"));
        assert!(prompt.contains(r#"{"sql""#));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let prompt = gen_related_columns("问题", None, "", "");
        assert!(!prompt.contains("Reference Documents"));
        assert!(!prompt.contains("Similar SQL Examples"));
    }
}
