//! Prompt templates for the authoring, repair, and insight calls.

/// Prompt for generating SQL from a question plus schema context.
pub fn sql_generation(schema_context: &str, question: &str) -> String {
    format!(
        "Generate PostgreSQL SQL.\n\n\
         Use only these tables:\n\n\
         {schema_context}\n\
         Return only SQL.\n\n\
         Question: {question}\n"
    )
}

/// Prompt for repairing a query that failed validation.
pub fn sql_repair(schema_context: &str, bad_sql: &str) -> String {
    format!(
        "You are an assistant that fixes SQL queries so they are valid SELECT queries.\n\
         Only return the corrected SQL. Do not return any explanation.\n\
         Schema context:\n{schema_context}\n\
         Broken SQL:\n{bad_sql}\n\n\
         Return a corrected SELECT query using only the available tables."
    )
}

/// Prompt for annotating a multi-row result with an insight.
pub fn insight(question: &str, columns_json: &str, rows_json: &str) -> String {
    format!(
        "User asked: {question}\n\n\
         Columns: {columns_json}\n\
         Sample rows: {rows_json}\n\n\
         Analyze the result and provide key insights.\n\
         Focus on trends, outliers, and notable comparisons."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_prompt_embeds_schema_and_question() {
        let prompt = sql_generation("Table: orders\nColumns: id, amount\n\n", "how many orders");
        assert!(prompt.contains("Table: orders"));
        assert!(prompt.contains("Question: how many orders"));
        assert!(prompt.contains("Return only SQL."));
    }

    #[test]
    fn test_repair_prompt_embeds_broken_sql() {
        let prompt = sql_repair("Table: orders\n", "SELEC * FRM orders");
        assert!(prompt.contains("Broken SQL:\nSELEC * FRM orders"));
        assert!(prompt.contains("valid SELECT queries"));
    }

    #[test]
    fn test_insight_prompt_embeds_samples() {
        let prompt = insight("revenue by month", "[\"month\",\"total\"]", "[[1,2]]");
        assert!(prompt.contains("User asked: revenue by month"));
        assert!(prompt.contains("[[1,2]]"));
    }
}
