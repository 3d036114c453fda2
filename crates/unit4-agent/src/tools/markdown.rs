use std::future::ready;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use unit4_agent_core::tool::{Tool, ToolResult};
use unit4_agent_table::Table;

/// A table as the model writes it.
#[derive(Deserialize, JsonSchema)]
pub struct TableInput {
    #[schemars(description = "Column names.")]
    columns: Vec<String>,
    #[schemars(description = "Rows of cells, in column order.")]
    rows: Vec<Vec<Value>>,
}

/// Parameters of [`ConvertTableToMarkdownTool`].
#[derive(Deserialize, JsonSchema)]
pub struct ConvertTableToMarkdownParameters {
    #[schemars(description = "The table to render.")]
    table: TableInput,
}

/// A tool that renders a table as markdown.
pub struct ConvertTableToMarkdownTool {
    parameter_schema: Value,
}

impl ConvertTableToMarkdownTool {
    /// Creates a new markdown tool.
    #[inline]
    pub fn new() -> Self {
        Self {
            parameter_schema: schema_for!(ConvertTableToMarkdownParameters)
                .to_value(),
        }
    }
}

impl Default for ConvertTableToMarkdownTool {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for ConvertTableToMarkdownTool {
    type Input = ConvertTableToMarkdownParameters;

    fn name(&self) -> &str {
        "convert_table_to_markdown"
    }

    fn description(&self) -> &str {
        "Converts a table given as column names and rows into a markdown \
         table."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: ConvertTableToMarkdownParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let TableInput { columns, rows } = input.table;
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect();
        ready(Ok(Table::new(columns, rows).to_markdown()))
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_convert() {
        let input: ConvertTableToMarkdownParameters =
            serde_json::from_value(json!({
                "table": {
                    "columns": ["Name", "Score"],
                    "rows": [["Ann", 3.5], ["Bob", null], [true]]
                }
            }))
            .unwrap();
        let result = ConvertTableToMarkdownTool::new()
            .execute(input)
            .await
            .unwrap();

        let expected = Table::new(
            vec!["Name".to_owned(), "Score".to_owned()],
            vec![
                vec!["Ann".to_owned(), "3.5".to_owned()],
                vec!["Bob".to_owned(), String::new()],
                vec!["true".to_owned()],
            ],
        );
        assert_eq!(result, expected.to_markdown());
    }
}
