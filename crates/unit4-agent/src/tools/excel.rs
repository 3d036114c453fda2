use std::io::Cursor;

use reqwest::Client;
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::spawn_blocking;
use umya_spreadsheet::reader::xlsx;
use unit4_agent_core::tool::{Error as ToolError, Tool, ToolResult};
use unit4_agent_table::{Table, dedupe_column_names};

use super::download;

/// Parameters of [`ReadExcelTool`].
#[derive(Deserialize, JsonSchema)]
pub struct ReadExcelParameters {
    #[schemars(
        description = "URL of the Excel file to read, no extension needed."
    )]
    file_url: String,
}

/// A tool that reads the first sheet of an Excel workbook.
pub struct ReadExcelTool {
    client: Client,
    parameter_schema: Value,
}

impl ReadExcelTool {
    /// Creates a tool that downloads workbooks through `client`.
    #[inline]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            parameter_schema: schema_for!(ReadExcelParameters).to_value(),
        }
    }
}

impl Tool for ReadExcelTool {
    type Input = ReadExcelParameters;

    fn name(&self) -> &str {
        "read_excel"
    }

    fn description(&self) -> &str {
        r#"
Reads an Excel file (.xlsx) from a URL and returns its first sheet as a markdown table.
The first row of the sheet is used as the header."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: ReadExcelParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        async move {
            let file_url = input.file_url.trim();
            let file = download(&client, file_url).await.map_err(|err| {
                let reason = format!("Failed to download {file_url}: {err}");
                ToolError::execution_error().with_reason(reason)
            })?;

            let table = spawn_blocking(move || read_first_sheet(file.bytes))
                .await
                .map_err(|_| {
                    ToolError::execution_error()
                        .with_reason("Failed to read the workbook")
                })??;
            if table.columns.is_empty() {
                return Ok("The first sheet is empty.".to_owned());
            }
            Ok(table.to_markdown())
        }
    }
}

fn read_first_sheet(bytes: Vec<u8>) -> Result<Table, ToolError> {
    let book = xlsx::read_reader(Cursor::new(bytes), true).map_err(|err| {
        ToolError::execution_error()
            .with_reason(format!("Not a valid Excel file: {err}"))
    })?;
    let sheet = book.get_sheet(&0).ok_or_else(|| {
        ToolError::execution_error().with_reason("The workbook has no sheets")
    })?;

    let (max_col, max_row) = sheet.get_highest_column_and_row();
    if max_col == 0 || max_row == 0 {
        return Ok(Table::default());
    }

    let columns = (1..=max_col)
        .map(|col| {
            let name = sheet.get_value((col, 1));
            if name.trim().is_empty() {
                format!("Unnamed: {}", col - 1)
            } else {
                name
            }
        })
        .collect();
    let columns = dedupe_column_names(columns);
    let rows = (2..=max_row)
        .map(|row| {
            (1..=max_col)
                .map(|col| sheet.get_value((col, row)))
                .collect::<Vec<_>>()
        })
        .filter(|cells| cells.iter().any(|cell| !cell.trim().is_empty()))
        .collect();
    Ok(Table::new(columns, rows))
}
