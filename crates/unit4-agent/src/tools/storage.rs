use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::spawn_blocking;
use unit4_agent_core::tool::{Error as ToolError, Tool, ToolResult};
use unit4_agent_table::{Table, TableStore};

/// Parameters of [`RetrieveCsvStorageTool`].
#[derive(Deserialize, JsonSchema)]
pub struct RetrieveCsvStorageParameters {
    #[schemars(description = "Key of the stored table, such as `table_1`.")]
    key: String,
}

/// A tool that reads a table saved by the wiki tool.
pub struct RetrieveCsvStorageTool {
    store: TableStore<Table>,
    parameter_schema: Value,
}

impl RetrieveCsvStorageTool {
    /// Creates a tool that reads from `store`.
    #[inline]
    pub fn new(store: TableStore<Table>) -> Self {
        Self {
            store,
            parameter_schema: schema_for!(RetrieveCsvStorageParameters)
                .to_value(),
        }
    }
}

impl Tool for RetrieveCsvStorageTool {
    type Input = RetrieveCsvStorageParameters;

    fn name(&self) -> &str {
        "retrieve_csv_storage_tool"
    }

    fn description(&self) -> &str {
        "Retrieves a stored table by its key and returns it as a markdown \
         table."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: RetrieveCsvStorageParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let store = self.store.clone();
        async move {
            let key = input.key.trim().to_owned();
            let fetch_key = key.clone();
            let fetched = spawn_blocking(move || store.fetch(&fetch_key))
                .await
                .map_err(|_| {
                    ToolError::execution_error()
                        .with_reason("Failed to read the storage")
                })?;

            match fetched {
                Ok(Some(table)) => Ok(table.to_markdown()),
                Ok(None) => Err(ToolError::execution_error()
                    .with_reason(format!("No data found for key: {key}"))),
                // Reported as output so the model can try another key.
                Err(err) => Ok(format!("Error retrieving data: {err}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn params(key: &str) -> RetrieveCsvStorageParameters {
        RetrieveCsvStorageParameters {
            key: key.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_retrieve_table() {
        let dir = tempdir().unwrap();
        let store = TableStore::open(dir.path(), "wiki_tables", true).unwrap();
        let table = Table::new(
            vec!["Year".to_owned(), "Album".to_owned()],
            vec![vec!["1972".to_owned(), "Hasta la victoria".to_owned()]],
        );
        store.save("table_2", &table).unwrap();

        let tool = RetrieveCsvStorageTool::new(store);
        let result = tool.execute(params(" table_2 ")).await.unwrap();
        assert_eq!(result, table.to_markdown());
    }

    #[tokio::test]
    async fn test_missing_key() {
        let dir = tempdir().unwrap();
        let store = TableStore::open(dir.path(), "wiki_tables", true).unwrap();
        let tool = RetrieveCsvStorageTool::new(store);
        let err = tool.execute(params("table_7")).await.unwrap_err();
        assert_eq!(err.reason(), "No data found for key: table_7");
    }

    #[tokio::test]
    async fn test_corrupted_store_is_reported() {
        let dir = tempdir().unwrap();
        let store = TableStore::open(dir.path(), "wiki_tables", true).unwrap();
        fs::write(store.path(), "not json").unwrap();

        let tool = RetrieveCsvStorageTool::new(store);
        let result = tool.execute(params("table_1")).await.unwrap();
        assert!(result.starts_with("Error retrieving data: "));
    }
}
