use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use tokio::task::spawn_blocking;
use unit4_agent_core::tool::{Error as ToolError, Tool, ToolResult};
use unit4_agent_table::{StoreError, Table, TableStore};
use unit4_agent_wiki::{WikiClient, WikiPage};

const DEFAULT_LANGUAGE: &str = "en";

/// Parameters of [`WikiTool`].
#[derive(Deserialize, JsonSchema)]
pub struct WikiParameters {
    #[schemars(
        description = "Title of the Wikipedia page, for example \
                       `Python_(programming_language)`."
    )]
    query: String,
    #[schemars(
        description = "Language edition of Wikipedia, for example `en` for \
                       English or `ja` for Japanese. Defaults to `en`."
    )]
    language: Option<String>,
}

/// A tool that reads a Wikipedia page and stores its tables.
pub struct WikiTool {
    client: WikiClient,
    store: TableStore<Table>,
    parameter_schema: Value,
}

impl WikiTool {
    /// Creates a wiki tool that stores tables into `store`.
    #[inline]
    pub fn new(client: WikiClient, store: TableStore<Table>) -> Self {
        Self {
            client,
            store,
            parameter_schema: schema_for!(WikiParameters).to_value(),
        }
    }
}

impl Tool for WikiTool {
    type Input = WikiParameters;

    fn name(&self) -> &str {
        "wiki_tool"
    }

    fn description(&self) -> &str {
        r#"
Gets the content and tables of a Wikipedia page.
Each table is replaced by a placeholder such as {{table_1}} in the content, and is stored under the same key (`table_1`).
Read the content first to see what a table holds, then get the table with `retrieve_csv_storage_tool`.
Calling this tool again replaces all stored tables."#
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: WikiParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let store = self.store.clone();
        async move {
            let language = input
                .language
                .filter(|language| !language.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned());
            let WikiPage { content, tables } = client
                .fetch_page(input.query.trim(), language.trim())
                .await
                .map_err(|err| {
                    ToolError::execution_error().with_reason(err.to_string())
                })?;

            let keys = spawn_blocking(move || replace_tables(&store, tables))
                .await
                .map_err(|_| {
                    ToolError::execution_error()
                        .with_reason("Failed to store tables")
                })?
                .map_err(|err| {
                    ToolError::execution_error().with_reason(err.to_string())
                })?;

            Ok(format_page(&content, &keys))
        }
    }
}

/// Replaces the stored tables with the ones of a page in a single write,
/// so concurrent lookups never leave a mix of two pages behind.
fn replace_tables(
    store: &TableStore<Table>,
    tables: Vec<(String, Table)>,
) -> Result<Vec<String>, StoreError> {
    let keys = tables.iter().map(|(key, _)| key.clone()).collect();
    store.replace_all(tables)?;
    Ok(keys)
}

fn format_page(content: &str, keys: &[String]) -> String {
    if keys.is_empty() {
        return format!("{content}\n\nNo tables were found on this page.");
    }
    format!(
        "{content}\n\nStored tables (read them with \
         `retrieve_csv_storage_tool`): {}",
        keys.join(", ")
    )
}
