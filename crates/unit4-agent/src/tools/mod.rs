//! Tools the agent can use.

mod excel;
mod fetch;
mod markdown;
mod speech;
mod storage;
mod visual_qa;
mod wiki;

pub use excel::{ReadExcelParameters, ReadExcelTool};
pub use fetch::{FetchTextContentParameters, FetchTextContentTool};
pub use markdown::{
    ConvertTableToMarkdownParameters, ConvertTableToMarkdownTool, TableInput,
};
pub use speech::{SpeechRecognitionParameters, SpeechRecognitionTool};
pub use storage::{RetrieveCsvStorageParameters, RetrieveCsvStorageTool};
pub use visual_qa::{VisualQaParameters, VisualQaTool};
pub use wiki::{WikiParameters, WikiTool};

use reqwest::{Client, header};

/// A downloaded file.
struct Download {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

/// Downloads `url`, failing on a non-success status.
async fn download(
    client: &Client,
    url: &str,
) -> Result<Download, reqwest::Error> {
    debug!("downloading {url}");
    let resp = client.get(url).send().await?.error_for_status()?;
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned());
    let bytes = resp.bytes().await?.to_vec();
    Ok(Download {
        bytes,
        content_type,
    })
}
