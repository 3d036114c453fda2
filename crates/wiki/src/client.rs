use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::extract::{WikiPage, extract_page};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Errors from [`WikiClient`].
#[derive(Debug, Error)]
pub enum WikiError {
    /// The API answered with a non-success status.
    #[error("api error: {0} - {1}")]
    Status(StatusCode, String),
    /// The API reported an error, such as a missing page.
    #[error("api error: {0}")]
    Api(String),
    /// The response has neither an error nor parse data.
    #[error("api error: No parse data found")]
    MissingParse,
    /// The language code can't be part of a host name.
    #[error("invalid language code: {0:?}")]
    InvalidLanguage(String),
    /// The request couldn't be sent, or the response couldn't be read.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Deserialize)]
struct ApiResponse {
    parse: Option<ParseData>,
    error: Option<ApiErrorData>,
}

#[derive(Deserialize)]
struct ParseData {
    text: ParseText,
}

#[derive(Deserialize)]
struct ParseText {
    #[serde(rename = "*")]
    html: String,
}

#[derive(Deserialize)]
struct ApiErrorData {
    info: String,
}

/// A client for the MediaWiki parse API of Wikipedia.
#[derive(Clone, Debug)]
pub struct WikiClient {
    client: Client,
    api_url: Option<String>,
}

impl WikiClient {
    /// Creates a client with its own connection pool.
    pub fn new() -> Result<Self, WikiError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Creates a client that sends requests through `client`.
    #[inline]
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            api_url: None,
        }
    }

    /// Sends every request to `api_url` instead of
    /// `https://{language}.wikipedia.org/w/api.php`.
    #[inline]
    pub fn with_api_url<S: Into<String>>(self, api_url: S) -> Self {
        Self {
            api_url: Some(api_url.into()),
            ..self
        }
    }

    /// Fetches the page `title` (e.g. `Mercedes_Sosa`) from the Wikipedia
    /// edition of `language` (e.g. `en`).
    pub async fn fetch_page(
        &self,
        title: &str,
        language: &str,
    ) -> Result<WikiPage, WikiError> {
        let api_url = self.api_url(language)?;
        debug!("fetching wiki page {title:?} from {api_url}");

        let resp = self
            .client
            .get(&api_url)
            .query(&[
                ("action", "parse"),
                ("page", title),
                ("format", "json"),
                ("prop", "text"),
                ("disabletoc", "1"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            warn!("wiki api returned {status}");
            return Err(WikiError::Status(status, body));
        }

        let data: ApiResponse = resp.json().await?;
        if let Some(error) = data.error {
            return Err(WikiError::Api(error.info));
        }
        let Some(parse) = data.parse else {
            return Err(WikiError::MissingParse);
        };

        let page = extract_page(&parse.text.html);
        debug!(
            "extracted {} bytes of text and {} tables",
            page.content.len(),
            page.tables.len()
        );
        Ok(page)
    }

    fn api_url(&self, language: &str) -> Result<String, WikiError> {
        if let Some(api_url) = &self.api_url {
            return Ok(api_url.clone());
        }
        let valid = !language.is_empty()
            && language
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(WikiError::InvalidLanguage(language.to_owned()));
        }
        Ok(format!("https://{language}.wikipedia.org/w/api.php"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> WikiClient {
        WikiClient::new()
            .unwrap()
            .with_api_url(format!("{}/w/api.php", server.uri()))
    }

    #[tokio::test]
    async fn test_fetch_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("action", "parse"))
            .and(query_param("page", "Mercedes_Sosa"))
            .and(query_param("prop", "text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "parse": {
                    "title": "Mercedes Sosa",
                    "pageid": 476992,
                    "text": {
                        "*": "<h2>Life</h2><p>An Argentine singer.</p>\
                              <table class=\"wikitable\">\
                              <tr><th>Year</th></tr><tr><td>1962</td></tr>\
                              </table>"
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let page = client.fetch_page("Mercedes_Sosa", "en").await.unwrap();
        assert_eq!(
            page.content,
            "\n## Life\n\nAn Argentine singer.\n\n{{table_1}}"
        );
        assert_eq!(page.tables.len(), 1);
        assert_eq!(page.tables[0].1.columns, ["Year"]);
    }

    #[tokio::test]
    async fn test_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": {
                    "code": "missingtitle",
                    "info": "The page you specified doesn't exist."
                }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.fetch_page("No_such_page", "en").await.unwrap_err();
        let WikiError::Api(info) = err else {
            panic!("expected an api error, got {err:?}");
        };
        assert!(info.contains("doesn't exist"));
    }

    #[tokio::test]
    async fn test_status_and_missing_parse() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("page", "Broken"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "Empty"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.fetch_page("Broken", "en").await.unwrap_err();
        let WikiError::Status(status, body) = err else {
            panic!("expected a status error, got {err:?}");
        };
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "down");
        let err = client.fetch_page("Empty", "en").await.unwrap_err();
        assert!(matches!(err, WikiError::MissingParse));
    }

    #[tokio::test]
    async fn test_invalid_language() {
        let client = WikiClient::new().unwrap();
        let err = client
            .fetch_page("Mercedes_Sosa", "en.evil.com/")
            .await
            .unwrap_err();
        assert!(matches!(err, WikiError::InvalidLanguage(_)));
    }
}
