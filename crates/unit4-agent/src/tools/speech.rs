use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use unit4_agent_core::tool::{Tool, ToolResult};

use super::{Download, download};

const DEFAULT_MODEL: &str = "openai/whisper-large-v3";
// Upload limit of the Whisper-compatible APIs.
const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Error)]
enum TranscriptionError {
    #[error("failed to download the audio: {0}")]
    Download(#[source] reqwest::Error),
    #[error(
        "audio file too large ({0} bytes, max {max})",
        max = MAX_AUDIO_BYTES
    )]
    TooLarge(usize),
    #[error("transcription request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("transcription API error ({0}): {1}")]
    Api(StatusCode, String),
    #[error("transcription response has no text")]
    MissingText,
}

/// Parameters of [`SpeechRecognitionTool`].
#[derive(Deserialize, JsonSchema)]
pub struct SpeechRecognitionParameters {
    #[schemars(
        description = "URL of the audio file to transcribe, no extension \
                       needed."
    )]
    audio_url: String,
}

/// A tool that transcribes audio with a Whisper-compatible API.
pub struct SpeechRecognitionTool {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    parameter_schema: Value,
}

impl SpeechRecognitionTool {
    /// Creates a tool that posts to `{base_url}/audio/transcriptions`.
    pub fn new<S: Into<String>>(
        client: Client,
        base_url: &str,
        api_key: S,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/');
        Self {
            client,
            api_url: format!("{base_url}/audio/transcriptions"),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            parameter_schema: schema_for!(SpeechRecognitionParameters)
                .to_value(),
        }
    }

    /// Sets the transcription model.
    #[inline]
    pub fn with_model<S: Into<String>>(self, model: S) -> Self {
        Self {
            model: model.into(),
            ..self
        }
    }
}

impl Tool for SpeechRecognitionTool {
    type Input = SpeechRecognitionParameters;

    fn name(&self) -> &str {
        "speech_recognition"
    }

    fn description(&self) -> &str {
        "Converts the speech in an audio file to text."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: SpeechRecognitionParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        let api_url = self.api_url.clone();
        let api_key = self.api_key.clone();
        let model = self.model.clone();
        async move {
            let audio_url = input.audio_url.trim();
            match transcribe(&client, &api_url, &api_key, &model, audio_url)
                .await
            {
                Ok(text) => Ok(text),
                Err(err) => {
                    warn!("failed to transcribe {audio_url}: {err}");
                    Ok(format!("Error: {err}"))
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct TranscriptionBody {
    text: Option<String>,
}

async fn transcribe(
    client: &Client,
    api_url: &str,
    api_key: &str,
    model: &str,
    audio_url: &str,
) -> Result<String, TranscriptionError> {
    let Download {
        bytes,
        content_type,
    } = download(client, audio_url)
        .await
        .map_err(TranscriptionError::Download)?;
    if bytes.len() > MAX_AUDIO_BYTES {
        return Err(TranscriptionError::TooLarge(bytes.len()));
    }

    let (file_name, mime) = audio_file_name(audio_url, content_type.as_deref());
    debug!("transcribing {} bytes as {file_name} ({mime})", bytes.len());
    let file_part = Part::bytes(bytes).file_name(file_name).mime_str(mime)?;
    let form = Form::new()
        .part("file", file_part)
        .text("model", model.to_owned())
        .text("response_format", "json");

    let resp = client
        .post(api_url)
        .bearer_auth(api_key)
        .multipart(form)
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(TranscriptionError::Api(status, api_error_message(&body)));
    }

    let body: TranscriptionBody = resp.json().await?;
    body.text.ok_or(TranscriptionError::MissingText)
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value["error"]["message"].as_str().map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| body.trim().to_owned())
}

/// Picks the upload file name and MIME type, first from the extension in
/// the URL, then from the response content type.
fn audio_file_name(
    url: &str,
    content_type: Option<&str>,
) -> (String, &'static str) {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    if let Some((_, ext)) = last_segment.rsplit_once('.') {
        if let Some((ext, mime)) = audio_format_by_extension(ext) {
            return (format!("audio.{ext}"), mime);
        }
    }

    let essence = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase());
    match essence.as_deref().and_then(audio_format_by_mime) {
        Some((ext, mime)) => (format!("audio.{ext}"), mime),
        None => ("audio.mp3".to_owned(), "audio/mpeg"),
    }
}

fn audio_format_by_extension(
    ext: &str,
) -> Option<(&'static str, &'static str)> {
    match ext.to_ascii_lowercase().as_str() {
        "flac" => Some(("flac", "audio/flac")),
        "mp3" | "mpeg" | "mpga" => Some(("mp3", "audio/mpeg")),
        "mp4" | "m4a" => Some(("m4a", "audio/mp4")),
        // Uploads named `.oga` are rejected.
        "ogg" | "oga" => Some(("ogg", "audio/ogg")),
        "opus" => Some(("opus", "audio/opus")),
        "wav" => Some(("wav", "audio/wav")),
        "webm" => Some(("webm", "audio/webm")),
        _ => None,
    }
}

fn audio_format_by_mime(
    mime: &str,
) -> Option<(&'static str, &'static str)> {
    match mime {
        "audio/flac" | "audio/x-flac" => Some(("flac", "audio/flac")),
        "audio/mpeg" | "audio/mp3" => Some(("mp3", "audio/mpeg")),
        "audio/mp4" | "audio/x-m4a" => Some(("m4a", "audio/mp4")),
        "audio/ogg" => Some(("ogg", "audio/ogg")),
        "audio/opus" => Some(("opus", "audio/opus")),
        "audio/wav" | "audio/x-wav" | "audio/wave" => {
            Some(("wav", "audio/wav"))
        }
        "audio/webm" => Some(("webm", "audio/webm")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn tool(server: &MockServer) -> SpeechRecognitionTool {
        SpeechRecognitionTool::new(
            Client::new(),
            &format!("{}/v1/", server.uri()),
            "sk-test",
        )
    }

    async fn mount_audio(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/files/recipe"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(vec![0u8; 64]),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_transcribe() {
        let server = MockServer::start().await;
        mount_audio(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "text": "Mix the strawberries with sugar."
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = tool(&server)
            .execute(SpeechRecognitionParameters {
                audio_url: format!("{}/files/recipe", server.uri()),
            })
            .await
            .unwrap();
        assert_eq!(text, "Mix the strawberries with sugar.");
    }

    #[tokio::test]
    async fn test_api_error_is_text() {
        let server = MockServer::start().await;
        mount_audio(&server).await;
        Mock::given(method("POST"))
            .and(path("/v1/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "invalid api key" }
            })))
            .mount(&server)
            .await;

        let text = tool(&server)
            .execute(SpeechRecognitionParameters {
                audio_url: format!("{}/files/recipe", server.uri()),
            })
            .await
            .unwrap();
        assert_eq!(
            text,
            "Error: transcription API error (401 Unauthorized): \
             invalid api key"
        );
    }

    #[tokio::test]
    async fn test_download_error_is_text() {
        let server = MockServer::start().await;
        let text = tool(&server)
            .execute(SpeechRecognitionParameters {
                audio_url: format!("{}/files/missing", server.uri()),
            })
            .await
            .unwrap();
        assert!(text.starts_with("Error: failed to download the audio"));
    }

    #[test]
    fn test_audio_file_name() {
        assert_eq!(
            audio_file_name("https://x.test/a/voice.OGA?dl=1", None),
            ("audio.ogg".to_owned(), "audio/ogg")
        );
        assert_eq!(
            audio_file_name(
                "https://x.test/files/1f97",
                Some("audio/x-wav; charset=binary")
            ),
            ("audio.wav".to_owned(), "audio/wav")
        );
        assert_eq!(
            audio_file_name("https://x.test/files/1f97", None),
            ("audio.mp3".to_owned(), "audio/mpeg")
        );
    }
}
