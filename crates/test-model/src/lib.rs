//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use unit4_agent_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: VecDeque<PresetEvent>,
    finish_reason: Option<ModelFinishReason>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        let delay = this.delay;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        if let Some(event) = this.events.pop_front() {
            let event = match event {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg)
                }
                PresetEvent::ToolCall(req) => ModelResponseEvent::ToolCall(req),
                PresetEvent::Usage(usage) => ModelResponseEvent::Usage(usage),
            };
            return Poll::Ready(Ok(Some(event)));
        }

        // `None` after the completion event, also when polled again.
        let completed =
            this.finish_reason.take().map(ModelResponseEvent::Completed);
        Poll::Ready(Ok(completed))
    }
}

struct ScriptedResponse {
    preset: PresetResponse,
    failures_left: Option<u64>,
}

#[derive(Default)]
struct Script {
    responses: VecDeque<ScriptedResponse>,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to push the preset responses. Each
/// successful request consumes the next preset in order, no matter what
/// the request contains. If there are no presets left, an error will be
/// returned. All received requests are recorded for later inspection.
///
/// Clones share the same script, so a test can keep one clone around to
/// inspect the requests after handing the other to an agent.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    /// Appends a preset response to the script.
    #[inline]
    pub fn push_response(&self, preset: PresetResponse) {
        let failures_left = preset.failures;
        self.lock().responses.push_back(ScriptedResponse {
            preset,
            failures_left,
        });
    }

    /// Sets the delay before every event.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns a copy of every request received so far.
    #[inline]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    /// Returns the number of presets not consumed yet.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.lock().responses.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_response(
        &self,
        req: &ModelRequest,
    ) -> Result<PresetResponse, Error> {
        let mut script = self.lock();
        script.requests.push(req.clone());

        let Some(front) = script.responses.front_mut() else {
            return Err(Error {
                message: "script exhausted",
                kind: ErrorKind::Other,
            });
        };
        match front.failures_left {
            Some(0) if front.preset.failures == Some(0) => {
                return Err(Error {
                    message: "preset always fails",
                    kind: ErrorKind::Other,
                });
            }
            Some(n) if n > 0 => {
                front.failures_left = Some(n - 1);
                return Err(Error {
                    message: "scripted rate limit",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
            _ => {}
        }

        script
            .responses
            .pop_front()
            .map(|scripted| scripted.preset)
            .ok_or(Error {
                message: "script exhausted",
                kind: ErrorKind::Other,
            })
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let delay = self.delay.unwrap_or(Duration::from_millis(1));
        let resp = self.next_response(req).map(|preset| {
            let has_tool_call = preset
                .events
                .iter()
                .any(|event| matches!(event, PresetEvent::ToolCall(_)));
            TestModelResponse {
                events: preset.events.into(),
                finish_reason: Some(if has_tool_call {
                    ModelFinishReason::ToolCalls
                } else {
                    ModelFinishReason::Stop
                }),
                delay,
                sleep: None,
            }
        });
        ready(resp)
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use serde_json::json;
    use unit4_agent_model::{ModelMessage, ToolCallRequest};

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Option<ToolCallRequest>, ModelFinishReason) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut tool_call = None;
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
                .unwrap();
            match event {
                ModelResponseEvent::Completed(reason) => {
                    return (msg, tool_call, reason);
                }
                ModelResponseEvent::MessageDelta(delta) => {
                    msg.push_str(&delta);
                }
                ModelResponseEvent::ToolCall(req) => tool_call = Some(req),
                ModelResponseEvent::Usage(_) => {}
            }
        }
    }

    fn request(text: &str) -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::user_text(text)],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let provider = TestModelProvider::default();
        provider.push_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Hello, ".to_owned()),
            PresetEvent::MessageDelta("world!".to_owned()),
        ]));
        provider.push_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Let me check.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "tool:1".to_owned(),
                name: "read_excel".to_owned(),
                arguments: json!({ "file_url": "https://example.com/a" }),
            }),
        ]));

        let resp = provider.send_request(&request("Hi")).await.unwrap();
        let (msg, tool_call, reason) = collect_response(resp).await;
        assert_eq!(msg, "Hello, world!");
        assert!(tool_call.is_none());
        assert_eq!(reason, ModelFinishReason::Stop);

        let resp = provider.send_request(&request("Sales?")).await.unwrap();
        let (msg, tool_call, reason) = collect_response(resp).await;
        assert_eq!(msg, "Let me check.");
        assert_eq!(tool_call.unwrap().name, "read_excel");
        assert_eq!(reason, ModelFinishReason::ToolCalls);

        assert_eq!(provider.requests().len(), 2);
        assert_eq!(provider.remaining(), 0);
        let err = provider.send_request(&request("?")).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let provider = TestModelProvider::default();
        provider.push_response(PresetResponse::text("ok").with_failures(2));

        for _ in 0..2 {
            let err = provider.send_request(&request("Hi")).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        }
        assert!(provider.send_request(&request("Hi")).await.is_ok());

        provider.push_response(PresetResponse::text("never").with_failures(0));
        for _ in 0..3 {
            let err = provider.send_request(&request("Hi")).await.err().unwrap();
            assert_eq!(err.kind(), ErrorKind::Other);
        }
        assert_eq!(provider.remaining(), 1);
    }
}
