use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use serde_json::Value;
use unit4_agent_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    TokenUsage, ToolCallRequest,
};

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, ToolCallDelta};

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

struct PartialState {
    sse: Sse,
    id: Option<String>,
    // Keyed by the `index` the server assigns, so the fragments of one call
    // are merged together and calls are emitted in index order.
    tool_calls: BTreeMap<u32, PartialToolCall>,
    // Events decoded from the stream but not yet handed out. A single chunk
    // can carry several events (a delta plus a finish reason, for example).
    queued: VecDeque<ModelResponseEvent>,
    finish_reason: Option<ModelFinishReason>,
    done: bool,
}

impl PartialState {
    fn new(sse: Sse) -> Self {
        Self {
            sse,
            id: None,
            tool_calls: Default::default(),
            queued: Default::default(),
            finish_reason: None,
            done: false,
        }
    }

    fn merge_tool_calls(&mut self, deltas: Vec<ToolCallDelta>) {
        for delta in deltas {
            let index = delta
                .index
                .unwrap_or_else(|| self.tool_calls.len() as u32);
            let partial = self.tool_calls.entry(index).or_default();
            if let Some(id) = delta.id {
                partial.id.push_str(&id);
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    partial.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    partial.arguments.push_str(&arguments);
                }
            }
        }
    }

    fn flush_tool_calls(&mut self) {
        let tool_calls = std::mem::take(&mut self.tool_calls);
        for (_, call) in tool_calls {
            let arguments = if call.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.arguments).unwrap_or_else(|err| {
                    warn!("unparsable tool arguments for {}: {err}", call.name);
                    Value::Null
                })
            };
            self.queued
                .push_back(ModelResponseEvent::ToolCall(ToolCallRequest {
                    id: call.id,
                    name: call.name,
                    arguments,
                }));
        }
    }

    fn finish(&mut self) {
        let had_tool_calls = !self.tool_calls.is_empty();
        self.flush_tool_calls();
        let reason = self.finish_reason.take().unwrap_or(if had_tool_calls {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        });
        self.queued
            .push_back(ModelResponseEvent::Completed(reason));
        self.done = true;
    }

    fn apply_chunk(&mut self, chunk: ChatCompletionChunk) -> Result<(), Error> {
        if let Some(err) = chunk.error {
            let kind = if err.is_rate_limit() {
                ErrorKind::RateLimitExceeded
            } else {
                ErrorKind::Other
            };
            return Err(Error::new(err.message, kind));
        }

        if let Some(id) = chunk.id {
            if self.id.get_or_insert_with(|| id.clone()) != &id {
                return Err(Error::new("chunk id mismatch", ErrorKind::Other));
            }
        }

        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    self.queued
                        .push_back(ModelResponseEvent::MessageDelta(content));
                }
            }
            if let Some(tool_calls) = choice.delta.tool_calls {
                self.merge_tool_calls(tool_calls);
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(match reason.as_str() {
                    "tool_calls" => ModelFinishReason::ToolCalls,
                    "length" => ModelFinishReason::Length,
                    _ => ModelFinishReason::Stop,
                });
                self.flush_tool_calls();
            }
        }

        // With `include_usage`, the usage arrives in a trailing chunk that
        // has no choices, after the finish reason.
        if let Some(usage) = chunk.usage {
            self.queued.push_back(ModelResponseEvent::Usage(TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            }));
        }
        Ok(())
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState::new(sse);
        Self {
            next_event_fut: Some(Box::pin(next_event(partial_state))),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        *this.next_event_fut = Some(Box::pin(next_event(partial_state)));
        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    loop {
        if let Some(event) = partial_state.queued.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.done {
            return Ok((None, partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                partial_state.finish();
                continue;
            }
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            partial_state.finish();
            continue;
        }

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        partial_state.apply_chunk(chunk)?;
    }
}
