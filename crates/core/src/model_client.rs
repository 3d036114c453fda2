use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use tracing::Instrument;
use unit4_agent_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent, TokenUsage, ToolCallRequest,
};

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type DeltaFn = Arc<dyn Fn(&str) + Send + Sync>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, DeltaFn) -> BoxedSendRequestFuture + Send + Sync
>;

/// How rate-limited requests are retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound of a single delay.
    pub max_interval: Duration,
    /// Give up once this much time has passed since the first attempt.
    /// `None` retries forever.
    pub max_elapsed_time: Option<Duration>,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            max_elapsed_time: Some(Duration::ZERO),
        }
    }

    fn to_backoff(self) -> impl Backoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_interval(self.max_interval)
            .with_max_elapsed_time(self.max_elapsed_time)
            .build()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: Some(Duration::from_secs(120)),
        }
    }
}

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    retry_policy: RetryPolicy,
}

impl ModelClient {
    /// Wraps a provider with the default retry policy.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[inline]
    pub fn with_retry_policy(self, retry_policy: RetryPolicy) -> Self {
        Self {
            retry_policy,
            ..self
        }
    }

    /// Returns the retry policy in use.
    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Sends a request and returns the whole response.
    ///
    /// Message deltas are forwarded to `on_delta` as they arrive. A request
    /// that fails with a retryable error is sent again after a backoff, in
    /// which case the deltas received before the failure are not revoked.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_delta: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<ModelClientResponse, Box<dyn ModelProviderError>> {
        let on_delta: DeltaFn = Arc::new(on_delta);
        let operation = || {
            let fut = (self.handler_fn)(req.clone(), Arc::clone(&on_delta));
            async move {
                fut.await.map_err(|err| {
                    if err.kind().is_retryable() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        };
        let notify = |err: Box<dyn ModelProviderError>, after: Duration| {
            warn!("model request failed ({err}), retrying in {after:?}");
        };
        backoff::future::retry_notify(
            self.retry_policy.to_backoff(),
            operation,
            notify,
        )
        .await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug, Default)]
pub struct ModelClientResponse {
    /// The text the model produced.
    pub transcript: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
    /// Token usage reported for this response.
    pub usage: TokenUsage,
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_delta: DeltaFn,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut collected = ModelClientResponse::default();

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                on_delta(&msg);
                collected.transcript.push_str(&msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                collected.tool_calls.push(req);
            }
            ModelResponseEvent::Usage(usage) => {
                collected.usage += usage;
            }
            ModelResponseEvent::Completed(reason) => {
                collected.finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");
    Ok(collected)
}
