use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::future::{poll_fn, ready};
use std::pin::Pin;
use std::task::{self, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use unit4_agent_model::{
    ContentPart, ErrorKind, ModelFinishReason, ModelMessage, ModelProvider,
    ModelProviderError, ModelRequest, ModelResponse, ModelResponseEvent,
    TokenUsage,
};

#[derive(Debug)]
struct EchoError(ErrorKind);

impl Display for EchoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Error for EchoError {}

impl ModelProviderError for EchoError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// Streams "You said ..." word by word, then reports usage and stops.
struct EchoResponse {
    words: VecDeque<String>,
    usage: Option<TokenUsage>,
    completed: bool,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for EchoResponse {
    type Error = EchoError;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        let sleep = this
            .sleep
            .get_or_insert_with(|| Box::pin(sleep(Duration::from_millis(1))));
        ready!(sleep.as_mut().poll(cx));
        this.sleep = None;

        if let Some(mut word) = this.words.pop_front() {
            if !this.words.is_empty() {
                word.push(' ');
            }
            return Poll::Ready(Ok(Some(ModelResponseEvent::MessageDelta(
                word,
            ))));
        }
        if let Some(usage) = this.usage.take() {
            return Poll::Ready(Ok(Some(ModelResponseEvent::Usage(usage))));
        }
        if !this.completed {
            this.completed = true;
            return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                ModelFinishReason::Stop,
            ))));
        }
        Poll::Ready(Ok(None))
    }
}

struct EchoProvider;

impl ModelProvider for EchoProvider {
    type Error = EchoError;
    type Response = EchoResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let Some(ModelMessage::User(parts)) = req.messages.last() else {
            return ready(Err(EchoError(ErrorKind::Other)));
        };

        let mut words = VecDeque::from(["You".to_owned(), "said".to_owned()]);
        let mut images = 0;
        for part in parts {
            match part {
                ContentPart::Text(text) => {
                    words.extend(text.split(' ').map(ToString::to_string))
                }
                ContentPart::ImageUrl(_) => images += 1,
            }
        }
        if images > 0 {
            words.push_back(format!("(+{images} images)"));
        }

        ready(Ok(EchoResponse {
            usage: Some(TokenUsage {
                input_tokens: req.messages.len() as u64,
                output_tokens: words.len() as u64,
            }),
            words,
            completed: false,
            sleep: None,
        }))
    }
}

async fn collect(mut resp: EchoResponse) -> (String, TokenUsage) {
    let mut text = String::new();
    let mut usage = TokenUsage::default();
    loop {
        let event = poll_fn(|cx| Pin::new(&mut resp).poll_next_event(cx))
            .await
            .unwrap();
        match event {
            Some(ModelResponseEvent::MessageDelta(delta)) => {
                text.push_str(&delta)
            }
            Some(ModelResponseEvent::Usage(u)) => usage += u,
            Some(ModelResponseEvent::Completed(reason)) => {
                assert_eq!(reason, ModelFinishReason::Stop)
            }
            Some(event) => unreachable!("unexpected event: {event:?}"),
            None => break,
        }
    }
    (text, usage)
}

#[tokio::test]
async fn test_text_completion() {
    let req = ModelRequest {
        messages: vec![ModelMessage::user_text("Good morning")],
        tools: vec![],
    };
    let resp = EchoProvider.send_request(&req).await.unwrap();
    let (text, usage) = collect(resp).await;
    assert_eq!(text, "You said Good morning");
    assert_eq!(usage.total(), 5);
}

#[tokio::test]
async fn test_multimodal_input() {
    let req = ModelRequest {
        messages: vec![ModelMessage::User(vec![
            ContentPart::Text("What is this?".to_owned()),
            ContentPart::ImageUrl("https://example.com/cat.png".to_owned()),
        ])],
        tools: vec![],
    };
    let resp = EchoProvider.send_request(&req).await.unwrap();
    let (text, _) = collect(resp).await;
    assert_eq!(text, "You said What is this? (+1 images)");
}

#[tokio::test]
async fn test_error() {
    let req = ModelRequest::default();
    let err = EchoProvider.send_request(&req).await.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Other);
}
