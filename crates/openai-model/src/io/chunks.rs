use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Response;

#[derive(Debug, PartialEq, Eq)]
pub struct Error(pub String);

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// An adapter for streaming byte chunks out of a response body.
pub struct Chunks {
    inner: ByteStream,
}

impl Chunks {
    pub fn from_response(response: Response) -> Self {
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| Error(err.to_string())));
        Self {
            inner: Box::pin(stream),
        }
    }

    #[cfg(test)]
    pub fn from_static(parts: &[&'static [u8]]) -> Self {
        let parts: Vec<_> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        Self {
            inner: Box::pin(futures_util::stream::iter(parts)),
        }
    }

    #[inline]
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, Error> {
        self.inner.next().await.transpose()
    }
}
