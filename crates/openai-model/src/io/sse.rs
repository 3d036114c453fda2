use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field is surfaced. Comment lines (OpenRouter sends
/// `: OPENROUTER PROCESSING` while the upstream model is warming up) and
/// the `event`, `id` and `retry` fields are skipped. An event that is not
/// terminated by a blank line before the stream ends is discarded.
pub struct Sse {
    buf: Vec<u8>,
    data: Option<String>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            data: None,
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            while let Some(line) = self.take_line()? {
                if let Some(event) = self.process_line(&line)? {
                    return Ok(Some(event));
                }
            }

            match self.chunks.next_chunk().await.map_err(Error::ChunksError)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => return Ok(None),
            }
        }
    }

    fn take_line(&mut self) -> Result<Option<String>, Error> {
        let Some(eol_idx) = self.buf.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let mut line: Vec<u8> = self.buf.drain(..=eol_idx).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map(Some)
            .map_err(|_| Error::InvalidPayload)
    }

    fn process_line(&mut self, line: &str) -> Result<Option<String>, Error> {
        if line.is_empty() {
            // Blank line dispatches the event collected so far.
            return Ok(self.data.take());
        }
        if line.starts_with(':') {
            trace!("sse comment: {line}");
            return Ok(None);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => {
                (field, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "data" => {
                let data = self.data.get_or_insert_with(String::new);
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value);
            }
            "event" | "id" | "retry" => {}
            _ => trace!("ignoring unknown sse field: {field}"),
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_normal_events() {
        let chunks = Chunks::from_static(&[b"data: hello\n\n", b"data: bye\n\n"]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_across_chunks() {
        let chunks = Chunks::from_static(&[b"data:", b" hello\r\n", b"\r\n"]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multibyte_char_split() {
        // "é" is 0xC3 0xA9 in UTF-8.
        let chunks = Chunks::from_static(&[b"data: caf\xC3", b"\xA9\n\n"]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "café");
    }

    #[tokio::test]
    async fn test_comments_and_other_fields() {
        let chunks = Chunks::from_static(&[
            b": OPENROUTER PROCESSING\n\n",
            b"event: message\nid: 7\ndata:{\"a\":1}\n\n",
        ]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "{\"a\":1}");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multiline_data() {
        let chunks = Chunks::from_static(&[b"data: a\ndata: b\n\n"]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "a\nb");
    }

    #[tokio::test]
    async fn test_unknown_fields_ignored() {
        let chunks = Chunks::from_static(&[
            b"xxxxxx\n\n",
            b"vendor: keep-alive\ndata: hello\n\n",
        ]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let chunks = Chunks::from_static(&[b"data: hello\n", b"data: bye\n"]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap(), None);

        let chunks = Chunks::from_static(&[b"data: \xFF\n\n"]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);
    }
}
