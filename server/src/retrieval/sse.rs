use rocket::futures::TryStreamExt;
use tokio_stream::{Stream, StreamExt};
use tokio_util::{
    codec::{FramedRead, LinesCodec},
    io::StreamReader,
};

use crate::retrieval::RetrievalError;

/// A server-sent event: the event name (if any) and its data lines joined by newlines
#[derive(Debug, Default, PartialEq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Accumulates SSE lines until a blank line completes the frame.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    event: Option<String>,
    data: Option<String>,
}

impl SseFrameDecoder {
    /// Process one line (without the line terminator), returning a frame if the line completed one.
    pub fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return self.finish();
        }
        if line.starts_with(':') {
            return None; // comment / keep-alive
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => {
                let data = self.data.get_or_insert_with(String::new);
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value);
            }
            _ => {}
        }
        None
    }

    /// Flush the pending frame, if it has any data.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        let data = self.data.take()?;
        Some(SseFrame { event, data })
    }
}

/// Get a stream of SSE frames from the retrieval service response.
pub fn get_sse_frames(
    response: reqwest::Response,
) -> impl Stream<Item = Result<SseFrame, RetrievalError>> {
    let stream_reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
    let mut line_reader = Box::pin(FramedRead::new(stream_reader, LinesCodec::new()));

    async_stream::stream! {
        let mut decoder = SseFrameDecoder::default();
        while let Some(line_result) = line_reader.next().await {
            match line_result {
                Ok(line) => {
                    if let Some(frame) = decoder.push_line(&line) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(RetrievalError::Stream(e.to_string()));
                    return;
                }
            }
        }
        if let Some(frame) = decoder.finish() {
            yield Ok(frame);
        }
    }
}
