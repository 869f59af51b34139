//! Range streaming handler.
//!
//! Every successful answer is a 206 with `Content-Range`, even without a
//! `Range` header, so players treat the resource as seekable from the first
//! request.

use crate::api::AppState;
use crate::error::{Error, Result};
use crate::stream::{self, ByteStream, StreamResponse};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::warn;

/// GET /{path} - Stream a file or archive member
#[utoipa::path(
    get,
    path = "/{path}",
    tag = "stream",
    params(
        ("path" = String, Path, description = "File path under the root, or `archive|member`"),
        ("Range" = Option<String>, Header, description = "Byte range, e.g. `bytes=0-1023`")
    ),
    responses(
        (status = 206, description = "The requested bytes", content_type = "application/octet-stream"),
        (status = 400, description = "Malformed reference", body = crate::error::ApiError),
        (status = 404, description = "No such file or member", body = crate::error::ApiError),
        (status = 416, description = "Range starts past the end", body = crate::error::ApiError),
        (status = 422, description = "Archive cannot be read", body = crate::error::ApiError)
    )
)]
pub async fn stream_resource(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    headers: HeaderMap,
) -> Response {
    let range_header = headers.get(header::RANGE).and_then(|h| h.to_str().ok());
    let cancel = CancellationToken::new();

    match stream::open(&state.config, &reference, range_header, cancel.clone()).await {
        Ok(opened) => match partial_response(opened, cancel) {
            Ok(response) => response,
            Err(e) => e.into_response(),
        },
        Err(e) => e.into_response(),
    }
}

fn partial_response(opened: StreamResponse, cancel: CancellationToken) -> Result<Response> {
    let content_type = determine_content_type(&opened.resource.display_name());
    let body = LengthCheckedBody {
        inner: opened.stream,
        start: opened.range.start,
        expected: opened.content_length,
        sent: 0,
        finished: false,
        _cancel_on_drop: cancel.drop_guard(),
    };

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, opened.content_length.to_string())
        .header(header::CONTENT_RANGE, opened.range.content_range())
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from_stream(body))
        .map_err(|e| Error::Other(format!("failed to build response: {}", e)))
}

/// Response body that refuses to end quietly before `expected` bytes
///
/// A stream that stops short (the source never produced the rest) ends with
/// an error item, which makes the server abort the connection instead of
/// finishing a response whose `Content-Length` was a lie. Dropping the body,
/// which is what happens when the client disconnects, cancels the streamer.
struct LengthCheckedBody {
    inner: ByteStream,
    start: u64,
    expected: u64,
    sent: u64,
    finished: bool,
    _cancel_on_drop: DropGuard,
}

impl Stream for LengthCheckedBody {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                warn!(
                    sent = this.sent,
                    expected = this.expected,
                    error = %e,
                    "aborting response before full length"
                );
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) if this.sent < this.expected => {
                this.finished = true;
                warn!(
                    sent = this.sent,
                    expected = this.expected,
                    "stream ended short, aborting response"
                );
                Poll::Ready(Some(Err(Error::SourceUnavailable {
                    offset: this.start + this.sent,
                    sent: this.sent,
                    requested: this.expected,
                })))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Content type from the file extension
fn determine_content_type(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" | "m2ts" => "video/mp2t",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "flac" => "audio/flac",
        "wav" => "audio/wav",
        "srt" => "application/x-subrip",
        "vtt" => "text/vtt",
        "nfo" | "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
