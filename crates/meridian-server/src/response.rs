//! Response construction.
//!
//! [`Resp`] builds the usual responses: plain text, JSON encoded through
//! the router's [`BufferPool`], error pages, and file content with
//! conditional and range request handling.

use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{BufMut, Bytes};
use futures_util::stream;
use http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use meridian_core::{BoxError, HttpError, HttpResult};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::buffer::BufferPool;
use crate::request::Req;

/// Body type of every response the router produces.
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

/// A response with a [`ResponseBody`].
pub type HttpResponse = Response<ResponseBody>;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json; charset=utf-8";

// File bodies are read in chunks of this size, with a few queued ahead.
const FILE_CHUNK: u64 = 64 * 1024;
const FILE_QUEUE: usize = 4;

/// A body holding `data`.
pub fn full(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed_unsync()
}

/// An empty body.
pub fn empty() -> ResponseBody {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

// Streams `length` bytes of `content` from `start`, reading on the blocking
// pool. Reading stops early once the body is dropped.
fn file_body<R>(mut content: R, start: u64, length: u64) -> ResponseBody
where
    R: Read + Seek + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(FILE_QUEUE);

    tokio::task::spawn_blocking(move || {
        if let Err(err) = content.seek(SeekFrom::Start(start)) {
            let _ = tx.blocking_send(Err(err));
            return;
        }
        let mut remaining = length;
        while remaining > 0 {
            let want = remaining.min(FILE_CHUNK);
            let mut chunk = Vec::new();
            let chunk = match (&mut content).take(want).read_to_end(&mut chunk) {
                Ok(read) if read as u64 == want => Ok(Bytes::from(chunk)),
                Ok(_) => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                Err(err) => Err(err),
            };
            let failed = chunk.is_err();
            if tx.blocking_send(chunk).is_err() || failed {
                return;
            }
            remaining -= want;
        }
    });

    let chunks = stream::unfold(rx, |mut rx| async move {
        let chunk = rx.recv().await?;
        Some((chunk.map(Frame::data).map_err(BoxError::from), rx))
    });
    StreamBody::new(chunks).boxed_unsync()
}

/// A plain-text error page: the text followed by a newline.
pub fn error_response(text: &str, status: StatusCode) -> HttpResponse {
    let mut response = with_body(status, TEXT_PLAIN, Bytes::from(format!("{text}\n")));
    response
        .headers_mut()
        .insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

fn with_body(status: StatusCode, content_type: &'static str, body: Bytes) -> HttpResponse {
    let length = body.len();
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    response
}

/// Response helpers bound to the router's buffer pool.
#[derive(Debug, Clone)]
pub struct Resp {
    buffers: Arc<BufferPool>,
}

impl Resp {
    pub(crate) fn new(buffers: Arc<BufferPool>) -> Self {
        Self { buffers }
    }

    /// `200 OK` plain text.
    pub fn text(&self, text: impl Into<String>) -> HttpResponse {
        self.text_status(text, StatusCode::OK)
    }

    /// Plain text with the given status.
    pub fn text_status(&self, text: impl Into<String>, status: StatusCode) -> HttpResponse {
        with_body(status, TEXT_PLAIN, Bytes::from(text.into()))
    }

    /// `200 OK` JSON.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> HttpResult<HttpResponse> {
        self.json_status(value, StatusCode::OK)
    }

    /// JSON with the given status.
    ///
    /// Encodes into a pooled buffer; the buffer goes back to the pool
    /// whether or not encoding succeeds.
    pub fn json_status<T: Serialize + ?Sized>(
        &self,
        value: &T,
        status: StatusCode,
    ) -> HttpResult<HttpResponse> {
        let mut buf = self.buffers.get();
        serde_json::to_writer((&mut *buf).writer(), value).map_err(HttpError::internal)?;
        Ok(self.json_bytes(Bytes::copy_from_slice(&buf), status))
    }

    /// Pre-encoded JSON with the given status.
    pub fn json_bytes(&self, json: impl Into<Bytes>, status: StatusCode) -> HttpResponse {
        with_body(status, APPLICATION_JSON, json.into())
    }

    /// A plain-text error page.
    pub fn error(&self, text: &str, status: StatusCode) -> HttpResponse {
        error_response(text, status)
    }

    /// `404 Not Found` with the given text.
    pub fn not_found(&self, text: &str) -> HttpResponse {
        error_response(text, StatusCode::NOT_FOUND)
    }

    /// `400 Bad Request`.
    pub fn bad_request(&self) -> HttpResponse {
        error_response("Bad request", StatusCode::BAD_REQUEST)
    }

    /// `500 Internal Server Error`.
    pub fn internal_error(&self) -> HttpResponse {
        error_response("Internal server error", StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Serves `content` as the file `name`.
    ///
    /// The content type comes from the extension of `name`. A `modified`
    /// time sets `Last-Modified` and enables `If-Modified-Since` (304). A
    /// single byte range is answered with 206, an unsatisfiable one with
    /// 416; multi-range requests get the whole file. `HEAD` requests get
    /// the headers only.
    ///
    /// The body is streamed in chunks read on Tokio's blocking pool, so this
    /// must be called from within a Tokio runtime.
    pub fn file<R: Read + Seek + Send + 'static>(
        &self,
        req: &Req,
        name: &str,
        modified: Option<SystemTime>,
        mut content: R,
    ) -> HttpResult<HttpResponse> {
        let method = req.method();
        let headers = req.headers();
        let modified = modified.filter(|time| *time > UNIX_EPOCH);

        if let Some(modified) = modified {
            if (method == Method::GET || method == Method::HEAD) && not_modified(headers, modified) {
                let mut response = Response::new(empty());
                *response.status_mut() = StatusCode::NOT_MODIFIED;
                set_last_modified(response.headers_mut(), modified)?;
                return Ok(response);
            }
        }

        let size = content.seek(SeekFrom::End(0))?;
        let (status, start, length) = match parse_range(headers, size) {
            ByteRange::Full => (StatusCode::OK, 0, size),
            ByteRange::Partial { start, end } => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
            ByteRange::Unsatisfiable => {
                let mut response =
                    error_response("invalid range", StatusCode::RANGE_NOT_SATISFIABLE);
                response.headers_mut().insert(
                    header::CONTENT_RANGE,
                    header_value(format!("bytes */{size}"))?,
                );
                return Ok(response);
            }
        };

        let body = if method == Method::HEAD {
            empty()
        } else {
            file_body(content, start, length)
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        let out = response.headers_mut();
        out.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type(name)));
        out.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        out.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        if status == StatusCode::PARTIAL_CONTENT {
            let end = start + length - 1;
            out.insert(
                header::CONTENT_RANGE,
                header_value(format!("bytes {start}-{end}/{size}"))?,
            );
        }
        if let Some(modified) = modified {
            set_last_modified(out, modified)?;
        }
        Ok(response)
    }

    /// Serves `content` as a download named `name`.
    ///
    /// Same as [`file`](Self::file) plus
    /// `Content-Disposition: attachment; filename=<urlencoded name>`.
    pub fn attachment<R: Read + Seek + Send + 'static>(
        &self,
        req: &Req,
        name: &str,
        modified: Option<SystemTime>,
        content: R,
    ) -> HttpResult<HttpResponse> {
        let mut response = self.file(req, name, modified, content)?;
        let filename = serde_urlencoded::to_string([("filename", name)]).map_err(HttpError::internal)?;
        response.headers_mut().insert(
            header::CONTENT_DISPOSITION,
            header_value(format!("attachment; {filename}"))?,
        );
        Ok(response)
    }
}

fn header_value(value: String) -> HttpResult<HeaderValue> {
    HeaderValue::try_from(value).map_err(HttpError::internal)
}

fn set_last_modified(headers: &mut HeaderMap, modified: SystemTime) -> HttpResult<()> {
    headers.insert(
        header::LAST_MODIFIED,
        header_value(httpdate::fmt_http_date(modified))?,
    );
    Ok(())
}

// HTTP dates have one-second resolution.
fn not_modified(headers: &HeaderMap, modified: SystemTime) -> bool {
    let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| httpdate::parse_http_date(value).ok())
    else {
        return false;
    };

    let seconds = |time: SystemTime| time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).ok();
    matches!((seconds(modified), seconds(since)), (Some(m), Some(s)) if m <= s)
}

#[derive(Debug, PartialEq, Eq)]
enum ByteRange {
    Full,
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

fn parse_range(headers: &HeaderMap, size: u64) -> ByteRange {
    let Some(value) = headers.get(header::RANGE) else {
        return ByteRange::Full;
    };
    let Some(spec) = value.to_str().ok().and_then(|v| v.trim().strip_prefix("bytes=")) else {
        return ByteRange::Unsatisfiable;
    };
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return ByteRange::Unsatisfiable;
    };

    let parsed = if first.is_empty() {
        // "-N": the last N bytes.
        last.parse::<u64>()
            .ok()
            .filter(|&n| n > 0 && size > 0)
            .map(|n| (size - n.min(size), size - 1))
    } else {
        match (first.parse::<u64>(), last) {
            (Ok(start), "") => Some((start, size.saturating_sub(1))),
            (Ok(start), last) => last
                .parse::<u64>()
                .ok()
                .filter(|&end| end >= start)
                .map(|end| (start, end.min(size.saturating_sub(1)))),
            (Err(_), _) => None,
        }
    };

    match parsed {
        Some((start, end)) if start < size => ByteRange::Partial { start, end },
        _ => ByteRange::Unsatisfiable,
    }
}

/// Content type for a file name, by extension.
pub fn content_type(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "xml" => "application/xml",
        "txt" => TEXT_PLAIN,
        "csv" => "text/csv; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
