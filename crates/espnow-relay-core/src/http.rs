//! Minimal HTTP/1.1 client framing
//!
//! One request per connection (`Connection: close`). The framing is generic
//! over [`embedded_io_async`] streams so the same code runs over the firmware's
//! TLS session and over in-memory streams in tests.

use embedded_io_async::{ErrorKind, Read, Write};
use heapless::String;
use log::debug;
use thiserror_no_std::Error;

use crate::endpoint::HTTPS_DEFAULT_PORT;

/// Content type of every relayed body
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Maximum number of response body bytes kept for logging
pub const RESPONSE_BODY_LIMIT: usize = 256;

/// Capacity of the serialized request line and headers
pub const REQUEST_HEAD_CAPACITY: usize = 384;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    #[error("stream I/O error: {0:?}")]
    Io(ErrorKind),
    #[error("response header does not fit in the receive buffer")]
    HeaderTooLarge,
    #[error("malformed HTTP status line")]
    MalformedStatusLine,
    #[error("connection closed before a response header arrived")]
    ConnectionClosed,
    #[error("request head does not fit in the head buffer")]
    RequestTooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Post,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Post => "POST",
        }
    }
}

/// A single outbound request
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub method: Method,
    pub host: &'a str,
    /// Appended to the `Host` header unless it is the HTTPS default
    pub port: u16,
    pub path: &'a str,
    pub content_type: &'a str,
    pub body: &'a [u8],
}

impl<'a> Request<'a> {
    /// JSON `POST` to `host:port` + `path`
    pub fn post_json(host: &'a str, port: u16, path: &'a str, body: &'a [u8]) -> Self {
        Self {
            method: Method::Post,
            host,
            port,
            path,
            content_type: CONTENT_TYPE_JSON,
            body,
        }
    }
}

/// Status and the portion of the body captured by [`exchange`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSummary {
    pub status: u16,
    /// Bytes written to the caller's body buffer
    pub body_len: usize,
    /// The server sent more body than the buffer could hold
    pub truncated: bool,
}

/// Serialize the request line and headers, ending with the blank line.
pub fn write_request_head<W: core::fmt::Write>(out: &mut W, request: &Request<'_>) -> Result<(), HttpError> {
    let mut emit = || -> core::fmt::Result {
        write!(out, "{} {} HTTP/1.1\r\n", request.method.as_str(), request.path)?;
        if request.port == HTTPS_DEFAULT_PORT {
            write!(out, "Host: {}\r\n", request.host)?;
        } else {
            write!(out, "Host: {}:{}\r\n", request.host, request.port)?;
        }
        write!(
            out,
            "Content-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            request.content_type,
            request.body.len()
        )
    };
    emit().map_err(|_| HttpError::RequestTooLarge)
}

/// Send `request` on `stream` and read the response.
///
/// The header is accumulated in `head_buf`; up to `body_out.len()` bytes of
/// body are copied into `body_out`. Reading stops at `Content-Length`, after
/// the last chunk of a chunked body, at end of stream, or once `body_out` is
/// full. Without `Content-Length`, a read error after the header counts as end
/// of stream.
pub async fn exchange<S: Read + Write>(
    stream: &mut S,
    request: &Request<'_>,
    head_buf: &mut [u8],
    body_out: &mut [u8],
) -> Result<ResponseSummary, HttpError> {
    let mut head: String<REQUEST_HEAD_CAPACITY> = String::new();
    write_request_head(&mut head, request)?;

    stream.write_all(head.as_bytes()).await.map_err(io)?;
    stream.write_all(request.body).await.map_err(io)?;
    stream.flush().await.map_err(io)?;

    // Read until the header terminator shows up.
    let mut filled = 0;
    let header_end = loop {
        if let Some(pos) = find_header_end(&head_buf[..filled]) {
            break pos;
        }
        if filled == head_buf.len() {
            return Err(HttpError::HeaderTooLarge);
        }
        let n = stream.read(&mut head_buf[filled..]).await.map_err(io)?;
        if n == 0 {
            return Err(HttpError::ConnectionClosed);
        }
        filled += n;
    };

    let header = core::str::from_utf8(&head_buf[..header_end]).map_err(|_| HttpError::MalformedStatusLine)?;
    let status = parse_status_line(header)?;
    let content_length = parse_content_length(header);
    let chunked = is_chunked(header);

    // Body bytes that arrived together with the header.
    let early = &head_buf[header_end + 4..filled];
    let mut body_len = early.len().min(body_out.len());
    body_out[..body_len].copy_from_slice(&early[..body_len]);
    let mut truncated = early.len() > body_len;
    let mut seen = early.len();
    let mut complete = body_complete(content_length, chunked, seen, &body_out[..body_len]);

    while !truncated && !complete {
        if body_len == body_out.len() {
            truncated = match content_length {
                Some(len) => seen < len,
                None if chunked => true,
                // One more byte tells "exactly full" from "truncated".
                None => matches!(stream.read(&mut [0u8; 1]).await, Ok(n) if n > 0),
            };
            break;
        }
        let n = match stream.read(&mut body_out[body_len..]).await {
            Ok(n) => n,
            // Without a length the body ends when the peer stops sending. TLS
            // sessions report that as an error rather than a zero-length read.
            Err(e) if content_length.is_none() => {
                debug!("Response body ended by {}", io(e));
                0
            }
            Err(e) => return Err(io(e)),
        };
        if n == 0 {
            break;
        }
        body_len += n;
        seen += n;
        complete = body_complete(content_length, chunked, seen, &body_out[..body_len]);
    }

    if let Some(len) = content_length
        && body_len > len
    {
        body_len = len;
        truncated = false;
    }

    if chunked {
        body_len = decode_chunked_in_place(&mut body_out[..body_len]);
    }

    Ok(ResponseSummary {
        status,
        body_len,
        truncated,
    })
}

/// Whether the whole body has arrived, judged by `Content-Length` or by the
/// terminal chunk.
fn body_complete(content_length: Option<usize>, chunked: bool, seen: usize, body: &[u8]) -> bool {
    match content_length {
        Some(len) => seen >= len,
        None => chunked && has_last_chunk(body),
    }
}

fn io<E: embedded_io_async::Error>(e: E) -> HttpError {
    HttpError::Io(e.kind())
}

/// Position of the `\r\n\r\n` that ends the header, if present
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Status code from the first header line (`HTTP/1.1 200 OK`)
pub fn parse_status_line(header: &str) -> Result<u16, HttpError> {
    let first_line = header.lines().next().ok_or(HttpError::MalformedStatusLine)?;
    let mut parts = first_line.split_ascii_whitespace();

    let version = parts.next().ok_or(HttpError::MalformedStatusLine)?;
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::MalformedStatusLine);
    }

    let code = parts.next().ok_or(HttpError::MalformedStatusLine)?;
    match code.parse::<u16>() {
        Ok(status) if code.len() == 3 && (100..=599).contains(&status) => Ok(status),
        _ => Err(HttpError::MalformedStatusLine),
    }
}

/// `Content-Length` header value, if present and numeric
pub fn parse_content_length(header: &str) -> Option<usize> {
    header_value(header, "content-length").and_then(|value| value.parse::<usize>().ok())
}

fn is_chunked(header: &str) -> bool {
    header_value(header, "transfer-encoding").is_some_and(|value| value.eq_ignore_ascii_case("chunked"))
}

fn header_value<'h>(header: &'h str, name: &str) -> Option<&'h str> {
    header
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

/// Walk the chunk framing in `buf` and report whether the zero-size chunk and
/// the blank line ending its trailer are both present.
fn has_last_chunk(buf: &[u8]) -> bool {
    let mut pos = 0;
    loop {
        let Some(line_len) = buf[pos..].windows(2).position(|w| w == b"\r\n") else {
            return false;
        };
        let Some(size) = chunk_size(&buf[pos..pos + line_len]) else {
            return false;
        };
        pos += line_len + 2;

        if size == 0 {
            let trailer = &buf[pos..];
            return trailer.starts_with(b"\r\n") || find_header_end(trailer).is_some();
        }
        pos += size + 2;
        if pos >= buf.len() {
            return false;
        }
    }
}

fn chunk_size(line: &[u8]) -> Option<usize> {
    let line = core::str::from_utf8(line).ok()?;
    let hex = line.split(';').next().unwrap_or(line).trim();
    usize::from_str_radix(hex, 16).ok()
}

/// Strip chunk framing from `buf` in place, returning the decoded length.
///
/// A trailing partial chunk (cut off by the body limit) is kept as far as it
/// was received.
fn decode_chunked_in_place(buf: &mut [u8]) -> usize {
    let mut read = 0;
    let mut written = 0;

    while read < buf.len() {
        let Some(line_len) = buf[read..].windows(2).position(|w| w == b"\r\n") else {
            break;
        };
        let Some(size) = chunk_size(&buf[read..read + line_len]) else {
            break;
        };
        if size == 0 {
            break;
        }

        read += line_len + 2;
        let take = size.min(buf.len() - read);
        buf.copy_within(read..read + take, written);
        written += take;
        read += take + 2;
    }

    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io_async::ErrorType;

    /// In-memory stream replaying a canned response and recording writes.
    struct MockStream<'r> {
        response: &'r [u8],
        /// Upper bound on bytes returned per read, to exercise reassembly
        chunk: usize,
        /// What reads return once `response` is used up
        end: StreamEnd,
        written: std::vec::Vec<u8>,
    }

    #[derive(Clone, Copy)]
    enum StreamEnd {
        Eof,
        Error(ErrorKind),
        /// The peer keeps the connection open and sends nothing more
        HoldOpen,
    }

    impl<'r> MockStream<'r> {
        fn new(response: &'r [u8], chunk: usize) -> Self {
            Self::ending(response, chunk, StreamEnd::Eof)
        }

        fn ending(response: &'r [u8], chunk: usize, end: StreamEnd) -> Self {
            Self {
                response,
                chunk,
                end,
                written: std::vec::Vec::new(),
            }
        }
    }

    impl ErrorType for MockStream<'_> {
        type Error = ErrorKind;
    }

    impl Read for MockStream<'_> {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            if self.response.is_empty() {
                return match self.end {
                    StreamEnd::Eof => Ok(0),
                    StreamEnd::Error(kind) => Err(kind),
                    StreamEnd::HoldOpen => core::future::pending().await,
                };
            }
            let n = buf.len().min(self.chunk).min(self.response.len());
            buf[..n].copy_from_slice(&self.response[..n]);
            self.response = &self.response[n..];
            Ok(n)
        }
    }

    impl Write for MockStream<'_> {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    fn run(response: &[u8], chunk: usize, body_cap: usize) -> (Result<ResponseSummary, HttpError>, std::vec::Vec<u8>, std::vec::Vec<u8>) {
        let mut stream = MockStream::new(response, chunk);
        let (result, body) = run_on(&mut stream, body_cap);
        (result, stream.written, body)
    }

    /// Run one exchange, failing the test if it is still waiting after a second.
    fn run_on(stream: &mut MockStream<'_>, body_cap: usize) -> (Result<ResponseSummary, HttpError>, std::vec::Vec<u8>) {
        let request = Request::post_json("relay.example.com", 443, "/ingest", br#"{"class_name":1}"#);
        let mut head = [0u8; 512];
        let mut body = std::vec![0u8; body_cap];
        let result = embassy_futures::block_on(embassy_time::with_timeout(
            embassy_time::Duration::from_secs(1),
            exchange(stream, &request, &mut head, &mut body),
        ))
        .expect("exchange did not finish");
        let len = result.map(|r| r.body_len).unwrap_or(0);
        body.truncate(len);
        (result, body)
    }

    #[test]
    fn test_request_head_format() {
        let mut head: String<REQUEST_HEAD_CAPACITY> = String::new();
        let request = Request::post_json("relay.example.com", 443, "/api/v1", b"{}");
        write_request_head(&mut head, &request).unwrap();
        assert_eq!(
            head.as_str(),
            "POST /api/v1 HTTP/1.1\r\nHost: relay.example.com\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_request_head_non_default_port() {
        let mut head: String<REQUEST_HEAD_CAPACITY> = String::new();
        let request = Request::post_json("10.0.0.2", 8443, "/", b"");
        write_request_head(&mut head, &request).unwrap();
        assert!(head.contains("\r\nHost: 10.0.0.2:8443\r\n"));
        assert!(head.contains("\r\nContent-Length: 0\r\n"));
    }

    #[test]
    fn test_request_head_overflow() {
        let mut head: String<16> = String::new();
        let request = Request::post_json("relay.example.com", 443, "/", b"{}");
        assert_eq!(write_request_head(&mut head, &request), Err(HttpError::RequestTooLarge));
    }

    #[test]
    fn test_exchange_sends_head_then_body() {
        let (result, written, body) = run(b"HTTP/1.1 201 Created\r\nContent-Length: 2\r\n\r\nok", 7, 256);

        let summary = result.unwrap();
        assert_eq!(summary.status, 201);
        assert!(!summary.truncated);
        assert_eq!(body, b"ok");

        let text = core::str::from_utf8(&written).unwrap();
        assert!(text.starts_with("POST /ingest HTTP/1.1\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"class_name\":1}"));
    }

    #[test]
    fn test_exchange_reads_until_close_without_content_length() {
        let (result, _, body) = run(b"HTTP/1.0 200 OK\r\n\r\nall of it", 3, 256);
        assert_eq!(result.unwrap().status, 200);
        assert_eq!(body, b"all of it");
    }

    #[test]
    fn test_exchange_truncates_long_body() {
        let (result, _, body) = run(b"HTTP/1.1 500 Internal Server Error\r\n\r\n0123456789", 64, 4);
        let summary = result.unwrap();
        assert_eq!(summary.status, 500);
        assert!(summary.truncated);
        assert_eq!(body, b"0123");
    }

    #[test]
    fn test_exchange_exact_fit_is_not_truncated() {
        let (result, _, body) = run(b"HTTP/1.1 200 OK\r\n\r\nabcd", 1, 4);
        assert!(!result.unwrap().truncated);
        assert_eq!(body, b"abcd");
    }

    #[test]
    fn test_exchange_decodes_chunked_body() {
        let (result, _, body) = run(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
            10,
            256,
        );
        assert_eq!(result.unwrap().status, 200);
        assert_eq!(body, b"hello world");
    }

    #[test]
    fn test_exchange_read_error_ends_body_without_content_length() {
        let mut stream = MockStream::ending(
            b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\naccepted",
            5,
            StreamEnd::Error(ErrorKind::ConnectionAborted),
        );
        let (result, body) = run_on(&mut stream, 256);

        let summary = result.unwrap();
        assert_eq!(summary.status, 200);
        assert!(!summary.truncated);
        assert_eq!(body, b"accepted");
    }

    #[test]
    fn test_exchange_read_error_before_content_length_is_reached() {
        let mut stream = MockStream::ending(
            b"HTTP/1.1 200 OK\r\nContent-Length: 20\r\n\r\npartial",
            64,
            StreamEnd::Error(ErrorKind::ConnectionReset),
        );
        let (result, _) = run_on(&mut stream, 256);
        assert_eq!(result, Err(HttpError::Io(ErrorKind::ConnectionReset)));
    }

    #[test]
    fn test_exchange_chunked_body_then_close_error() {
        let mut stream = MockStream::ending(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nok\r\n0\r\n\r\n",
            8,
            StreamEnd::Error(ErrorKind::Other),
        );
        let (result, body) = run_on(&mut stream, 256);
        assert_eq!(result.unwrap().status, 200);
        assert_eq!(body, b"ok");
    }

    #[test]
    fn test_exchange_stops_at_last_chunk_while_connection_stays_open() {
        for chunk in [1, 7, 512] {
            let mut stream = MockStream::ending(
                b"HTTP/1.1 201 Created\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nsave\r\n0\r\n\r\n",
                chunk,
                StreamEnd::HoldOpen,
            );
            let (result, body) = run_on(&mut stream, 256);
            assert_eq!(result.unwrap().status, 201);
            assert_eq!(body, b"save");
        }
    }

    #[test]
    fn test_exchange_stops_at_content_length_while_connection_stays_open() {
        let mut stream = MockStream::ending(
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
            3,
            StreamEnd::HoldOpen,
        );
        let (result, body) = run_on(&mut stream, 256);
        assert_eq!(result.unwrap().status, 200);
        assert_eq!(body, b"ok");
    }

    #[test]
    fn test_last_chunk_detection() {
        assert!(has_last_chunk(b"5\r\nhello\r\n0\r\n\r\n"));
        assert!(has_last_chunk(b"0\r\n\r\n"));
        assert!(has_last_chunk(b"2\r\nok\r\n0\r\nX-Trace: 1\r\n\r\n"));
        assert!(!has_last_chunk(b"5\r\nhello\r\n"));
        assert!(!has_last_chunk(b"5\r\nhello\r\n0\r\n"));
        assert!(!has_last_chunk(b"10\r\n0\r\n\r\n"));
        assert!(!has_last_chunk(b""));
    }

    #[test]
    fn test_exchange_closed_before_header() {
        let (result, _, _) = run(b"HTTP/1.1 200", 4, 256);
        assert_eq!(result, Err(HttpError::ConnectionClosed));
    }

    #[test]
    fn test_exchange_header_too_large() {
        let mut response = std::vec::Vec::from(&b"HTTP/1.1 200 OK\r\nX-Pad: "[..]);
        response.extend(core::iter::repeat_n(b'a', 600));
        response.extend_from_slice(b"\r\n\r\n");
        let (result, _, _) = run(&response, 64, 256);
        assert_eq!(result, Err(HttpError::HeaderTooLarge));
    }

    #[test]
    fn test_status_line_parsing() {
        assert_eq!(parse_status_line("HTTP/1.1 404 Not Found"), Ok(404));
        assert_eq!(parse_status_line("HTTP/1.0 204"), Ok(204));
        assert_eq!(parse_status_line("ICY 200 OK"), Err(HttpError::MalformedStatusLine));
        assert_eq!(parse_status_line("HTTP/1.1 2000 OK"), Err(HttpError::MalformedStatusLine));
        assert_eq!(parse_status_line(""), Err(HttpError::MalformedStatusLine));
    }

    #[test]
    fn test_content_length_lookup_is_case_insensitive() {
        let header = "HTTP/1.1 200 OK\r\ncontent-LENGTH:  42\r\nServer: x";
        assert_eq!(parse_content_length(header), Some(42));
        assert_eq!(parse_content_length("HTTP/1.1 200 OK\r\nServer: x"), None);
    }

    #[test]
    fn test_find_header_end() {
        assert_eq!(find_header_end(b"HTTP/1.1 200 OK\r\n\r\nbody"), Some(15));
        assert_eq!(find_header_end(b"HTTP/1.1 200 OK\r\n"), None);
    }
}
