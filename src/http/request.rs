use std::io::Read;

use tracing::debug;

use crate::error::{ ConnectionResult, RequestError };
use crate::http::buffer::{ ReadBuffer, Span };
use crate::http::line::LineStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Head,
    Put,
    Delete,
    Trace,
    Options,
    Connect,
    Patch,
}

impl Method {
    const ALL: [(&'static [u8], Method); 9] = [
        (b"GET", Method::Get),
        (b"POST", Method::Post),
        (b"HEAD", Method::Head),
        (b"PUT", Method::Put),
        (b"DELETE", Method::Delete),
        (b"TRACE", Method::Trace),
        (b"OPTIONS", Method::Options),
        (b"CONNECT", Method::Connect),
        (b"PATCH", Method::Patch),
    ];

    /// Case-insensitive lookup of a request-line method token.
    pub fn from_token(token: &[u8]) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map(|(_, method)| *method)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Trace => "TRACE",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Patch => "PATCH",
        }
    }
}

/// Main parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    RequestLine,
    Headers,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// Suspend until the reader delivers more bytes.
    Incomplete,
    /// A whole request is buffered and ready for resolution.
    Complete,
}

/// An HTTP/1.1 request assembled incrementally inside a fixed read buffer.
///
/// URL, version, host and body are views into the buffer. They are cleared
/// together with the buffer, so a reset request never exposes stale data.
pub struct HttpRequest {
    buffer: ReadBuffer,
    state: CheckState,
    method: Option<Method>,
    url: Option<Span>,
    version: Option<Span>,
    host: Option<Span>,
    content_length: usize,
    keep_alive: bool,
    body_start: usize,
    // End offset of a completed request.
    end: Option<usize>,
}

impl HttpRequest {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: ReadBuffer::with_capacity(capacity),
            state: CheckState::RequestLine,
            method: None,
            url: None,
            version: None,
            host: None,
            content_length: 0,
            keep_alive: false,
            body_start: 0,
            end: None,
        }
    }

    pub fn fill<R: Read>(&mut self, src: &mut R) -> ConnectionResult<usize> {
        self.buffer.fill(src)
    }

    /// Advances the state machine over everything buffered so far.
    ///
    /// Lines are consumed for as long as the tokenizer yields complete ones.
    /// Once in the body state completion is decided by length alone, so a
    /// body that is already fully buffered completes without another line.
    pub fn parse(&mut self) -> Result<ParseStatus, RequestError> {
        if self.end.is_some() {
            return Ok(ParseStatus::Complete);
        }

        loop {
            let line = match self.state {
                CheckState::Body => return Ok(self.parse_content()),
                CheckState::RequestLine | CheckState::Headers => match self.buffer.parse_line() {
                    LineStatus::Ok => self.buffer.take_line(),
                    LineStatus::Open => return Ok(ParseStatus::Incomplete),
                    LineStatus::Bad => {
                        debug!(offset = self.buffer.checked_idx(), "malformed line terminator");
                        return Err(RequestError::BadRequest);
                    }
                },
            };
            debug!(
                line = %String::from_utf8_lossy(self.buffer.get(line).unwrap_or_default()),
                "got http line"
            );

            match self.state {
                CheckState::RequestLine => self.parse_request_line(line)?,
                CheckState::Headers => {
                    if self.parse_header(line) == ParseStatus::Complete {
                        return Ok(ParseStatus::Complete);
                    }
                }
                CheckState::Body => return Err(RequestError::Internal),
            }
        }
    }

    fn parse_request_line(&mut self, line: Span) -> Result<(), RequestError> {
        let text = self.buffer.get(line).ok_or(RequestError::BadRequest)?;

        let method_end = text.iter().position(is_blank).ok_or(RequestError::BadRequest)?;
        match Method::from_token(&text[..method_end]) {
            Some(Method::Get) => {}
            other => {
                debug!(
                    method = %String::from_utf8_lossy(&text[..method_end]),
                    known = other.is_some(),
                    "unsupported method"
                );
                return Err(RequestError::BadRequest);
            }
        }

        let url_start = skip_blank(text, method_end);
        let url_end = url_start
            + text[url_start..].iter().position(is_blank).ok_or(RequestError::BadRequest)?;
        let version_start = skip_blank(text, url_end);
        let version_end = trim_end(text, version_start);

        if !text[version_start..version_end].eq_ignore_ascii_case(b"HTTP/1.1") {
            return Err(RequestError::BadRequest);
        }
        if text.get(url_start) != Some(&b'/') {
            return Err(RequestError::BadRequest);
        }

        self.method = Some(Method::Get);
        self.url = Some(Span::new(line.start + url_start, line.start + url_end));
        self.version = Some(Span::new(line.start + version_start, line.start + version_end));
        self.state = CheckState::Headers;
        Ok(())
    }

    fn parse_header(&mut self, line: Span) -> ParseStatus {
        if line.len == 0 {
            if self.content_length != 0 {
                self.state = CheckState::Body;
                self.body_start = self.buffer.start_line();
                return ParseStatus::Incomplete;
            }
            self.end = Some(self.buffer.start_line());
            return ParseStatus::Complete;
        }

        let Some(text) = self.buffer.get(line) else {
            return ParseStatus::Incomplete;
        };

        if let Some((from, to)) = header_value(text, b"Connection:") {
            if text[from..to].eq_ignore_ascii_case(b"keep-alive") {
                self.keep_alive = true;
            }
        } else if let Some((from, to)) = header_value(text, b"Content-Length:") {
            self.content_length = leading_number(&text[from..to]);
        } else if let Some((from, to)) = header_value(text, b"Host:") {
            self.host = Some(Span::new(line.start + from, line.start + to));
        } else {
            debug!(header = %String::from_utf8_lossy(text), "unknown header");
        }
        ParseStatus::Incomplete
    }

    fn parse_content(&mut self) -> ParseStatus {
        let end = self.body_start.saturating_add(self.content_length);
        if self.buffer.read_idx() >= end {
            self.end = Some(end);
            ParseStatus::Complete
        } else {
            ParseStatus::Incomplete
        }
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn url(&self) -> Option<&[u8]> {
        self.url.and_then(|s| self.buffer.get(s))
    }

    pub fn version(&self) -> Option<&[u8]> {
        self.version.and_then(|s| self.buffer.get(s))
    }

    pub fn host(&self) -> Option<&[u8]> {
        self.host.and_then(|s| self.buffer.get(s))
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// The request body, once the whole of it is buffered.
    pub fn body(&self) -> Option<&[u8]> {
        let end = self.end?;
        if self.state != CheckState::Body {
            return None;
        }
        self.buffer.get(Span::new(self.body_start, end))
    }

    pub fn buffer(&self) -> &ReadBuffer {
        &self.buffer
    }

    pub fn is_buffer_full(&self) -> bool {
        self.buffer.is_full()
    }

    /// Clears every parsed field and the whole buffer.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.clear_fields();
    }

    /// Prepares for the next request on a persistent connection. Bytes that
    /// arrived after the finished request are kept at the front of the
    /// buffer; returns whether any are waiting.
    pub fn recycle(&mut self) -> bool {
        let consumed = self.end.unwrap_or(self.buffer.read_idx());
        self.buffer.compact(consumed);
        self.clear_fields();
        self.buffer.read_idx() > 0
    }

    fn clear_fields(&mut self) {
        self.state = CheckState::RequestLine;
        self.method = None;
        self.url = None;
        self.version = None;
        self.host = None;
        self.content_length = 0;
        self.keep_alive = false;
        self.body_start = 0;
        self.end = None;
    }
}

fn is_blank(b: &u8) -> bool {
    *b == b' ' || *b == b'\t'
}

fn skip_blank(text: &[u8], from: usize) -> usize {
    from + text[from..].iter().take_while(|b| is_blank(b)).count()
}

fn trim_end(text: &[u8], from: usize) -> usize {
    text.len() - text[from..].iter().rev().take_while(|b| is_blank(b)).count()
}

/// Matches `name` as a case-insensitive prefix and returns the trimmed
/// value range within `text`.
fn header_value(text: &[u8], name: &[u8]) -> Option<(usize, usize)> {
    if text.len() < name.len() || !text[..name.len()].eq_ignore_ascii_case(name) {
        return None;
    }
    let from = skip_blank(text, name.len());
    Some((from, trim_end(text, from)))
}

/// Leading decimal digits, saturating; anything unparsable counts as zero.
fn leading_number(value: &[u8]) -> usize {
    value
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .fold(0usize, |acc, b| acc.saturating_mul(10).saturating_add((b - b'0') as usize))
}
