use crate::error::{ ConnectionResult, RequestError };
use crate::http::buffer::WriteBuffer;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Body sent for a successfully resolved file of zero bytes.
pub const EMPTY_FILE_BODY: &str = "<html><body></body></html>";

/// HTTP status codes this server can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 500 Internal Error
    InternalError,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::InternalError => 500,
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalError => "Internal Error",
        }
    }

    /// Fixed body sent with an error status.
    pub fn canned_body(&self) -> &'static str {
        match self {
            StatusCode::Ok => EMPTY_FILE_BODY,
            StatusCode::BadRequest => {
                "Your request has bad syntax or is inherently impossible to satisfy.\n"
            }
            StatusCode::Forbidden => "You do not have permission to get file from this server.\n",
            StatusCode::NotFound => "The requested file was not found on this server.\n",
            StatusCode::InternalError => {
                "There was an unusual problem serving the requested file.\n"
            }
        }
    }
}

impl From<RequestError> for StatusCode {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::BadRequest => StatusCode::BadRequest,
            RequestError::NotFound => StatusCode::NotFound,
            RequestError::Forbidden => StatusCode::Forbidden,
            RequestError::Internal => StatusCode::InternalError,
        }
    }
}

/// Scatter-gather layout of a built response: the formatted bytes in the
/// write buffer, optionally followed by `body_len` bytes of mapped file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub status: StatusCode,
    pub header_len: usize,
    pub body_len: usize,
}

impl Descriptor {
    pub fn segment_count(&self) -> usize {
        if self.body_len > 0 { 2 } else { 1 }
    }
}

/// Typed appends into the fixed write buffer. Every call fails instead of
/// truncating when the buffer is exhausted.
pub struct ResponseBuilder<'a> {
    out: &'a mut WriteBuffer,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(out: &'a mut WriteBuffer) -> Self {
        Self { out }
    }

    pub fn add_status_line(&mut self, status: StatusCode) -> ConnectionResult<()> {
        self.out.append_fmt(format_args!(
            "{} {} {}\r\n",
            HTTP_VERSION,
            status.as_u16(),
            status.reason_phrase()
        ))
    }

    pub fn add_content_length(&mut self, len: usize) -> ConnectionResult<()> {
        self.out.append_fmt(format_args!("Content-Length: {}\r\n", len))
    }

    pub fn add_connection(&mut self, keep_alive: bool) -> ConnectionResult<()> {
        let value = if keep_alive { "keep-alive" } else { "close" };
        self.out.append_fmt(format_args!("Connection: {}\r\n", value))
    }

    pub fn add_blank_line(&mut self) -> ConnectionResult<()> {
        self.out.append(b"\r\n")
    }

    pub fn add_headers(&mut self, content_len: usize, keep_alive: bool) -> ConnectionResult<()> {
        self.add_content_length(content_len)?;
        self.add_connection(keep_alive)?;
        self.add_blank_line()
    }

    pub fn add_content(&mut self, content: &[u8]) -> ConnectionResult<()> {
        self.out.append(content)
    }
}

/// Formats the response for a resolved request into `out`.
///
/// `outcome` is the size of the mapped file on success. A non-empty file
/// is not copied: the descriptor points its second segment at the
/// mapping. Errors and empty files carry their canned body inline.
pub fn build_response(
    out: &mut WriteBuffer,
    outcome: Result<usize, RequestError>,
    keep_alive: bool,
) -> ConnectionResult<Descriptor> {
    out.clear();
    let mut builder = ResponseBuilder::new(out);

    let status = match outcome {
        Ok(size) if size > 0 => {
            builder.add_status_line(StatusCode::Ok)?;
            builder.add_headers(size, keep_alive)?;
            return Ok(Descriptor { status: StatusCode::Ok, header_len: out.len(), body_len: size });
        }
        Ok(_) => StatusCode::Ok,
        Err(err) => StatusCode::from(err),
    };

    let body = status.canned_body();
    builder.add_status_line(status)?;
    builder.add_headers(body.len(), keep_alive)?;
    builder.add_content(body.as_bytes())?;
    Ok(Descriptor { status, header_len: out.len(), body_len: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;

    #[test]
    fn status_line_matches_reason() {
        let mut out = WriteBuffer::with_capacity(64);
        ResponseBuilder::new(&mut out).add_status_line(StatusCode::NotFound).unwrap();
        assert_eq!(out.as_bytes(), b"HTTP/1.1 404 Not Found\r\n");
    }

    #[test]
    fn file_response_holds_headers_only() {
        let mut out = WriteBuffer::with_capacity(128);
        let desc = build_response(&mut out, Ok(1234), true).unwrap();
        assert_eq!(
            out.as_bytes(),
            b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\nConnection: keep-alive\r\n\r\n"
        );
        assert_eq!(desc.segment_count(), 2);
        assert_eq!(desc.body_len, 1234);
    }

    #[test]
    fn empty_file_gets_inline_html() {
        let mut out = WriteBuffer::with_capacity(128);
        let desc = build_response(&mut out, Ok(0), false).unwrap();
        assert_eq!(desc.segment_count(), 1);
        assert!(out.as_bytes().ends_with(EMPTY_FILE_BODY.as_bytes()));
    }

    #[test]
    fn overflow_fails_the_build() {
        let mut out = WriteBuffer::with_capacity(32);
        let result = build_response(&mut out, Err(RequestError::Forbidden), false);
        assert!(matches!(result, Err(ConnectionError::ResponseTooLarge)));
    }
}
