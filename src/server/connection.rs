use std::io::{ self, IoSlice, Read, Write };
use std::net::SocketAddr;

use mio::net::TcpStream;

use crate::error::{ ConnectionError, ConnectionResult, RequestError };
use crate::handlers::static_files::{ DocumentRoot, MappedFile };
use crate::http::buffer::WriteBuffer;
use crate::http::request::{ HttpRequest, ParseStatus };
use crate::http::response::{ build_response, Descriptor, StatusCode };

/// What the lifecycle controller does after `process`.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// Request not fully buffered yet; wait for the next read.
    NeedMoreInput,
    /// A response is staged; switch the socket to write interest.
    ResponseReady(StatusCode),
    /// The connection cannot continue.
    Close(ConnectionError),
}

/// What the lifecycle controller does after a writable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The socket filled up; wait for the next writable event.
    Pending,
    /// Response sent and the connection was reset for another request.
    /// `pipelined` is set when bytes of that request are already buffered.
    KeepAlive { pipelined: bool },
    /// Response sent on a non-persistent connection.
    Finished,
    /// Nothing was staged.
    Idle,
}

// Per-segment progress of the staged response.
#[derive(Debug, Clone, Copy)]
struct Outgoing {
    desc: Descriptor,
    header_sent: usize,
    body_sent: usize,
}

impl Outgoing {
    fn is_done(&self) -> bool {
        self.header_sent == self.desc.header_len && self.body_sent == self.desc.body_len
    }

    fn advance(&mut self, mut n: usize) {
        let from_header = n.min(self.desc.header_len - self.header_sent);
        self.header_sent += from_header;
        n -= from_header;
        self.body_sent += n.min(self.desc.body_len - self.body_sent);
    }
}

/// Per-socket state, allocated once per slot and reused across the
/// connections that occupy that slot.
pub struct Connection {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
    request: HttpRequest,
    write_buf: WriteBuffer,
    file: Option<MappedFile>,
    outgoing: Option<Outgoing>,
}

impl Connection {
    pub fn new(read_capacity: usize, write_capacity: usize) -> Self {
        Self {
            stream: None,
            peer: None,
            request: HttpRequest::with_capacity(read_capacity),
            write_buf: WriteBuffer::with_capacity(write_capacity),
            file: None,
            outgoing: None,
        }
    }

    /// Takes over a freshly accepted socket.
    pub fn init(&mut self, stream: TcpStream, peer: SocketAddr) {
        self.release();
        self.stream = Some(stream);
        self.peer = Some(peer);
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn stream_mut(&mut self) -> Option<&mut TcpStream> {
        self.stream.as_mut()
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn has_pending_response(&self) -> bool {
        self.outgoing.is_some()
    }

    /// Drains the socket into the read buffer.
    pub fn fill(&mut self) -> ConnectionResult<usize> {
        let stream = self.stream.as_mut().ok_or(ConnectionError::NotConnected)?;
        self.request.fill(stream)
    }

    pub fn fill_from<R: Read>(&mut self, src: &mut R) -> ConnectionResult<usize> {
        self.request.fill(src)
    }

    /// Parses what is buffered and, once a request is complete, resolves it
    /// and stages the response. Runs on a worker thread.
    pub fn process(&mut self, docs: &DocumentRoot) -> ProcessOutcome {
        let outcome = match self.request.parse() {
            Ok(ParseStatus::Incomplete) => {
                if self.request.is_buffer_full() {
                    return ProcessOutcome::Close(ConnectionError::RequestTooLarge);
                }
                return ProcessOutcome::NeedMoreInput;
            }
            Ok(ParseStatus::Complete) => self.do_request(docs),
            Err(e) => Err(e),
        };

        match self.process_write(outcome) {
            Ok(status) => ProcessOutcome::ResponseReady(status),
            Err(e) => {
                self.unmap();
                ProcessOutcome::Close(e)
            }
        }
    }

    fn do_request(&mut self, docs: &DocumentRoot) -> Result<usize, RequestError> {
        let url = self.request.url().ok_or(RequestError::Internal)?;
        let file = docs.resolve(url)?;
        let len = file.len();
        self.file = Some(file);
        Ok(len)
    }

    fn process_write(&mut self, outcome: Result<usize, RequestError>) -> ConnectionResult<StatusCode> {
        let desc = build_response(&mut self.write_buf, outcome, self.request.keep_alive())?;
        self.outgoing = Some(Outgoing { desc, header_sent: 0, body_sent: 0 });
        Ok(desc.status)
    }

    pub fn write(&mut self) -> ConnectionResult<WriteOutcome> {
        let mut stream = self.stream.take().ok_or(ConnectionError::NotConnected)?;
        let result = self.write_to(&mut stream);
        self.stream = Some(stream);
        result
    }

    /// Sends the staged response with vectored writes, resuming each
    /// segment exactly where the previous partial write stopped.
    pub fn write_to<W: Write>(&mut self, sink: &mut W) -> ConnectionResult<WriteOutcome> {
        let Some(mut out) = self.outgoing else {
            return Ok(WriteOutcome::Idle);
        };

        while !out.is_done() {
            let header = &self.write_buf.as_bytes()[out.header_sent..out.desc.header_len];
            let body = match &self.file {
                Some(file) if out.desc.body_len > 0 => &file.as_bytes()[out.body_sent..out.desc.body_len],
                _ => &[][..],
            };
            let slices = [IoSlice::new(header), IoSlice::new(body)];
            let count = if body.is_empty() { 1 } else { 2 };

            match sink.write_vectored(&slices[..count]) {
                Ok(0) => {
                    self.abort_response();
                    return Err(io::Error::from(io::ErrorKind::WriteZero).into());
                }
                Ok(n) => out.advance(n),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.outgoing = Some(out);
                    return Ok(WriteOutcome::Pending);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.abort_response();
                    return Err(e.into());
                }
            }
        }

        self.abort_response();
        if self.request.keep_alive() {
            let pipelined = self.request.recycle();
            Ok(WriteOutcome::KeepAlive { pipelined })
        } else {
            Ok(WriteOutcome::Finished)
        }
    }

    fn abort_response(&mut self) {
        self.outgoing = None;
        self.write_buf.clear();
        self.unmap();
    }

    fn unmap(&mut self) {
        self.file = None;
    }

    /// Drops all request state and the mapping, and hands back the socket
    /// so the caller can deregister it before it is closed.
    pub fn release(&mut self) -> Option<TcpStream> {
        self.abort_response();
        self.request.reset();
        self.peer = None;
        self.stream.take()
    }
}
