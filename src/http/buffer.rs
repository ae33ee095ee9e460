use std::fmt;
use std::io::{ self, Read, Write };

use crate::error::{ ConnectionError, ConnectionResult };
use crate::http::line::{ self, LineStatus };

/// A bounds-checked view into the read buffer.
///
/// Views are plain offsets; they stay meaningful only until the buffer is
/// cleared or compacted, after which the owner must drop them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, len: end.saturating_sub(start) }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Fixed-capacity receive buffer.
///
/// Invariant: `start_line <= checked_idx <= read_idx <= capacity`.
pub struct ReadBuffer {
    buf: Box<[u8]>,
    read_idx: usize,
    checked_idx: usize,
    start_line: usize,
}

impl ReadBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            read_idx: 0,
            checked_idx: 0,
            start_line: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn read_idx(&self) -> usize {
        self.read_idx
    }

    pub fn checked_idx(&self) -> usize {
        self.checked_idx
    }

    pub fn start_line(&self) -> usize {
        self.start_line
    }

    pub fn is_full(&self) -> bool {
        self.read_idx >= self.buf.len()
    }

    /// Receives from `src` until it would block.
    ///
    /// Returns the number of bytes taken in by this call. A zero-length
    /// receive (peer closed) and hard errors are both failures; bytes
    /// received before the failure stay in the buffer. Filling stops once
    /// the buffer is exactly full, and a call on an already full buffer
    /// fails immediately.
    pub fn fill<R: Read>(&mut self, src: &mut R) -> ConnectionResult<usize> {
        if self.is_full() {
            return Err(ConnectionError::RequestTooLarge);
        }

        let mut received = 0;
        while self.read_idx < self.buf.len() {
            match src.read(&mut self.buf[self.read_idx..]) {
                Ok(0) => return Err(ConnectionError::PeerClosed),
                Ok(n) => {
                    self.read_idx += n;
                    received += n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(received)
    }

    /// Runs the tokenizer over the unscanned bytes.
    pub fn parse_line(&mut self) -> LineStatus {
        let (status, next) = line::parse_line(&mut self.buf[..self.read_idx], self.checked_idx);
        self.checked_idx = next;
        status
    }

    /// Hands out the line that the last [`LineStatus::Ok`] terminated and
    /// moves `start_line` to the beginning of the next one.
    pub fn take_line(&mut self) -> Span {
        let line = Span::new(self.start_line, self.checked_idx.saturating_sub(2));
        self.start_line = self.checked_idx;
        line
    }

    pub fn get(&self, span: Span) -> Option<&[u8]> {
        if span.end() > self.read_idx {
            return None;
        }
        self.buf.get(span.start..span.end())
    }

    /// Drops everything before `consumed` and slides the rest to the
    /// front. All outstanding views become invalid.
    pub fn compact(&mut self, consumed: usize) {
        let consumed = consumed.min(self.read_idx);
        self.buf.copy_within(consumed..self.read_idx, 0);
        self.read_idx -= consumed;
        self.checked_idx = 0;
        self.start_line = 0;
    }

    pub fn clear(&mut self) {
        self.read_idx = 0;
        self.checked_idx = 0;
        self.start_line = 0;
    }
}

/// Fixed-capacity response header buffer. Appends that do not fit fail
/// without moving `write_idx`.
pub struct WriteBuffer {
    buf: Box<[u8]>,
    write_idx: usize,
}

impl WriteBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            write_idx: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.write_idx
    }

    pub fn is_empty(&self) -> bool {
        self.write_idx == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.write_idx]
    }

    pub fn append(&mut self, bytes: &[u8]) -> ConnectionResult<()> {
        let end = self.write_idx + bytes.len();
        if end > self.buf.len() {
            return Err(ConnectionError::ResponseTooLarge);
        }
        self.buf[self.write_idx..end].copy_from_slice(bytes);
        self.write_idx = end;
        Ok(())
    }

    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) -> ConnectionResult<()> {
        let mut free = &mut self.buf[self.write_idx..];
        let before = free.len();
        free.write_fmt(args).map_err(|_| ConnectionError::ResponseTooLarge)?;
        self.write_idx += before - free.len();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.write_idx = 0;
    }
}
