//! HTTP/1.1 request parsing and response formatting over fixed buffers.
//!
//! - **`buffer`**: bounded read/write buffers and buffer views
//! - **`line`**: the CRLF line tokenizer run in place over the read buffer
//! - **`request`**: the request-line / headers / body state machine
//! - **`response`**: status codes, canned bodies and the header formatter

pub mod buffer;
pub mod line;
pub mod request;
pub mod response;
