//! A static-file HTTP/1.1 server.
//!
//! One reactor thread owns every socket and a fixed pool of workers parses
//! requests and stages responses. Files are served from a memory map and
//! written together with the response headers in a single vectored write.

pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod network;
pub mod server;

pub use config::Config;
pub use server::{ Server, ShutdownHandle };
