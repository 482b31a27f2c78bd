//! Completion client for generating chat replies.
//!
//! Provides:
//! - Response body types of the completion endpoint
//! - `HttpCompletionClient` - the `CompletionClient` over HTTP

pub mod client;
pub mod protocol;

pub use client::HttpCompletionClient;
pub use protocol::ResponseApi;
