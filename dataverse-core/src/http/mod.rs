//! HTTP access shared by all extractors.

pub mod client;
pub mod retry;

pub use client::{FetchError, HttpClient, RawResponse};
pub use retry::{Jitter, RetryPolicy};
