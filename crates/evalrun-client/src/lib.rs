//! Client library for the evalrun server.
//!
//! Provides a typed HTTP client and a [`Watcher`] that polls a session until
//! the completion rule is satisfied.

pub mod error;
pub mod http;
pub mod watch;

pub use error::{ClientError, WatchError};
pub use http::HttpClient;
pub use watch::{outcome_of, Poll, SessionProbe, WatchReport, Watcher, DEFAULT_POLL_INTERVAL};
