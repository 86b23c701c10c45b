//! # Stratus Resilience
//!
//! Timing primitives shared by the client runtime:
//!
//! - [`BackoffPolicy`] - exponential delay with a cap, or a fixed interval
//! - [`sleep_or_cancel`] - a sleep that gives up once a [`CancellationToken`]
//!   fires
//!
//! ```rust
//! use std::time::Duration;
//! use stratus_resilience::BackoffPolicy;
//!
//! let policy = BackoffPolicy::default();
//! let delays: Vec<_> = policy.iter().take(5).collect();
//! assert_eq!(delays[0], Duration::from_millis(500));
//! assert_eq!(delays[4], Duration::from_secs(5));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod cancel;

pub use backoff::{Backoff, BackoffPolicy, PolicyError};
pub use cancel::{Cancelled, sleep_or_cancel};
pub use tokio_util::sync::CancellationToken;
