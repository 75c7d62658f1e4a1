//! Proxy Validator - concurrent proxy list checker
//!
//! Parses proxy lists in several address formats, checks every proxy with a
//! bounded pool of concurrent probes, enriches working ones with geo and ISP
//! data, and exports them in five text formats.

pub mod error;
pub mod proxy;
pub mod tui;

pub use error::{InputError, ParseFailure, ProbeError};
pub use proxy::*;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
