//! Proxy module for parsing and validating proxy lists
//!
//! This module provides functionality for:
//! - Parsing proxies from various formats (IP:PORT, IP:PORT:USER:PASS, USER:PASS@IP:PORT)
//! - Checking proxies with a bounded pool of concurrent workers
//! - Enriching working proxies with geo and ISP data
//! - Exporting working proxies in several text formats

pub mod export;
pub mod geo;
pub mod models;
pub mod parser;
pub mod pool;
pub mod probe;
pub mod records;
pub mod stats;

pub use export::{ExportFormatter, ExportKind};
pub use geo::{GeoInfo, GeoLocator, GeoSource};
pub use models::{
    ProbeOutcome, ProbeTarget, ProxyAddress, ProxyAuth, ProxyRecord, ProxyStatus, ProxyType,
    TypeSelection,
};
pub use parser::{ParseReport, ParsedLine, ProxyParser};
pub use pool::{PoolConfig, RunCanceller, RunHandle, ValidationPool};
pub use probe::{HttpProbe, ProbeConfig, ProxyProbe};
pub use records::RecordSet;
pub use stats::{ResultAggregator, Snapshot, Tally};
