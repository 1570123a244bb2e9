//! ArcGIS FeatureServer scraper.
//!
//! Layers that cap how many records a query may return are fetched by object ID windows, each
//! response saved as its own partial file. The partial files are later folded into one CSV sorted
//! by object ID.

pub mod aggregate;
pub mod config;
mod error;
mod macros;
pub mod parse;
pub mod process;
pub mod request;

pub use aggregate::{aggregate, AggregationReport, Aggregator, ConsolidatedTable};
pub use config::{OutputFormat, ScraperConfig};
pub use error::{Error, Result};
pub use process::{paginate, PaginationReport, Paginator, Termination};
pub use request::{FeatureSource, HttpSource, QueryRequest, QueryWindow};

// Used by `info_time!` and `warn_time!` so callers don't need chrono themselves.
#[doc(hidden)]
pub use chrono;

/// Share of the server's record cap requested per window.
const CHUNK_RATIO: f64 = 0.75;
const DEFAULT_ID_FIELD: &str = "OBJECTID";
const DEFAULT_OUTPUT_TYPE: &str = "json";
const DATE_FORMAT: &str = "%Y-%m-%d";
