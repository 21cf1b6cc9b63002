//! Relative qualifying pace of drivers and constructors across a season.
//!
//! Raw session laps flow through [`filter`], [`ranker`] and [`lead`], and
//! [`season`] averages the per-session results, optionally over venues of
//! one downforce level only.

pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod lead;
pub mod publish;
pub mod ranker;
pub mod reference;
pub mod season;

pub use config::PipelineConfig;
pub use data::{CsvSessionSource, Lap, Session, SessionKind, SessionSource};
pub use error::{PaceError, Result};
pub use reference::ReferenceData;
pub use season::{aggregate_season, collect_season, FailurePolicy, SeasonRankings, SeasonTables};
