use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::filter::DEFAULT_IQR_MULTIPLIER;
use crate::reference::MAX_COMBINED_LEVEL;
use crate::season::FailurePolicy;

/// Environment variable naming the config file when no path is given.
pub const CONFIG_ENV: &str = "QUALI_PACE_CONFIG";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub season: u16,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// k in the `Q3 + k * IQR` lap time cutoff.
    pub iqr_multiplier: f64,
    /// Append drivers without a valid lap to the session tables at their
    /// classification position.
    pub include_no_lap_drivers: bool,
    pub on_main_session_failure: FailurePolicy,
    /// Downforce queries to publish; 0 aggregates every event.
    pub downforce_levels: Vec<u8>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            season: 2023,
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            include_no_lap_drivers: false,
            on_main_session_failure: FailurePolicy::Abort,
            downforce_levels: (0..=MAX_COMBINED_LEVEL).collect(),
        }
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Loads `path` if given, else the file named by `QUALI_PACE_CONFIG`,
    /// else the defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => match std::env::var_os(CONFIG_ENV) {
                Some(p) => Self::load(PathBuf::from(p)),
                None => Ok(Self::default()),
            },
        }
    }

    /// Configured downforce queries, with 0 mapped to "no filter".
    pub fn downforce_queries(&self) -> impl Iterator<Item = Option<u8>> + '_ {
        self.downforce_levels
            .iter()
            .map(|&level| (level != 0).then_some(level))
    }
}
