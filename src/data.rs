use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use serde::Deserialize;

use crate::error::{PaceError, Result};

// column names follow the timing provider's lap export
#[derive(Debug, Deserialize)]
struct RawLap {
    #[serde(rename = "Driver")] driver: String,
    #[serde(rename = "Team")] team: String,
    #[serde(rename = "LapTime")] lap_time: Option<f64>,
    #[serde(rename = "Sector1Time")] sector1: Option<f64>,
    #[serde(rename = "Sector2Time")] sector2: Option<f64>,
    #[serde(rename = "Sector3Time")] sector3: Option<f64>,
    #[serde(rename = "TyreLife")] tyre_life: Option<f64>,
    #[serde(rename = "IsAccurate")] is_accurate: bool,
    #[serde(rename = "Deleted")] deleted: bool,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(rename = "Abbreviation")] driver: String,
    #[serde(rename = "Position")] position: u32,
    #[serde(rename = "Q1")] q1: Option<f64>,
}

/// One flying lap attempt. Times are in seconds; a missing value means the
/// timing feed did not record it.
#[derive(Debug, Clone, PartialEq)]
pub struct Lap {
    pub driver: String,
    pub team: String,
    pub lap_time: Option<f64>,
    pub sectors: [Option<f64>; 3],
    pub tyre_life: Option<u32>,
    /// False for in/out laps and other non-representative laps.
    pub is_accurate: bool,
    // track limits
    pub deleted: bool,
}

impl Lap {
    /// A clean accurate lap, mostly for building sessions by hand.
    pub fn timed(driver: &str, team: &str, lap_time: f64, sectors: [f64; 3]) -> Self {
        Self {
            driver: driver.to_string(),
            team: team.to_string(),
            lap_time: Some(lap_time),
            sectors: sectors.map(Some),
            tyre_life: None,
            is_accurate: true,
            deleted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationEntry {
    pub driver: String,
    pub position: u32,
    /// Best time in the first qualifying segment.
    pub q1_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionKind {
    Qualifying,
    SprintQualifying,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Qualifying => "qualifying",
            SessionKind::SprintQualifying => "sprint_qualifying",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub event: String,
    pub kind: SessionKind,
    pub laps: Vec<Lap>,
    pub classification: Vec<ClassificationEntry>,
}

impl Session {
    pub fn position_of(&self, driver: &str) -> Option<u32> {
        self.classification
            .iter()
            .find(|c| c.driver == driver)
            .map(|c| c.position)
    }

    /// Every driver that appears anywhere in the raw laps.
    pub fn drivers(&self) -> BTreeSet<&str> {
        self.laps.iter().map(|l| l.driver.as_str()).collect()
    }

    pub fn q1_times(&self) -> Vec<f64> {
        self.classification.iter().filter_map(|c| c.q1_time).collect()
    }
}

pub trait SessionSource {
    fn get_session(&self, season: u16, event: &str, kind: SessionKind) -> Result<Session>;
}

/// Reads sessions exported as CSV, laid out as
/// `<root>/<season>/<event>/<kind>_laps.csv` and `<kind>_results.csv`.
pub struct CsvSessionSource {
    root: PathBuf,
}

impl CsvSessionSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn session_dir(&self, season: u16, event: &str) -> PathBuf {
        self.root.join(season.to_string()).join(event)
    }

    fn read_laps(path: &Path) -> Result<Vec<Lap>> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let mut laps = Vec::new();
        for res in reader.deserialize() {
            let raw: RawLap = res?;
            laps.push(Lap {
                driver: raw.driver,
                team: raw.team,
                lap_time: raw.lap_time,
                sectors: [raw.sector1, raw.sector2, raw.sector3],
                tyre_life: raw.tyre_life.map(|t| t.round() as u32),
                is_accurate: raw.is_accurate,
                deleted: raw.deleted,
            });
        }
        Ok(laps)
    }

    fn read_classification(path: &Path) -> Result<Vec<ClassificationEntry>> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        let mut classification = Vec::new();
        for res in reader.deserialize() {
            let raw: RawResult = res?;
            classification.push(ClassificationEntry {
                driver: raw.driver,
                position: raw.position,
                q1_time: raw.q1,
            });
        }
        classification.sort_by_key(|c| c.position);
        Ok(classification)
    }
}

impl SessionSource for CsvSessionSource {
    fn get_session(&self, season: u16, event: &str, kind: SessionKind) -> Result<Session> {
        let dir = self.session_dir(season, event);
        let laps_path = dir.join(format!("{kind}_laps.csv"));
        let results_path = dir.join(format!("{kind}_results.csv"));

        for path in [&laps_path, &results_path] {
            if !path.exists() {
                return Err(PaceError::Retrieval {
                    event: event.to_string(),
                    kind,
                    reason: format!("{} not found", path.display()),
                });
            }
        }

        Ok(Session {
            event: event.to_string(),
            kind,
            laps: Self::read_laps(&laps_path)?,
            classification: Self::read_classification(&results_path)?,
        })
    }
}
