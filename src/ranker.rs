use std::cmp::Ordering;
use std::collections::BTreeMap;

use ndarray::Array1;

use crate::data::Lap;
use crate::error::{PaceError, Result};
use crate::reference::ReferenceData;

/// How a driver's laps in one session are reduced to a single time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Fastest,
    Average,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Fastest, Metric::Average];

    fn reduce(&self, values: &Array1<f64>) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Metric::Fastest => Some(values.fold(f64::INFINITY, |acc, &v| acc.min(v))),
            Metric::Average => values.mean(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SectorResult {
    pub time: Option<f64>,
    pub rank: Option<u32>,
}

/// One driver's line in a session table.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRow {
    pub driver: String,
    pub team: String,
    /// `None` for drivers who kept no valid lap.
    pub lap_time: Option<f64>,
    /// Classification position for drivers without a valid lap.
    pub lap_rank: u32,
    pub pct_off_pace: Option<f64>,
    pub sectors: [SectorResult; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedTable {
    pub metric: Metric,
    /// Timed drivers in rank order, then drivers without a valid lap.
    pub rows: Vec<RankedRow>,
}

impl RankedTable {
    pub fn row(&self, driver: &str) -> Option<&RankedRow> {
        self.rows.iter().find(|r| r.driver == driver)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRanking {
    pub fastest: RankedTable,
    pub average: RankedTable,
}

impl SessionRanking {
    pub fn table(&self, metric: Metric) -> &RankedTable {
        match metric {
            Metric::Fastest => &self.fastest,
            Metric::Average => &self.average,
        }
    }
}

pub fn pct_off_pace(time: f64, reference: f64) -> f64 {
    (time - reference) / reference * 100.0
}

// missing times last, then by time, then by driver code
pub(crate) fn compare_times(a: (&str, Option<f64>), b: (&str, Option<f64>)) -> Ordering {
    match (a.1, b.1) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.0.cmp(b.0))
}

// positions 1..=N in compare_times order
fn positions(times: &BTreeMap<&str, Option<f64>>) -> BTreeMap<String, u32> {
    let mut order: Vec<(&str, Option<f64>)> = times.iter().map(|(d, t)| (*d, *t)).collect();
    order.sort_by(|a, b| compare_times(*a, *b));
    order
        .iter()
        .enumerate()
        .map(|(i, (driver, _))| (driver.to_string(), i as u32 + 1))
        .collect()
}

fn rank_metric(
    by_driver: &BTreeMap<&str, Vec<&Lap>>,
    metric: Metric,
    no_valid_lap: Option<&BTreeMap<String, u32>>,
    reference: &ReferenceData,
) -> Result<RankedTable> {
    // one reduced time per driver for the whole lap...
    let lap_times: BTreeMap<&str, Option<f64>> = by_driver
        .iter()
        .map(|(driver, laps)| {
            let values: Array1<f64> = laps.iter().filter_map(|l| l.lap_time).collect();
            (*driver, metric.reduce(&values))
        })
        .collect();

    // ...and one per sector, ranked on their own
    let sector_times: Vec<BTreeMap<&str, Option<f64>>> = (0..3)
        .map(|s| {
            by_driver
                .iter()
                .map(|(driver, laps)| {
                    let values: Array1<f64> = laps.iter().filter_map(|l| l.sectors[s]).collect();
                    (*driver, metric.reduce(&values))
                })
                .collect()
        })
        .collect();

    let lap_ranks = positions(&lap_times);
    let sector_ranks: Vec<BTreeMap<String, u32>> = sector_times.iter().map(positions).collect();

    let mut rows = Vec::with_capacity(lap_times.len());
    for (driver, time) in &lap_times {
        let sectors = [0, 1, 2].map(|s| SectorResult {
            time: sector_times[s][driver],
            rank: sector_ranks[s].get(*driver).copied(),
        });
        rows.push(RankedRow {
            driver: driver.to_string(),
            team: reference.team_of(driver)?.to_string(),
            lap_time: *time,
            lap_rank: lap_ranks[*driver],
            pct_off_pace: None,
            sectors,
        });
    }
    rows.sort_by_key(|r| r.lap_rank);

    // the rank-1 time sets the pace for everyone else
    let best = rows
        .first()
        .and_then(|r| r.lap_time)
        .ok_or_else(|| PaceError::InsufficientData("no valid lap to set the pace".to_string()))?;
    for row in rows.iter_mut() {
        row.pct_off_pace = row.lap_time.map(|t| pct_off_pace(t, best));
    }

    // no-lap drivers go after the timed field, ranked by where they were classified
    if let Some(no_valid_lap) = no_valid_lap {
        for (driver, position) in no_valid_lap {
            rows.push(RankedRow {
                driver: driver.clone(),
                team: reference.team_of(driver)?.to_string(),
                lap_time: None,
                lap_rank: *position,
                pct_off_pace: None,
                sectors: Default::default(),
            });
        }
    }

    Ok(RankedTable { metric, rows })
}

/// Ranks every driver with a valid lap by fastest and by average time,
/// overall and per sector.
pub fn rank_session(
    laps: &[Lap],
    no_valid_lap: Option<&BTreeMap<String, u32>>,
    reference: &ReferenceData,
) -> Result<SessionRanking> {
    // group the laps per driver first, untimed laps don't count
    let mut by_driver: BTreeMap<&str, Vec<&Lap>> = BTreeMap::new();
    for lap in laps.iter().filter(|l| l.lap_time.is_some()) {
        by_driver.entry(lap.driver.as_str()).or_default().push(lap);
    }
    if by_driver.is_empty() {
        return Err(PaceError::InsufficientData(
            "no driver set a valid lap".to_string(),
        ));
    }

    Ok(SessionRanking {
        fastest: rank_metric(&by_driver, Metric::Fastest, no_valid_lap, reference)?,
        average: rank_metric(&by_driver, Metric::Average, no_valid_lap, reference)?,
    })
}
