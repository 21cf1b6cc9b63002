use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::data::{Lap, Session};
use crate::error::{PaceError, Result};

pub const DEFAULT_IQR_MULTIPLIER: f64 = 2.0;

/// Fewest distinct Q1 times that still give meaningful quartiles.
pub const MIN_DISTINCT_Q1_TIMES: usize = 4;

/// Laps that survived filtering for one session.
#[derive(Debug, Clone)]
pub struct FilteredSession {
    pub laps: Vec<Lap>,
    /// Drivers who ran in the session but kept no lap, mapped to their
    /// official position.
    pub no_valid_lap: BTreeMap<String, u32>,
    /// Upper lap-time threshold `Q3 + k * IQR`, in seconds.
    pub cutoff: f64,
    /// Accurate laps dropped for exceeding the cutoff.
    pub removed: usize,
}

/// Percentile with linear interpolation between the two closest ranks,
/// `q` in 0..=100. `values` does not need to be sorted.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

/// Upper cutoff `Q3 + k * IQR` over the session's Q1 times.
pub fn anomaly_threshold(q1_times: &[f64], k: f64) -> Result<f64> {
    // quartiles over a handful of equal times are meaningless, so bail out
    let mut distinct = q1_times.to_vec();
    distinct.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    distinct.dedup();
    if distinct.len() < MIN_DISTINCT_Q1_TIMES {
        return Err(PaceError::InsufficientData(format!(
            "{} distinct Q1 times, need at least {MIN_DISTINCT_Q1_TIMES}",
            distinct.len()
        )));
    }

    let (Some(q1), Some(q3)) = (percentile(q1_times, 25.0), percentile(q1_times, 75.0)) else {
        return Err(PaceError::InsufficientData("no Q1 times".to_string()));
    };
    Ok(q3 + k * (q3 - q1))
}

/// `mm:ss.mmm`
pub fn format_lap_time(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0).round() as u64;
    format!(
        "{:02}:{:02}.{:03}",
        total_ms / 60_000,
        (total_ms / 1000) % 60,
        total_ms % 1000
    )
}

/// Drops invalid laps and laps slower than the session's anomaly cutoff.
pub fn filter_anomalous_laps(session: &Session, k: f64) -> Result<FilteredSession> {
    // in/out laps, deleted laps and laps with no time never count
    let accurate: Vec<&Lap> = session
        .laps
        .iter()
        .filter(|l| l.is_accurate && !l.deleted && l.lap_time.is_some())
        .collect();

    let cutoff = anomaly_threshold(&session.q1_times(), k).map_err(|e| match e {
        PaceError::InsufficientData(reason) => PaceError::InsufficientData(format!(
            "{} {}: {reason}",
            session.event, session.kind
        )),
        other => other,
    })?;

    // only an upper cutoff, the accuracy flag already rules out anything
    // impossibly fast
    let laps: Vec<Lap> = accurate
        .iter()
        .filter(|l| l.lap_time.is_some_and(|t| t <= cutoff))
        .map(|l| (*l).clone())
        .collect();
    let removed = accurate.len() - laps.len();

    info!(
        event = %session.event,
        kind = %session.kind,
        "cutoff lap time {}, removed {} laps",
        format_lap_time(cutoff),
        removed
    );

    // anyone who ran but kept nothing falls back to their official position
    let mut no_valid_lap = BTreeMap::new();
    for driver in session.drivers() {
        if laps.iter().any(|l| l.driver == driver) {
            continue;
        }
        let position = session.position_of(driver).ok_or_else(|| {
            PaceError::InsufficientData(format!(
                "{} {}: {driver} has no valid lap and no classification",
                session.event, session.kind
            ))
        })?;
        no_valid_lap.insert(driver.to_string(), position);
    }

    if !no_valid_lap.is_empty() {
        info!(
            event = %session.event,
            "drivers without a competitive lap: {:?}",
            no_valid_lap.keys().collect::<Vec<_>>()
        );
    }
    debug!(kept = laps.len(), "filtered {} {}", session.event, session.kind);

    Ok(FilteredSession {
        laps,
        no_valid_lap,
        cutoff,
        removed,
    })
}
