use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use ndarray::aview1;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::data::{SessionKind, SessionSource};
use crate::error::{PaceError, Result};
use crate::filter::filter_anomalous_laps;
use crate::lead::select_lead_drivers;
use crate::ranker::{rank_session, Metric, SessionRanking};
use crate::reference::ReferenceData;

/// What to do when an event's main qualifying session cannot be ranked.
/// Sprint failures are always skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the scan; later events are not included.
    #[default]
    Abort,
    /// Leave the event out and carry on.
    Skip,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRanking {
    pub event: String,
    pub qualifying: SessionRanking,
    pub sprint: Option<SessionRanking>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanIssue {
    pub event: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeasonRankings {
    pub events: Vec<EventRanking>,
    pub skipped_sprints: Vec<ScanIssue>,
    pub skipped_events: Vec<ScanIssue>,
    /// Set when the scan ended before the end of the calendar.
    pub stopped_at: Option<ScanIssue>,
}

/// Retrieves, filters and ranks one session.
pub fn rank_event(
    source: &dyn SessionSource,
    reference: &ReferenceData,
    config: &PipelineConfig,
    event: &str,
    kind: SessionKind,
) -> Result<SessionRanking> {
    let session = source.get_session(config.season, event, kind)?;
    let filtered = filter_anomalous_laps(&session, config.iqr_multiplier)?;
    let no_valid_lap = config
        .include_no_lap_drivers
        .then_some(&filtered.no_valid_lap);
    rank_session(&filtered.laps, no_valid_lap, reference)
}

pub fn collect_season(
    source: &dyn SessionSource,
    reference: &ReferenceData,
    config: &PipelineConfig,
) -> Result<SeasonRankings> {
    collect_season_with(source, reference, config, |_| true)
}

/// Ranks every event on the calendar, plus its sprint qualifying where the
/// event hosts one.
///
/// `keep_going` is asked before each event; returning false ends the scan
/// there. Unknown drivers abort the whole scan with an error.
pub fn collect_season_with<F>(
    source: &dyn SessionSource,
    reference: &ReferenceData,
    config: &PipelineConfig,
    mut keep_going: F,
) -> Result<SeasonRankings>
where
    F: FnMut(&str) -> bool,
{
    info!(season = config.season, "scraping qualifying data");
    let mut rankings = SeasonRankings::default();

    for event in reference.events() {
        if !keep_going(event) {
            info!(event, "season scan cancelled");
            rankings.stopped_at = Some(ScanIssue {
                event: event.to_string(),
                reason: "cancelled".to_string(),
            });
            break;
        }

        info!(event, "scraping");
        let qualifying =
            match rank_event(source, reference, config, event, SessionKind::Qualifying) {
                Ok(ranking) => ranking,
                Err(e @ PaceError::UnknownIdentity(_)) => return Err(e),
                Err(e) => {
                    let issue = ScanIssue {
                        event: event.to_string(),
                        reason: e.to_string(),
                    };
                    match config.on_main_session_failure {
                        FailurePolicy::Abort => {
                            warn!(event, error = %e, "cannot scrape, stopping season scan");
                            rankings.stopped_at = Some(issue);
                            break;
                        }
                        FailurePolicy::Skip => {
                            warn!(event, error = %e, "cannot scrape, skipping event");
                            rankings.skipped_events.push(issue);
                            continue;
                        }
                    }
                }
            };

        let sprint = if reference.has_sprint(event) {
            match rank_event(source, reference, config, event, SessionKind::SprintQualifying) {
                Ok(ranking) => Some(ranking),
                Err(e @ PaceError::UnknownIdentity(_)) => return Err(e),
                Err(e) => {
                    warn!(event, error = %e, "skipping sprint, timing data looks unreliable");
                    rankings.skipped_sprints.push(ScanIssue {
                        event: event.to_string(),
                        reason: e.to_string(),
                    });
                    None
                }
            }
        } else {
            None
        };

        rankings.events.push(EventRanking {
            event: event.to_string(),
            qualifying,
            sprint,
        });
    }

    Ok(rankings)
}

#[derive(Debug, Default)]
struct PaceSamples {
    ranks: Vec<f64>,
    pcts: Vec<f64>,
}

impl PaceSamples {
    fn push(&mut self, rank: u32, pct: Option<f64>) {
        self.ranks.push(rank as f64);
        // untimed rows carry a rank but no pace
        if let Some(pct) = pct {
            self.pcts.push(pct);
        }
    }

    fn mean_rank(&self) -> Option<f64> {
        aview1(&self.ranks).mean()
    }

    fn mean_pct(&self) -> Option<f64> {
        aview1(&self.pcts).mean()
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    fastest: PaceSamples,
    average: PaceSamples,
}

impl Accumulator {
    fn samples(&mut self, metric: Metric) -> &mut PaceSamples {
        match metric {
            Metric::Fastest => &mut self.fastest,
            Metric::Average => &mut self.average,
        }
    }
}

// accumulators for a closed set of identities, seeded up front
struct Ledger {
    kind: &'static str,
    entries: BTreeMap<String, Accumulator>,
}

impl Ledger {
    fn new<'a>(kind: &'static str, identities: impl Iterator<Item = &'a str>) -> Self {
        Self {
            kind,
            entries: identities
                .map(|id| (id.to_string(), Accumulator::default()))
                .collect(),
        }
    }

    fn record(&mut self, identity: &str, metric: Metric, rank: u32, pct: Option<f64>) -> Result<()> {
        let acc = self.entries.get_mut(identity).ok_or_else(|| {
            PaceError::UnknownIdentity(format!("{} {identity}", self.kind))
        })?;
        acc.samples(metric).push(rank, pct);
        Ok(())
    }

    fn get(&self, identity: &str) -> Option<&Accumulator> {
        self.entries.get(identity)
    }
}

// serde renames are the published column headers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverAggregate {
    #[serde(rename = "Driver")] pub driver: String,
    #[serde(rename = "Team")] pub team: String,
    #[serde(rename = "FL Average Rank")] pub fastest_rank: f64,
    #[serde(rename = "Avg pct of FL pace")] pub fastest_pct: Option<f64>,
    #[serde(rename = "AV Average Rank")] pub average_rank: Option<f64>,
    #[serde(rename = "Avg pct of avg pace")] pub average_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamAggregate {
    #[serde(rename = "Team")] pub team: String,
    #[serde(rename = "FL Average Rank")] pub fastest_rank: f64,
    #[serde(rename = "Avg pct of FL pace")] pub fastest_pct: Option<f64>,
    #[serde(rename = "AV Average Rank")] pub average_rank: Option<f64>,
    #[serde(rename = "Avg pct of avg pace")] pub average_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedEvent {
    pub event: String,
    pub with_sprint: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonTables {
    /// `None` when every event was included.
    pub downforce: Option<u8>,
    pub drivers: Vec<DriverAggregate>,
    pub teams: Vec<TeamAggregate>,
    pub lead_drivers: Vec<TeamAggregate>,
    pub events: Vec<IncludedEvent>,
}

fn team_row(team: &str, acc: &Accumulator) -> Option<TeamAggregate> {
    Some(TeamAggregate {
        team: team.to_string(),
        fastest_rank: acc.fastest.mean_rank()?,
        fastest_pct: acc.fastest.mean_pct(),
        average_rank: acc.average.mean_rank(),
        average_pct: acc.average.mean_pct(),
    })
}

fn by_fastest_rank(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

fn accumulate(
    ranking: &SessionRanking,
    drivers: &mut Ledger,
    teams: &mut Ledger,
    leads: &mut Ledger,
) -> Result<()> {
    for metric in Metric::ALL {
        let table = ranking.table(metric);
        for row in &table.rows {
            drivers.record(&row.driver, metric, row.lap_rank, row.pct_off_pace)?;
            teams.record(&row.team, metric, row.lap_rank, row.pct_off_pace)?;
        }
        for lead in select_lead_drivers(table) {
            leads.record(&lead.team, metric, lead.rank, lead.pct_off_pace)?;
        }
    }
    Ok(())
}

/// Mean rank and mean percentage off pace per driver, per team and per
/// team lead driver, over the events at `downforce` (all events if `None`).
///
/// Each table is sorted by mean fastest-lap rank. Identities that never
/// appear are left out.
pub fn aggregate_season(
    rankings: &SeasonRankings,
    downforce: Option<u8>,
    reference: &ReferenceData,
) -> Result<SeasonTables> {
    let selected: Option<BTreeSet<&str>> = downforce
        .map(|level| reference.events_at_downforce(level))
        .transpose()?;
    match downforce {
        Some(level) => info!(level, "calculating pace rankings at downforce level"),
        None => info!("calculating pace rankings over all events"),
    }

    let mut drivers = Ledger::new("driver", reference.drivers());
    let mut teams = Ledger::new("team", reference.teams());
    let mut leads = Ledger::new("team", reference.teams());
    let mut events = Vec::new();

    for ranked in &rankings.events {
        if selected
            .as_ref()
            .is_some_and(|s| !s.contains(ranked.event.as_str()))
        {
            continue;
        }

        accumulate(&ranked.qualifying, &mut drivers, &mut teams, &mut leads)?;
        if let Some(sprint) = &ranked.sprint {
            accumulate(sprint, &mut drivers, &mut teams, &mut leads)?;
        }
        events.push(IncludedEvent {
            event: ranked.event.clone(),
            with_sprint: ranked.sprint.is_some(),
        });
    }

    let mut driver_rows = Vec::new();
    for driver in reference.drivers() {
        let Some(acc) = drivers.get(driver) else { continue };
        let Some(fastest_rank) = acc.fastest.mean_rank() else { continue };
        driver_rows.push(DriverAggregate {
            driver: driver.to_string(),
            team: reference.team_of(driver)?.to_string(),
            fastest_rank,
            fastest_pct: acc.fastest.mean_pct(),
            average_rank: acc.average.mean_rank(),
            average_pct: acc.average.mean_pct(),
        });
    }
    let mut team_rows: Vec<TeamAggregate> = reference
        .teams()
        .filter_map(|t| teams.get(t).and_then(|acc| team_row(t, acc)))
        .collect();
    let mut lead_rows: Vec<TeamAggregate> = reference
        .teams()
        .filter_map(|t| leads.get(t).and_then(|acc| team_row(t, acc)))
        .collect();

    driver_rows.sort_by(|a, b| {
        by_fastest_rank(a.fastest_rank, b.fastest_rank).then_with(|| a.driver.cmp(&b.driver))
    });
    for rows in [&mut team_rows, &mut lead_rows] {
        rows.sort_by(|a, b| {
            by_fastest_rank(a.fastest_rank, b.fastest_rank).then_with(|| a.team.cmp(&b.team))
        });
    }

    info!(events = events.len(), "completed pace rankings");
    Ok(SeasonTables {
        downforce,
        drivers: driver_rows,
        teams: team_rows,
        lead_drivers: lead_rows,
        events,
    })
}
