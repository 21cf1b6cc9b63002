use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::ranker::{compare_times, pct_off_pace, RankedRow, RankedTable};

/// A team's best-placed driver in one session, re-ranked against the other
/// teams' best-placed drivers.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadRow {
    pub team: String,
    pub driver: String,
    pub lap_time: Option<f64>,
    pub rank: u32,
    pub pct_off_pace: Option<f64>,
}

// timed leads by time, untimed leads by classification position
fn lead_order(a: &RankedRow, b: &RankedRow) -> Ordering {
    match (a.lap_time, b.lap_time) {
        (None, None) => a
            .lap_rank
            .cmp(&b.lap_rank)
            .then_with(|| a.driver.cmp(&b.driver)),
        _ => compare_times((a.driver.as_str(), a.lap_time), (b.driver.as_str(), b.lap_time)),
    }
}

/// Keeps each team's better-ranked driver and ranks the reduced field 1..M.
/// Ties on rank drop the later driver code.
pub fn select_lead_drivers(table: &RankedTable) -> Vec<LeadRow> {
    let mut best: BTreeMap<&str, &RankedRow> = BTreeMap::new();
    for row in &table.rows {
        best.entry(row.team.as_str())
            .and_modify(|current| {
                if (row.lap_rank, &row.driver) < (current.lap_rank, &current.driver) {
                    *current = row;
                }
            })
            .or_insert(row);
    }

    let mut leads: Vec<&RankedRow> = best.into_values().collect();
    leads.sort_by(|a, b| lead_order(a, b));

    // pct is measured against the new rank-1 time, not inherited
    let pace = leads.first().and_then(|r| r.lap_time);
    leads
        .iter()
        .enumerate()
        .map(|(i, row)| LeadRow {
            team: row.team.clone(),
            driver: row.driver.clone(),
            lap_time: row.lap_time,
            rank: i as u32 + 1,
            pct_off_pace: row.lap_time.zip(pace).map(|(t, p)| pct_off_pace(t, p)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranker::{Metric, SectorResult};

    fn row(driver: &str, team: &str, time: Option<f64>, rank: u32) -> RankedRow {
        RankedRow {
            driver: driver.to_string(),
            team: team.to_string(),
            lap_time: time,
            lap_rank: rank,
            pct_off_pace: None,
            sectors: [SectorResult::default(); 3],
        }
    }

    fn table(rows: Vec<RankedRow>) -> RankedTable {
        RankedTable {
            metric: Metric::Fastest,
            rows,
        }
    }

    #[test]
    fn test_drops_slower_teammate() {
        let t = table(vec![
            row("A1", "Alpha", Some(80.0), 1),
            row("X", "T", Some(80.2), 2),
            row("B1", "Beta", Some(80.3), 3),
            row("C1", "Gamma", Some(80.4), 4),
            row("Y", "T", Some(80.8), 5),
        ]);
        let leads = select_lead_drivers(&t);

        assert_eq!(leads.len(), 4);
        let t_rows: Vec<&LeadRow> = leads.iter().filter(|r| r.team == "T").collect();
        assert_eq!(t_rows.len(), 1);
        assert_eq!(t_rows[0].driver, "X");
        assert_eq!(t_rows[0].rank, 2);
        assert_eq!(leads.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_reranks_and_recomputes_pct() {
        let t = table(vec![
            row("A1", "Alpha", Some(80.0), 1),
            row("A2", "Alpha", Some(80.1), 2),
            row("B1", "Beta", Some(80.4), 3),
            row("B2", "Beta", Some(80.5), 4),
        ]);
        let leads = select_lead_drivers(&t);

        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].driver, "A1");
        assert_eq!(leads[0].pct_off_pace, Some(0.0));
        assert_eq!(leads[1].driver, "B1");
        assert_eq!(leads[1].rank, 2);
        assert!((leads[1].pct_off_pace.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_single_driver_team_passes_through() {
        let t = table(vec![
            row("A1", "Alpha", Some(80.0), 1),
            row("S", "Solo", Some(80.2), 2),
            row("A2", "Alpha", Some(80.3), 3),
        ]);
        let leads = select_lead_drivers(&t);
        let solo = leads.iter().find(|r| r.team == "Solo").unwrap();
        assert_eq!(solo.driver, "S");
        assert_eq!(solo.lap_time, Some(80.2));
    }

    #[test]
    fn test_untimed_rows_sort_last() {
        let t = table(vec![
            row("A1", "Alpha", Some(80.0), 1),
            row("B1", "Beta", Some(80.5), 2),
            row("C1", "Gamma", None, 3),
            row("B2", "Beta", None, 4),
        ]);
        let leads = select_lead_drivers(&t);

        assert_eq!(leads.len(), 3);
        assert_eq!(leads[2].driver, "C1");
        assert_eq!(leads[2].rank, 3);
        assert_eq!(leads[2].pct_off_pace, None);
        assert!(leads.iter().all(|r| r.driver != "B2"));
    }

    #[test]
    fn test_equal_ranks_drop_later_code() {
        let t = table(vec![
            row("A1", "Alpha", Some(80.0), 1),
            row("Z", "Zeta", None, 2),
            row("M", "Zeta", None, 2),
        ]);
        let leads = select_lead_drivers(&t);
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[1].driver, "M");
    }

    #[test]
    fn test_untimed_leads_follow_classification() {
        let t = table(vec![
            row("AAA", "Alpha", Some(80.0), 1),
            row("ZZZ", "Zeta", None, 12),
            row("BBB", "Beta", None, 18),
        ]);
        let leads = select_lead_drivers(&t);
        let order: Vec<(&str, u32)> = leads.iter().map(|r| (r.driver.as_str(), r.rank)).collect();
        // P12 outranks P18 even though BBB sorts first by code
        assert_eq!(order, vec![("AAA", 1), ("ZZZ", 2), ("BBB", 3)]);
    }

    mod properties {
        use std::collections::{BTreeMap, BTreeSet};

        use proptest::prelude::*;

        use super::*;
        use crate::data::Lap;
        use crate::ranker::rank_session;
        use crate::reference::ReferenceData;

        const GRID: [&str; 20] = [
            "VER", "PER", "ALO", "STR", "HAM", "RUS", "LEC", "SAI", "BOT", "ZHO", "GAS", "OCO",
            "ALB", "SAR", "TSU", "RIC", "HUL", "MAG", "NOR", "PIA",
        ];

        // random timed laps over part of the grid; everyone else gets a
        // shuffled classification position and no lap
        fn session_strategy() -> impl Strategy<Value = (Vec<Lap>, BTreeMap<String, u32>)> {
            (
                prop::collection::vec((0..GRID.len(), 75.0f64..95.0), 1..60),
                Just((1..=GRID.len() as u32).collect::<Vec<u32>>()).prop_shuffle(),
            )
                .prop_map(|(times, positions)| {
                    let laps: Vec<Lap> = times
                        .iter()
                        .map(|&(d, t)| Lap::timed(GRID[d], "", t, [t / 3.0; 3]))
                        .collect();
                    let no_lap = GRID
                        .iter()
                        .zip(positions)
                        .filter(|(d, _)| laps.iter().all(|l| l.driver != **d))
                        .map(|(d, p)| (d.to_string(), p))
                        .collect();
                    (laps, no_lap)
                })
        }

        proptest! {
            #[test]
            fn one_lead_per_team_taken_from_the_table(
                (laps, no_lap) in session_strategy(),
                with_no_lap in any::<bool>()
            ) {
                let reference = ReferenceData::season_2023().unwrap();
                let ranking = rank_session(&laps, with_no_lap.then_some(&no_lap), &reference).unwrap();

                for table in [&ranking.fastest, &ranking.average] {
                    let leads = select_lead_drivers(table);

                    let teams: BTreeSet<&str> = table.rows.iter().map(|r| r.team.as_str()).collect();
                    let lead_teams: BTreeSet<&str> = leads.iter().map(|r| r.team.as_str()).collect();
                    prop_assert_eq!(leads.len(), teams.len());
                    prop_assert_eq!(&lead_teams, &teams);

                    let ranks: Vec<u32> = leads.iter().map(|r| r.rank).collect();
                    prop_assert_eq!(ranks, (1..=leads.len() as u32).collect::<Vec<_>>());

                    for lead in &leads {
                        // lap time passes through and no teammate placed better
                        let source = table.row(&lead.driver).unwrap();
                        prop_assert_eq!(lead.lap_time, source.lap_time);
                        let best_rank = table
                            .rows
                            .iter()
                            .filter(|r| r.team == lead.team)
                            .map(|r| r.lap_rank)
                            .min();
                        prop_assert_eq!(Some(source.lap_rank), best_rank);
                    }

                    if leads[0].lap_time.is_some() {
                        prop_assert_eq!(leads[0].pct_off_pace, Some(0.0));
                    }
                    for pair in leads.windows(2) {
                        match (pair[0].lap_time, pair[1].lap_time) {
                            (Some(a), Some(b)) => prop_assert!(a <= b),
                            (None, Some(_)) => prop_assert!(false, "untimed lead ahead of a timed one"),
                            (Some(_), None) => {}
                            (None, None) => {
                                let a = table.row(&pair[0].driver).unwrap().lap_rank;
                                let b = table.row(&pair[1].driver).unwrap().lap_rank;
                                prop_assert!(a <= b);
                            }
                        }
                    }
                }
            }
        }
    }
}
