use std::fs;
use std::path::{Path, PathBuf};

use csv::Writer;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::season::{DriverAggregate, SeasonTables, TeamAggregate};

/// Rows between the tops of consecutive downforce blocks on the sheet.
pub const BLOCK_HEIGHT: usize = 23;
/// Columns between adjacent tables within a block.
pub const TABLE_SPACING: usize = 6;

const DRIVER_HEADERS: [&str; 6] = [
    "Driver",
    "Team",
    "FL Average Rank",
    "Avg pct of FL pace",
    "AV Average Rank",
    "Avg pct of avg pace",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    LeadDriver,
    Team,
    Driver,
}

impl TableKind {
    pub fn file_stem(&self) -> &'static str {
        match self {
            TableKind::LeadDriver => "lead_driver_df",
            TableKind::Team => "team_df",
            TableKind::Driver => "driver_df",
        }
    }

    fn index(&self) -> usize {
        match self {
            TableKind::LeadDriver => 0,
            TableKind::Team => 1,
            TableKind::Driver => 2,
        }
    }
}

/// Top-left cell (1-based) of a table on the shared sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridPlacement {
    pub row: usize,
    pub col: usize,
}

impl GridPlacement {
    /// Blocks are keyed by the downforce level itself (0 for the unfiltered
    /// query), not by where the level sits in the configured query list, so
    /// level `n` always starts at row `2 + 23 * n`.
    pub fn for_level(level: Option<u8>, table: TableKind) -> Self {
        Self {
            row: 2 + BLOCK_HEIGHT * level.unwrap_or(0) as usize,
            col: 1 + TABLE_SPACING * table.index(),
        }
    }
}

pub trait TableSink {
    fn write_tables(&mut self, tables: &SeasonTables) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

fn level_suffix(level: Option<u8>) -> u8 {
    level.unwrap_or(0)
}

/// One CSV file per table per downforce query.
pub struct CsvTableSink {
    dir: PathBuf,
}

impl CsvTableSink {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn path_for(&self, level: Option<u8>, table: TableKind) -> PathBuf {
        self.dir
            .join(format!("{}{}.csv", table.file_stem(), level_suffix(level)))
    }

    fn write<T: Serialize>(&self, path: &Path, rows: &[T], headers: &[&str]) -> Result<()> {
        let mut writer = Writer::from_path(path)?;
        if rows.is_empty() {
            // serde only emits headers alongside a first record
            writer.write_record(headers)?;
        }
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl TableSink for CsvTableSink {
    fn write_tables(&mut self, tables: &SeasonTables) -> Result<()> {
        let level = tables.downforce;
        let team_headers = &DRIVER_HEADERS[1..];
        self.write(&self.path_for(level, TableKind::LeadDriver), &tables.lead_drivers, team_headers)?;
        self.write(&self.path_for(level, TableKind::Team), &tables.teams, team_headers)?;
        self.write(&self.path_for(level, TableKind::Driver), &tables.drivers, &DRIVER_HEADERS)?;
        info!(level = level_suffix(level), dir = %self.dir.display(), "tables written");
        Ok(())
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn team_cells(row: &TeamAggregate) -> Vec<String> {
    vec![
        row.team.clone(),
        row.fastest_rank.to_string(),
        fmt_opt(row.fastest_pct),
        fmt_opt(row.average_rank),
        fmt_opt(row.average_pct),
    ]
}

fn driver_cells(row: &DriverAggregate) -> Vec<String> {
    vec![
        row.driver.clone(),
        row.team.clone(),
        row.fastest_rank.to_string(),
        fmt_opt(row.fastest_pct),
        fmt_opt(row.average_rank),
        fmt_opt(row.average_pct),
    ]
}

/// Lays every query's tables out on one sheet at fixed offsets and writes
/// the sheet as a single CSV on `finish`.
pub struct GridTableSink {
    path: PathBuf,
    cells: Vec<Vec<String>>,
}

impl GridTableSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cells: Vec::new(),
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.cells
            .get(row.checked_sub(1)?)
            .and_then(|r| r.get(col.checked_sub(1)?))
            .map(String::as_str)
    }

    fn set(&mut self, row: usize, col: usize, value: String) {
        let (r, c) = (row - 1, col - 1);
        if self.cells.len() <= r {
            self.cells.resize(r + 1, Vec::new());
        }
        let line = &mut self.cells[r];
        if line.len() <= c {
            line.resize(c + 1, String::new());
        }
        line[c] = value;
    }

    fn place(&mut self, at: GridPlacement, headers: &[&str], rows: Vec<Vec<String>>) {
        for (c, header) in headers.iter().enumerate() {
            self.set(at.row, at.col + c, header.to_string());
        }
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                self.set(at.row + 1 + r, at.col + c, value);
            }
        }
    }
}

impl TableSink for GridTableSink {
    fn write_tables(&mut self, tables: &SeasonTables) -> Result<()> {
        let level = tables.downforce;
        let team_headers = &DRIVER_HEADERS[1..];
        self.place(
            GridPlacement::for_level(level, TableKind::LeadDriver),
            team_headers,
            tables.lead_drivers.iter().map(team_cells).collect(),
        );
        self.place(
            GridPlacement::for_level(level, TableKind::Team),
            team_headers,
            tables.teams.iter().map(team_cells).collect(),
        );
        self.place(
            GridPlacement::for_level(level, TableKind::Driver),
            &DRIVER_HEADERS,
            tables.drivers.iter().map(driver_cells).collect(),
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let width = self.cells.iter().map(Vec::len).max().unwrap_or(0);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)?;
        for line in &self.cells {
            let mut padded = line.clone();
            padded.resize(width, String::new());
            writer.write_record(&padded)?;
        }
        writer.flush()?;
        info!(path = %self.path.display(), "sheet written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(level: Option<u8>) -> SeasonTables {
        SeasonTables {
            downforce: level,
            drivers: vec![DriverAggregate {
                driver: "VER".to_string(),
                team: "Red Bull Racing".to_string(),
                fastest_rank: 1.5,
                fastest_pct: Some(0.25),
                average_rank: Some(2.0),
                average_pct: None,
            }],
            teams: vec![TeamAggregate {
                team: "Red Bull Racing".to_string(),
                fastest_rank: 2.0,
                fastest_pct: Some(0.5),
                average_rank: Some(2.5),
                average_pct: Some(0.75),
            }],
            lead_drivers: Vec::new(),
            events: Vec::new(),
        }
    }

    #[test]
    fn test_grid_placement() {
        assert_eq!(
            GridPlacement::for_level(None, TableKind::LeadDriver),
            GridPlacement { row: 2, col: 1 }
        );
        assert_eq!(
            GridPlacement::for_level(Some(1), TableKind::Team),
            GridPlacement { row: 25, col: 7 }
        );
        assert_eq!(
            GridPlacement::for_level(Some(9), TableKind::Driver),
            GridPlacement { row: 209, col: 13 }
        );
    }

    #[test]
    fn test_csv_sink_writes_fixed_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvTableSink::new(dir.path().join("out")).unwrap();
        sink.write_tables(&tables(Some(4))).unwrap();

        let driver_csv = fs::read_to_string(sink.path_for(Some(4), TableKind::Driver)).unwrap();
        let mut lines = driver_csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Driver,Team,FL Average Rank,Avg pct of FL pace,AV Average Rank,Avg pct of avg pace"
        );
        assert_eq!(lines.next().unwrap(), "VER,Red Bull Racing,1.5,0.25,2.0,");

        let team_csv = fs::read_to_string(sink.path_for(Some(4), TableKind::Team)).unwrap();
        assert!(team_csv.starts_with("Team,FL Average Rank,"));

        // empty tables still carry their header
        let lead_csv = fs::read_to_string(dir.path().join("out/lead_driver_df4.csv")).unwrap();
        assert_eq!(
            lead_csv.trim_end(),
            "Team,FL Average Rank,Avg pct of FL pace,AV Average Rank,Avg pct of avg pace"
        );
    }

    #[test]
    fn test_grid_sink_places_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = GridTableSink::new(dir.path().join("sheet.csv"));
        sink.write_tables(&tables(None)).unwrap();
        sink.write_tables(&tables(Some(1))).unwrap();

        assert_eq!(sink.cell(2, 1), Some("Team"));
        assert_eq!(sink.cell(2, 7), Some("Team"));
        assert_eq!(sink.cell(3, 7), Some("Red Bull Racing"));
        assert_eq!(sink.cell(2, 13), Some("Driver"));
        assert_eq!(sink.cell(3, 13), Some("VER"));
        assert_eq!(sink.cell(3, 16), Some("0.25"));
        assert_eq!(sink.cell(26, 13), Some("VER"));

        sink.finish().unwrap();
        let sheet = fs::read_to_string(dir.path().join("sheet.csv")).unwrap();
        assert_eq!(sheet.lines().count(), 26);
    }

    #[test]
    fn test_grid_block_follows_level_not_query_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = GridTableSink::new(dir.path().join("sheet.csv"));
        // a config asking for [7, 0] still puts level 7 at its own block
        sink.write_tables(&tables(Some(7))).unwrap();
        sink.write_tables(&tables(None)).unwrap();

        assert_eq!(sink.cell(163, 13), Some("Driver"));
        assert_eq!(sink.cell(164, 13), Some("VER"));
        assert_eq!(sink.cell(3, 13), Some("VER"));
        assert_eq!(sink.cell(25, 13), None);
    }
}
