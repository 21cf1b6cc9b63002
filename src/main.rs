use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quali_pace::publish::{CsvTableSink, GridTableSink, TableSink};
use quali_pace::{aggregate_season, collect_season, CsvSessionSource, PipelineConfig, ReferenceData};

const SHEET_FILE: &str = "quali_ranks.csv";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = PipelineConfig::resolve(config_path.as_deref())
        .context("failed to load pipeline config")?;

    if config.season != 2023 {
        bail!("no reference tables for season {}", config.season);
    }
    let reference = ReferenceData::season_2023().context("reference tables are inconsistent")?;

    let source = CsvSessionSource::new(&config.data_dir);
    let rankings = collect_season(&source, &reference, &config)
        .context("season scan failed")?;

    if let Some(stop) = &rankings.stopped_at {
        warn!(event = %stop.event, reason = %stop.reason, "season scan stopped early");
    }
    for skipped in &rankings.skipped_sprints {
        warn!(event = %skipped.event, "sprint left out");
    }

    let mut csv_sink = CsvTableSink::new(&config.output_dir)?;
    let mut grid_sink = GridTableSink::new(config.output_dir.join(SHEET_FILE));

    for downforce in config.downforce_queries() {
        let tables = aggregate_season(&rankings, downforce, &reference)
            .with_context(|| format!("aggregation failed for downforce {downforce:?}"))?;
        let included: Vec<&str> = tables.events.iter().map(|e| e.event.as_str()).collect();
        info!(?downforce, "included events: {}", included.join(", "));

        csv_sink.write_tables(&tables)?;
        grid_sink.write_tables(&tables)?;
    }
    grid_sink.finish()?;

    println!(
        "Ranked {} events ({} sprints) into {}",
        rankings.events.len(),
        rankings.events.iter().filter(|e| e.sprint.is_some()).count(),
        config.output_dir.display()
    );
    Ok(())
}
