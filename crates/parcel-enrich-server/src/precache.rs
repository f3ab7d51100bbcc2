//! Batch sidewalk enrichment of a training CSV.
//!
//! Reads rows with `latitude` and `longitude` columns, optionally draws a
//! seeded random sample, looks up every row through the shared cache, and
//! writes the rows back out with a `has_sidewalk` column.

use std::path::PathBuf;

use csv::StringRecord;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;

use parcel_enrich::ProximityCache;

use crate::types::{ServerError, ServerResult};

pub const LAT_COLUMN: &str = "latitude";
pub const LON_COLUMN: &str = "longitude";
pub const SIDEWALK_COLUMN: &str = "has_sidewalk";

/// Seed used when none is given, so repeated runs draw the same sample.
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone)]
pub struct PrecacheOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Rows to draw at random; all rows when `None`.
    pub sample: Option<usize>,
    pub seed: u64,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecacheSummary {
    pub rows: usize,
    pub with_sidewalk: usize,
    /// Rows whose coordinates did not parse; written as `False`.
    pub skipped: usize,
}

/// Enrich the input CSV and write the output CSV.
pub async fn run(cache: &ProximityCache, options: &PrecacheOptions) -> ServerResult<PrecacheSummary> {
    let mut reader = csv::Reader::from_path(&options.input)?;
    let mut headers = reader.headers()?.clone();
    let lat_idx = column(&headers, LAT_COLUMN)?;
    let lon_idx = column(&headers, LON_COLUMN)?;

    let mut rows = reader.records().collect::<Result<Vec<_>, _>>()?;
    tracing::info!("Read {} rows from {}", rows.len(), options.input.display());

    if let Some(n) = options.sample {
        rows = sample_rows(rows, n, options.seed)?;
        tracing::info!("Sampled {n} rows (seed {})", options.seed);
    }

    let sidewalk_idx = match headers.iter().position(|h| h == SIDEWALK_COLUMN) {
        Some(idx) => Some(idx),
        None => {
            headers.push_field(SIDEWALK_COLUMN);
            None
        }
    };

    let progress = if options.show_progress {
        let bar = ProgressBar::new(rows.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut writer = csv::Writer::from_path(&options.output)?;
    writer.write_record(&headers)?;

    let mut summary = PrecacheSummary::default();
    for row in &rows {
        let coords = parse_coord(row, lat_idx).zip(parse_coord(row, lon_idx));
        let found = match coords {
            Some((lat, lon)) => cache.lookup(lat, lon).await,
            None => {
                tracing::warn!("Skipping row with unparsable coordinates: {row:?}");
                summary.skipped += 1;
                false
            }
        };

        summary.rows += 1;
        if found {
            summary.with_sidewalk += 1;
        }
        writer.write_record(&with_flag(row, sidewalk_idx, found))?;
        progress.inc(1);
    }

    progress.finish_and_clear();
    writer.flush()?;
    cache.flush().await?;

    tracing::info!(
        "Sidewalk-enriched sample saved to {} ({} of {} rows near a sidewalk)",
        options.output.display(),
        summary.with_sidewalk,
        summary.rows
    );
    Ok(summary)
}

fn column(headers: &StringRecord, name: &str) -> ServerResult<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| ServerError::InvalidParams(format!("CSV is missing a '{name}' column")))
}

fn parse_coord(row: &StringRecord, idx: usize) -> Option<f64> {
    row.get(idx)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn sample_rows(rows: Vec<StringRecord>, n: usize, seed: u64) -> ServerResult<Vec<StringRecord>> {
    if n > rows.len() {
        return Err(ServerError::InvalidParams(format!(
            "Cannot sample {n} rows from {} available",
            rows.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let picked = rand::seq::index::sample(&mut rng, rows.len(), n);
    let mut slots: Vec<Option<StringRecord>> = rows.into_iter().map(Some).collect();
    Ok(picked
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

fn with_flag(row: &StringRecord, existing: Option<usize>, found: bool) -> StringRecord {
    let flag = if found { "True" } else { "False" };
    match existing {
        Some(idx) => row
            .iter()
            .enumerate()
            .map(|(i, v)| if i == idx { flag } else { v })
            .collect(),
        None => {
            let mut out = row.clone();
            out.push_field(flag);
            out
        }
    }
}
