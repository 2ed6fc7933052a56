use std::collections::BTreeSet;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

use crate::model::{Accumulator, FixtureSeason, MatchStat, SeasonPayload, TeamMapping};
use crate::normalize::flatten_fixtures;
use crate::page_fetch::PageSource;
use crate::persist::{
    Checkpoint, failed_units_path, load_json, pending, progress_path, save_json,
};

pub const FIXTURES_STAGE: &str = "fixtures";
pub const WAGES_STAGE: &str = "wages";
pub const MATCH_STATS_STAGE: &str = "match_stats";

pub const SEASON_PROGRESS_EVERY: usize = 10;
pub const MATCH_PROGRESS_EVERY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeasonUnit {
    pub team_id: String,
    pub team_name: String,
    pub season: String,
}

impl SeasonUnit {
    pub fn key(&self) -> String {
        format!("{}:{}", self.team_id, self.season)
    }
}

/// Every (team, season) pair in mapping order.
pub fn season_units(mapping: &TeamMapping) -> Vec<SeasonUnit> {
    mapping
        .teams
        .iter()
        .flat_map(|team| {
            team.seasons.iter().map(|season| SeasonUnit {
                team_id: team.team_id.clone(),
                team_name: team.team_name.clone(),
                season: season.clone(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct MatchFilter {
    pub teams: Option<Vec<String>>,
    pub seasons: Option<Vec<String>>,
    pub competitions: Option<Vec<String>>,
    pub max_matches: Option<usize>,
}

/// Match report URLs from the fixtures output, filtered, de-duplicated in first-seen
/// order, then capped.
pub fn match_urls(fixtures: &Accumulator<FixtureSeason>, filter: &MatchFilter) -> Vec<String> {
    let allowed = |list: &Option<Vec<String>>, value: Option<&str>| match list {
        None => true,
        Some(list) => value.is_some_and(|v| list.iter().any(|x| x == v)),
    };

    let mut seen = BTreeSet::new();
    let mut urls = Vec::new();
    for row in flatten_fixtures(fixtures) {
        if !allowed(&filter.teams, row.get("team_name"))
            || !allowed(&filter.seasons, row.get("season"))
            || !allowed(&filter.competitions, row.comp())
        {
            continue;
        }
        let Some(url) = row.non_empty("full_match_report_url") else {
            continue;
        };
        if seen.insert(url.to_string()) {
            urls.push(url.to_string());
        }
    }
    if let Some(max) = filter.max_matches {
        urls.truncate(max);
    }
    urls
}

#[derive(Debug, Clone)]
pub struct StageOptions {
    pub output_dir: PathBuf,
    pub progress_save: bool,
    pub progress_every: usize,
    pub unit_pause: Duration,
    pub resume: bool,
}

impl StageOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            progress_save: true,
            progress_every: SEASON_PROGRESS_EVERY,
            unit_pause: Duration::from_secs(1),
            resume: false,
        }
    }

    pub fn every(mut self, n: usize) -> Self {
        self.progress_every = n;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageSummary {
    pub stage: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub records: usize,
    pub failed: Vec<String>,
    pub resumed: usize,
}

#[derive(Debug, Clone)]
pub struct StageOutcome<A> {
    pub data: A,
    pub summary: StageSummary,
}

struct Ledger {
    processed: BTreeSet<String>,
    failed: Vec<String>,
    attempted: usize,
}

// Loads the checkpoint and its snapshot when resuming; otherwise starts empty.
fn seed<A>(stage: &str, opts: &StageOptions) -> Result<(A, BTreeSet<String>)>
where
    A: Default + DeserializeOwned,
{
    if !opts.resume {
        return Ok((A::default(), BTreeSet::new()));
    }
    let Some(cp) = Checkpoint::load(&opts.output_dir, stage)? else {
        info!(%stage, "no checkpoint found, starting fresh");
        return Ok((A::default(), BTreeSet::new()));
    };
    let data = load_json::<A>(&cp.snapshot)?;
    info!(
        %stage,
        processed = cp.processed.len(),
        snapshot = %cp.snapshot.display(),
        "resuming from checkpoint"
    );
    Ok((data, cp.processed))
}

fn checkpoint<A: Serialize>(
    stage: &str,
    opts: &StageOptions,
    data: &A,
    ledger: &Ledger,
    total: usize,
) -> Result<()> {
    let snapshot = progress_path(&opts.output_dir, stage, ledger.attempted);
    save_json(&snapshot, data)?;
    Checkpoint {
        stage: stage.to_string(),
        processed: ledger.processed.clone(),
        failed: ledger.failed.clone(),
        cursor: ledger.attempted,
        total,
        snapshot: snapshot.clone(),
        written_at: Utc::now(),
    }
    .save(&opts.output_dir)?;
    info!(%stage, file = %snapshot.display(), "progress saved");
    Ok(())
}

/// Runs one unit per (key, unit) in order, skipping keys already processed by a resumed
/// checkpoint. `step` merges into the accumulator and reports success.
fn drive<U, A>(
    stage: &str,
    units: &[(String, U)],
    opts: &StageOptions,
    mut data: A,
    already: BTreeSet<String>,
    mut step: impl FnMut(&U, &mut A) -> bool,
    snapshot_ready: impl Fn(&A) -> bool,
) -> (A, Ledger)
where
    A: Serialize,
{
    let work = pending(&already, units);
    let total = work.len();
    let mut ledger = Ledger {
        processed: already,
        failed: Vec::new(),
        attempted: 0,
    };

    for (i, (key, unit)) in work.into_iter().enumerate() {
        let n = i + 1;
        info!("[{n}/{total}] {stage} {key}");
        ledger.attempted = n;
        if step(unit, &mut data) {
            ledger.processed.insert(key.clone());
        } else {
            ledger.failed.push(key.clone());
        }

        if !opts.unit_pause.is_zero() {
            thread::sleep(opts.unit_pause);
        }

        let due = opts.progress_every > 0 && n % opts.progress_every == 0;
        if opts.progress_save && due && snapshot_ready(&data) {
            if let Err(err) = checkpoint(stage, opts, &data, &ledger, total) {
                warn!(%stage, error = %err, "failed to save progress");
            }
        }
    }
    (data, ledger)
}

/// Team × season stage (fixtures, wages). Empty results are recorded as explicit `None`.
pub fn run_season_stage<T>(
    stage: &str,
    source: &mut dyn PageSource,
    units: &[SeasonUnit],
    opts: &StageOptions,
    mut collect: impl FnMut(&mut dyn PageSource, &SeasonUnit) -> Option<T>,
) -> Result<StageOutcome<Accumulator<T>>>
where
    T: SeasonPayload + Serialize + DeserializeOwned,
{
    let keyed: Vec<(String, SeasonUnit)> = units.iter().map(|u| (u.key(), u.clone())).collect();
    let (seeded, already) = seed::<Accumulator<T>>(stage, opts)?;
    let resumed = already.len();
    info!(%stage, units = keyed.len(), resumed, "starting stage");

    let (data, ledger) = drive(
        stage,
        &keyed,
        opts,
        seeded,
        already,
        |unit, acc: &mut Accumulator<T>| {
            acc.ensure_team(&unit.team_id, &unit.team_name);
            match collect(&mut *source, unit) {
                Some(payload) if !payload.records().is_empty() => {
                    let records = payload.records().len();
                    info!(team = %unit.team_name, season = %unit.season, records, "success");
                    acc.record(&unit.team_id, &unit.team_name, &unit.season, Some(payload));
                    true
                }
                _ => {
                    warn!(team = %unit.team_name, season = %unit.season, "no data found");
                    acc.record(&unit.team_id, &unit.team_name, &unit.season, None);
                    false
                }
            }
        },
        |_| true,
    );

    let summary = StageSummary {
        stage: stage.to_string(),
        attempted: ledger.attempted,
        succeeded: data.succeeded(),
        records: data.total_records(),
        failed: ledger.failed,
        resumed,
    };
    info!(
        %stage,
        teams = data.teams.len(),
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        records = summary.records,
        "stage summary"
    );
    Ok(StageOutcome { data, summary })
}

/// Match-statistics stage over report URLs. Failed URLs are written to a
/// `failed_urls_<timestamp>.json` ledger next to the output.
pub fn run_match_stats_stage(
    source: &mut dyn PageSource,
    urls: &[String],
    opts: &StageOptions,
    mut collect: impl FnMut(&mut dyn PageSource, &str) -> Option<Vec<MatchStat>>,
) -> Result<StageOutcome<Vec<MatchStat>>> {
    let stage = MATCH_STATS_STAGE;
    let keyed: Vec<(String, String)> = urls.iter().map(|u| (u.clone(), u.clone())).collect();
    let (seeded, already) = seed::<Vec<MatchStat>>(stage, opts)?;
    let resumed = already.len();
    info!(matches = keyed.len(), resumed, "processing matches");

    let started = Instant::now();
    let (data, ledger) = drive(
        stage,
        &keyed,
        opts,
        seeded,
        already,
        |url, acc: &mut Vec<MatchStat>| match collect(&mut *source, url) {
            Some(stats) if !stats.is_empty() => {
                info!(rows = stats.len(), "successfully scraped stats");
                acc.extend(stats);
                true
            }
            _ => {
                warn!(%url, "failed to scrape stats");
                false
            }
        },
        |acc| !acc.is_empty(),
    );

    let succeeded = ledger.attempted - ledger.failed.len();
    let hours = started.elapsed().as_secs_f64() / 3600.0;
    let rate = if hours > 0.0 {
        succeeded as f64 / hours
    } else {
        0.0
    };
    info!(
        succeeded,
        failed = ledger.failed.len(),
        rows = data.len(),
        hours,
        matches_per_hour = rate,
        "match stats complete"
    );

    if !ledger.failed.is_empty() {
        let path = failed_units_path(&opts.output_dir, Utc::now());
        match save_json(&path, &ledger.failed) {
            Ok(()) => info!(file = %path.display(), "failed urls saved"),
            Err(err) => error!(error = %err, "failed to save failed urls"),
        }
    }

    let summary = StageSummary {
        stage: stage.to_string(),
        attempted: ledger.attempted,
        succeeded,
        records: data.len(),
        failed: ledger.failed,
        resumed,
    };
    Ok(StageOutcome { data, summary })
}
