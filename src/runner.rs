use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Result, bail};
use tracing::{error, info, warn};

use crate::config::{CollectConfig, Step};
use crate::error::PipelineError;
use crate::export::{with_suffix, write_table_formats};
use crate::fixtures::collect_fixtures;
use crate::match_stats::collect_match_stats;
use crate::model::{Accumulator, FixtureSeason, TeamMapping};
use crate::normalize::{fixtures_table, match_stats_table, wages_table};
use crate::page_fetch::{PageFetcher, PageSource};
use crate::persist::{load_json, save_json};
use crate::pipeline::{
    FIXTURES_STAGE, MATCH_PROGRESS_EVERY, MATCH_STATS_STAGE, MatchFilter, SEASON_PROGRESS_EVERY,
    StageOptions, StageSummary, WAGES_STAGE, match_urls, run_match_stats_stage, run_season_stage,
    season_units,
};
use crate::session::Session;
use crate::teams::build_team_mapping;
use crate::wages::{collect_wages, wage_summary};

/// Where fetchers come from. The live implementation talks to the network.
pub trait Sources {
    fn basic(&self) -> Result<Box<dyn PageSource>>;
    fn enhanced(&self) -> Result<Box<dyn PageSource>>;
}

pub struct LiveSources<'a> {
    pub config: &'a CollectConfig,
}

impl Sources for LiveSources<'_> {
    fn basic(&self) -> Result<Box<dyn PageSource>> {
        Ok(Box::new(PageFetcher::new()?))
    }

    fn enhanced(&self) -> Result<Box<dyn PageSource>> {
        Ok(Box::new(Session::new(self.config.session_config())?))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub step: Option<Step>,
    pub skip_existing: bool,
    pub dry_run: bool,
    pub resume: bool,
    pub wage_summary: bool,
}

pub struct OutputPaths {
    pub teams: PathBuf,
    pub fixtures: PathBuf,
    pub wages: PathBuf,
    pub match_stats: PathBuf,
}

impl OutputPaths {
    pub fn new(config: &CollectConfig) -> Self {
        let raw = config.raw_dir();
        Self {
            teams: raw.join("all_teams"),
            fixtures: raw.join("all_competitions_fixtures"),
            wages: raw.join("premier_league_wages"),
            match_stats: raw.join("match_stats").join("all_match_stats"),
        }
    }

    /// Raw JSON output of a step.
    pub fn raw(&self, step: Step) -> PathBuf {
        let prefix = match step {
            Step::TeamMapping => &self.teams,
            Step::Fixtures => &self.fixtures,
            Step::Wages => &self.wages,
            Step::MatchStats => &self.match_stats,
        };
        with_suffix(prefix, ".json")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Completed,
    SkippedExisting,
    Disabled,
    Failed(String),
    /// Failed, but the pipeline carries on without it.
    Tolerated(String),
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub steps: Vec<(Step, StepStatus)>,
}

impl PipelineReport {
    pub fn attempted(&self) -> usize {
        self.steps
            .iter()
            .filter(|(_, s)| !matches!(s, StepStatus::Disabled))
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.steps
            .iter()
            .filter(|(_, s)| {
                matches!(
                    s,
                    StepStatus::Completed | StepStatus::SkippedExisting | StepStatus::Tolerated(_)
                )
            })
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded() == self.attempted()
    }
}

fn stage_options(config: &CollectConfig, dir: &Path, every: usize, resume: bool) -> StageOptions {
    StageOptions {
        output_dir: dir.to_path_buf(),
        progress_save: config.progress_save,
        progress_every: every,
        unit_pause: config.unit_pause,
        resume,
    }
}

fn require<T: serde::de::DeserializeOwned>(
    stage: &'static str,
    path: &Path,
    prerequisite: &'static str,
) -> Result<T> {
    if !path.exists() {
        return Err(PipelineError::MissingPrerequisite {
            stage,
            path: path.to_path_buf(),
            prerequisite,
        }
        .into());
    }
    load_json(path)
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

pub fn run_team_mapping(
    config: &CollectConfig,
    paths: &OutputPaths,
    source: &mut dyn PageSource,
) -> Result<TeamMapping> {
    let mapping = build_team_mapping(source, &config.seasons);
    if mapping.is_empty() {
        return Err(PipelineError::EmptyStage { stage: "team_mapping" }.into());
    }
    let path = paths.raw(Step::TeamMapping);
    save_json(&path, &mapping)?;
    info!(file = %path.display(), teams = mapping.len(), "team mapping saved");
    Ok(mapping)
}

pub fn run_fixtures(
    config: &CollectConfig,
    paths: &OutputPaths,
    source: &mut dyn PageSource,
    resume: bool,
) -> Result<StageSummary> {
    let teams_path = paths.raw(Step::TeamMapping);
    let mapping: TeamMapping = require(FIXTURES_STAGE, &teams_path, "team_mapping")?;
    info!(teams = mapping.len(), "loaded teams");
    let mapping = mapping.filtered(config.teams.as_deref(), config.filter_seasons.as_deref());
    let units = season_units(&mapping);
    if units.is_empty() {
        bail!("no teams to process after filtering");
    }

    let dir = parent_dir(&paths.fixtures);
    let opts = stage_options(config, &dir, SEASON_PROGRESS_EVERY, resume);
    let outcome = run_season_stage(FIXTURES_STAGE, source, &units, &opts, collect_fixtures)?;
    if outcome.summary.succeeded == 0 {
        return Err(PipelineError::EmptyStage { stage: FIXTURES_STAGE }.into());
    }

    save_json(&paths.raw(Step::Fixtures), &outcome.data)?;
    let table = fixtures_table(&outcome.data);
    if table.is_empty() {
        warn!("no fixtures converted to a table");
    } else {
        let prefix = with_suffix(&paths.fixtures, "_dataframe");
        write_table_formats(&table, &prefix, &config.output_formats)?;
    }
    info!(
        teams = outcome.data.teams.len(),
        matches = table.len(),
        "fixtures collection complete"
    );
    Ok(outcome.summary)
}

pub fn run_wages(
    config: &CollectConfig,
    paths: &OutputPaths,
    source: &mut dyn PageSource,
    resume: bool,
    summary: bool,
) -> Result<StageSummary> {
    let teams_path = paths.raw(Step::TeamMapping);
    let mapping: TeamMapping = require(WAGES_STAGE, &teams_path, "team_mapping")?;
    let mapping = mapping.filtered(config.teams.as_deref(), config.filter_seasons.as_deref());
    let units = season_units(&mapping);
    if units.is_empty() {
        bail!("no teams to process after filtering");
    }

    let dir = parent_dir(&paths.wages);
    let opts = stage_options(config, &dir, SEASON_PROGRESS_EVERY, resume);
    let outcome = run_season_stage(WAGES_STAGE, source, &units, &opts, collect_wages)?;
    if outcome.summary.succeeded == 0 {
        return Err(PipelineError::EmptyStage { stage: WAGES_STAGE }.into());
    }

    save_json(&paths.raw(Step::Wages), &outcome.data)?;
    let table = wages_table(&outcome.data);
    if !table.is_empty() {
        let prefix = with_suffix(&paths.wages, "_dataframe");
        write_table_formats(&table, &prefix, &config.output_formats)?;
    }
    if summary {
        let stats = wage_summary(&outcome.data);
        save_json(&with_suffix(&paths.wages, "_summary.json"), &stats)?;
        info!(
            teams = stats.total_teams,
            seasons = stats.total_seasons,
            players = stats.total_players,
            "wage summary saved"
        );
    }
    Ok(outcome.summary)
}

pub fn run_match_stats(
    config: &CollectConfig,
    paths: &OutputPaths,
    source: &mut dyn PageSource,
    resume: bool,
) -> Result<StageSummary> {
    let fixtures: Accumulator<FixtureSeason> =
        require(MATCH_STATS_STAGE, &paths.raw(Step::Fixtures), "fixtures")?;
    let filter = MatchFilter {
        teams: config.teams.clone(),
        seasons: config.filter_seasons.clone(),
        competitions: (!config.competitions.is_empty()).then(|| config.competitions.clone()),
        max_matches: config.max_matches,
    };
    let urls = match_urls(&fixtures, &filter);
    info!(matches = urls.len(), "unique match urls to process");
    if urls.is_empty() {
        bail!("no matches to process after filtering");
    }

    let dir = parent_dir(&paths.match_stats);
    let opts = stage_options(config, &dir, MATCH_PROGRESS_EVERY, resume);
    let outcome = run_match_stats_stage(source, &urls, &opts, collect_match_stats)?;
    if outcome.data.is_empty() {
        return Err(PipelineError::EmptyStage { stage: MATCH_STATS_STAGE }.into());
    }

    save_json(&paths.raw(Step::MatchStats), &outcome.data)?;
    let table = match_stats_table(&outcome.data);
    let prefix = with_suffix(&paths.match_stats, "_dataframe");
    write_table_formats(&table, &prefix, &config.output_formats)?;
    Ok(outcome.summary)
}

pub struct Runner<'a> {
    pub config: &'a CollectConfig,
    pub options: RunOptions,
    pub paths: OutputPaths,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a CollectConfig, options: RunOptions) -> Self {
        let paths = OutputPaths::new(config);
        Self {
            config,
            options,
            paths,
        }
    }

    fn planned(&self) -> Vec<Step> {
        match self.options.step {
            Some(step) => vec![step],
            None => Step::ALL.to_vec(),
        }
    }

    pub fn plan(&self) -> Vec<(Step, bool)> {
        self.planned()
            .into_iter()
            .map(|step| (step, self.config.step(step).enabled))
            .collect()
    }

    pub fn run(&self, sources: &dyn Sources) -> Result<PipelineReport> {
        let started = Instant::now();
        self.config.log_summary();
        if self.options.dry_run {
            for (step, enabled) in self.plan() {
                let state = if enabled { "would run" } else { "disabled" };
                info!(%step, state, "dry run");
            }
            return Ok(PipelineReport { steps: Vec::new() });
        }
        self.config.ensure_directories()?;

        let mut steps = Vec::new();
        for step in self.planned() {
            let flags = self.config.step(step);
            if !flags.enabled {
                info!(%step, "skipping, disabled in configuration");
                steps.push((step, StepStatus::Disabled));
                continue;
            }
            info!(%step, "step starting");
            let raw = self.paths.raw(step);
            if (self.options.skip_existing || flags.skip_if_exists) && raw.exists() {
                info!(%step, file = %raw.display(), "output exists, skipping");
                steps.push((step, StepStatus::SkippedExisting));
                continue;
            }

            match self.run_step(step, sources) {
                Ok(()) => {
                    info!(%step, "step completed");
                    steps.push((step, StepStatus::Completed));
                }
                Err(err) if step == Step::Wages => {
                    error!(%step, error = %format!("{err:#}"), "step failed");
                    warn!(%step, "continuing pipeline despite failure");
                    steps.push((step, StepStatus::Tolerated(format!("{err:#}"))));
                }
                Err(err) => {
                    error!(%step, error = %format!("{err:#}"), "step failed, pipeline stopping");
                    steps.push((step, StepStatus::Failed(format!("{err:#}"))));
                    break;
                }
            }
        }

        let report = PipelineReport { steps };
        info!(
            succeeded = report.succeeded(),
            attempted = report.attempted(),
            secs = started.elapsed().as_secs_f64(),
            environment = %self.config.environment,
            "pipeline complete"
        );
        Ok(report)
    }

    fn run_step(&self, step: Step, sources: &dyn Sources) -> Result<()> {
        let resume = self.options.resume;
        match step {
            Step::TeamMapping => {
                let mut source = sources.basic()?;
                run_team_mapping(self.config, &self.paths, source.as_mut())?;
            }
            Step::Fixtures => {
                let mut source = sources.basic()?;
                run_fixtures(self.config, &self.paths, source.as_mut(), resume)?;
            }
            Step::Wages => {
                let mut source = sources.basic()?;
                let summary = self.options.wage_summary;
                run_wages(self.config, &self.paths, source.as_mut(), resume, summary)?;
            }
            Step::MatchStats => {
                let mut source = if self.config.enhanced_scraper {
                    sources.enhanced()?
                } else {
                    sources.basic()?
                };
                run_match_stats(self.config, &self.paths, source.as_mut(), resume)?;
            }
        }
        Ok(())
    }
}
