use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use fbref_collect::config::{CollectConfig, Environment, Step};
use fbref_collect::export::OutputFormat;
use fbref_collect::logging::init_logging;
use fbref_collect::pipeline::StageSummary;
use fbref_collect::runner::{
    LiveSources, OutputPaths, RunOptions, Runner, Sources, run_fixtures, run_match_stats,
    run_team_mapping, run_wages,
};

#[derive(Parser)]
#[command(name = "fbref_collect")]
#[command(version, about = "Collects FBRef team, fixture, wage and match statistics", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Environment preset (dev, prod, test)
    #[arg(long = "env", global = true, value_enum)]
    environment: Option<Environment>,

    /// Seasons to discover teams for, e.g. 2023-2024,2024-2025
    #[arg(long, global = true, value_delimiter = ',')]
    seasons: Option<Vec<String>>,

    /// Only process these seasons in the later stages
    #[arg(long, global = true, value_delimiter = ',')]
    filter_seasons: Option<Vec<String>>,

    /// Only process teams with these names
    #[arg(long, global = true, value_delimiter = ',')]
    teams: Option<Vec<String>>,

    /// Competitions kept when selecting match reports
    #[arg(long, global = true, value_delimiter = ',')]
    competitions: Option<Vec<String>>,

    /// Output formats for the flat tables
    #[arg(long, global = true, value_delimiter = ',', value_enum)]
    formats: Option<Vec<OutputFormat>>,

    /// Cap on match reports to scrape
    #[arg(long, global = true)]
    max_matches: Option<usize>,

    /// Root data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run every enabled step in order
    Run {
        /// Run a single step
        #[arg(long, value_enum)]
        step: Option<Step>,

        /// Skip steps whose raw output already exists
        #[arg(long)]
        skip_existing: bool,

        /// Log the plan without fetching anything
        #[arg(long)]
        dry_run: bool,

        /// Continue stages from their checkpoints
        #[arg(long)]
        resume: bool,

        /// Also write the wage summary
        #[arg(long)]
        summary: bool,
    },

    /// Discover teams for the configured seasons
    Teams,

    /// Collect fixtures for every team-season
    Fixtures {
        #[arg(long)]
        resume: bool,
    },

    /// Collect Premier League wages for every team-season
    Wages {
        #[arg(long)]
        resume: bool,

        #[arg(long)]
        summary: bool,
    },

    /// Scrape team statistics from match reports
    MatchStats {
        #[arg(long)]
        resume: bool,

        /// Use the plain fetcher instead of the paced session
        #[arg(long)]
        no_enhanced: bool,
    },
}

fn join(values: &[String]) -> String {
    values.join(",")
}

fn overrides(args: &GlobalArgs) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let mut set = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            map.insert(key.to_string(), value);
        }
    };
    set("FBREF_ENV", args.environment.map(|e| e.name().to_string()));
    set("FBREF_SEASONS", args.seasons.as_deref().map(join));
    set("FBREF_FILTER_SEASONS", args.filter_seasons.as_deref().map(join));
    set("FBREF_TEAMS", args.teams.as_deref().map(join));
    set("FBREF_COMPETITIONS", args.competitions.as_deref().map(join));
    set(
        "FBREF_OUTPUT_FORMATS",
        args.formats.as_ref().map(|formats| {
            formats
                .iter()
                .map(|f| f.extension())
                .collect::<Vec<_>>()
                .join(",")
        }),
    );
    set("FBREF_MAX_MATCHES", args.max_matches.map(|n| n.to_string()));
    set("FBREF_DATA_DIR", args.data_dir.as_ref().map(|p| p.display().to_string()));
    set("FBREF_LOG_LEVEL", args.log_level.clone());
    set("FBREF_LOG_FILE", args.log_file.as_ref().map(|p| p.display().to_string()));
    map
}

fn log_stage(summary: &StageSummary) {
    info!(
        stage = summary.stage,
        attempted = summary.attempted,
        succeeded = summary.succeeded,
        records = summary.records,
        failed = summary.failed.len(),
        "stage finished"
    );
}

fn run(cli: Cli, config: &CollectConfig) -> Result<bool> {
    let sources = LiveSources { config };
    match cli.command {
        Command::Run {
            step,
            skip_existing,
            dry_run,
            resume,
            summary,
        } => {
            let options = RunOptions {
                step,
                skip_existing,
                dry_run,
                resume,
                wage_summary: summary,
            };
            let report = Runner::new(config, options).run(&sources)?;
            Ok(report.all_succeeded())
        }
        Command::Teams => {
            config.ensure_directories()?;
            let paths = OutputPaths::new(config);
            let mut source = sources.basic()?;
            let mapping = run_team_mapping(config, &paths, source.as_mut())?;
            info!(teams = mapping.len(), team_seasons = mapping.team_seasons(), "teams done");
            Ok(true)
        }
        Command::Fixtures { resume } => {
            config.ensure_directories()?;
            let paths = OutputPaths::new(config);
            let mut source = sources.basic()?;
            log_stage(&run_fixtures(config, &paths, source.as_mut(), resume)?);
            Ok(true)
        }
        Command::Wages { resume, summary } => {
            config.ensure_directories()?;
            let paths = OutputPaths::new(config);
            let mut source = sources.basic()?;
            log_stage(&run_wages(config, &paths, source.as_mut(), resume, summary)?);
            Ok(true)
        }
        Command::MatchStats {
            resume,
            no_enhanced,
        } => {
            config.ensure_directories()?;
            let paths = OutputPaths::new(config);
            let mut source = if no_enhanced || !config.enhanced_scraper {
                sources.basic()?
            } else {
                sources.enhanced()?
            };
            log_stage(&run_match_stats(config, &paths, source.as_mut(), resume)?);
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match CollectConfig::from_env_with(&overrides(&cli.global)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_logging(&config.log_level, config.log_file.as_deref()) {
        eprintln!("logging setup failed: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(cli, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %format!("{err:#}"), "collection failed");
            ExitCode::FAILURE
        }
    }
}
