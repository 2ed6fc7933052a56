use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::export::OutputFormat;
use crate::session::SessionConfig;
use crate::text::is_valid_season;

const MAX_DELAY_SECS: f64 = 3600.0;
const MAX_CHUNK_BREAK_SECS: f64 = 86_400.0;

const PROD_SEASONS: [&str; 6] = [
    "2019-2020",
    "2020-2021",
    "2021-2022",
    "2022-2023",
    "2023-2024",
    "2024-2025",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Environment {
    Dev,
    Prod,
    Test,
}

impl Environment {
    pub fn name(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
            Environment::Test => "test",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            "test" => Ok(Environment::Test),
            other => bail!("unknown environment: {other}"),
        }
    }

    fn default_seasons(self) -> Vec<String> {
        let seasons: &[&str] = match self {
            Environment::Prod => &PROD_SEASONS,
            Environment::Dev => &PROD_SEASONS[PROD_SEASONS.len() - 2..],
            Environment::Test => &["2023-2024"],
        };
        seasons.iter().map(|s| s.to_string()).collect()
    }

    fn default_max_matches(self) -> Option<usize> {
        match self {
            Environment::Prod => None,
            Environment::Dev => Some(50),
            Environment::Test => Some(5),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Step {
    TeamMapping,
    Fixtures,
    Wages,
    MatchStats,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::TeamMapping, Step::Fixtures, Step::Wages, Step::MatchStats];

    pub fn name(self) -> &'static str {
        match self {
            Step::TeamMapping => "team_mapping",
            Step::Fixtures => "fixtures",
            Step::Wages => "wages",
            Step::MatchStats => "match_stats",
        }
    }

    fn index(self) -> usize {
        match self {
            Step::TeamMapping => 0,
            Step::Fixtures => 1,
            Step::Wages => 2,
            Step::MatchStats => 3,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepFlags {
    pub enabled: bool,
    pub skip_if_exists: bool,
}

impl Default for StepFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_if_exists: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapingDelays {
    pub min_delay: f64,
    pub max_delay: f64,
    pub chunk_size: u32,
    pub chunk_break: f64,
}

impl Default for ScrapingDelays {
    fn default() -> Self {
        Self {
            min_delay: 3.0,
            max_delay: 12.0,
            chunk_size: 50,
            chunk_break: 300.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub environment: Environment,
    pub base_path: PathBuf,
    pub seasons: Vec<String>,
    pub output_formats: Vec<OutputFormat>,
    pub teams: Option<Vec<String>>,
    pub filter_seasons: Option<Vec<String>>,
    pub competitions: Vec<String>,
    pub max_matches: Option<usize>,
    pub enhanced_scraper: bool,
    pub progress_save: bool,
    pub unit_pause: Duration,
    pub delays: ScrapingDelays,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub steps: [StepFlags; 4],
}

impl CollectConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(&BTreeMap::new())
    }

    /// Like `from_env`, with `overrides` taking precedence over the process environment.
    pub fn from_env_with(overrides: &BTreeMap<String, String>) -> Result<Self> {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| overrides.get(key).cloned().or_else(|| env::var(key).ok()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let flag = |key: &str, default: bool| get(key).map(|v| parse_bool(&v)).unwrap_or(default);
        let number = |key: &str, default: f64| -> Result<f64> {
            let Some(v) = get(key) else {
                return Ok(default);
            };
            match v.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(n),
                _ => bail!("{key} must be a number, got {v:?}"),
            }
        };

        let environment = match get("FBREF_ENV") {
            Some(raw) => Environment::parse(&raw)?,
            None => Environment::Prod,
        };
        let seasons = get("FBREF_SEASONS")
            .map(|v| split_list(&v))
            .unwrap_or_else(|| environment.default_seasons());
        let output_formats = match get("FBREF_OUTPUT_FORMATS") {
            Some(v) => split_list(&v)
                .iter()
                .map(|f| f.parse::<OutputFormat>())
                .collect::<Result<Vec<_>>>()?,
            None => vec![OutputFormat::Json],
        };
        // "none" and 0 both lift the cap.
        let max_matches = match get("FBREF_MAX_MATCHES") {
            Some(v) if v.eq_ignore_ascii_case("none") => None,
            Some(v) => v
                .parse::<usize>()
                .map(|n| (n > 0).then_some(n))
                .with_context(|| format!("FBREF_MAX_MATCHES={v}"))?,
            None => environment.default_max_matches(),
        };

        let defaults = ScrapingDelays::default();
        let delays = ScrapingDelays {
            min_delay: number("FBREF_MIN_DELAY", defaults.min_delay)?,
            max_delay: number("FBREF_MAX_DELAY", defaults.max_delay)?,
            chunk_size: number("FBREF_CHUNK_SIZE", f64::from(defaults.chunk_size))? as u32,
            chunk_break: number("FBREF_CHUNK_BREAK", defaults.chunk_break)?,
        };
        let unit_pause = number("FBREF_UNIT_PAUSE", 1.0)?.clamp(0.0, 60.0);

        let mut steps = [StepFlags::default(); 4];
        for step in Step::ALL {
            let suffix = step.name().to_ascii_uppercase();
            steps[step.index()] = StepFlags {
                enabled: !flag(&format!("FBREF_DISABLE_{suffix}"), false),
                skip_if_exists: flag(&format!("FBREF_SKIP_IF_EXISTS_{suffix}"), false),
            };
        }

        let config = Self {
            environment,
            base_path: get("FBREF_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            seasons,
            output_formats,
            teams: get("FBREF_TEAMS").map(|v| split_list(&v)),
            filter_seasons: get("FBREF_FILTER_SEASONS").map(|v| split_list(&v)),
            competitions: get("FBREF_COMPETITIONS")
                .map(|v| split_list(&v))
                .unwrap_or_else(|| vec!["Premier League".to_string()]),
            max_matches,
            enhanced_scraper: flag("FBREF_ENHANCED_SCRAPER", true),
            progress_save: flag("FBREF_PROGRESS_SAVE", true),
            unit_pause: Duration::from_secs_f64(unit_pause),
            delays,
            log_level: get("FBREF_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_file: get("FBREF_LOG_FILE").map(PathBuf::from),
            steps,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.seasons.is_empty() {
            bail!("at least one season is required");
        }
        for season in self.seasons.iter().chain(self.filter_seasons.iter().flatten()) {
            if !is_valid_season(season) {
                bail!("invalid season {season:?}, expected YYYY-YYYY with consecutive years");
            }
        }
        if self.output_formats.is_empty() {
            bail!("at least one output format is required");
        }
        let d = &self.delays;
        if d.min_delay < 0.0 || d.max_delay < 0.0 || d.chunk_break < 0.0 {
            bail!("scraping delays must not be negative");
        }
        if d.max_delay > MAX_DELAY_SECS || d.chunk_break > MAX_CHUNK_BREAK_SECS {
            bail!(
                "scraping delays are capped at {MAX_DELAY_SECS}s per request \
                 and {MAX_CHUNK_BREAK_SECS}s per chunk break"
            );
        }
        if d.min_delay > d.max_delay {
            bail!(
                "min_delay ({}) must not exceed max_delay ({})",
                d.min_delay,
                d.max_delay
            );
        }
        if d.chunk_size < 1 {
            bail!("chunk_size must be at least 1");
        }
        Ok(())
    }

    pub fn step(&self, step: Step) -> StepFlags {
        self.steps[step.index()]
    }

    /// Season filter when set, otherwise the configured seasons.
    pub fn effective_seasons(&self) -> &[String] {
        self.filter_seasons.as_deref().unwrap_or(&self.seasons)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base_path.join(self.environment.name())
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir().join("raw")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        let data = self.data_dir();
        for dir in [
            data.join("raw"),
            data.join("raw").join("match_stats"),
            data.join("processed"),
            data.join("external"),
        ] {
            fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            min_delay: Duration::from_secs_f64(self.delays.min_delay),
            max_delay: Duration::from_secs_f64(self.delays.max_delay),
            chunk_size: self.delays.chunk_size,
            chunk_break: Duration::from_secs_f64(self.delays.chunk_break),
            ..SessionConfig::default()
        }
    }

    pub fn log_summary(&self) {
        info!(
            environment = %self.environment,
            base = %self.base_path.display(),
            seasons = ?self.effective_seasons(),
            formats = ?self.output_formats,
            teams = ?self.teams,
            competitions = ?self.competitions,
            max_matches = ?self.max_matches,
            enhanced = self.enhanced_scraper,
            "configuration"
        );
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_bool(raw: &str) -> bool {
    let t = raw.trim().to_ascii_lowercase();
    !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
}
