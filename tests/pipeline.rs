mod common;

use std::fs;
use std::time::Duration;

use serde_json::Value;

use common::StubSource;
use fbref_collect::fixtures::collect_fixtures;
use fbref_collect::match_stats::collect_match_stats;
use fbref_collect::model::{Accumulator, FixtureSeason};
use fbref_collect::persist::{Checkpoint, checkpoint_path, load_json};
use fbref_collect::pipeline::{
    FIXTURES_STAGE, MatchFilter, SeasonUnit, StageOptions, WAGES_STAGE, match_urls,
    run_match_stats_stage, run_season_stage,
};
use fbref_collect::site::{SquadPage, squad_url};
use fbref_collect::wages::{collect_wages, wage_summary};

const GOOD_MATCH: &str = "https://fbref.com/en/matches/3a6836b4/Arsenal-Chelsea";
const BLOCKED_MATCH: &str = "https://fbref.com/en/matches/0b1e2c3d/Chelsea-Arsenal";
const MISSING_MATCH: &str = "https://fbref.com/en/matches/9f8e7d6c/Arsenal-Everton";

fn unit(team_id: &str, team_name: &str, season: &str) -> SeasonUnit {
    SeasonUnit {
        team_id: team_id.into(),
        team_name: team_name.into(),
        season: season.into(),
    }
}

fn fixtures_url(u: &SeasonUnit) -> String {
    squad_url(&u.team_id, &u.season, &u.team_name, SquadPage::Fixtures)
}

fn quiet(dir: &std::path::Path) -> StageOptions {
    let mut opts = StageOptions::new(dir);
    opts.unit_pause = Duration::ZERO;
    opts
}

#[test]
fn failed_units_are_recorded_as_null() {
    let dir = tempfile::tempdir().unwrap();
    let arsenal = unit("18bb7c10", "Arsenal", "2023-2024");
    let chelsea = unit("cff3d9bb", "Chelsea", "2023-2024");
    let mut source = StubSource::new().page(fixtures_url(&arsenal), "squad_fixtures.html");

    let outcome = run_season_stage(
        FIXTURES_STAGE,
        &mut source,
        &[arsenal.clone(), chelsea.clone()],
        &quiet(dir.path()),
        collect_fixtures,
    )
    .unwrap();

    assert_eq!(outcome.summary.attempted, 2);
    assert_eq!(outcome.summary.succeeded, 1);
    assert_eq!(outcome.summary.records, 3);
    assert_eq!(outcome.summary.failed, vec![chelsea.key()]);
    let recorded: Vec<(&str, usize)> = outcome
        .data
        .teams
        .iter()
        .map(|t| (t.team_id.as_str(), t.seasons.len()))
        .collect();
    assert_eq!(recorded, vec![("18bb7c10", 1), ("cff3d9bb", 1)]);
    assert!(outcome.data.teams[1].seasons[0].data.is_none());

    let json = serde_json::to_value(&outcome.data).unwrap();
    assert_eq!(json["cff3d9bb"]["team_name"], "Chelsea");
    assert_eq!(json["cff3d9bb"]["seasons_data"]["2023-2024"], Value::Null);
    let matches = &json["18bb7c10"]["seasons_data"]["2023-2024"]["matches"];
    assert_eq!(matches.as_array().map(Vec::len), Some(3));
}

#[test]
fn resume_skips_units_already_processed() {
    let dir = tempfile::tempdir().unwrap();
    let units = vec![
        unit("18bb7c10", "Arsenal", "2023-2024"),
        unit("18bb7c10", "Arsenal", "2024-2025"),
        unit("cff3d9bb", "Chelsea", "2023-2024"),
    ];
    let mut source = StubSource::new();
    for u in &units {
        source = source.page(fixtures_url(u), "squad_fixtures.html");
    }
    let opts = quiet(dir.path()).every(2);

    run_season_stage(FIXTURES_STAGE, &mut source, &units[..2], &opts, collect_fixtures).unwrap();
    let checkpoint = Checkpoint::load(dir.path(), FIXTURES_STAGE).unwrap().unwrap();
    assert_eq!(checkpoint.processed.len(), 2);
    assert!(checkpoint.snapshot.exists());
    assert_eq!(checkpoint.remaining(&[(units[2].key(), ())]).len(), 1);

    let mut resumed_source = StubSource::new().page(fixtures_url(&units[2]), "squad_fixtures.html");
    let mut resume_opts = opts.clone();
    resume_opts.resume = true;
    let outcome = run_season_stage(
        FIXTURES_STAGE,
        &mut resumed_source,
        &units,
        &resume_opts,
        collect_fixtures,
    )
    .unwrap();

    assert_eq!(resumed_source.requests(), vec![fixtures_url(&units[2])]);
    assert_eq!(outcome.summary.resumed, 2);
    assert_eq!(outcome.summary.attempted, 1);
    assert_eq!(outcome.data.succeeded(), 3);
    assert_eq!(outcome.data.teams.len(), 2);
}

#[test]
fn resume_without_checkpoint_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let arsenal = unit("18bb7c10", "Arsenal", "2023-2024");
    let mut source = StubSource::new().page(fixtures_url(&arsenal), "squad_fixtures.html");
    let mut opts = quiet(dir.path());
    opts.resume = true;

    let outcome =
        run_season_stage(FIXTURES_STAGE, &mut source, &[arsenal], &opts, collect_fixtures)
            .unwrap();
    assert_eq!(outcome.summary.resumed, 0);
    assert_eq!(outcome.summary.succeeded, 1);
    assert!(!checkpoint_path(dir.path(), FIXTURES_STAGE).exists());
}

#[test]
fn wages_stage_feeds_the_summary() {
    let dir = tempfile::tempdir().unwrap();
    let arsenal = unit("18bb7c10", "Arsenal", "2023-2024");
    let wages_url = squad_url("18bb7c10", "2023-2024", "Arsenal", SquadPage::Wages);
    let mut source = StubSource::new().page(wages_url, "squad_wages.html");

    let outcome =
        run_season_stage(WAGES_STAGE, &mut source, &[arsenal], &quiet(dir.path()), collect_wages)
            .unwrap();
    assert_eq!(outcome.summary.records, 3);

    let summary = wage_summary(&outcome.data);
    assert_eq!(summary.total_teams, 1);
    assert_eq!(summary.total_seasons, 1);
    assert_eq!(summary.total_players, 3);
    assert_eq!(summary.players_by_team.get("Arsenal"), Some(&3));
    assert_eq!(summary.tables_coverage.get("div_wages"), Some(&1));
}

#[test]
fn match_urls_filter_and_cap() {
    let arsenal = unit("18bb7c10", "Arsenal", "2023-2024");
    let chelsea = unit("cff3d9bb", "Chelsea", "2023-2024");
    let mut source = StubSource::new()
        .page(fixtures_url(&arsenal), "squad_fixtures.html")
        .page(fixtures_url(&chelsea), "squad_fixtures.html");

    let mut fixtures: Accumulator<FixtureSeason> = Accumulator::new();
    for u in [&arsenal, &chelsea] {
        let data = collect_fixtures(&mut source, u);
        fixtures.record(&u.team_id, &u.team_name, &u.season, data);
    }

    let all = match_urls(&fixtures, &MatchFilter::default());
    assert_eq!(all.len(), 3, "both teams list the same three reports");
    assert_eq!(
        all[0],
        "https://fbref.com/en/matches/3a6836b4/Arsenal-Nottingham-Forest-August-12-2023-Premier-League"
    );

    let league_only = MatchFilter {
        competitions: Some(vec!["Premier League".into()]),
        ..MatchFilter::default()
    };
    assert_eq!(match_urls(&fixtures, &league_only).len(), 2);

    let capped = MatchFilter {
        teams: Some(vec!["Chelsea".into()]),
        max_matches: Some(1),
        ..MatchFilter::default()
    };
    assert_eq!(match_urls(&fixtures, &capped), vec![all[0].clone()]);

    let other_season = MatchFilter {
        seasons: Some(vec!["2022-2023".into()]),
        ..MatchFilter::default()
    };
    assert!(match_urls(&fixtures, &other_season).is_empty());
}

#[test]
fn match_stage_writes_failed_urls() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = StubSource::new()
        .page(GOOD_MATCH, "match_report.html")
        .page(BLOCKED_MATCH, "match_report_no_primary.html");
    let urls: Vec<String> = [GOOD_MATCH, BLOCKED_MATCH, MISSING_MATCH]
        .iter()
        .map(|u| u.to_string())
        .collect();

    let outcome =
        run_match_stats_stage(&mut source, &urls, &quiet(dir.path()), collect_match_stats)
            .unwrap();
    assert_eq!(outcome.summary.attempted, 3);
    assert_eq!(outcome.summary.succeeded, 1);
    assert_eq!(outcome.data.len(), 12);
    assert!(outcome.data.iter().all(|s| s.match_id == GOOD_MATCH));

    let ledger = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("failed_urls_"))
        })
        .expect("failed urls ledger should be written");
    let failed: Vec<String> = load_json(&ledger).unwrap();
    assert_eq!(failed, vec![BLOCKED_MATCH, MISSING_MATCH]);
}
