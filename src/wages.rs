use std::collections::BTreeMap;

use scraper::Html;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::html_table::{
    data_rows, data_stat, find_by_id, find_first, first_link, row_record, text_of,
};
use crate::model::{Accumulator, WageSeason};
use crate::page_fetch::PageSource;
use crate::pipeline::SeasonUnit;
use crate::record::Record;
use crate::site::{SquadPage, squad_url};

/// Wage tables in lookup order: (table id, `table_source` label).
pub const WAGE_TABLES: [(&str, &str); 2] = [("wages", "primary"), ("div_wages", "secondary")];

#[derive(Debug, Clone, PartialEq)]
pub struct WageTables {
    pub players: Vec<Record>,
    pub tables_found: Vec<String>,
}

pub fn extract_wages(doc: &Html) -> Option<WageTables> {
    let mut players = Vec::new();
    let mut tables_found = Vec::new();
    for (table_id, source) in WAGE_TABLES {
        let Some(table) = find_by_id(doc, "table", table_id) else {
            continue;
        };
        tables_found.push(table_id.to_string());
        let rows = data_rows(table);
        debug!(table = table_id, rows = rows.len(), "wage rows found");
        players.extend(rows.into_iter().filter_map(|row| wage_row(row, source)));
    }
    if tables_found.is_empty() {
        return None;
    }
    Some(WageTables {
        players,
        tables_found,
    })
}

fn wage_row(row: scraper::ElementRef<'_>, source: &str) -> Option<Record> {
    let cell = find_first(row, "th", |c| data_stat(c) == Some("player"))
        .or_else(|| find_first(row, "td", |c| data_stat(c) == Some("player")))?;
    let player_name = match first_link(cell) {
        Some(link) => text_of(&link),
        None => text_of(&cell),
    };
    if player_name.is_empty() {
        return None;
    }

    let mut record = Record::new();
    record.insert("table_source", source);
    record.insert("player_name", player_name);
    for (key, value) in row_record(row, &["player"], false).iter() {
        if let Some(value) = value {
            record.insert(key, value);
        }
    }
    Some(record)
}

pub fn collect_wages(source: &mut dyn PageSource, unit: &SeasonUnit) -> Option<WageSeason> {
    info!(team = %unit.team_name, season = %unit.season, "fetching wages");
    let url = squad_url(&unit.team_id, &unit.season, &unit.team_name, SquadPage::Wages);
    debug!(%url);

    let Some(doc) = source.fetch_page(&url) else {
        error!(team = %unit.team_name, season = %unit.season, "failed to fetch wages page");
        return None;
    };
    let Some(tables) = extract_wages(&doc) else {
        warn!(team = %unit.team_name, season = %unit.season, "no wages tables found");
        return None;
    };
    info!(
        team = %unit.team_name,
        players = tables.players.len(),
        tables = ?tables.tables_found,
        "wages extracted"
    );
    Some(WageSeason {
        team_id: unit.team_id.clone(),
        team_name: unit.team_name.clone(),
        season: unit.season.clone(),
        players: tables.players,
        tables_found: tables.tables_found,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WageSummary {
    pub total_teams: usize,
    pub total_seasons: usize,
    pub total_players: usize,
    pub teams_by_season: BTreeMap<String, usize>,
    pub players_by_team: BTreeMap<String, usize>,
    pub tables_coverage: BTreeMap<String, usize>,
}

pub fn wage_summary(wages: &Accumulator<WageSeason>) -> WageSummary {
    let mut summary = WageSummary {
        total_teams: wages.teams.len(),
        tables_coverage: WAGE_TABLES
            .iter()
            .map(|(id, _)| (id.to_string(), 0))
            .collect(),
        ..WageSummary::default()
    };
    for team in &wages.teams {
        summary.players_by_team.entry(team.team_name.clone()).or_insert(0);
    }
    for (team, season, data) in wages.successful() {
        if data.players.is_empty() {
            continue;
        }
        summary.total_seasons += 1;
        summary.total_players += data.players.len();
        *summary
            .players_by_team
            .entry(team.team_name.clone())
            .or_insert(0) += data.players.len();
        *summary.teams_by_season.entry(season.to_string()).or_insert(0) += 1;
        for table in &data.tables_found {
            if let Some(count) = summary.tables_coverage.get_mut(table) {
                *count += 1;
            }
        }
    }
    summary
}
