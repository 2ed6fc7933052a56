use scraper::Html;
use tracing::{debug, error, info, warn};

use crate::html_table::{data_rows, find_by_id, row_record};
use crate::model::FixtureSeason;
use crate::page_fetch::PageSource;
use crate::pipeline::SeasonUnit;
use crate::record::Record;
use crate::site::{SquadPage, squad_url};

pub const FIXTURES_TABLE_ID: &str = "matchlogs_for";

/// Rows of the match-log table that carry a date or an opponent. `None` when the
/// table is missing.
pub fn extract_fixtures(doc: &Html) -> Option<Vec<Record>> {
    let table = find_by_id(doc, "table", FIXTURES_TABLE_ID)?;
    let rows = data_rows(table);
    debug!(rows = rows.len(), "fixture rows found");
    let matches = rows
        .into_iter()
        .map(|row| row_record(row, &[], true))
        .filter(|m| m.date().is_some() || m.opponent().is_some())
        .collect();
    Some(matches)
}

pub fn collect_fixtures(source: &mut dyn PageSource, unit: &SeasonUnit) -> Option<FixtureSeason> {
    info!(team = %unit.team_name, season = %unit.season, "fetching fixtures");
    let url = squad_url(&unit.team_id, &unit.season, &unit.team_name, SquadPage::Fixtures);
    debug!(%url);

    let Some(doc) = source.fetch_page(&url) else {
        error!(team = %unit.team_name, season = %unit.season, "failed to fetch fixtures page");
        return None;
    };
    let Some(matches) = extract_fixtures(&doc) else {
        warn!(team = %unit.team_name, season = %unit.season, "no fixtures table found");
        return None;
    };
    info!(team = %unit.team_name, matches = matches.len(), "fixtures extracted");
    Some(FixtureSeason {
        team_id: unit.team_id.clone(),
        team_name: unit.team_name.clone(),
        season: unit.season.clone(),
        matches,
    })
}
