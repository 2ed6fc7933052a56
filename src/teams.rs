use scraper::Html;
use tracing::{error, info, warn};

use crate::html_table::{attr, data_rows, data_stat, find_by_id, find_first, first_link, text_of};
use crate::model::{SeasonTeam, TeamMapping};
use crate::page_fetch::PageSource;
use crate::site::{PREMIER_LEAGUE_COMP, league_stats_url};
use crate::text::{is_valid_team_id, team_id_from_href};

pub const ROSTER_TABLE_ID: &str = "stats_squads_standard_for";

/// Teams listed on a season's league page, in table order. `None` when the roster
/// table is missing.
pub fn extract_season_teams(doc: &Html, season: &str) -> Option<Vec<SeasonTeam>> {
    let Some(table) = find_by_id(doc, "table", ROSTER_TABLE_ID) else {
        warn!(%season, "squads table not found");
        return None;
    };

    let mut teams: Vec<SeasonTeam> = Vec::new();
    for row in data_rows(table) {
        let Some(cell) = find_first(row, "th", |c| data_stat(c) == Some("team")) else {
            continue;
        };
        let Some(link) = first_link(cell) else {
            continue;
        };
        let team_name = text_of(&link);
        let Some(href) = attr(&link, "href").filter(|h| h.contains("/squads/")) else {
            continue;
        };
        match team_id_from_href(href).filter(|id| is_valid_team_id(id)) {
            Some(team_id) => {
                let entry = SeasonTeam {
                    team_name,
                    team_id: team_id.to_string(),
                    season: season.to_string(),
                    href: href.to_string(),
                };
                // A repeated name keeps its first position but takes the later row.
                match teams.iter_mut().find(|t| t.team_name == entry.team_name) {
                    Some(existing) => *existing = entry,
                    None => teams.push(entry),
                }
            }
            None => warn!(%team_name, %href, "invalid team id"),
        }
    }
    info!(%season, teams = teams.len(), "season roster parsed");
    Some(teams)
}

pub fn collect_season_teams(source: &mut dyn PageSource, season: &str) -> Vec<SeasonTeam> {
    info!(%season, "fetching teams");
    let url = league_stats_url(PREMIER_LEAGUE_COMP, season);
    let Some(doc) = source.fetch_page(&url) else {
        error!(%season, "failed to fetch league page");
        return Vec::new();
    };
    extract_season_teams(&doc, season).unwrap_or_default()
}

pub fn build_team_mapping(source: &mut dyn PageSource, seasons: &[String]) -> TeamMapping {
    info!(seasons = seasons.len(), "starting team id extraction");
    let mut mapping = TeamMapping::default();
    for season in seasons {
        let found = collect_season_teams(source, season);
        mapping.merge_season(&found);
    }
    info!(
        teams = mapping.len(),
        team_seasons = mapping.team_seasons(),
        "team id extraction complete"
    );
    mapping
}
