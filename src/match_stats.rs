use scraper::{ElementRef, Html};
use tracing::{debug, error, info, warn};

use crate::html_table::{child_elements, find_all, find_by_id, find_first, stripped_text};
use crate::model::MatchStat;
use crate::page_fetch::PageSource;
use crate::text::extract_percentage_or_value;

pub const PRIMARY_BLOCK_ID: &str = "team_stats";
pub const SECONDARY_BLOCK_ID: &str = "team_stats_extra";

// Rendered as card icons, not numbers.
const SKIPPED_LABEL: &str = "Cards";

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryStats {
    pub stats: Vec<MatchStat>,
    pub home: String,
    pub away: String,
}

fn stat_pair(
    match_id: &str,
    home: &str,
    away: &str,
    stat: &str,
    values: (String, String),
) -> [MatchStat; 2] {
    [
        MatchStat {
            match_id: match_id.to_string(),
            team_name: home.to_string(),
            stat_name: stat.to_string(),
            stat_value: values.0,
        },
        MatchStat {
            match_id: match_id.to_string(),
            team_name: away.to_string(),
            stat_name: stat.to_string(),
            stat_value: values.1,
        },
    ]
}

/// The `team_stats` table: a header row naming both teams followed by label/value row
/// pairs. `None` when the block, its table, or a two-team header is missing.
pub fn extract_primary(doc: &Html, match_id: &str) -> Option<PrimaryStats> {
    let Some(block) = find_by_id(doc, "div", PRIMARY_BLOCK_ID) else {
        warn!("no team_stats div found");
        return None;
    };
    let Some(table) = find_first(block, "table", |_| true) else {
        warn!("no table found in team_stats div");
        return None;
    };
    let rows = find_all(table, "tr");
    let (header, rows) = rows.split_first()?;
    let team_cells = find_all(*header, "th");
    if team_cells.len() < 2 {
        warn!(cells = team_cells.len(), "team_stats header lacks both teams");
        return None;
    }
    let home_text = stripped_text(&team_cells[0]);
    let away_text = stripped_text(&team_cells[1]);
    let (Some(home), Some(away)) = (
        home_text.split_whitespace().next(),
        away_text.split_whitespace().last(),
    ) else {
        warn!("team_stats header has blank team names");
        return None;
    };

    let mut stats = Vec::new();
    for pair in rows.chunks_exact(2) {
        let stat_name = stripped_text(&pair[0]);
        if stat_name.is_empty() || stat_name == SKIPPED_LABEL {
            continue;
        }
        let cells = find_all(pair[1], "td");
        let [first, second] = cells.as_slice() else {
            continue;
        };
        let values = (
            extract_percentage_or_value(&stripped_text(first)),
            extract_percentage_or_value(&stripped_text(second)),
        );
        stats.extend(stat_pair(match_id, home, away, &stat_name, values));
    }

    Some(PrimaryStats {
        stats,
        home: home.to_string(),
        away: away.to_string(),
    })
}

// ASCII digits only: fractions, percentages and non-Latin numerals are not counts here.
fn is_count(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

/// The `team_stats_extra` block: containers of (home value, label, away value) triples.
/// Only triples where both values are plain counts are kept.
pub fn extract_secondary(
    doc: &Html,
    match_id: &str,
    home: &str,
    away: &str,
) -> Option<Vec<MatchStat>> {
    let Some(block) = find_by_id(doc, "div", SECONDARY_BLOCK_ID) else {
        warn!("no team_stats_extra div found");
        return None;
    };

    let mut stats = Vec::new();
    for container in child_elements(block, "div") {
        let cells: Vec<ElementRef<'_>> = find_all(container, "div");
        for triple in cells.chunks_exact(3) {
            let home_value = stripped_text(&triple[0]);
            let stat_name = stripped_text(&triple[1]);
            let away_value = stripped_text(&triple[2]);
            if is_count(&home_value) && is_count(&away_value) {
                let values = (home_value, away_value);
                stats.extend(stat_pair(match_id, home, away, &stat_name, values));
            }
        }
    }
    (!stats.is_empty()).then_some(stats)
}

/// All long-form statistics on a match page. `None` unless the primary block parsed and
/// at least one statistic came out of either block.
pub fn extract_match_stats(doc: &Html, match_id: &str) -> Option<Vec<MatchStat>> {
    let Some(primary) = extract_primary(doc, match_id) else {
        warn!(%match_id, "failed to scrape team stats");
        return None;
    };
    let mut stats = primary.stats;
    debug!(rows = stats.len(), "main stats rows");
    if let Some(extra) = extract_secondary(doc, match_id, &primary.home, &primary.away) {
        debug!(rows = extra.len(), "extra stats rows");
        stats.extend(extra);
    }
    if stats.is_empty() {
        warn!(%match_id, "no stats available");
        return None;
    }
    Some(stats)
}

pub fn collect_match_stats(source: &mut dyn PageSource, match_url: &str) -> Option<Vec<MatchStat>> {
    info!(url = %match_url, "scraping match");
    let Some(doc) = source.fetch_page(match_url) else {
        error!(url = %match_url, "failed to fetch match page");
        return None;
    };
    let stats = extract_match_stats(&doc, match_url)?;
    info!(rows = stats.len(), "match stats collected");
    Some(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_plain_ascii_digits() {
        assert!(is_count("12"));
        assert!(is_count("0"));
        for value in ["", "55%", "1.5", "-3", " 4", "٣", "²"] {
            assert!(!is_count(value), "{value:?}");
        }
    }
}
