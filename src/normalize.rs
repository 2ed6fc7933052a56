use crate::model::{Accumulator, FixtureSeason, MatchStat, WageSeason};
use crate::record::Record;
use crate::site::full_url;
use crate::text::{match_id_from_href, parse_wage_value};

pub const TEAM_COLUMNS: [&str; 3] = ["team_name", "season", "team_id"];

pub const FIXTURE_COLUMNS: [&str; 20] = [
    "date",
    "time",
    "comp",
    "round",
    "day",
    "venue",
    "result",
    "gf",
    "ga",
    "opponent",
    "xg",
    "xga",
    "poss",
    "attendance",
    "captain",
    "formation",
    "formation_opp",
    "referee",
    "match_report",
    "notes",
];

pub const WAGE_PRIORITY: [&str; 6] = [
    "team_name",
    "season",
    "player_name",
    "age",
    "annual_wages",
    "weekly_wages",
];

pub const MATCH_STAT_PRIORITY: [&str; 4] = ["match_id", "team_name", "stat_name", "stat_value"];

const WAGE_VALUE_COLUMNS: [&str; 2] = ["weekly_wages", "annual_wages"];

/// Flat rows with a stable column order. Cells missing from a row are empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
}

impl Table {
    pub fn new(rows: Vec<Record>, priority: &[&str], known: &[&str]) -> Self {
        let columns = column_order(&rows, priority, known);
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        self.rows.get(row)?.get(column)
    }
}

/// Priority columns first, then the well-known columns, each only when some row has
/// them, then everything else in first-encountered order.
pub fn column_order(rows: &[Record], priority: &[&str], known: &[&str]) -> Vec<String> {
    let mut encountered: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !encountered.contains(&key) {
                encountered.push(key);
            }
        }
    }

    let mut columns: Vec<String> = Vec::with_capacity(encountered.len());
    for col in priority.iter().chain(known) {
        if encountered.contains(col) && !columns.iter().any(|c| c == col) {
            columns.push(col.to_string());
        }
    }
    for col in encountered {
        if !columns.iter().any(|c| c == col) {
            columns.push(col.to_string());
        }
    }
    columns
}

fn identity(team_id: &str, team_name: &str, season: &str) -> Record {
    let mut record = Record::new();
    record.insert("team_id", team_id);
    record.insert("team_name", team_name);
    record.insert("season", season);
    record
}

fn merge_into(target: &mut Record, source: &Record) {
    for (key, value) in source.iter() {
        if let Some(value) = value {
            target.insert(key, value);
        }
    }
}

pub fn flatten_fixtures(fixtures: &Accumulator<FixtureSeason>) -> Vec<Record> {
    let mut rows = Vec::new();
    for (team, season, data) in fixtures.successful() {
        for m in &data.matches {
            let mut row = identity(&team.team_id, &team.team_name, season);
            merge_into(&mut row, m);
            if let Some(href) = m.match_report_href() {
                row.insert("full_match_report_url", full_url(href));
            }
            rows.push(row);
        }
    }
    rows
}

pub fn fixtures_table(fixtures: &Accumulator<FixtureSeason>) -> Table {
    Table::new(flatten_fixtures(fixtures), &TEAM_COLUMNS, &FIXTURE_COLUMNS)
}

pub fn flatten_wages(wages: &Accumulator<WageSeason>) -> Vec<Record> {
    let mut rows = Vec::new();
    for (team, season, data) in wages.successful() {
        let tables_found = data.tables_found.join(", ");
        for player in &data.players {
            let mut row = identity(&team.team_id, &team.team_name, season);
            row.insert("tables_found", tables_found.as_str());
            merge_into(&mut row, player);
            for col in WAGE_VALUE_COLUMNS {
                let Some(parsed) = player.get(col).and_then(parse_wage_value) else {
                    continue;
                };
                let currencies = [
                    ("gbp", parsed.pounds),
                    ("eur", parsed.euros),
                    ("usd", parsed.dollars),
                ];
                for (suffix, amount) in currencies {
                    if let Some(amount) = amount {
                        row.insert(format!("{col}_{suffix}"), amount.to_string());
                    }
                }
            }
            rows.push(row);
        }
    }
    rows
}

pub fn wages_table(wages: &Accumulator<WageSeason>) -> Table {
    Table::new(flatten_wages(wages), &WAGE_PRIORITY, &[])
}

pub fn match_stats_table(stats: &[MatchStat]) -> Table {
    let rows = stats
        .iter()
        .map(|s| {
            let mut row = Record::new();
            row.insert("match_id", s.match_id.as_str());
            row.insert("team_name", s.team_name.as_str());
            row.insert("stat_name", s.stat_name.as_str());
            row.insert("stat_value", s.stat_value.as_str());
            if let Some(key) = match_id_from_href(&s.match_id) {
                row.insert("match_key", key);
            }
            row
        })
        .collect();
    Table::new(rows, &MATCH_STAT_PRIORITY, &[])
}

/// Groups flat rows back by (team_id, season), dropping the identity columns and the
/// given derived columns. Groups come out in first-seen order.
pub fn regroup(rows: &[Record], derived: &[&str]) -> Vec<(String, String, Vec<Record>)> {
    let mut groups: Vec<(String, String, Vec<Record>)> = Vec::new();
    for row in rows {
        let team_id = row.get("team_id").unwrap_or_default().to_string();
        let season = row.get("season").unwrap_or_default().to_string();
        let mut record = row.clone();
        for col in TEAM_COLUMNS.iter().chain(derived) {
            record.remove(col);
        }
        match groups
            .iter_mut()
            .find(|(id, s, _)| *id == team_id && *s == season)
        {
            Some((_, _, records)) => records.push(record),
            None => groups.push((team_id, season, vec![record])),
        }
    }
    groups
}
