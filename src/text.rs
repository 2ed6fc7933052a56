use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TEAM_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-f0-9]{8}$").expect("team id regex"));
static SQUAD_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/squads/([a-f0-9]+)/").expect("squad href regex"));
static MATCH_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/matches/([a-f0-9]+)/").expect("match href regex"));
static PERCENTAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?%)").expect("percentage regex"));
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)").expect("number regex"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-]").expect("non-word regex"));
static SEASON: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{4})$").expect("season regex"));
static WAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"£\s*([\d,]+)(?:\s*\(€\s*([\d,]+),\s*\$\s*([\d,]+)\))?").expect("wage regex")
});

pub fn is_valid_team_id(team_id: &str) -> bool {
    TEAM_ID.is_match(team_id)
}

pub fn team_id_from_href(href: &str) -> Option<&str> {
    SQUAD_HREF
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn match_id_from_href(href: &str) -> Option<&str> {
    MATCH_HREF
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Percentage if present, otherwise the first number, otherwise the text unchanged.
pub fn extract_percentage_or_value(text: &str) -> String {
    if let Some(m) = PERCENTAGE.captures(text).and_then(|c| c.get(1)) {
        return m.as_str().to_string();
    }
    if let Some(m) = NUMBER.captures(text).and_then(|c| c.get(1)) {
        return m.as_str().to_string();
    }
    text.to_string()
}

pub fn clean_team_name_for_url(team_name: &str) -> String {
    let dashed = team_name.replace(' ', "-").replace('\'', "");
    NON_WORD.replace_all(&dashed, "").into_owned()
}

pub fn is_valid_season(season: &str) -> bool {
    let Some(caps) = SEASON.captures(season) else {
        return false;
    };
    let start = caps[1].parse::<u32>().ok();
    let end = caps[2].parse::<u32>().ok();
    matches!((start, end), (Some(s), Some(e)) if e == s + 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WageValue {
    pub pounds: Option<u64>,
    pub euros: Option<u64>,
    pub dollars: Option<u64>,
}

pub fn parse_wage_value(text: &str) -> Option<WageValue> {
    let caps = WAGE.captures(text)?;
    let amount = |idx: usize| {
        caps.get(idx)
            .and_then(|m| m.as_str().replace(',', "").parse::<u64>().ok())
    };
    let value = WageValue {
        pounds: amount(1),
        euros: amount(2),
        dollars: amount(3),
    };
    (value != WageValue::default()).then_some(value)
}
