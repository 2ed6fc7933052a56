use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open record: site-defined column identifiers mapped to cell text, in the order the
/// columns were encountered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), Value::String(value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Value for `key` when present and not blank.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.trim().is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        match self.0.shift_remove(key)? {
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn date(&self) -> Option<&str> {
        self.non_empty("date")
    }

    pub fn opponent(&self) -> Option<&str> {
        self.non_empty("opponent")
    }

    pub fn comp(&self) -> Option<&str> {
        self.non_empty("comp")
    }

    pub fn venue(&self) -> Option<&str> {
        self.non_empty("venue")
    }

    pub fn result(&self) -> Option<&str> {
        self.non_empty("result")
    }

    pub fn goals_for(&self) -> Option<&str> {
        self.non_empty("gf")
    }

    pub fn goals_against(&self) -> Option<&str> {
        self.non_empty("ga")
    }

    pub fn player_name(&self) -> Option<&str> {
        self.non_empty("player_name")
    }

    pub fn table_source(&self) -> Option<&str> {
        self.non_empty("table_source")
    }

    pub fn match_report_href(&self) -> Option<&str> {
        self.non_empty("match_report_href")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}
