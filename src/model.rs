use std::collections::BTreeSet;

use serde::de::{DeserializeOwned, Error as _};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::record::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonTeam {
    pub team_name: String,
    pub team_id: String,
    pub season: String,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamIdentity {
    pub team_name: String,
    pub team_id: String,
    pub seasons: Vec<String>,
    pub aliases: BTreeSet<String>,
}

impl TeamIdentity {
    pub fn answers_to(&self, name: &str) -> bool {
        self.team_name == name || self.aliases.contains(name)
    }
}

/// Every team seen across the scanned seasons, keyed by site identifier, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamMapping {
    pub teams: Vec<TeamIdentity>,
}

impl TeamMapping {
    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn team_seasons(&self) -> usize {
        self.teams.iter().map(|t| t.seasons.len()).sum()
    }

    pub fn merge_season(&mut self, found: &[SeasonTeam]) {
        for entry in found {
            let idx = match self.teams.iter().position(|t| t.team_id == entry.team_id) {
                Some(idx) => idx,
                None => {
                    self.teams.push(TeamIdentity {
                        team_name: entry.team_name.clone(),
                        team_id: entry.team_id.clone(),
                        seasons: Vec::new(),
                        aliases: BTreeSet::new(),
                    });
                    self.teams.len() - 1
                }
            };
            let team = &mut self.teams[idx];
            if !team.seasons.contains(&entry.season) {
                team.seasons.push(entry.season.clone());
            }
            team.aliases.insert(entry.team_name.clone());
        }
    }

    /// Keeps teams answering to one of `names` (when given) and trims their seasons to
    /// `seasons` (when given). Teams left without seasons are dropped.
    pub fn filtered(&self, names: Option<&[String]>, seasons: Option<&[String]>) -> TeamMapping {
        let teams = self
            .teams
            .iter()
            .filter(|t| names.is_none_or(|names| names.iter().any(|n| t.answers_to(n))))
            .map(|t| {
                let mut team = t.clone();
                if let Some(seasons) = seasons {
                    team.seasons.retain(|s| seasons.contains(s));
                }
                team
            })
            .filter(|t| !t.seasons.is_empty())
            .collect();
        TeamMapping { teams }
    }
}

impl Serialize for TeamMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.teams.len()))?;
        for team in &self.teams {
            map.serialize_entry(&team.team_id, team)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TeamMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let mut teams = Vec::with_capacity(raw.len());
        for (team_id, value) in raw {
            let mut team: TeamIdentity = serde_json::from_value(value)
                .map_err(|e| D::Error::custom(format!("team {team_id}: {e}")))?;
            team.team_id = team_id;
            teams.push(team);
        }
        Ok(TeamMapping { teams })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureSeason {
    pub team_id: String,
    pub team_name: String,
    pub season: String,
    pub matches: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WageSeason {
    pub team_id: String,
    pub team_name: String,
    pub season: String,
    pub players: Vec<Record>,
    pub tables_found: Vec<String>,
}

/// Per-season payloads that count child records.
pub trait SeasonPayload {
    fn records(&self) -> &[Record];
}

impl SeasonPayload for FixtureSeason {
    fn records(&self) -> &[Record] {
        &self.matches
    }
}

impl SeasonPayload for WageSeason {
    fn records(&self) -> &[Record] {
        &self.players
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonEntry<T> {
    pub season: String,
    /// `None` marks a unit that was attempted and produced nothing.
    pub data: Option<T>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeamSeasons<T> {
    pub team_id: String,
    pub team_name: String,
    pub seasons: Vec<SeasonEntry<T>>,
}

/// Stage accumulator: team -> season -> payload, keyed by team id and season.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator<T> {
    pub teams: Vec<TeamSeasons<T>>,
}

impl<T> Default for Accumulator<T> {
    fn default() -> Self {
        Self { teams: Vec::new() }
    }
}

impl<T> Accumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a team without recording any season for it yet.
    pub fn ensure_team(&mut self, team_id: &str, team_name: &str) -> &mut TeamSeasons<T> {
        let idx = match self.teams.iter().position(|t| t.team_id == team_id) {
            Some(idx) => idx,
            None => {
                self.teams.push(TeamSeasons {
                    team_id: team_id.to_string(),
                    team_name: team_name.to_string(),
                    seasons: Vec::new(),
                });
                self.teams.len() - 1
            }
        };
        &mut self.teams[idx]
    }

    /// Records the outcome for (team, season), replacing any earlier outcome for that key.
    pub fn record(&mut self, team_id: &str, team_name: &str, season: &str, data: Option<T>) {
        let team = self.ensure_team(team_id, team_name);
        match team.seasons.iter_mut().find(|e| e.season == season) {
            Some(existing) => existing.data = data,
            None => team.seasons.push(SeasonEntry {
                season: season.to_string(),
                data,
            }),
        }
    }

    pub fn successful(&self) -> impl Iterator<Item = (&TeamSeasons<T>, &str, &T)> {
        self.teams.iter().flat_map(|team| {
            team.seasons
                .iter()
                .filter_map(move |e| e.data.as_ref().map(|d| (team, e.season.as_str(), d)))
        })
    }
}

impl<T: SeasonPayload> Accumulator<T> {
    pub fn succeeded(&self) -> usize {
        self.successful()
            .filter(|(_, _, d)| !d.records().is_empty())
            .count()
    }

    pub fn total_records(&self) -> usize {
        self.successful().map(|(_, _, d)| d.records().len()).sum()
    }
}

struct SeasonsView<'a, T>(&'a [SeasonEntry<T>]);

impl<T: Serialize> Serialize for SeasonsView<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in self.0 {
            map.serialize_entry(&entry.season, &entry.data)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct TeamView<'a, T: Serialize> {
    team_name: &'a str,
    team_id: &'a str,
    seasons_data: SeasonsView<'a, T>,
}

impl<T: Serialize> Serialize for Accumulator<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.teams.len()))?;
        for team in &self.teams {
            let view = TeamView {
                team_name: &team.team_name,
                team_id: &team.team_id,
                seasons_data: SeasonsView(&team.seasons),
            };
            map.serialize_entry(&team.team_id, &view)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
struct RawTeam {
    team_name: String,
    #[serde(default)]
    seasons_data: Map<String, Value>,
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Accumulator<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let mut teams = Vec::with_capacity(raw.len());
        for (team_id, value) in raw {
            let team: RawTeam = serde_json::from_value(value)
                .map_err(|e| D::Error::custom(format!("team {team_id}: {e}")))?;
            let mut seasons = Vec::with_capacity(team.seasons_data.len());
            for (season, data) in team.seasons_data {
                let data = serde_json::from_value::<Option<T>>(data)
                    .map_err(|e| D::Error::custom(format!("{team_id} {season}: {e}")))?;
                seasons.push(SeasonEntry { season, data });
            }
            teams.push(TeamSeasons {
                team_id,
                team_name: team.team_name,
                seasons,
            });
        }
        Ok(Accumulator { teams })
    }
}

/// One long-form match statistic: a single team's value for a single statistic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStat {
    pub match_id: String,
    pub team_name: String,
    pub stat_name: String,
    pub stat_value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen(name: &str, id: &str, season: &str) -> SeasonTeam {
        SeasonTeam {
            team_name: name.to_string(),
            team_id: id.to_string(),
            season: season.to_string(),
            href: format!("/en/squads/{id}/"),
        }
    }

    #[test]
    fn merge_collects_aliases_and_dedups_seasons() {
        let mut mapping = TeamMapping::default();
        mapping.merge_season(&[seen("Tottenham", "361ca564", "2022-2023")]);
        mapping.merge_season(&[seen("Tottenham Hotspur", "361ca564", "2023-2024")]);
        mapping.merge_season(&[seen("Tottenham", "361ca564", "2023-2024")]);

        assert_eq!(mapping.len(), 1);
        let team = &mapping.teams[0];
        assert_eq!(team.team_id, "361ca564");
        assert_eq!(team.team_name, "Tottenham");
        assert_eq!(team.seasons, vec!["2022-2023", "2023-2024"]);
        assert_eq!(team.aliases.len(), 2);
        assert!(team.answers_to("Tottenham Hotspur"));
    }

    #[test]
    fn mapping_filters_by_alias_and_season() {
        let mut mapping = TeamMapping::default();
        mapping.merge_season(&[
            seen("Arsenal", "18bb7c10", "2023-2024"),
            seen("Chelsea", "cff3d9bb", "2023-2024"),
        ]);
        mapping.merge_season(&[seen("Arsenal", "18bb7c10", "2022-2023")]);

        let names = vec!["Arsenal".to_string()];
        let seasons = vec!["2022-2023".to_string()];
        let filtered = mapping.filtered(Some(&names), Some(&seasons));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.teams[0].seasons, vec!["2022-2023"]);

        let none = mapping.filtered(Some(&["Chelsea".to_string()]), Some(&seasons));
        assert!(none.is_empty());
    }

    #[test]
    fn mapping_json_is_keyed_by_team_id_in_order() {
        let mut mapping = TeamMapping::default();
        mapping.merge_season(&[
            seen("Wolves", "8cec06e1", "2023-2024"),
            seen("Arsenal", "18bb7c10", "2023-2024"),
        ]);
        let json = serde_json::to_value(&mapping).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["8cec06e1", "18bb7c10"]);
        let back: TeamMapping = serde_json::from_value(json).unwrap();
        assert_eq!(back, mapping);
    }

    #[test]
    fn accumulator_records_none_and_replaces_on_retry() {
        let mut acc: Accumulator<FixtureSeason> = Accumulator::new();
        acc.record("18bb7c10", "Arsenal", "2023-2024", None);
        assert_eq!(acc.teams[0].seasons.len(), 1);
        assert_eq!(acc.succeeded(), 0);
        assert!(acc.teams[0].seasons[0].data.is_none());

        let mut m = Record::new();
        m.insert("date", "2023-08-12");
        acc.record(
            "18bb7c10",
            "Arsenal",
            "2023-2024",
            Some(FixtureSeason {
                team_id: "18bb7c10".into(),
                team_name: "Arsenal".into(),
                season: "2023-2024".into(),
                matches: vec![m],
            }),
        );
        assert_eq!(acc.teams[0].seasons.len(), 1);
        assert_eq!(acc.succeeded(), 1);
        assert_eq!(acc.total_records(), 1);
    }

    #[test]
    fn accumulator_json_keeps_explicit_nulls() {
        let mut acc: Accumulator<FixtureSeason> = Accumulator::new();
        acc.record("18bb7c10", "Arsenal", "2022-2023", None);
        let json = serde_json::to_value(&acc).unwrap();
        assert_eq!(
            json["18bb7c10"]["seasons_data"]["2022-2023"],
            serde_json::Value::Null
        );
        assert_eq!(json["18bb7c10"]["team_name"], "Arsenal");
        let back: Accumulator<FixtureSeason> = serde_json::from_value(json).unwrap();
        assert_eq!(back, acc);
    }
}
