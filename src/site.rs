use crate::text::clean_team_name_for_url;

pub const BASE_URL: &str = "https://fbref.com";
const SITE_ROOT: &str = "https://fbref.com/en";
pub const PREMIER_LEAGUE_COMP: &str = "comps/9";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquadPage {
    Wages,
    Fixtures,
}

pub fn league_stats_url(comp_path: &str, season: &str) -> String {
    format!("{SITE_ROOT}/{comp_path}/{season}/{season}-Premier-League-Stats")
}

pub fn squad_url(team_id: &str, season: &str, team_name: &str, page: SquadPage) -> String {
    let name = clean_team_name_for_url(team_name);
    match page {
        SquadPage::Wages => {
            format!("{SITE_ROOT}/squads/{team_id}/{season}/wages/{name}-Wage-Details")
        }
        SquadPage::Fixtures => format!(
            "{SITE_ROOT}/squads/{team_id}/{season}/all_comps/{name}-Stats-All-Competitions"
        ),
    }
}

pub fn full_url(href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{BASE_URL}{href}")
    }
}
