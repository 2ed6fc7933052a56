use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("http status {status}")]
    Status { status: u16 },
    #[error("rate limited (429), retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed reading body: {0}")]
    Body(String),
}

impl FetchError {
    pub fn looks_rate_limited(&self) -> bool {
        if matches!(self, FetchError::RateLimited { .. }) {
            return true;
        }
        let text = self.to_string().to_ascii_lowercase();
        text.contains("429") || text.contains("rate")
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(
        "{stage}: required input {} not found; run the {prerequisite} stage first",
        path.display()
    )]
    MissingPrerequisite {
        stage: &'static str,
        path: PathBuf,
        prerequisite: &'static str,
    },
    #[error("{stage}: no records were extracted")]
    EmptyStage { stage: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detection_reads_error_text() {
        assert!(FetchError::RateLimited { retry_after: None }.looks_rate_limited());
        assert!(FetchError::Status { status: 429 }.looks_rate_limited());
        assert!(FetchError::Transport("Rate exceeded".into()).looks_rate_limited());
        assert!(!FetchError::Status { status: 503 }.looks_rate_limited());
        assert!(!FetchError::Transport("connection reset".into()).looks_rate_limited());
    }

    #[test]
    fn missing_prerequisite_names_the_stage_to_run() {
        let err = PipelineError::MissingPrerequisite {
            stage: "fixtures",
            path: PathBuf::from("data/prod/raw/all_teams.json"),
            prerequisite: "team_mapping",
        };
        let msg = err.to_string();
        assert!(msg.contains("all_teams.json"));
        assert!(msg.contains("run the team_mapping stage first"));
    }
}
