//! DTO definitions used by the admin REST API and documentation layer.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dto::{matches::MatchSnapshot, queue::TeamSummary, validation::validate_actor},
    state::{court::CourtMode, match_machine::FinalScore, match_machine::Side},
};

/// Request to adjust one side's score of a match.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ScoreUpdateRequest {
    /// Which team scored: `1` or `2`.
    #[validate(range(min = 1, max = 2))]
    pub team: u8,
    /// Signed adjustment; negative values correct mistakes.
    #[validate(range(min = -100, max = 100))]
    pub delta: i32,
}

impl ScoreUpdateRequest {
    /// Side addressed by the `team` field.
    pub fn side(&self) -> Side {
        if self.team == 1 { Side::Team1 } else { Side::Team2 }
    }
}

/// Request to resolve a match by admin decision.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ForceResolveRequest {
    /// Admin identity recorded for audit.
    #[validate(length(min = 1, max = 64), custom(function = "validate_actor"))]
    pub actor: String,
    /// Overrides the recorded score when present.
    #[serde(default)]
    pub final_score: Option<FinalScore>,
}

/// Partial court update.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CourtUpdateRequest {
    #[serde(default)]
    pub is_open: Option<bool>,
    #[serde(default)]
    pub mode: Option<CourtMode>,
}

/// Query accepted when evicting a team.
#[derive(Debug, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct EvictQuery {
    /// Admin identity recorded in the logs.
    #[validate(length(max = 64))]
    pub actor: Option<String>,
}

/// Response returned after an eviction.
#[derive(Debug, Serialize, ToSchema)]
pub struct EvictedTeamResponse {
    pub team: TeamSummary,
}

/// Finished matches, newest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchHistoryResponse {
    pub matches: Vec<MatchSnapshot>,
}
