//! Result confirmation submitted by the teams on court.

use crate::{
    dto::{matches::MatchSnapshot, ws::ConfirmResultRequest},
    error::ServiceError,
    state::SharedState,
};

/// Record a team's confirmation or rejection of the current result.
pub async fn confirm_result(
    state: &SharedState,
    request: ConfirmResultRequest,
) -> Result<MatchSnapshot, ServiceError> {
    let ConfirmResultRequest {
        match_id,
        team_id,
        confirmed,
        final_score,
    } = request;

    state
        .run_action(|authority, now| {
            authority.confirm_result(match_id, team_id, confirmed, final_score, now)
        })
        .await
        .map(MatchSnapshot::from)
}
