//! Queue admission and withdrawal requested by realtime clients.

use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::ws::JoinQueueRequest,
    error::ServiceError,
    state::{
        SharedState,
        authority::{Admission, NewTeam},
        team::Team,
    },
};

/// Admit a team at the tail of the queue.
pub async fn join_queue(
    state: &SharedState,
    request: JoinQueueRequest,
) -> Result<Admission, ServiceError> {
    request.validate()?;

    let new_team = NewTeam {
        name: request.team_name,
        members: request.members,
        contact_info: request
            .contact_info
            .map(|contact| contact.trim().to_owned())
            .filter(|contact| !contact.is_empty()),
    };
    state
        .run_action(|authority, now| authority.join_queue(new_team, now))
        .await
}

/// Withdraw a team that is waiting or resting.
pub async fn leave_queue(state: &SharedState, team_id: Uuid) -> Result<Team, ServiceError> {
    state
        .run_action(|authority, _| authority.leave_queue(team_id))
        .await
}
