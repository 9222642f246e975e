//! Strict FIFO waiting list feeding the court.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::ServiceError,
    state::team::{Team, TeamStatus, normalize_name},
};

/// Why the queue changed, so observers can react semantically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueEventKind {
    /// A team was admitted at the tail.
    TeamJoined,
    /// A team withdrew.
    TeamRemoved,
    /// An admin removed a team.
    TeamEvicted,
    /// The two earliest teams were promoted onto the court.
    TeamPromoted,
    /// A team came back from the court or from cooldown.
    TeamReturned,
}

/// Ordered sequence of waiting teams. Insertion order is queue order.
#[derive(Debug, Clone)]
pub struct CourtQueue {
    teams: IndexMap<Uuid, Team>,
    capacity: usize,
}

/// Point-in-time view of the queue with 1-based positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueView {
    /// Waiting teams with their position, in queue order.
    pub teams: Vec<(usize, Team)>,
    /// Number of waiting teams.
    pub total_teams: usize,
    /// Remaining free slots.
    pub available_slots: usize,
    /// Configured capacity.
    pub capacity: usize,
}

impl CourtQueue {
    /// Create an empty queue holding at most `capacity` teams.
    pub fn new(capacity: usize) -> Self {
        Self {
            teams: IndexMap::new(),
            capacity,
        }
    }

    /// Number of waiting teams.
    pub fn len(&self) -> usize {
        self.teams.len()
    }

    /// Whether no team is waiting.
    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots left before admissions are refused.
    pub fn available_slots(&self) -> usize {
        self.capacity.saturating_sub(self.teams.len())
    }

    /// Whether a waiting team already uses this display name.
    pub fn contains_name(&self, name: &str) -> bool {
        let key = normalize_name(name);
        self.teams.values().any(|team| team.name_key() == key)
    }

    /// Borrow a waiting team.
    pub fn get(&self, team_id: &Uuid) -> Option<&Team> {
        self.teams.get(team_id)
    }

    /// Borrow a waiting team mutably.
    pub fn get_mut(&mut self, team_id: &Uuid) -> Option<&mut Team> {
        self.teams.get_mut(team_id)
    }

    /// 1-based position of a waiting team.
    pub fn position(&self, team_id: &Uuid) -> Option<usize> {
        self.teams.get_index_of(team_id).map(|index| index + 1)
    }

    /// Append a team at the tail, returning its position.
    pub fn admit(&mut self, mut team: Team) -> Result<usize, ServiceError> {
        if self.teams.len() >= self.capacity {
            return Err(ServiceError::QueueFull {
                capacity: self.capacity,
            });
        }
        if self.contains_name(&team.name) {
            return Err(ServiceError::TeamNameExists(team.name));
        }

        team.status = TeamStatus::Waiting;
        self.teams.insert(team.id, team);
        Ok(self.teams.len())
    }

    /// Remove a waiting team, preserving the order of everyone behind it.
    pub fn withdraw(&mut self, team_id: &Uuid) -> Result<Team, ServiceError> {
        self.teams
            .shift_remove(team_id)
            .ok_or(ServiceError::TeamNotFound(*team_id))
    }

    /// Remove the two earliest-admitted teams, or nothing when fewer than two wait.
    pub fn promote_two(&mut self) -> Option<(Team, Team)> {
        if self.teams.len() < 2 {
            return None;
        }

        let (_, mut first) = self.teams.shift_remove_index(0)?;
        let (_, mut second) = self.teams.shift_remove_index(0)?;
        first.status = TeamStatus::Playing;
        second.status = TeamStatus::Playing;
        Some((first, second))
    }

    /// Snapshot the queue with positions recomputed from the current order.
    pub fn view(&self) -> QueueView {
        QueueView {
            teams: self
                .teams
                .values()
                .cloned()
                .enumerate()
                .map(|(index, team)| (index + 1, team))
                .collect(),
            total_teams: self.teams.len(),
            available_slots: self.available_slots(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;

    fn team(name: &str) -> Team {
        Team::new(name.into(), 4, None, OffsetDateTime::UNIX_EPOCH)
    }

    #[test]
    fn admitting_two_teams_reports_positions_and_slots() {
        let mut queue = CourtQueue::new(10);
        assert_eq!(queue.admit(team("Alpha")).unwrap(), 1);
        assert_eq!(queue.admit(team("Beta")).unwrap(), 2);

        let view = queue.view();
        assert_eq!(view.total_teams, 2);
        assert_eq!(view.available_slots, 8);
        let names: Vec<_> = view
            .teams
            .iter()
            .map(|(pos, team)| (*pos, team.name.as_str()))
            .collect();
        assert_eq!(names, vec![(1, "Alpha"), (2, "Beta")]);
    }

    #[test]
    fn full_queue_rejects_admission() {
        let mut queue = CourtQueue::new(2);
        queue.admit(team("Alpha")).unwrap();
        queue.admit(team("Beta")).unwrap();

        let err = queue.admit(team("Gamma")).unwrap_err();
        assert_eq!(err, ServiceError::QueueFull { capacity: 2 });
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn duplicate_names_are_rejected_case_insensitively() {
        let mut queue = CourtQueue::new(10);
        queue.admit(team("Alpha")).unwrap();

        let err = queue.admit(team("  alpha ")).unwrap_err();
        assert!(matches!(err, ServiceError::TeamNameExists(_)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn withdrawn_name_can_be_reused() {
        let mut queue = CourtQueue::new(10);
        let alpha = team("Alpha");
        let alpha_id = alpha.id;
        queue.admit(alpha).unwrap();
        queue.withdraw(&alpha_id).unwrap();

        assert!(queue.admit(team("Alpha")).is_ok());
    }

    #[test]
    fn withdraw_preserves_admission_order() {
        let mut queue = CourtQueue::new(10);
        let teams: Vec<Team> = ["A", "B", "C", "D"].into_iter().map(team).collect();
        let ids: Vec<Uuid> = teams.iter().map(|t| t.id).collect();
        for t in teams {
            queue.admit(t).unwrap();
        }

        queue.withdraw(&ids[1]).unwrap();

        let order: Vec<_> = queue.view().teams.into_iter().map(|(_, t)| t.id).collect();
        assert_eq!(order, vec![ids[0], ids[2], ids[3]]);
        assert_eq!(queue.position(&ids[3]), Some(3));
    }

    #[test]
    fn withdrawing_unknown_team_fails() {
        let mut queue = CourtQueue::new(10);
        let id = Uuid::new_v4();
        assert_eq!(queue.withdraw(&id), Err(ServiceError::TeamNotFound(id)));
    }

    #[test]
    fn promote_two_takes_earliest_admitted_regardless_of_wins() {
        let mut queue = CourtQueue::new(10);
        let mut veteran = team("Veteran");
        veteran.wins = 12;
        queue.admit(team("Alpha")).unwrap();
        queue.admit(team("Beta")).unwrap();
        queue.admit(veteran).unwrap();

        let (first, second) = queue.promote_two().unwrap();
        assert_eq!(first.name, "Alpha");
        assert_eq!(second.name, "Beta");
        assert_eq!(first.status, TeamStatus::Playing);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.view().teams[0].0, 1);
    }

    #[test]
    fn promote_two_needs_two_teams() {
        let mut queue = CourtQueue::new(10);
        queue.admit(team("Alpha")).unwrap();
        assert!(queue.promote_two().is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn total_matches_admitted_minus_withdrawn() {
        let mut queue = CourtQueue::new(6);
        let mut admitted = Vec::new();
        for name in ["A", "B", "C", "D", "E"] {
            let t = team(name);
            admitted.push(t.id);
            queue.admit(t).unwrap();
        }
        queue.withdraw(&admitted[0]).unwrap();
        queue.withdraw(&admitted[4]).unwrap();
        queue.admit(team("F")).unwrap();

        let view = queue.view();
        assert_eq!(view.total_teams, 4);
        assert_eq!(view.available_slots, 2);
        let names: Vec<_> = view.teams.iter().map(|(_, t)| t.name.clone()).collect();
        assert_eq!(names, vec!["B", "C", "D", "F"]);
    }
}
