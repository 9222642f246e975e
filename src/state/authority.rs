//! Canonical owner of queue, match and court state.
//!
//! Every mutation runs to completion against `&mut Authority` and returns the
//! deltas it produced, in emission order. Callers serialize access (see
//! [`crate::state::AppState::run_action`]) so that the returned order is also
//! the order observers receive.

use std::{collections::VecDeque, time::Duration};

use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::ServiceError,
    state::{
        court::{CourtMode, CourtState},
        match_machine::{
            DisputePolicy, FinalScore, Match, MatchEventKind, MatchInput, MatchStateMachine,
            MatchStatus, Side, TeamRef,
        },
        queue::{CourtQueue, QueueEventKind, QueueView},
        team::{Team, TeamStatus, normalize_name},
    },
};

/// Tunables the authority needs at runtime.
#[derive(Debug, Clone)]
pub struct AuthoritySettings {
    /// Maximum number of waiting teams.
    pub queue_capacity: usize,
    /// Score that ends a match.
    pub target_score: u32,
    /// How long teams have to confirm a result.
    pub confirmation_window: Duration,
    /// Pause between matches. Zero disables it.
    pub court_cooldown: Duration,
    /// Rest period before a team returns to the queue. Zero returns immediately.
    pub team_cooldown: Duration,
    /// Handling of conflicting confirmations.
    pub dispute_policy: DisputePolicy,
    /// Start the next match without admin intervention.
    pub auto_start: bool,
    /// Initial court open flag.
    pub court_open: bool,
    /// Initial court mode.
    pub court_mode: CourtMode,
    /// Number of finished matches kept for history.
    pub archive_limit: usize,
}

impl Default for AuthoritySettings {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            target_score: 21,
            confirmation_window: Duration::from_secs(60),
            court_cooldown: Duration::ZERO,
            team_cooldown: Duration::from_secs(120),
            dispute_policy: DisputePolicy::Park,
            auto_start: true,
            court_open: true,
            court_mode: CourtMode::Regular,
            archive_limit: 50,
        }
    }
}

/// Admission request after payload validation.
#[derive(Debug, Clone)]
pub struct NewTeam {
    /// Requested display name.
    pub name: String,
    /// Player count.
    pub members: u8,
    /// Optional contact handle.
    pub contact_info: Option<String>,
}

/// Result of a successful admission.
#[derive(Debug, Clone)]
pub struct Admission {
    /// The admitted team.
    pub team: Team,
    /// 1-based position at admission time.
    pub position: usize,
}

/// Queue change with the full resulting view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDelta {
    /// Why the queue changed.
    pub kind: QueueEventKind,
    /// Queue revision after the change.
    pub revision: u64,
    /// Queue after the change.
    pub view: QueueView,
    /// Teams the change is about.
    pub teams: Vec<TeamRef>,
}

/// Match transition with the full resulting record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDelta {
    /// Transition that happened.
    pub kind: MatchEventKind,
    /// Match revision after the change.
    pub revision: u64,
    /// Match after the change.
    pub record: Match,
    /// The match is no longer the one on (or last on) the court.
    pub archived: bool,
}

/// Court state as exposed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourtSnapshot {
    /// Court singleton.
    pub court: CourtState,
    /// Number of non-terminal matches on the court (0 or 1).
    pub active_matches: usize,
    /// Court revision.
    pub revision: u64,
}

/// A state change to fan out to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    /// Queue changed.
    Queue(QueueDelta),
    /// A match changed.
    Match(MatchDelta),
    /// Court status changed.
    Court(CourtSnapshot),
}

#[derive(Debug, Clone)]
struct RestingTeam {
    team: Team,
    until: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Default)]
struct Revisions {
    queue: u64,
    matches: u64,
    court: u64,
}

/// Single source of truth for the court.
#[derive(Debug)]
pub struct Authority {
    settings: AuthoritySettings,
    queue: CourtQueue,
    current: Option<MatchStateMachine>,
    on_court: Vec<Team>,
    resting: Vec<RestingTeam>,
    archive: VecDeque<Match>,
    court: CourtState,
    revisions: Revisions,
}

impl Authority {
    /// Build an empty authority.
    pub fn new(settings: AuthoritySettings) -> Self {
        Self {
            queue: CourtQueue::new(settings.queue_capacity),
            court: CourtState::new(settings.court_open, settings.court_mode),
            current: None,
            on_court: Vec::new(),
            resting: Vec::new(),
            archive: VecDeque::new(),
            revisions: Revisions::default(),
            settings,
        }
    }

    /// Admit a team at the tail of the queue.
    pub fn join_queue(
        &mut self,
        request: NewTeam,
        now: OffsetDateTime,
    ) -> Result<(Admission, Vec<Delta>), ServiceError> {
        if !self.court.is_open {
            return Err(ServiceError::CourtClosed);
        }

        let name = request.name.trim().to_owned();
        if name.is_empty() {
            return Err(ServiceError::InvalidInput(
                "team name must not be empty".into(),
            ));
        }
        if self.name_taken(&name) {
            return Err(ServiceError::TeamNameExists(name));
        }

        let team = Team::new(name, request.members, request.contact_info, now);
        let position = self.queue.admit(team.clone())?;
        info!(team_id = %team.id, team = %team.name, position, "team joined queue");

        let mut deltas = Vec::new();
        self.push_queue(QueueEventKind::TeamJoined, vec![(&team).into()], &mut deltas);
        self.auto_start(now, &mut deltas);

        Ok((Admission { team, position }, deltas))
    }

    /// Withdraw a waiting or resting team on its own request.
    pub fn leave_queue(
        &mut self,
        team_id: Uuid,
    ) -> Result<(Team, Vec<Delta>), ServiceError> {
        let team = self.remove_team(team_id)?;
        info!(team_id = %team.id, team = %team.name, "team left queue");

        let mut deltas = Vec::new();
        self.push_queue(QueueEventKind::TeamRemoved, vec![(&team).into()], &mut deltas);
        Ok((team, deltas))
    }

    /// Remove a waiting or resting team on behalf of an admin.
    pub fn evict(
        &mut self,
        team_id: Uuid,
        actor: &str,
    ) -> Result<(Team, Vec<Delta>), ServiceError> {
        let team = self.remove_team(team_id)?;
        info!(team_id = %team.id, team = %team.name, actor, "team evicted");

        let mut deltas = Vec::new();
        self.push_queue(QueueEventKind::TeamEvicted, vec![(&team).into()], &mut deltas);
        Ok((team, deltas))
    }

    /// Start the next match now, regardless of the auto-start setting.
    pub fn promote(&mut self, now: OffsetDateTime) -> Result<(Match, Vec<Delta>), ServiceError> {
        let mut deltas = Vec::new();
        let record = self.start_next(now, &mut deltas)?;
        Ok((record, deltas))
    }

    /// Adjust one side's score of the current match.
    pub fn update_score(
        &mut self,
        match_id: Uuid,
        side: Side,
        delta: i32,
        now: OffsetDateTime,
    ) -> Result<(Match, Vec<Delta>), ServiceError> {
        let machine = self.current_mut(match_id)?;
        let kind = machine.apply(MatchInput::Score { side, delta }, now)?;
        let record = machine.record().clone();

        let mut deltas = Vec::new();
        if let Some(kind) = kind {
            debug!(match_id = %record.id, score1 = record.score1, score2 = record.score2, "score updated");
            self.push_match(kind, record.clone(), &mut deltas);
        }
        Ok((record, deltas))
    }

    /// Record a team's acknowledgement (or rejection) of the current result.
    pub fn confirm_result(
        &mut self,
        match_id: Uuid,
        team_id: Uuid,
        confirmed: bool,
        final_score: Option<FinalScore>,
        now: OffsetDateTime,
    ) -> Result<(Match, Vec<Delta>), ServiceError> {
        let machine = self.current_mut(match_id)?;
        let kind = machine.apply(
            MatchInput::Confirm {
                team_id,
                confirmed,
                final_score,
            },
            now,
        )?;
        let record = machine.record().clone();

        if let Some(team) = self.on_court.iter_mut().find(|team| team.id == team_id) {
            team.last_seen = now;
        }

        let mut deltas = Vec::new();
        if let Some(kind) = kind {
            info!(match_id = %record.id, %team_id, confirmed, status = %record.status, "confirmation received");
            self.push_match(kind, record.clone(), &mut deltas);
            self.release_court(now, &mut deltas);
            self.auto_start(now, &mut deltas);
        }
        Ok((record, deltas))
    }

    /// Resolve the current match or an archived one by admin decision.
    pub fn force_resolve(
        &mut self,
        match_id: Uuid,
        actor: String,
        final_score: Option<FinalScore>,
        now: OffsetDateTime,
    ) -> Result<(Match, Vec<Delta>), ServiceError> {
        let input = MatchInput::ForceResolve {
            actor: actor.clone(),
            final_score,
        };
        let mut deltas = Vec::new();

        let is_current = self
            .current
            .as_ref()
            .is_some_and(|machine| machine.record().id == match_id);

        let (previous_winner, kind, record) = if is_current {
            let machine = self.current_mut(match_id)?;
            let previous_winner = machine.record().winner_id;
            let kind = machine.apply(input, now)?;
            (previous_winner, kind, machine.record().clone())
        } else {
            let index = self
                .archive
                .iter()
                .position(|record| record.id == match_id)
                .ok_or(ServiceError::MatchNotFound(match_id))?;
            let archived = self.archive[index].clone();
            let previous_winner = archived.winner_id;
            let mut machine = MatchStateMachine::resume(
                archived,
                self.settings.confirmation_window,
                self.settings.dispute_policy,
            );
            let kind = machine.apply(input, now)?;
            let record = machine.into_record();
            self.archive[index] = record.clone();
            (previous_winner, kind, record)
        };

        info!(match_id = %record.id, actor = %actor, winner = ?record.winner_id, "match force-resolved");
        if let Some(kind) = kind {
            self.push_match(kind, record.clone(), &mut deltas);
        }

        if is_current && !self.on_court.is_empty() {
            self.release_court(now, &mut deltas);
        } else if previous_winner != record.winner_id {
            if let Some(previous) = previous_winner {
                self.adjust_wins(previous, |wins| wins.saturating_sub(1));
            }
            if let Some(winner) = record.winner_id {
                self.adjust_wins(winner, |wins| wins.saturating_add(1));
            }
        }
        self.auto_start(now, &mut deltas);

        Ok((record, deltas))
    }

    /// Open or close the court, or switch its mode.
    pub fn set_court(
        &mut self,
        is_open: Option<bool>,
        mode: Option<CourtMode>,
        now: OffsetDateTime,
    ) -> (CourtSnapshot, Vec<Delta>) {
        let mut deltas = Vec::new();
        let mut changed = false;

        if let Some(is_open) = is_open.filter(|open| *open != self.court.is_open) {
            self.court.is_open = is_open;
            changed = true;
        }
        if let Some(mode) = mode.filter(|mode| *mode != self.court.mode) {
            self.court.mode = mode;
            changed = true;
        }

        if changed {
            info!(is_open = self.court.is_open, mode = ?self.court.mode, "court settings updated");
            self.push_court(&mut deltas);
            self.auto_start(now, &mut deltas);
        }
        (self.court_snapshot(), deltas)
    }

    /// Timer sweep: confirmation deadlines, court cooldown, resting teams, auto-start.
    pub fn tick(&mut self, now: OffsetDateTime) -> Vec<Delta> {
        let mut deltas = Vec::new();

        let expired = match self.current.as_mut() {
            Some(machine) if machine.is_expired(now) => match machine.apply(MatchInput::Expire, now) {
                Ok(kind) => kind.map(|kind| (kind, machine.record().clone())),
                Err(err) => {
                    warn!(error = %err, "failed to expire match");
                    None
                }
            },
            _ => None,
        };
        if let Some((kind, record)) = expired {
            info!(match_id = %record.id, winner = ?record.winner_id, "confirmation window elapsed");
            self.push_match(kind, record, &mut deltas);
            self.release_court(now, &mut deltas);
        }

        if self.court.cooldown_end.is_some() && !self.court.in_cooldown(now) {
            self.court.cooldown_end = None;
            debug!("court cooldown ended");
            self.push_court(&mut deltas);
        }

        self.return_rested(now, &mut deltas);
        self.auto_start(now, &mut deltas);
        deltas
    }

    /// Current queue and its revision.
    pub fn queue_snapshot(&self) -> (QueueView, u64) {
        (self.queue.view(), self.revisions.queue)
    }

    /// Match on (or last on) the court and the match revision.
    pub fn current_match(&self) -> (Option<Match>, u64) {
        (
            self.current.as_ref().map(|machine| machine.record().clone()),
            self.revisions.matches,
        )
    }

    /// Court state and its revision.
    pub fn court_snapshot(&self) -> CourtSnapshot {
        CourtSnapshot {
            court: self.court.clone(),
            active_matches: usize::from(self.has_active_match()),
            revision: self.revisions.court,
        }
    }

    /// Finished matches, newest first.
    pub fn history(&self) -> Vec<Match> {
        let finished_current = self
            .current
            .as_ref()
            .filter(|machine| machine.is_terminal())
            .map(|machine| machine.record().clone());
        finished_current
            .into_iter()
            .chain(self.archive.iter().rev().cloned())
            .collect()
    }

    /// Look up any active team, whatever its status.
    pub fn team(&self, team_id: &Uuid) -> Option<&Team> {
        self.queue
            .get(team_id)
            .or_else(|| self.on_court.iter().find(|team| team.id == *team_id))
            .or_else(|| {
                self.resting
                    .iter()
                    .map(|resting| &resting.team)
                    .find(|team| team.id == *team_id)
            })
    }

    /// Whether a non-terminal match occupies the court.
    pub fn has_active_match(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|machine| !machine.is_terminal())
    }

    fn name_taken(&self, name: &str) -> bool {
        let key = normalize_name(name);
        self.queue.contains_name(name)
            || self.on_court.iter().any(|team| team.name_key() == key)
            || self.resting.iter().any(|resting| resting.team.name_key() == key)
    }

    fn current_mut(&mut self, match_id: Uuid) -> Result<&mut MatchStateMachine, ServiceError> {
        self.current
            .as_mut()
            .filter(|machine| machine.record().id == match_id)
            .ok_or(ServiceError::MatchNotFound(match_id))
    }

    fn remove_team(&mut self, team_id: Uuid) -> Result<Team, ServiceError> {
        if self.on_court.iter().any(|team| team.id == team_id) {
            return Err(ServiceError::InvalidState(
                "team is on court and cannot leave before the match ends".into(),
            ));
        }
        match self.queue.withdraw(&team_id) {
            Ok(team) => Ok(team),
            Err(err) => {
                let index = self
                    .resting
                    .iter()
                    .position(|resting| resting.team.id == team_id)
                    .ok_or(err)?;
                Ok(self.resting.remove(index).team)
            }
        }
    }

    fn auto_start(&mut self, now: OffsetDateTime, deltas: &mut Vec<Delta>) {
        if !self.settings.auto_start {
            return;
        }
        if let Err(err) = self.start_next(now, deltas) {
            debug!(reason = %err, "next match not started");
        }
    }

    fn start_next(
        &mut self,
        now: OffsetDateTime,
        deltas: &mut Vec<Delta>,
    ) -> Result<Match, ServiceError> {
        if !self.court.is_open {
            return Err(ServiceError::CourtClosed);
        }
        if self.has_active_match() {
            return Err(ServiceError::InvalidState(
                "a match is already in progress".into(),
            ));
        }
        if self.court.in_cooldown(now) {
            return Err(ServiceError::InvalidState("court is cooling down".into()));
        }
        let (first, second) = self.queue.promote_two().ok_or_else(|| {
            ServiceError::InvalidState("at least two teams must be waiting".into())
        })?;

        let machine = MatchStateMachine::start(
            &first,
            &second,
            self.settings.target_score,
            self.court.mode,
            self.settings.confirmation_window,
            self.settings.dispute_policy,
            now,
        );
        let record = machine.record().clone();
        if let Some(previous) = self.current.replace(machine) {
            self.archive(previous.into_record());
        }

        info!(match_id = %record.id, team1 = %first.name, team2 = %second.name, "match started");
        let refs = vec![TeamRef::from(&first), TeamRef::from(&second)];
        self.on_court = vec![first, second];

        self.push_queue(QueueEventKind::TeamPromoted, refs, deltas);
        self.push_match(MatchEventKind::MatchStarted, record.clone(), deltas);
        self.push_court(deltas);
        Ok(record)
    }

    /// Hand the court back once the current match is terminal.
    fn release_court(&mut self, now: OffsetDateTime, deltas: &mut Vec<Delta>) {
        let Some(record) = self
            .current
            .as_ref()
            .filter(|machine| machine.is_terminal())
            .map(|machine| machine.record().clone())
        else {
            return;
        };
        if self.on_court.is_empty() {
            return;
        }

        let champion_return =
            record.match_type == CourtMode::ChampionReturn && record.status != MatchStatus::Disputed;
        let mut teams = std::mem::take(&mut self.on_court);
        teams.sort_by_key(|team| Some(team.id) != record.winner_id);

        let mut returning = Vec::new();
        for mut team in teams {
            let won = record.winner_id == Some(team.id);
            if won {
                team.wins = team.wins.saturating_add(1);
            }
            team.last_seen = now;

            if (champion_return && won) || self.settings.team_cooldown.is_zero() {
                returning.push(team);
            } else {
                team.status = TeamStatus::Cooldown;
                self.resting.push(RestingTeam {
                    team,
                    until: now + self.settings.team_cooldown,
                });
            }
        }
        self.return_teams(returning, now, deltas);

        if !self.settings.court_cooldown.is_zero() {
            self.court.cooldown_end = Some(now + self.settings.court_cooldown);
        }
        self.push_court(deltas);
    }

    fn return_rested(&mut self, now: OffsetDateTime, deltas: &mut Vec<Delta>) {
        let mut returning = Vec::new();
        let mut index = 0;
        while index < self.resting.len() {
            let due = self.resting[index].until <= now;
            if due && returning.len() < self.queue.available_slots() {
                returning.push(self.resting.remove(index).team);
            } else {
                index += 1;
            }
        }
        self.return_teams(returning, now, deltas);
    }

    /// Put teams back at the tail; anything that does not fit keeps resting.
    fn return_teams(&mut self, teams: Vec<Team>, now: OffsetDateTime, deltas: &mut Vec<Delta>) {
        let mut returned = Vec::new();
        for mut team in teams {
            if self.queue.available_slots() == 0 {
                team.status = TeamStatus::Cooldown;
                self.resting.push(RestingTeam { team, until: now });
                continue;
            }
            team.joined_at = now;
            let team_ref = TeamRef::from(&team);
            match self.queue.admit(team.clone()) {
                Ok(_) => returned.push(team_ref),
                Err(err) => {
                    warn!(team_id = %team.id, error = %err, "team could not return to queue");
                    team.status = TeamStatus::Cooldown;
                    self.resting.push(RestingTeam { team, until: now });
                }
            }
        }

        if !returned.is_empty() {
            debug!(count = returned.len(), "teams returned to queue");
            self.push_queue(QueueEventKind::TeamReturned, returned, deltas);
        }
    }

    fn adjust_wins(&mut self, team_id: Uuid, update: impl Fn(u32) -> u32) {
        let team = match self.queue.get_mut(&team_id) {
            Some(team) => Some(team),
            None => self
                .on_court
                .iter_mut()
                .chain(self.resting.iter_mut().map(|resting| &mut resting.team))
                .find(|team| team.id == team_id),
        };
        if let Some(team) = team {
            team.wins = update(team.wins);
        }
    }

    fn archive(&mut self, record: Match) {
        self.archive.push_back(record);
        while self.archive.len() > self.settings.archive_limit {
            self.archive.pop_front();
        }
    }

    fn push_queue(&mut self, kind: QueueEventKind, teams: Vec<TeamRef>, deltas: &mut Vec<Delta>) {
        self.revisions.queue += 1;
        deltas.push(Delta::Queue(QueueDelta {
            kind,
            revision: self.revisions.queue,
            view: self.queue.view(),
            teams,
        }));
    }

    fn push_match(&mut self, kind: MatchEventKind, record: Match, deltas: &mut Vec<Delta>) {
        self.revisions.matches += 1;
        let archived = self
            .current
            .as_ref()
            .is_none_or(|machine| machine.record().id != record.id);
        deltas.push(Delta::Match(MatchDelta {
            kind,
            revision: self.revisions.matches,
            record,
            archived,
        }));
    }

    fn push_court(&mut self, deltas: &mut Vec<Delta>) {
        self.revisions.court += 1;
        deltas.push(Delta::Court(self.court_snapshot()));
    }
}
