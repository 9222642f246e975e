use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::{
    dto::{
        common::{Notification, NotificationType},
        court::CourtStatusPayload,
        matches::MatchUpdatedEvent,
        ws::{Room, ServerMessage},
    },
    state::{
        AppState, RoomFrame,
        authority::{Delta, MatchDelta, QueueDelta},
        match_machine::{Match, MatchEventKind},
        queue::QueueEventKind,
    },
};

const NOTIFICATION_DURATION_MS: u64 = 5_000;

/// Turn authority deltas into room broadcasts, in order.
pub fn publish_deltas(state: &AppState, deltas: Vec<Delta>, now: OffsetDateTime) {
    for delta in deltas {
        match delta {
            Delta::Queue(delta) => broadcast_queue_updated(state, delta, now),
            Delta::Match(delta) => broadcast_match_updated(state, delta, now),
            Delta::Court(snapshot) => {
                let config = state.config();
                let payload = CourtStatusPayload::from_snapshot(snapshot, now, &config.timezone);
                send_public_event(state, &ServerMessage::CourtStatus(payload.clone()));
                send_admin_event(state, &ServerMessage::CourtStatus(payload));
            }
        }
    }
}

/// Broadcast a queue change to both rooms.
fn broadcast_queue_updated(state: &AppState, delta: QueueDelta, now: OffsetDateTime) {
    let evicted = (delta.kind == QueueEventKind::TeamEvicted).then(|| {
        delta
            .teams
            .iter()
            .map(|team| team.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    });

    let event = ServerMessage::QueueUpdated(delta.into());
    send_public_event(state, &event);
    send_admin_event(state, &event);

    if let Some(names) = evicted {
        let note = Notification::new(
            NotificationType::Info,
            "Team evicted",
            format!("{names} removed from the queue"),
            now,
        );
        send_admin_event(state, &ServerMessage::Notification(note));
    }
}

/// Broadcast a match transition, plus the notifications it warrants.
fn broadcast_match_updated(state: &AppState, delta: MatchDelta, now: OffsetDateTime) {
    let public_note = public_notification(delta.kind, &delta.record, now);
    let admin_note = (delta.kind == MatchEventKind::MatchDisputed).then(|| {
        Notification::new(
            NotificationType::Warning,
            "Dispute needs review",
            format!(
                "{} vs {} ({}) was disputed; force-resolve it to settle the result",
                delta.record.team1.name, delta.record.team2.name, delta.record.id
            ),
            now,
        )
    });

    let event = ServerMessage::MatchUpdated(MatchUpdatedEvent::from(delta));
    send_public_event(state, &event);
    send_admin_event(state, &event);

    if let Some(note) = public_note {
        send_public_event(state, &ServerMessage::Notification(note));
    }
    if let Some(note) = admin_note {
        send_admin_event(state, &ServerMessage::Notification(note));
    }
}

fn public_notification(
    kind: MatchEventKind,
    record: &Match,
    now: OffsetDateTime,
) -> Option<Notification> {
    let (t1, t2) = (&record.team1.name, &record.team2.name);
    let score = format!("{t1} {} - {} {t2}", record.score1, record.score2);
    let winner = record.winner_id.map(|id| {
        if id == record.team1.id { t1 } else { t2 }
    });

    let (kind, title, message) = match kind {
        MatchEventKind::MatchStarted => (
            NotificationType::Info,
            "Match started",
            format!("{t1} vs {t2}, first to {}", record.target_score),
        ),
        MatchEventKind::MatchEnded => (
            NotificationType::Info,
            "Confirm the result",
            format!("{score}. Both teams must confirm."),
        ),
        MatchEventKind::MatchCompleted => (
            NotificationType::Success,
            "Match completed",
            match winner {
                Some(winner) => format!("{winner} wins ({score})"),
                None => format!("Tie ({score})"),
            },
        ),
        MatchEventKind::MatchTimeoutResolved => (
            NotificationType::Warning,
            "Result recorded after timeout",
            format!("Confirmation window elapsed; recorded {score}"),
        ),
        MatchEventKind::MatchForceResolved => (
            NotificationType::Info,
            "Result set by staff",
            format!(
                "{} recorded {score}",
                record.resolved_by.as_deref().unwrap_or("An admin")
            ),
        ),
        MatchEventKind::MatchDisputed => (
            NotificationType::Warning,
            "Result disputed",
            format!("{t1} and {t2} disagree on the result; staff will resolve it"),
        ),
        MatchEventKind::ScoreUpdated | MatchEventKind::ConfirmationReceived => return None,
    };

    Some(Notification::new(kind, title, message, now).with_duration(NOTIFICATION_DURATION_MS))
}

/// Serialize a server message once into a room frame.
pub fn to_frame(message: &ServerMessage) -> Option<RoomFrame> {
    match serde_json::to_string(message) {
        Ok(text) => Some(RoomFrame {
            event: message.event_name(),
            text: Arc::from(text),
        }),
        Err(err) => {
            warn!(event = message.event_name(), error = %err, "failed to serialize realtime payload");
            None
        }
    }
}

fn send_public_event(state: &AppState, message: &ServerMessage) {
    send_room_event(state, Room::Public, message);
}

fn send_admin_event(state: &AppState, message: &ServerMessage) {
    send_room_event(state, Room::Admin, message);
}

fn send_room_event(state: &AppState, room: Room, message: &ServerMessage) {
    if let Some(frame) = to_frame(message) {
        debug!(%room, event = frame.event, "broadcasting");
        state.rooms().broadcast(room, frame);
    }
}
