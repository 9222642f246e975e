use std::{future::Future, net::SocketAddr, time::Duration};

use court_queue::{
    client::{ConnectionConfig, CourtClient, Mirror},
    config::AppConfig,
    dto::ws::JoinQueueRequest,
    error::ErrorCode,
    routes,
    services::clock_supervisor,
    state::{AppState, court::CourtMode, match_machine::MatchStatus},
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{net::TcpListener, time::timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn spawn_server(config: AppConfig) -> SocketAddr {
    let state = AppState::new(config);
    clock_supervisor::spawn(state.clone());
    let app = routes::router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn within<T>(future: impl Future<Output = T>) -> T {
    timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out waiting for the server")
}

fn client_for(addr: SocketAddr) -> CourtClient {
    CourtClient::start(ConnectionConfig::new(format!("http://{addr}")).with_auto_connect(true))
        .unwrap()
}

fn join(name: &str) -> JoinQueueRequest {
    JoinQueueRequest {
        team_name: name.into(),
        members: 4,
        contact_info: None,
    }
}

async fn wait_connected(client: &CourtClient, epoch: u64) {
    let mut status = client.watch_status();
    within(status.wait_for(|status| status.connected && status.epoch == epoch))
        .await
        .unwrap();
}

#[tokio::test]
async fn stores_follow_admissions_and_promotion() {
    let addr = spawn_server(AppConfig {
        target_score: 3,
        ..AppConfig::default()
    })
    .await;
    let client = client_for(addr);
    wait_connected(&client, 1).await;

    client.join_queue(join("Alpha")).unwrap();
    let queue = within(client.queue().wait_for(|synced| synced.value.teams().len() == 1))
        .await
        .unwrap();
    assert_eq!(queue.value.teams()[0].name, "Alpha");
    assert_eq!(queue.value.teams()[0].position, Some(1));

    client.join_queue(join("Beta")).unwrap();
    let current = within(client.current_match().wait_for(|synced| synced.value.is_live()))
        .await
        .unwrap();
    let live = current.value.current.unwrap();
    assert_eq!(live.team1.name, "Alpha");
    assert_eq!(live.team2.name, "Beta");
    assert_eq!(live.status, MatchStatus::Active);

    let queue = within(client.queue().wait_for(|synced| {
        synced.value.teams().is_empty() && synced.value.revision() > queue.value.revision()
    }))
    .await
    .unwrap();
    assert_eq!(queue.value.snapshot.total_teams, 0);

    let court = within(client.court().wait_for(|synced| synced.value.active_matches() == 1))
        .await
        .unwrap();
    assert!(court.value.is_open());
    assert!(court.value.is_regular_mode());

    // The name is still held by a team on court.
    client.join_queue(join("Alpha")).unwrap();
    let rejected = within(client.queue().wait_for(|synced| synced.error.is_some()))
        .await
        .unwrap();
    assert_eq!(rejected.error.unwrap().code, ErrorCode::TeamNameExists);
    assert!(client.current_match().get().error.is_none());
}

#[tokio::test]
async fn reconnect_converges_on_changes_missed_while_offline() {
    let addr = spawn_server(AppConfig {
        auto_start: false,
        ..AppConfig::default()
    })
    .await;
    let client = client_for(addr);
    wait_connected(&client, 1).await;

    client.join_queue(join("Gamma")).unwrap();
    let queue = within(client.queue().wait_for(|synced| synced.value.teams().len() == 1))
        .await
        .unwrap();
    let gamma = queue.value.teams()[0].id;

    client.disconnect();
    let mut status = client.watch_status();
    within(status.wait_for(|status| !status.connected)).await.unwrap();

    let http = reqwest::Client::new();
    let evicted = http
        .delete(format!("http://{addr}/api/admin/queue/{gamma}"))
        .send()
        .await
        .unwrap();
    assert!(evicted.status().is_success());
    let court = http
        .put(format!("http://{addr}/api/admin/court"))
        .json(&json!({ "mode": "champion-return" }))
        .send()
        .await
        .unwrap();
    assert!(court.status().is_success());

    // Offline: nothing moved locally.
    assert_eq!(client.queue().value().position_of(gamma), Some(1));
    assert!(client.court().value().is_regular_mode());

    client.connect();
    wait_connected(&client, 2).await;

    within(client.queue().wait_for(|synced| !synced.syncing && synced.value.teams().is_empty()))
        .await
        .unwrap();
    within(client.court().wait_for(|synced| synced.value.mode() == Some(CourtMode::ChampionReturn)))
        .await
        .unwrap();
}

#[tokio::test]
async fn public_room_fans_out_to_every_socket() {
    let addr = spawn_server(AppConfig::default()).await;
    let url = format!("ws://{addr}/ws");
    let (mut actor, _) = connect_async(url.as_str()).await.unwrap();
    let (mut observer, _) = connect_async(url.as_str()).await.unwrap();

    let request = json!({
        "event": "join-queue",
        "data": { "teamName": "Delta", "members": 3 }
    });
    actor
        .send(Message::Text(request.to_string().into()))
        .await
        .unwrap();

    let ack = within(next_event(&mut actor, "joined-queue")).await;
    assert_eq!(ack["teamName"], "Delta");
    assert_eq!(ack["position"], 1);

    let update = within(next_event(&mut observer, "queue-updated")).await;
    assert_eq!(update["kind"], "team_joined");
    assert_eq!(update["teams"][0]["name"], "Delta");

    let snapshot: Value = reqwest::get(format!("http://{addr}/api/queue"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["success"], true);
    assert_eq!(snapshot["data"]["revision"], update["revision"]);
}

async fn next_event<S>(socket: &mut S, event: &str) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = socket.next().await {
        if let Message::Text(text) = frame.unwrap() {
            let value: Value = serde_json::from_str(&text).unwrap();
            if value["event"] == event {
                return value["data"].clone();
            }
        }
    }
    panic!("socket closed before `{event}` arrived");
}
