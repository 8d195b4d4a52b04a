// Room lifecycle over the real wire: create/join/ready/start, error
// surfaces, host migration and lobby discovery, driven through the session
// client.

mod support;

use protocol::{RoomError, RoomMode, RoomStatus};
use relay_server::domain::{CODE_ALPHABET, CODE_LEN};
use session_client::{ClientError, SessionClient, SessionConfig};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const EVENT_WAIT: Duration = Duration::from_secs(5);

fn client() -> SessionClient {
    SessionClient::new(SessionConfig::new(support::ws_url()))
}

fn assert_rejected(err: ClientError, expected: RoomError) {
    match err {
        ClientError::Rejected(actual) => assert_eq!(actual, expected),
        other => panic!("expected rejection {expected:?}, got {other}"),
    }
}

#[tokio::test]
async fn full_1v1_flow_from_create_to_game_start() {
    let host = client();
    let guest = client();

    let (host_start_tx, mut host_start_rx) = mpsc::unbounded_channel();
    host.on_game_start(move |room| {
        let _ = host_start_tx.send(room.clone());
    });
    let (guest_start_tx, mut guest_start_rx) = mpsc::unbounded_channel();
    guest.on_game_start(move |room| {
        let _ = guest_start_tx.send(room.clone());
    });

    let created = host
        .create_room(RoomMode::OneVsOne, "Ada")
        .await
        .expect("create should succeed");
    assert_eq!(created.room_code.len(), CODE_LEN);
    assert!(
        created
            .room_code
            .bytes()
            .all(|b| CODE_ALPHABET.contains(&b))
    );
    assert!(host.is_host());
    assert_eq!(host.team(), 1);

    let joined = guest
        .join_room(&created.room_code, "Bo")
        .await
        .expect("join should succeed");
    assert_eq!(joined.team, 2);
    assert_eq!(joined.room.players.len(), 2);
    assert!(!guest.is_host());

    assert!(guest.toggle_ready().await.expect("toggle should ack"));
    host.start_game().await.expect("start should succeed");

    let host_room = timeout(EVENT_WAIT, host_start_rx.recv())
        .await
        .expect("host should see game start")
        .expect("channel open");
    assert_eq!(host_room.status, RoomStatus::Playing);

    let guest_room = timeout(EVENT_WAIT, guest_start_rx.recv())
        .await
        .expect("guest should see game start")
        .expect("channel open");
    assert_eq!(guest_room.status, RoomStatus::Playing);
}

#[tokio::test]
async fn join_errors_surface_to_the_caller() {
    let host = client();
    let created = host
        .create_room(RoomMode::OneVsOne, "Ada")
        .await
        .expect("create should succeed");

    // Unknown code.
    let lost = client();
    assert_rejected(
        lost.join_room("ZZZZZZ", "Eve").await.unwrap_err(),
        RoomError::NotFound,
    );

    // Fill the 1v1, then a third join must fail.
    let guest = client();
    guest
        .join_room(&created.room_code, "Bo")
        .await
        .expect("second seat should be free");
    let third = client();
    assert_rejected(
        third.join_room(&created.room_code, "Cy").await.unwrap_err(),
        RoomError::Full,
    );

    // Start the game; a freed seat is still unjoinable afterwards.
    guest.toggle_ready().await.expect("toggle should ack");
    host.start_game().await.expect("start should succeed");
    guest.leave_room().await;
    // Leaving is fire-and-forget; give the relay a beat to process it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_rejected(
        third.join_room(&created.room_code, "Cy").await.unwrap_err(),
        RoomError::AlreadyStarted,
    );
}

#[tokio::test]
async fn start_game_requires_ready_guests_and_a_host() {
    let host = client();
    let created = host
        .create_room(RoomMode::OneVsOne, "Ada")
        .await
        .expect("create should succeed");
    assert_rejected(
        host.start_game().await.unwrap_err(),
        RoomError::NotEnoughPlayers,
    );

    let guest = client();
    guest
        .join_room(&created.room_code, "Bo")
        .await
        .expect("join should succeed");
    assert_rejected(host.start_game().await.unwrap_err(), RoomError::NotAllReady);
    assert_rejected(guest.start_game().await.unwrap_err(), RoomError::NotHost);

    guest.toggle_ready().await.expect("toggle should ack");
    host.start_game().await.expect("start should now succeed");
}

#[tokio::test]
async fn host_leaving_promotes_the_remaining_player() {
    let host = client();
    let guest = client();

    let created = host
        .create_room(RoomMode::OneVsOne, "Ada")
        .await
        .expect("create should succeed");
    guest
        .join_room(&created.room_code, "Bo")
        .await
        .expect("join should succeed");

    let (migrated_tx, mut migrated_rx) = mpsc::unbounded_channel();
    guest.on_host_changed(move |new_host_id| {
        let _ = migrated_tx.send(*new_host_id);
    });

    host.leave_room().await;

    let new_host_id = timeout(EVENT_WAIT, migrated_rx.recv())
        .await
        .expect("guest should hear about migration")
        .expect("channel open");
    assert_eq!(Some(new_host_id), guest.conn_id());
    assert!(guest.is_host());
}

#[tokio::test]
async fn leaving_empties_and_deletes_the_room() {
    let host = client();
    let created = host
        .create_room(RoomMode::OneVsOne, "Ada")
        .await
        .expect("create should succeed");

    host.leave_room().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let late = client();
    assert_rejected(
        late.join_room(&created.room_code, "Bo").await.unwrap_err(),
        RoomError::NotFound,
    );
}

#[tokio::test]
async fn public_lobbies_are_discoverable_and_password_protected() {
    let lobby_name = format!("duel-{}", uuid::Uuid::new_v4());

    let host = client();
    let created = host
        .create_lobby(&lobby_name, "Ada", true, Some("hunter2"))
        .await
        .expect("create lobby should succeed");

    let browser = client();
    let lobbies = browser.get_lobbies().await.expect("listing should ack");
    let entry = lobbies
        .iter()
        .find(|l| l.code == created.room_code)
        .expect("our lobby should be listed");
    assert_eq!(entry.room_name, lobby_name);
    assert_eq!(entry.host_name, "Ada");
    assert!(entry.has_password);
    assert_eq!(entry.players, 1);

    assert_rejected(
        browser
            .join_lobby(&created.room_code, "Bo", Some("wrong"))
            .await
            .unwrap_err(),
        RoomError::BadPassword,
    );
    browser
        .join_lobby(&created.room_code, "Bo", Some("hunter2"))
        .await
        .expect("correct password should join");

    let count = browser.get_player_count().await.expect("count should ack");
    assert!(count >= 2);
}
