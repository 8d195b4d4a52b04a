// Host/guest state synchronization over the real wire: discrete events,
// periodic snapshots, snapshot-driven removal and the terminal game-over
// path.

mod support;

use protocol::{BuildingKind, RoomMode, UnitKind};
use session_client::{GameOverNotice, SessionClient, SessionConfig};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;

const EVENT_WAIT: Duration = Duration::from_secs(5);

fn client() -> SessionClient {
    SessionClient::new(SessionConfig::new(support::ws_url()))
}

/// Creates a 1v1 match with both sides in `playing`. Host is team 1,
/// guest team 2.
async fn start_match(host: &SessionClient, guest: &SessionClient) {
    let (host_start_tx, mut host_start_rx) = mpsc::unbounded_channel();
    host.on_game_start(move |_| {
        let _ = host_start_tx.send(());
    });
    let (guest_start_tx, mut guest_start_rx) = mpsc::unbounded_channel();
    guest.on_game_start(move |_| {
        let _ = guest_start_tx.send(());
    });

    let created = host
        .create_room(RoomMode::OneVsOne, "Ada")
        .await
        .expect("create should succeed");
    guest
        .join_room(&created.room_code, "Bo")
        .await
        .expect("join should succeed");
    guest.toggle_ready().await.expect("toggle should ack");
    host.start_game().await.expect("start should succeed");

    timeout(EVENT_WAIT, host_start_rx.recv())
        .await
        .expect("host should see game start");
    timeout(EVENT_WAIT, guest_start_rx.recv())
        .await
        .expect("guest should see game start");
}

/// Polls until `check` passes or the deadline hits.
async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + EVENT_WAIT;
    while Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn discrete_building_event_materializes_mirrored_on_the_guest() {
    let host = client();
    let guest = client();
    start_match(&host, &guest).await;

    let (building_tx, mut building_rx) = mpsc::unbounded_channel();
    guest.on_building_received(move |dto| {
        let _ = building_tx.send(dto.clone());
    });

    // Host is team 1, so its local x is already world-frame.
    let id = host
        .place_building(BuildingKind::Barracks, 4.0, 3.0, 200, 200)
        .expect("placement should send");

    let dto = timeout(EVENT_WAIT, building_rx.recv())
        .await
        .expect("guest should receive the building")
        .expect("channel open");
    assert_eq!(dto.id, id);
    assert_eq!(dto.sender_team, 1);
    assert_eq!(dto.x, 4.0);

    // Guest is team 2: local frame mirrors world x (cols 30 -> 29 - 4).
    let world = guest.world();
    wait_until("building in guest world", || {
        world.lock().unwrap().building(&id).is_some()
    })
    .await;
    let guard = world.lock().unwrap();
    let building = guard.building(&id).expect("present");
    assert_eq!(building.x, 25.0);
    assert_eq!(building.y, 3.0);
    assert!(!building.controlled);
}

#[tokio::test]
async fn snapshots_carry_units_and_absence_removes_them() {
    let host = client();
    let guest = client();
    start_match(&host, &guest).await;

    let unit_id = host
        .spawn_unit(UnitKind::Knight, 3.0, 4.0, 100, 100)
        .expect("spawn should send");

    // The periodic snapshot must carry it even if the discrete event is
    // how it first arrived; position updates flow through snapshots.
    {
        let world = host.world();
        let mut guard = world.lock().unwrap();
        let unit = guard.unit_mut(&unit_id).expect("host owns the unit");
        unit.x = 7.0;
        unit.hp = 64;
    }

    let guest_world = guest.world();
    wait_until("guest unit caught up with the host", || {
        let guard = guest_world.lock().unwrap();
        guard
            .unit(&unit_id)
            .is_some_and(|u| u.hp == 64 && u.x == 22.0)
    })
    .await;

    // Kill it host-side: it drops out of the snapshot and the guest prunes it.
    {
        let world = host.world();
        let mut guard = world.lock().unwrap();
        guard.unit_mut(&unit_id).expect("still host-side").alive = false;
    }
    wait_until("guest pruned the dead unit", || {
        guest_world.lock().unwrap().unit(&unit_id).is_none()
    })
    .await;
}

#[tokio::test]
async fn castle_fall_ends_the_match_for_both_sides() {
    let host = client();
    let guest = client();
    start_match(&host, &guest).await;

    let (host_over_tx, mut host_over_rx) = mpsc::unbounded_channel::<GameOverNotice>();
    host.on_game_over(move |notice| {
        let _ = host_over_tx.send(*notice);
    });
    let (guest_over_tx, mut guest_over_rx) = mpsc::unbounded_channel::<GameOverNotice>();
    guest.on_game_over(move |notice| {
        let _ = guest_over_tx.send(*notice);
    });

    // The host's own castle falls; the guest's team must be announced.
    {
        let world = host.world();
        let mut guard = world.lock().unwrap();
        guard.player_castle.hp = 0;
        guard.player_castle.alive = false;
    }

    let guest_notice = timeout(EVENT_WAIT, guest_over_rx.recv())
        .await
        .expect("guest should hear game over")
        .expect("channel open");
    assert_eq!(guest_notice.winner, 2);
    assert!(guest_notice.is_player_win);

    let host_notice = timeout(EVENT_WAIT, host_over_rx.recv())
        .await
        .expect("host should hear game over")
        .expect("channel open");
    assert_eq!(host_notice.winner, 2);
    assert!(!host_notice.is_player_win);
}

#[tokio::test]
async fn castle_damage_echoes_to_every_member() {
    let host = client();
    let guest = client();
    start_match(&host, &guest).await;

    let (dmg_tx, mut dmg_rx) = mpsc::unbounded_channel();
    host.on_castle_damage(move |dto| {
        let _ = dmg_tx.send(*dto);
    });

    // Sent by the host, echoed back to the host as well.
    host.send_castle_damage(2, 35).expect("damage should send");

    let dto = timeout(EVENT_WAIT, dmg_rx.recv())
        .await
        .expect("sender should get the echo")
        .expect("channel open");
    assert_eq!(dto.team, 2);
    assert_eq!(dto.amount, 35);
}
