// Room registry: the one owner of room and membership state. Every
// mutation runs under the write lock and returns a typed outcome listing
// the members the router must notify, so per-room effect order is exactly
// the order handlers acquire the lock.

use crate::domain::room::now_epoch_millis;
use crate::domain::{MIN_PLAYERS_TO_START, Room, Visibility, generate_room_code, normalize_code};
use protocol::{LobbySummaryDto, RoomDto, RoomError, RoomMode, RoomStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Tunables applied to a registry instance.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// How often the finished-room sweeper wakes.
    pub sweep_interval: Duration,
    /// How long a finished room may linger before it is deleted.
    pub finished_grace: Duration,
}

/// Lobby-discovery metadata supplied by `CreateLobby`.
#[derive(Debug, Clone, Default)]
pub struct RoomOptions {
    pub room_name: Option<String>,
    pub is_public: bool,
    pub password: Option<String>,
}

/// Members to notify plus the roster snapshot to send them.
#[derive(Debug)]
pub struct RosterBroadcast {
    pub members: Vec<u64>,
    pub room: RoomDto,
}

#[derive(Debug)]
pub struct CreateOutcome {
    pub room_code: String,
    pub broadcast: RosterBroadcast,
    pub lobbies_changed: bool,
}

#[derive(Debug)]
pub struct JoinOutcome {
    pub team: u8,
    pub broadcast: RosterBroadcast,
    pub lobbies_changed: bool,
}

#[derive(Debug)]
pub struct StartOutcome {
    pub broadcast: RosterBroadcast,
    pub lobbies_changed: bool,
}

#[derive(Debug)]
pub enum LeaveOutcome {
    NotInRoom,
    RoomDeleted {
        code: String,
        lobbies_changed: bool,
    },
    HostMigrated {
        new_host_id: u64,
        broadcast: RosterBroadcast,
        lobbies_changed: bool,
    },
    PlayerLeft {
        broadcast: RosterBroadcast,
        lobbies_changed: bool,
    },
}

#[derive(Debug, Default)]
struct RegistryInner {
    rooms: HashMap<String, Room>,
    /// Connection -> room code. Membership is resolved here, never from a
    /// message payload.
    memberships: HashMap<u64, String>,
}

/// Thread-safe registry for live rooms. One instance per server so tests
/// run in isolation.
#[derive(Debug)]
pub struct RoomRegistry {
    settings: RegistrySettings,
    inner: RwLock<RegistryInner>,
}

impl RoomRegistry {
    pub fn new(settings: RegistrySettings) -> Self {
        Self {
            settings,
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    pub async fn create_room(
        &self,
        conn_id: u64,
        mode: RoomMode,
        player_name: String,
        options: RoomOptions,
    ) -> Result<CreateOutcome, RoomError> {
        let mut inner = self.inner.write().await;

        // Retry under the lock until the candidate code is unused, so
        // uniqueness is checked atomically with insertion.
        let code = loop {
            let candidate = generate_room_code();
            if !inner.rooms.contains_key(&candidate) {
                break candidate;
            }
        };

        let visibility = if options.is_public {
            Visibility::Public
        } else {
            Visibility::Private
        };
        let password = options.password.filter(|p| !p.is_empty());
        let room = Room::new(
            code.clone(),
            conn_id,
            player_name,
            mode,
            visibility,
            password,
            options.room_name,
        );
        let lobbies_changed = visibility == Visibility::Public;
        let broadcast = RosterBroadcast {
            members: room.member_ids(),
            room: RoomDto::from(&room),
        };

        inner.rooms.insert(code.clone(), room);
        inner.memberships.insert(conn_id, code.clone());
        info!(conn_id, code = %code, "room created");

        Ok(CreateOutcome {
            room_code: code,
            broadcast,
            lobbies_changed,
        })
    }

    pub async fn join_room(
        &self,
        conn_id: u64,
        code: &str,
        player_name: String,
        password: Option<&str>,
    ) -> Result<JoinOutcome, RoomError> {
        let code = normalize_code(code);
        let mut inner = self.inner.write().await;
        let room = inner.rooms.get_mut(&code).ok_or(RoomError::NotFound)?;

        if room.is_full() {
            return Err(RoomError::Full);
        }
        if room.status != RoomStatus::Waiting {
            return Err(RoomError::AlreadyStarted);
        }
        if let Some(expected) = &room.password
            && password != Some(expected.as_str())
        {
            return Err(RoomError::BadPassword);
        }

        let team = room.assign_team();
        room.add_player(conn_id, player_name, team);
        let lobbies_changed = room.visibility == Visibility::Public;
        let broadcast = RosterBroadcast {
            members: room.member_ids(),
            room: RoomDto::from(&*room),
        };
        inner.memberships.insert(conn_id, code.clone());
        info!(conn_id, code = %code, team, "player joined");

        Ok(JoinOutcome {
            team,
            broadcast,
            lobbies_changed,
        })
    }

    pub async fn toggle_ready(&self, conn_id: u64) -> Result<(bool, RosterBroadcast), RoomError> {
        let mut inner = self.inner.write().await;
        let room = member_room_mut(&mut inner, conn_id)?;
        let player = room.player_mut(conn_id).ok_or(RoomError::NotInRoom)?;
        player.ready = !player.ready;
        let ready = player.ready;
        Ok((ready, roster(room)))
    }

    pub async fn switch_team(
        &self,
        conn_id: u64,
        team: u8,
    ) -> Result<(u8, RosterBroadcast), RoomError> {
        let mut inner = self.inner.write().await;
        let room = member_room_mut(&mut inner, conn_id)?;
        let player = room.player_mut(conn_id).ok_or(RoomError::NotInRoom)?;
        if matches!(team, 1 | 2) {
            player.team = team;
        }
        let team = player.team;
        Ok((team, roster(room)))
    }

    pub async fn start_game(&self, conn_id: u64) -> Result<StartOutcome, RoomError> {
        let mut inner = self.inner.write().await;
        let room = member_room_mut(&mut inner, conn_id)?;
        if room.host_id != conn_id {
            return Err(RoomError::NotHost);
        }
        if room.player_count() < MIN_PLAYERS_TO_START {
            return Err(RoomError::NotEnoughPlayers);
        }
        if !room.all_ready() {
            return Err(RoomError::NotAllReady);
        }

        room.status = RoomStatus::Playing;
        room.touch();
        let lobbies_changed = room.visibility == Visibility::Public;
        info!(code = %room.code, "game started");
        Ok(StartOutcome {
            broadcast: roster(room),
            lobbies_changed,
        })
    }

    /// Removes the connection from its room, if any. Disconnects and
    /// explicit leaves are the same transition.
    pub async fn leave(&self, conn_id: u64) -> LeaveOutcome {
        let mut inner = self.inner.write().await;
        let Some(code) = inner.memberships.remove(&conn_id) else {
            return LeaveOutcome::NotInRoom;
        };
        let Some(room) = inner.rooms.get_mut(&code) else {
            // Room already swept; membership was stale.
            return LeaveOutcome::NotInRoom;
        };

        let was_host = room.host_id == conn_id;
        let was_listed = room.visibility == Visibility::Public && room.status == RoomStatus::Waiting;
        room.remove_player(conn_id);

        if room.is_empty() {
            inner.rooms.remove(&code);
            info!(code = %code, "room deleted (empty)");
            return LeaveOutcome::RoomDeleted {
                code,
                lobbies_changed: was_listed,
            };
        }

        if was_host {
            // Promotion cannot fail: the room is non-empty.
            let new_host_id = room.promote_oldest().unwrap_or(conn_id);
            info!(code = %code, new_host_id, "host migrated");
            return LeaveOutcome::HostMigrated {
                new_host_id,
                broadcast: roster(room),
                lobbies_changed: was_listed,
            };
        }

        LeaveOutcome::PlayerLeft {
            broadcast: roster(room),
            lobbies_changed: was_listed,
        }
    }

    /// Host-authoritative snapshot relay: returns every member except the
    /// sender, or `None` when the event must be dropped silently.
    pub async fn accept_sync(&self, conn_id: u64) -> Option<Vec<u64>> {
        let mut inner = self.inner.write().await;
        let code = inner.memberships.get(&conn_id)?.clone();
        let room = inner.rooms.get_mut(&code)?;
        if room.host_id != conn_id {
            debug!(conn_id, code = %code, "sync from non-host dropped");
            return None;
        }
        room.touch();
        Some(room.member_ids().into_iter().filter(|id| *id != conn_id).collect())
    }

    /// Discrete building/unit events: sender's team plus the other members.
    pub async fn gameplay_targets(&self, conn_id: u64) -> Option<(u8, Vec<u64>)> {
        let inner = self.inner.read().await;
        let code = inner.memberships.get(&conn_id)?;
        let room = inner.rooms.get(code)?;
        if room.status != RoomStatus::Playing {
            return None;
        }
        let team = room.player(conn_id)?.team;
        let others = room
            .member_ids()
            .into_iter()
            .filter(|id| *id != conn_id)
            .collect();
        Some((team, others))
    }

    /// Castle damage goes to every member, the sender included.
    pub async fn castle_damage_targets(&self, conn_id: u64) -> Option<Vec<u64>> {
        let inner = self.inner.read().await;
        let code = inner.memberships.get(&conn_id)?;
        let room = inner.rooms.get(code)?;
        if room.status != RoomStatus::Playing {
            return None;
        }
        Some(room.member_ids())
    }

    /// Terminal transition; returns the members to notify.
    pub async fn finish(&self, conn_id: u64, winner: u8) -> Option<Vec<u64>> {
        let mut inner = self.inner.write().await;
        let code = inner.memberships.get(&conn_id)?.clone();
        let room = inner.rooms.get_mut(&code)?;
        room.status = RoomStatus::Finished;
        room.touch();
        info!(code = %code, winner, "game over");
        Some(room.member_ids())
    }

    /// Derived lobby listing: public rooms still waiting.
    pub async fn public_lobbies(&self) -> Vec<LobbySummaryDto> {
        let inner = self.inner.read().await;
        let mut lobbies: Vec<LobbySummaryDto> = inner
            .rooms
            .values()
            .filter(|r| r.visibility == Visibility::Public && r.status == RoomStatus::Waiting)
            .map(LobbySummaryDto::from)
            .collect();
        lobbies.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        lobbies
    }

    /// (live rooms, players across them) for the health probe.
    pub async fn counts(&self) -> (usize, usize) {
        let inner = self.inner.read().await;
        let players = inner.rooms.values().map(Room::player_count).sum();
        (inner.rooms.len(), players)
    }

    /// Deletes finished rooms whose grace period has elapsed. Lingering
    /// memberships are dropped; later events from those connections no-op.
    pub async fn sweep_finished(&self) -> usize {
        let grace_millis = self.settings.finished_grace.as_millis() as u64;
        let now = now_epoch_millis();
        let mut inner = self.inner.write().await;

        let expired: Vec<String> = inner
            .rooms
            .values()
            .filter(|r| {
                r.status == RoomStatus::Finished && now.saturating_sub(r.last_update) > grace_millis
            })
            .map(|r| r.code.clone())
            .collect();

        for code in &expired {
            if let Some(room) = inner.rooms.remove(code) {
                for id in room.member_ids() {
                    inner.memberships.remove(&id);
                }
                info!(code = %code, "finished room expired");
            }
        }
        expired.len()
    }

    /// Spawns the background sweeper for finished rooms.
    pub fn spawn_finished_sweeper(self: Arc<Self>) {
        let interval = self.settings.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let swept = self.sweep_finished().await;
                if swept > 0 {
                    debug!(swept, "sweeper removed finished rooms");
                }
            }
        });
    }
}

fn member_room_mut<'a>(
    inner: &'a mut RegistryInner,
    conn_id: u64,
) -> Result<&'a mut Room, RoomError> {
    let code = inner.memberships.get(&conn_id).ok_or(RoomError::NotInRoom)?;
    inner.rooms.get_mut(code).ok_or(RoomError::NotInRoom)
}

fn roster(room: &Room) -> RosterBroadcast {
    RosterBroadcast {
        members: room.member_ids(),
        room: RoomDto::from(room),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RoomRegistry {
        RoomRegistry::new(RegistrySettings {
            sweep_interval: Duration::from_secs(30),
            finished_grace: Duration::from_millis(0),
        })
    }

    async fn create_1v1(reg: &RoomRegistry, conn: u64, name: &str) -> String {
        reg.create_room(conn, RoomMode::OneVsOne, name.to_string(), RoomOptions::default())
            .await
            .expect("create should succeed")
            .room_code
    }

    #[tokio::test]
    async fn when_a_room_is_created_then_it_is_joinable_by_code() {
        let reg = registry();
        let code = create_1v1(&reg, 1, "Ada").await;

        let joined = reg
            .join_room(2, &code.to_lowercase(), "Bo".to_string(), None)
            .await
            .expect("join should succeed");
        assert_eq!(joined.team, 2);
        assert_eq!(joined.broadcast.room.players.len(), 2);
    }

    #[tokio::test]
    async fn when_the_room_is_full_then_join_fails_with_full() {
        let reg = registry();
        let code = create_1v1(&reg, 1, "Ada").await;
        reg.join_room(2, &code, "Bo".to_string(), None).await.unwrap();

        let err = reg.join_room(3, &code, "Cy".to_string(), None).await.unwrap_err();
        assert_eq!(err, RoomError::Full);
    }

    #[tokio::test]
    async fn when_the_code_is_unknown_then_join_fails_with_not_found() {
        let reg = registry();
        let err = reg
            .join_room(1, "ZZZZZZ", "Ada".to_string(), None)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::NotFound);
    }

    #[tokio::test]
    async fn when_the_password_mismatches_then_join_fails_with_bad_password() {
        let reg = registry();
        let outcome = reg
            .create_room(
                1,
                RoomMode::OneVsOne,
                "Ada".to_string(),
                RoomOptions {
                    room_name: Some("duel".to_string()),
                    is_public: true,
                    password: Some("hunter2".to_string()),
                },
            )
            .await
            .unwrap();

        let err = reg
            .join_room(2, &outcome.room_code, "Bo".to_string(), Some("wrong"))
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::BadPassword);

        reg.join_room(2, &outcome.room_code, "Bo".to_string(), Some("hunter2"))
            .await
            .expect("correct password should join");
    }

    #[tokio::test]
    async fn when_start_is_requested_before_ready_then_it_fails() {
        let reg = registry();
        let code = create_1v1(&reg, 1, "Ada").await;
        assert_eq!(
            reg.start_game(1).await.unwrap_err(),
            RoomError::NotEnoughPlayers
        );

        reg.join_room(2, &code, "Bo".to_string(), None).await.unwrap();
        assert_eq!(reg.start_game(1).await.unwrap_err(), RoomError::NotAllReady);
        assert_eq!(reg.start_game(2).await.unwrap_err(), RoomError::NotHost);

        let (ready, _) = reg.toggle_ready(2).await.unwrap();
        assert!(ready);
        let outcome = reg.start_game(1).await.unwrap();
        assert_eq!(outcome.broadcast.room.status, RoomStatus::Playing);
    }

    #[tokio::test]
    async fn when_the_host_leaves_then_the_oldest_member_inherits_the_room() {
        let reg = registry();
        let code = create_1v1(&reg, 1, "Ada").await;
        reg.join_room(2, &code, "Bo".to_string(), None).await.unwrap();

        match reg.leave(1).await {
            LeaveOutcome::HostMigrated {
                new_host_id,
                broadcast,
                ..
            } => {
                assert_eq!(new_host_id, 2);
                let host_entries: Vec<_> =
                    broadcast.room.players.iter().filter(|p| p.is_host).collect();
                assert_eq!(host_entries.len(), 1);
                assert_eq!(host_entries[0].id, 2);
            }
            other => panic!("expected host migration, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn when_the_last_player_leaves_then_the_code_is_unreachable() {
        let reg = registry();
        let code = create_1v1(&reg, 1, "Ada").await;

        match reg.leave(1).await {
            LeaveOutcome::RoomDeleted { .. } => {}
            other => panic!("expected deletion, got {other:?}"),
        }
        let err = reg
            .join_room(2, &code, "Bo".to_string(), None)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::NotFound);
    }

    #[tokio::test]
    async fn when_sync_comes_from_a_guest_then_it_is_dropped() {
        let reg = registry();
        let code = create_1v1(&reg, 1, "Ada").await;
        reg.join_room(2, &code, "Bo".to_string(), None).await.unwrap();

        assert_eq!(reg.accept_sync(1).await, Some(vec![2]));
        assert_eq!(reg.accept_sync(2).await, None);
        assert_eq!(reg.accept_sync(3).await, None);
    }

    #[tokio::test]
    async fn when_the_grace_period_elapses_then_finished_rooms_are_swept() {
        let reg = registry();
        let code = create_1v1(&reg, 1, "Ada").await;
        reg.join_room(2, &code, "Bo".to_string(), None).await.unwrap();
        reg.toggle_ready(2).await.unwrap();
        reg.start_game(1).await.unwrap();
        reg.finish(1, 2).await.unwrap();

        // Zero grace in the test settings: anything finished is overdue.
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(reg.sweep_finished().await, 1);
        let (rooms, players) = reg.counts().await;
        assert_eq!((rooms, players), (0, 0));
        assert!(matches!(reg.leave(1).await, LeaveOutcome::NotInRoom));
    }

    #[tokio::test]
    async fn when_lobbies_are_listed_then_only_public_waiting_rooms_appear() {
        let reg = registry();
        create_1v1(&reg, 1, "Ada").await;
        let public = reg
            .create_room(
                2,
                RoomMode::OneVsOne,
                "Bo".to_string(),
                RoomOptions {
                    room_name: Some("open duel".to_string()),
                    is_public: true,
                    password: None,
                },
            )
            .await
            .unwrap();

        let lobbies = reg.public_lobbies().await;
        assert_eq!(lobbies.len(), 1);
        assert_eq!(lobbies[0].code, public.room_code);
        assert_eq!(lobbies[0].room_name, "open duel");
        assert!(!lobbies[0].has_password);

        // Starting the match removes it from the listing.
        reg.join_room(3, &public.room_code, "Cy".to_string(), None)
            .await
            .unwrap();
        reg.toggle_ready(3).await.unwrap();
        reg.start_game(2).await.unwrap();
        assert!(reg.public_lobbies().await.is_empty());
    }
}
