use protocol::{LobbySummaryDto, PlayerDto, RoomDto, RoomMode, RoomStatus};
use std::time::{SystemTime, UNIX_EPOCH};

/// Rooms never start a match below this headcount.
pub const MIN_PLAYERS_TO_START: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Listed by `GetLobbies` while waiting.
    Public,
    /// Reachable by code only.
    Private,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: u64,
    pub name: String,
    pub team: u8,
    pub ready: bool,
    pub is_host: bool,
}

/// One live room. The roster vector is kept in join order; host migration
/// promotes the oldest surviving entry.
#[derive(Debug)]
pub struct Room {
    pub code: String,
    pub host_id: u64,
    pub mode: RoomMode,
    pub status: RoomStatus,
    pub visibility: Visibility,
    pub password: Option<String>,
    pub room_name: Option<String>,
    pub created_at: u64,
    pub last_update: u64,
    players: Vec<Player>,
}

impl Room {
    pub fn new(
        code: String,
        host_id: u64,
        host_name: String,
        mode: RoomMode,
        visibility: Visibility,
        password: Option<String>,
        room_name: Option<String>,
    ) -> Self {
        let now = now_epoch_millis();
        let mut room = Self {
            code,
            host_id,
            mode,
            status: RoomStatus::Waiting,
            visibility,
            password,
            room_name,
            created_at: now,
            last_update: now,
            players: Vec::new(),
        };
        room.add_player(host_id, host_name, 1);
        room
    }

    pub fn max_players(&self) -> usize {
        self.mode.max_players()
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, id: u64) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: u64) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn member_ids(&self) -> Vec<u64> {
        self.players.iter().map(|p| p.id).collect()
    }

    /// The balancing rule: join the side with the fewest members, ties
    /// toward team 1.
    pub fn assign_team(&self) -> u8 {
        let team1 = self.players.iter().filter(|p| p.team == 1).count();
        let team2 = self.players.iter().filter(|p| p.team == 2).count();
        if team1 <= team2 { 1 } else { 2 }
    }

    pub fn add_player(&mut self, id: u64, name: String, team: u8) {
        self.players.push(Player {
            id,
            name,
            team,
            ready: false,
            is_host: id == self.host_id,
        });
    }

    /// Removes the player; returns whether the entry existed.
    pub fn remove_player(&mut self, id: u64) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.id != id);
        self.players.len() != before
    }

    /// Hands the host role to the oldest surviving member.
    pub fn promote_oldest(&mut self) -> Option<u64> {
        let new_host = self.players.first().map(|p| p.id)?;
        self.host_id = new_host;
        for p in &mut self.players {
            p.is_host = p.id == new_host;
        }
        Some(new_host)
    }

    /// Hosts are implicitly ready; everyone else must opt in, and two
    /// players is the floor.
    pub fn all_ready(&self) -> bool {
        self.players.len() >= MIN_PLAYERS_TO_START
            && self.players.iter().all(|p| p.ready || p.is_host)
    }

    pub fn host_name(&self) -> &str {
        self.player(self.host_id).map_or("", |p| p.name.as_str())
    }

    pub fn touch(&mut self) {
        self.last_update = now_epoch_millis();
    }
}

impl From<&Room> for RoomDto {
    fn from(room: &Room) -> Self {
        RoomDto {
            code: room.code.clone(),
            mode: room.mode,
            status: room.status,
            players: room.players.iter().map(PlayerDto::from).collect(),
            max_players: room.max_players(),
        }
    }
}

impl From<&Player> for PlayerDto {
    fn from(p: &Player) -> Self {
        PlayerDto {
            id: p.id,
            name: p.name.clone(),
            team: p.team,
            ready: p.ready,
            is_host: p.is_host,
        }
    }
}

impl From<&Room> for LobbySummaryDto {
    fn from(room: &Room) -> Self {
        LobbySummaryDto {
            code: room.code.clone(),
            room_name: room
                .room_name
                .clone()
                .unwrap_or_else(|| format!("{}'s room", room.host_name())),
            host_name: room.host_name().to_string(),
            players: room.player_count(),
            max_players: room.max_players(),
            has_password: room.password.is_some(),
            created_at: room.created_at,
        }
    }
}

pub fn now_epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
