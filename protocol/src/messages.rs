// Top-level message unions. Request/response operations carry a
// client-chosen `seq` echoed by the matching ack; everything else is
// fire-and-forget.

use crate::error::RoomError;
use crate::room::{LobbySummaryDto, RoomDto, RoomMode};
use crate::snapshot::{BuildingPlacedDto, CastleDamageDto, GameSnapshotDto, UnitSpawnedDto};
use serde::{Deserialize, Serialize};

/// Messages the client sends to the relay over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    CreateRoom {
        seq: u64,
        mode: RoomMode,
        player_name: String,
    },
    CreateLobby {
        seq: u64,
        room_name: String,
        player_name: String,
        is_public: bool,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        mode: RoomMode,
    },
    JoinRoom {
        seq: u64,
        room_code: String,
        player_name: String,
    },
    JoinLobby {
        seq: u64,
        room_code: String,
        player_name: String,
        #[serde(default)]
        password: Option<String>,
    },
    ToggleReady {
        seq: u64,
    },
    SwitchTeam {
        seq: u64,
        team: u8,
    },
    StartGame {
        seq: u64,
    },
    GetLobbies {
        seq: u64,
    },
    GetPlayerCount {
        seq: u64,
    },
    LeaveRoom,
    // Gameplay events, relayed opaquely.
    BuildingPlaced(BuildingPlacedDto),
    UnitSpawned(UnitSpawnedDto),
    CastleDamage(CastleDamageDto),
    GameStateSync(GameSnapshotDto),
    GameOver {
        winner: u8,
    },
}

/// Outcome of a request/response operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "lowercase")]
pub enum AckResult<T> {
    Ok(T),
    Err(RoomError),
}

impl<T> AckResult<T> {
    pub fn into_result(self) -> Result<T, RoomError> {
        match self {
            AckResult::Ok(value) => Ok(value),
            AckResult::Err(err) => Err(err),
        }
    }
}

impl<T> From<Result<T, RoomError>> for AckResult<T> {
    fn from(result: Result<T, RoomError>) -> Self {
        match result {
            Ok(value) => AckResult::Ok(value),
            Err(err) => AckResult::Err(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomCreatedOk {
    pub room_code: String,
    pub room: RoomDto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyCreatedOk {
    pub room_code: String,
    pub room: RoomDto,
    pub room_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomJoinedOk {
    pub room: RoomDto,
    pub team: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadyOk {
    pub ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TeamOk {
    pub team: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyListOk {
    pub lobbies: Vec<LobbySummaryDto>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerCountOk {
    pub count: usize,
}

/// Messages the relay sends to a connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    /// Sent once after connect; the connection id is the player id.
    Welcome { conn_id: u64 },

    // Acks for request/response operations.
    RoomCreated { seq: u64, result: AckResult<RoomCreatedOk> },
    LobbyCreated { seq: u64, result: AckResult<LobbyCreatedOk> },
    RoomJoined { seq: u64, result: AckResult<RoomJoinedOk> },
    ReadyToggled { seq: u64, result: AckResult<ReadyOk> },
    TeamSwitched { seq: u64, result: AckResult<TeamOk> },
    GameStarted { seq: u64, result: AckResult<()> },
    Lobbies { seq: u64, result: AckResult<LobbyListOk> },
    PlayerCount { seq: u64, result: AckResult<PlayerCountOk> },

    // Room/lobby broadcasts.
    RoomUpdate(RoomDto),
    HostChanged { new_host_id: u64 },
    GameStart { room: RoomDto },
    /// Signal only; recipients re-poll `GetLobbies`.
    LobbiesUpdate,
    PlayerCountUpdate { count: usize },

    // Gameplay broadcasts.
    BuildingPlaced(BuildingPlacedDto),
    UnitSpawned(UnitSpawnedDto),
    CastleDamage(CastleDamageDto),
    GameStateUpdate(GameSnapshotDto),
    GameOver { winner: u8 },
}

impl ServerMessage {
    /// The `seq` echoed by an ack, if this message is one.
    pub fn ack_seq(&self) -> Option<u64> {
        match self {
            ServerMessage::RoomCreated { seq, .. }
            | ServerMessage::LobbyCreated { seq, .. }
            | ServerMessage::RoomJoined { seq, .. }
            | ServerMessage::ReadyToggled { seq, .. }
            | ServerMessage::TeamSwitched { seq, .. }
            | ServerMessage::GameStarted { seq, .. }
            | ServerMessage::Lobbies { seq, .. }
            | ServerMessage::PlayerCount { seq, .. } => Some(*seq),
            _ => None,
        }
    }
}
