use serde::{Deserialize, Serialize};
use std::fmt;

/// Rejections a request/response operation can surface to the caller.
///
/// Fire-and-forget gameplay events never produce one of these; out-of-context
/// events are dropped by the router with no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomError {
    /// Room code does not name a live room.
    NotFound,
    /// Room is at capacity for its mode.
    Full,
    /// Join attempted after the room left `waiting`.
    AlreadyStarted,
    /// Room has a password and the supplied one does not match.
    BadPassword,
    /// Privileged operation attempted by a non-host connection.
    NotHost,
    /// A non-host player has not readied up.
    NotAllReady,
    /// Below the minimum headcount to start.
    NotEnoughPlayers,
    /// The connection is not a member of any room.
    NotInRoom,
}

impl fmt::Display for RoomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RoomError::NotFound => "Room not found",
            RoomError::Full => "Room is full",
            RoomError::AlreadyStarted => "Game already started",
            RoomError::BadPassword => "Wrong password",
            RoomError::NotHost => "Only the host can do that",
            RoomError::NotAllReady => "Not all players ready",
            RoomError::NotEnoughPlayers => "Not enough players",
            RoomError::NotInRoom => "Not in a room",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for RoomError {}
