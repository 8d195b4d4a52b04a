// Callback slots the surrounding application registers for room and
// gameplay events. Slots are invoked from the connection's reader task
// after the client's own state has been updated; do not re-register a slot
// from inside its own callback.

use protocol::{
    BuildingPlacedDto, CastleDamageDto, GameSnapshotDto, PlayerDto, RoomDto, UnitSpawnedDto,
};
use std::sync::Mutex;

/// Terminal match result as seen from this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameOverNotice {
    pub winner: u8,
    pub is_player_win: bool,
}

pub(crate) type Slot<T> = Mutex<Option<Box<dyn Fn(&T) + Send + Sync>>>;

#[derive(Default)]
pub(crate) struct CallbackSlots {
    pub on_players_update: Slot<Vec<PlayerDto>>,
    pub on_game_start: Slot<RoomDto>,
    pub on_building_received: Slot<BuildingPlacedDto>,
    pub on_unit_received: Slot<UnitSpawnedDto>,
    pub on_game_state_received: Slot<GameSnapshotDto>,
    pub on_castle_damage: Slot<CastleDamageDto>,
    pub on_game_over: Slot<GameOverNotice>,
    pub on_host_changed: Slot<u64>,
    pub on_lobbies_update: Slot<()>,
    pub on_player_count_update: Slot<usize>,
}

impl CallbackSlots {
    pub fn clear(&self) {
        set(&self.on_players_update, None);
        set(&self.on_game_start, None);
        set(&self.on_building_received, None);
        set(&self.on_unit_received, None);
        set(&self.on_game_state_received, None);
        set(&self.on_castle_damage, None);
        set(&self.on_game_over, None);
        set(&self.on_host_changed, None);
        set(&self.on_lobbies_update, None);
        set(&self.on_player_count_update, None);
    }
}

pub(crate) fn set<T>(slot: &Slot<T>, f: Option<Box<dyn Fn(&T) + Send + Sync>>) {
    *crate::util::lock(slot) = f;
}

pub(crate) fn fire<T>(slot: &Slot<T>, value: &T) {
    if let Some(f) = crate::util::lock(slot).as_ref() {
        f(value);
    }
}
