// The session client: owns the relay connection, exposes the room
// operations as request/response calls, and routes broadcast events into
// reconciliation and the application's callback slots.

use crate::callbacks::{CallbackSlots, GameOverNotice, fire, set};
use crate::error::ClientError;
use crate::reconcile;
use crate::sync;
use crate::util::{lock, sync_id};
use crate::world::{DEFAULT_COLS, LocalBuilding, LocalUnit, LocalWorld};

use futures_util::{SinkExt, StreamExt};
use protocol::{
    BuildingKind, BuildingPlacedDto, CastleDamageDto, ClientMessage, GameSnapshotDto,
    LobbySummaryDto, PlayerDto, RoomCreatedOk, RoomDto, RoomJoinedOk, RoomMode, ServerMessage,
    UnitKind, UnitSpawnedDto,
};
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
};
use tracing::{debug, info, warn};

type WsSink = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<TcpStream>>,
    WsMessage,
>;
type WsSource = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint of the relay, e.g. `ws://127.0.0.1:3001/ws`.
    pub server_url: String,
    /// How long a request waits for its acknowledgement.
    pub request_timeout: Duration,
    /// Host snapshot emission interval. Fast enough for smooth
    /// interpolation, slow enough to bound bandwidth.
    pub sync_interval: Duration,
    /// Battlefield grid width, needed for frame mirroring.
    pub cols: u32,
}

impl SessionConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:3001/ws".to_string(),
            request_timeout: Duration::from_secs(5),
            sync_interval: Duration::from_millis(50),
            cols: DEFAULT_COLS,
        }
    }
}

#[derive(Debug)]
struct SessionState {
    conn_id: Option<u64>,
    room_code: Option<String>,
    team: u8,
    is_host: bool,
    game_started: bool,
    /// Tick of the newest snapshot applied; older arrivals are discarded.
    last_applied_tick: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            conn_id: None,
            room_code: None,
            team: 1,
            is_host: false,
            game_started: false,
            last_applied_tick: 0,
        }
    }
}

pub(crate) struct Shared {
    pub(crate) config: SessionConfig,
    state: Mutex<SessionState>,
    pending: Mutex<HashMap<u64, oneshot::Sender<ServerMessage>>>,
    writer: Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    welcome: Mutex<Option<oneshot::Sender<u64>>>,
    next_seq: AtomicU64,
    pub(crate) snapshot_tick: AtomicU64,
    callbacks: CallbackSlots,
    pub(crate) world: Arc<Mutex<LocalWorld>>,
    pub(crate) sync_stop: Mutex<Option<Arc<Notify>>>,
}

impl Shared {
    pub(crate) fn send_raw(&self, msg: &ClientMessage) -> Result<(), ClientError> {
        let guard = lock(&self.writer);
        let tx = guard.as_ref().ok_or(ClientError::NotConnected)?;
        let txt = serde_json::to_string(msg).map_err(ClientError::Encode)?;
        tx.send(WsMessage::text(txt))
            .map_err(|_| ClientError::ConnectionClosed)
    }
}

pub struct SessionClient {
    shared: Arc<Shared>,
    /// Serializes concurrent first connections.
    connect_gate: tokio::sync::Mutex<()>,
}

impl SessionClient {
    pub fn new(config: SessionConfig) -> Self {
        let world = Arc::new(Mutex::new(LocalWorld::new(config.cols)));
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(SessionState::default()),
                pending: Mutex::new(HashMap::new()),
                writer: Mutex::new(None),
                welcome: Mutex::new(None),
                next_seq: AtomicU64::new(1),
                snapshot_tick: AtomicU64::new(0),
                callbacks: CallbackSlots::default(),
                world,
                sync_stop: Mutex::new(None),
            }),
            connect_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// The simulation container. The application's tick mutates it; the
    /// synchronizer and reconciler read/write it under the same lock.
    pub fn world(&self) -> Arc<Mutex<LocalWorld>> {
        self.shared.world.clone()
    }

    pub fn conn_id(&self) -> Option<u64> {
        lock(&self.shared.state).conn_id
    }

    pub fn room_code(&self) -> Option<String> {
        lock(&self.shared.state).room_code.clone()
    }

    pub fn team(&self) -> u8 {
        lock(&self.shared.state).team
    }

    pub fn is_host(&self) -> bool {
        lock(&self.shared.state).is_host
    }

    // ---- callback registration -------------------------------------------

    pub fn on_players_update(&self, f: impl Fn(&Vec<PlayerDto>) + Send + Sync + 'static) {
        set(&self.shared.callbacks.on_players_update, Some(Box::new(f)));
    }

    pub fn on_game_start(&self, f: impl Fn(&RoomDto) + Send + Sync + 'static) {
        set(&self.shared.callbacks.on_game_start, Some(Box::new(f)));
    }

    pub fn on_building_received(&self, f: impl Fn(&BuildingPlacedDto) + Send + Sync + 'static) {
        set(&self.shared.callbacks.on_building_received, Some(Box::new(f)));
    }

    pub fn on_unit_received(&self, f: impl Fn(&UnitSpawnedDto) + Send + Sync + 'static) {
        set(&self.shared.callbacks.on_unit_received, Some(Box::new(f)));
    }

    pub fn on_game_state_received(&self, f: impl Fn(&GameSnapshotDto) + Send + Sync + 'static) {
        set(&self.shared.callbacks.on_game_state_received, Some(Box::new(f)));
    }

    pub fn on_castle_damage(&self, f: impl Fn(&CastleDamageDto) + Send + Sync + 'static) {
        set(&self.shared.callbacks.on_castle_damage, Some(Box::new(f)));
    }

    pub fn on_game_over(&self, f: impl Fn(&GameOverNotice) + Send + Sync + 'static) {
        set(&self.shared.callbacks.on_game_over, Some(Box::new(f)));
    }

    pub fn on_host_changed(&self, f: impl Fn(&u64) + Send + Sync + 'static) {
        set(&self.shared.callbacks.on_host_changed, Some(Box::new(f)));
    }

    pub fn on_lobbies_update(&self, f: impl Fn(&()) + Send + Sync + 'static) {
        set(&self.shared.callbacks.on_lobbies_update, Some(Box::new(f)));
    }

    pub fn on_player_count_update(&self, f: impl Fn(&usize) + Send + Sync + 'static) {
        set(&self.shared.callbacks.on_player_count_update, Some(Box::new(f)));
    }

    // ---- room operations -------------------------------------------------

    pub async fn create_room(
        &self,
        mode: RoomMode,
        player_name: &str,
    ) -> Result<RoomCreatedOk, ClientError> {
        let player_name = player_name.to_string();
        let reply = self
            .request(move |seq| ClientMessage::CreateRoom {
                seq,
                mode,
                player_name,
            })
            .await?;
        match reply {
            ServerMessage::RoomCreated { result, .. } => {
                let ok = result.into_result().map_err(ClientError::Rejected)?;
                let mut st = lock(&self.shared.state);
                st.room_code = Some(ok.room_code.clone());
                st.is_host = true;
                st.team = 1;
                Ok(ok)
            }
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    pub async fn create_lobby(
        &self,
        room_name: &str,
        player_name: &str,
        is_public: bool,
        password: Option<&str>,
    ) -> Result<RoomCreatedOk, ClientError> {
        let room_name = room_name.to_string();
        let player_name = player_name.to_string();
        let password = password.map(str::to_string);
        let reply = self
            .request(move |seq| ClientMessage::CreateLobby {
                seq,
                room_name,
                player_name,
                is_public,
                password,
                mode: RoomMode::default(),
            })
            .await?;
        match reply {
            ServerMessage::LobbyCreated { result, .. } => {
                let ok = result.into_result().map_err(ClientError::Rejected)?;
                let mut st = lock(&self.shared.state);
                st.room_code = Some(ok.room_code.clone());
                st.is_host = true;
                st.team = 1;
                Ok(RoomCreatedOk {
                    room_code: ok.room_code,
                    room: ok.room,
                })
            }
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    pub async fn join_room(
        &self,
        room_code: &str,
        player_name: &str,
    ) -> Result<RoomJoinedOk, ClientError> {
        self.join_inner(room_code, player_name, None).await
    }

    pub async fn join_lobby(
        &self,
        room_code: &str,
        player_name: &str,
        password: Option<&str>,
    ) -> Result<RoomJoinedOk, ClientError> {
        self.join_inner(room_code, player_name, password).await
    }

    async fn join_inner(
        &self,
        room_code: &str,
        player_name: &str,
        password: Option<&str>,
    ) -> Result<RoomJoinedOk, ClientError> {
        let room_code = room_code.to_string();
        let player_name = player_name.to_string();
        let password = password.map(str::to_string);
        let reply = self
            .request(move |seq| match password {
                None => ClientMessage::JoinRoom {
                    seq,
                    room_code,
                    player_name,
                },
                Some(password) => ClientMessage::JoinLobby {
                    seq,
                    room_code,
                    player_name,
                    password: Some(password),
                },
            })
            .await?;
        match reply {
            ServerMessage::RoomJoined { result, .. } => {
                let ok = result.into_result().map_err(ClientError::Rejected)?;
                let mut st = lock(&self.shared.state);
                st.room_code = Some(ok.room.code.clone());
                st.is_host = false;
                st.team = ok.team;
                Ok(ok)
            }
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    /// Flips this player's ready flag; returns the confirmed state.
    pub async fn toggle_ready(&self) -> Result<bool, ClientError> {
        let reply = self
            .request(|seq| ClientMessage::ToggleReady { seq })
            .await?;
        match reply {
            ServerMessage::ReadyToggled { result, .. } => Ok(result
                .into_result()
                .map_err(ClientError::Rejected)?
                .ready),
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    pub async fn switch_team(&self, team: u8) -> Result<u8, ClientError> {
        let reply = self
            .request(move |seq| ClientMessage::SwitchTeam { seq, team })
            .await?;
        match reply {
            ServerMessage::TeamSwitched { result, .. } => {
                let confirmed = result.into_result().map_err(ClientError::Rejected)?.team;
                lock(&self.shared.state).team = confirmed;
                Ok(confirmed)
            }
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    pub async fn start_game(&self) -> Result<(), ClientError> {
        let reply = self.request(|seq| ClientMessage::StartGame { seq }).await?;
        match reply {
            ServerMessage::GameStarted { result, .. } => {
                result.into_result().map_err(ClientError::Rejected)
            }
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    pub async fn get_lobbies(&self) -> Result<Vec<LobbySummaryDto>, ClientError> {
        let reply = self.request(|seq| ClientMessage::GetLobbies { seq }).await?;
        match reply {
            ServerMessage::Lobbies { result, .. } => Ok(result
                .into_result()
                .map_err(ClientError::Rejected)?
                .lobbies),
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    pub async fn get_player_count(&self) -> Result<usize, ClientError> {
        let reply = self
            .request(|seq| ClientMessage::GetPlayerCount { seq })
            .await?;
        match reply {
            ServerMessage::PlayerCount { result, .. } => Ok(result
                .into_result()
                .map_err(ClientError::Rejected)?
                .count),
            _ => Err(ClientError::UnexpectedAck),
        }
    }

    /// The cancellation primitive: stops the synchronizer, leaves the room
    /// on the relay, clears room state and detaches every callback.
    pub async fn leave_room(&self) {
        stop_sync(&self.shared);
        let _ = self.shared.send_raw(&ClientMessage::LeaveRoom);
        {
            let mut st = lock(&self.shared.state);
            st.room_code = None;
            st.is_host = false;
            st.game_started = false;
            st.last_applied_tick = 0;
        }
        self.shared.callbacks.clear();
    }

    // ---- gameplay sends --------------------------------------------------

    /// Records a locally placed building and announces it in world-frame
    /// coordinates. Returns the durable sync id.
    pub fn place_building(
        &self,
        kind: BuildingKind,
        x: f32,
        y: f32,
        hp: i32,
        max_hp: i32,
    ) -> Result<String, ClientError> {
        let conn_id = lock(&self.shared.state)
            .conn_id
            .ok_or(ClientError::NotConnected)?;
        let id = sync_id(conn_id);
        let dto = {
            let mut world = lock(&self.shared.world);
            let team = world.team;
            world.buildings.push(LocalBuilding {
                sync_id: id.clone(),
                kind,
                x,
                y,
                hp,
                max_hp,
                alive: true,
                team,
                controlled: true,
            });
            BuildingPlacedDto {
                id: id.clone(),
                kind,
                x: world.mirror_x(x),
                y,
                hp,
                max_hp,
                sender_team: team,
            }
        };
        self.shared.send_raw(&ClientMessage::BuildingPlaced(dto))?;
        Ok(id)
    }

    /// Records a locally spawned unit and announces it.
    pub fn spawn_unit(
        &self,
        kind: UnitKind,
        x: f32,
        y: f32,
        hp: i32,
        max_hp: i32,
    ) -> Result<String, ClientError> {
        let conn_id = lock(&self.shared.state)
            .conn_id
            .ok_or(ClientError::NotConnected)?;
        let id = sync_id(conn_id);
        let dto = {
            let mut world = lock(&self.shared.world);
            let team = world.team;
            world.units.push(LocalUnit {
                sync_id: id.clone(),
                kind,
                x,
                y,
                hp,
                max_hp,
                alive: true,
                team,
                controlled: true,
            });
            UnitSpawnedDto {
                id: id.clone(),
                kind,
                x: world.mirror_x(x),
                y,
                hp,
                max_hp,
                sender_team: team,
            }
        };
        self.shared.send_raw(&ClientMessage::UnitSpawned(dto))?;
        Ok(id)
    }

    pub fn send_castle_damage(&self, team: u8, amount: i32) -> Result<(), ClientError> {
        self.shared
            .send_raw(&ClientMessage::CastleDamage(CastleDamageDto { team, amount }))
    }

    // ---- connection ------------------------------------------------------

    /// Dials the relay if this is the first room operation.
    async fn ensure_connected(&self) -> Result<(), ClientError> {
        let _gate = self.connect_gate.lock().await;
        if lock(&self.shared.writer).is_some() {
            return Ok(());
        }

        let (ws, _response) = connect_async(self.shared.config.server_url.as_str())
            .await
            .map_err(ClientError::Ws)?;
        let (sink, stream) = ws.split();

        let (out_tx, out_rx) = mpsc::unbounded_channel::<WsMessage>();
        let (welcome_tx, welcome_rx) = oneshot::channel::<u64>();
        *lock(&self.shared.welcome) = Some(welcome_tx);
        *lock(&self.shared.writer) = Some(out_tx);

        tokio::spawn(writer_task(out_rx, sink));
        tokio::spawn(reader_task(self.shared.clone(), stream));

        // The relay's first frame names this connection.
        match tokio::time::timeout(self.shared.config.request_timeout, welcome_rx).await {
            Ok(Ok(conn_id)) => {
                info!(conn_id, "connected to relay");
                Ok(())
            }
            _ => {
                *lock(&self.shared.writer) = None;
                Err(ClientError::ConnectionClosed)
            }
        }
    }

    async fn request(
        &self,
        build: impl FnOnce(u64) -> ClientMessage,
    ) -> Result<ServerMessage, ClientError> {
        self.ensure_connected().await?;

        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(seq, tx);

        if let Err(e) = self.shared.send_raw(&build(seq)) {
            lock(&self.shared.pending).remove(&seq);
            return Err(e);
        }

        match tokio::time::timeout(self.shared.config.request_timeout, rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                lock(&self.shared.pending).remove(&seq);
                Err(ClientError::Timeout)
            }
        }
    }
}

async fn writer_task(mut out_rx: mpsc::UnboundedReceiver<WsMessage>, mut sink: WsSink) {
    while let Some(msg) = out_rx.recv().await {
        if sink.send(msg).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn reader_task(shared: Arc<Shared>, mut stream: WsSource) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerMessage>(text.as_str())
            {
                Ok(msg) => handle_server_message(&shared, msg),
                Err(e) => warn!(error = %e, "failed to parse server message"),
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "websocket recv error");
                break;
            }
        }
    }

    // Connection gone: fail pending requests, stop any sync task.
    *lock(&shared.writer) = None;
    lock(&shared.pending).clear();
    stop_sync(&shared);
    debug!("relay connection closed");
}

fn stop_sync(shared: &Arc<Shared>) {
    if let Some(stop) = lock(&shared.sync_stop).take() {
        stop.notify_one();
    }
}

/// The explicit become-host/arm transition: flips nothing by itself, only
/// guarantees a single live sync task.
fn start_sync(shared: &Arc<Shared>) {
    let mut guard = lock(&shared.sync_stop);
    if guard.is_some() {
        return;
    }
    let stop = Arc::new(Notify::new());
    *guard = Some(stop.clone());
    drop(guard);
    tokio::spawn(sync::run_host_sync(shared.clone(), stop));
}

fn handle_server_message(shared: &Arc<Shared>, msg: ServerMessage) {
    // Acks resolve the matching pending request.
    if let Some(seq) = msg.ack_seq() {
        if let Some(tx) = lock(&shared.pending).remove(&seq) {
            let _ = tx.send(msg);
        } else {
            debug!(seq, "ack with no pending request");
        }
        return;
    }

    match msg {
        ServerMessage::Welcome { conn_id } => {
            lock(&shared.state).conn_id = Some(conn_id);
            if let Some(tx) = lock(&shared.welcome).take() {
                let _ = tx.send(conn_id);
            }
        }

        ServerMessage::RoomUpdate(room) => {
            {
                let mut st = lock(&shared.state);
                if let Some(id) = st.conn_id
                    && let Some(me) = room.players.iter().find(|p| p.id == id)
                {
                    st.team = me.team;
                }
            }
            fire(&shared.callbacks.on_players_update, &room.players);
        }

        ServerMessage::HostChanged { new_host_id } => {
            let arm = {
                let mut st = lock(&shared.state);
                let me = st.conn_id == Some(new_host_id);
                if me {
                    st.is_host = true;
                }
                // The new host's snapshot counter starts over; reset the
                // horizon so its snapshots are not discarded as stale.
                st.last_applied_tick = 0;
                me && st.game_started
            };
            if arm {
                info!(new_host_id, "became host; arming synchronizer");
                start_sync(shared);
            }
            fire(&shared.callbacks.on_host_changed, &new_host_id);
        }

        ServerMessage::GameStart { room } => {
            let (team, is_host) = {
                let mut st = lock(&shared.state);
                st.game_started = true;
                st.last_applied_tick = 0;
                if let Some(id) = st.conn_id
                    && let Some(me) = room.players.iter().find(|p| p.id == id)
                {
                    st.team = me.team;
                }
                (st.team, st.is_host)
            };
            lock(&shared.world).reset(team);
            shared.snapshot_tick.store(0, Ordering::Relaxed);
            if is_host {
                start_sync(shared);
            }
            fire(&shared.callbacks.on_game_start, &room);
        }

        ServerMessage::BuildingPlaced(dto) => {
            {
                let mut world = lock(&shared.world);
                reconcile::apply_building_event(&mut world, &dto);
            }
            fire(&shared.callbacks.on_building_received, &dto);
        }

        ServerMessage::UnitSpawned(dto) => {
            {
                let mut world = lock(&shared.world);
                reconcile::apply_unit_event(&mut world, &dto);
            }
            fire(&shared.callbacks.on_unit_received, &dto);
        }

        ServerMessage::GameStateUpdate(snapshot) => {
            let (is_host, last_applied) = {
                let st = lock(&shared.state);
                (st.is_host, st.last_applied_tick)
            };
            // Only guests mirror the authoritative stream.
            if !is_host {
                let applied = {
                    let mut world = lock(&shared.world);
                    reconcile::apply_snapshot(&mut world, &snapshot, last_applied)
                };
                if applied {
                    lock(&shared.state).last_applied_tick = snapshot.tick;
                }
            }
            fire(&shared.callbacks.on_game_state_received, &snapshot);
        }

        ServerMessage::CastleDamage(dto) => {
            fire(&shared.callbacks.on_castle_damage, &dto);
        }

        ServerMessage::GameOver { winner } => {
            let notice = {
                let mut st = lock(&shared.state);
                st.game_started = false;
                GameOverNotice {
                    winner,
                    is_player_win: winner == st.team,
                }
            };
            stop_sync(shared);
            fire(&shared.callbacks.on_game_over, &notice);
        }

        ServerMessage::LobbiesUpdate => {
            fire(&shared.callbacks.on_lobbies_update, &());
        }

        ServerMessage::PlayerCountUpdate { count } => {
            fire(&shared.callbacks.on_player_count_update, &count);
        }

        // Acks were handled above.
        _ => {}
    }
}
