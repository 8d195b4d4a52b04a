use crate::frameworks::config;
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::rng::rand_id;
use crate::use_cases::{LeaveOutcome, RoomOptions, RosterBroadcast};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures_util::sink::SinkExt;
use protocol::{
    AckResult, ClientMessage, LobbyCreatedOk, LobbyListOk, PlayerCountOk, ReadyOk, RoomCreatedOk,
    RoomError, RoomJoinedOk, ServerMessage, TeamOk,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    OutboundClosed,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let conn_id = rand_id();
    let span = info_span!("conn", conn_id);
    let _enter = span.enter();

    // Register the outbound queue before any broadcast can target us.
    let (out_tx, out_rx) = mpsc::channel::<ServerMessage>(config::OUTBOUND_CHANNEL_CAPACITY);
    state.connections.insert(conn_id, out_tx).await;

    // Tell the client "this is who you are"; the connection id is the
    // player id for the rest of the session.
    if let Err(e) = send_message(&mut socket, &ServerMessage::Welcome { conn_id }).await {
        warn!(error = ?e, "failed to send welcome");
        state.connections.remove(conn_id).await;
        return;
    }
    broadcast_player_count(&state).await;
    info!("client connected");

    let mut ctx = ConnCtx {
        conn_id,
        out_rx,
        invalid_json: 0,
        msgs_in: 0,
        msgs_out: 0,
        last_invalid_log: Instant::now() - LOG_THROTTLE,
        close_frame: None,
    };

    if let Err(e) = run_client_loop(&mut socket, &mut ctx, &state).await {
        warn!(error = ?e, "client loop exited with error");
    }

    // Disconnect is the same transition as an explicit leave.
    state.connections.remove(conn_id).await;
    leave_current(&state, conn_id).await;
    broadcast_player_count(&state).await;
    debug!(msgs_in = ctx.msgs_in, msgs_out = ctx.msgs_out, "connection stats");
    info!("client disconnected");
}

struct ConnCtx {
    conn_id: u64,
    out_rx: mpsc::Receiver<ServerMessage>,
    invalid_json: u32,
    msgs_in: u64,
    msgs_out: u64,
    last_invalid_log: Instant,
    close_frame: Option<CloseFrame>,
}

enum LoopControl {
    Continue,
    Disconnect,
}

async fn run_client_loop(
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
    state: &Arc<AppState>,
) -> Result<(), NetError> {
    let conn_id = ctx.conn_id;

    // Split borrows so `tokio::select!` can hold them concurrently.
    let ConnCtx {
        out_rx,
        invalid_json,
        msgs_in,
        msgs_out,
        last_invalid_log,
        close_frame,
        ..
    } = ctx;

    let mut fatal: Option<NetError> = None;

    loop {
        let disconnect: bool = tokio::select! {
            // Incoming message from the client.
            incoming = socket.recv() => {
                match handle_incoming(
                    socket,
                    incoming,
                    conn_id,
                    state,
                    invalid_json,
                    msgs_in,
                    last_invalid_log,
                    close_frame,
                ).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            // Outbound broadcast queued by the registry side.
            outbound = out_rx.recv() => {
                match outbound {
                    Some(msg) => match send_message(socket, &msg).await {
                        Ok(()) => {
                            *msgs_out += 1;
                            false
                        }
                        Err(e) => {
                            warn!(error = ?e, "failed to forward broadcast");
                            true
                        }
                    },
                    None => {
                        fatal = Some(NetError::OutboundClosed);
                        true
                    }
                }
            }
        };

        if disconnect {
            if let Some(frame) = close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    if let Some(err) = fatal { Err(err) } else { Ok(()) }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_incoming(
    socket: &mut WebSocket,
    incoming: Option<Result<Message, Error>>,
    conn_id: u64,
    state: &Arc<AppState>,
    invalid_json: &mut u32,
    msgs_in: &mut u64,
    last_invalid_log: &mut Instant,
    close_frame: &mut Option<CloseFrame>,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(Message::Text(text))) => {
            *msgs_in += 1;
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => dispatch(socket, conn_id, state, msg).await,
                Err(parse_err) => {
                    *invalid_json += 1;
                    if should_log(last_invalid_log) {
                        warn!(
                            bytes = text.len(),
                            error = %parse_err,
                            "failed to parse client message"
                        );
                    }
                    if *invalid_json > MAX_INVALID_JSON {
                        *close_frame = Some(CloseFrame {
                            code: close_code::POLICY,
                            reason: "too many invalid messages".into(),
                        });
                        return Ok(LoopControl::Disconnect);
                    }
                    Ok(LoopControl::Continue)
                }
            }
        }
        Some(Ok(Message::Binary(_))) => {
            *close_frame = Some(CloseFrame {
                code: close_code::UNSUPPORTED,
                reason: "binary messages not supported".into(),
            });
            Ok(LoopControl::Disconnect)
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(LoopControl::Continue),
        Some(Ok(Message::Close(_))) => Ok(LoopControl::Disconnect),
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => Ok(LoopControl::Disconnect),
    }
}

/// Requests are answered on the caller's socket; broadcasts are queued to
/// every affected member's outbound queue. Fire-and-forget events with no
/// valid context are dropped with no reply.
async fn dispatch(
    socket: &mut WebSocket,
    conn_id: u64,
    state: &Arc<AppState>,
    msg: ClientMessage,
) -> Result<LoopControl, NetError> {
    match msg {
        ClientMessage::CreateRoom {
            seq,
            mode,
            player_name,
        } => {
            // A connection holds at most one membership.
            leave_current(state, conn_id).await;
            let result = state
                .registry
                .create_room(conn_id, mode, player_name, RoomOptions::default())
                .await;
            let ack = match result {
                Ok(outcome) => {
                    publish_roster(state, &outcome.broadcast).await;
                    AckResult::Ok(RoomCreatedOk {
                        room_code: outcome.room_code,
                        room: outcome.broadcast.room,
                    })
                }
                Err(err) => AckResult::Err(err),
            };
            send_message(socket, &ServerMessage::RoomCreated { seq, result: ack }).await?;
        }

        ClientMessage::CreateLobby {
            seq,
            room_name,
            player_name,
            is_public,
            password,
            mode,
        } => {
            leave_current(state, conn_id).await;
            let options = RoomOptions {
                room_name: Some(room_name.clone()),
                is_public,
                password,
            };
            let result = state
                .registry
                .create_room(conn_id, mode, player_name, options)
                .await;
            let ack = match result {
                Ok(outcome) => {
                    publish_roster(state, &outcome.broadcast).await;
                    if outcome.lobbies_changed {
                        lobbies_update(state).await;
                    }
                    AckResult::Ok(LobbyCreatedOk {
                        room_code: outcome.room_code,
                        room: outcome.broadcast.room,
                        room_name,
                    })
                }
                Err(err) => AckResult::Err(err),
            };
            send_message(socket, &ServerMessage::LobbyCreated { seq, result: ack }).await?;
        }

        ClientMessage::JoinRoom {
            seq,
            room_code,
            player_name,
        } => {
            leave_current(state, conn_id).await;
            let result = state
                .registry
                .join_room(conn_id, &room_code, player_name, None)
                .await;
            let ack = join_ack(state, result).await;
            send_message(socket, &ServerMessage::RoomJoined { seq, result: ack }).await?;
        }

        ClientMessage::JoinLobby {
            seq,
            room_code,
            player_name,
            password,
        } => {
            leave_current(state, conn_id).await;
            let result = state
                .registry
                .join_room(conn_id, &room_code, player_name, password.as_deref())
                .await;
            let ack = join_ack(state, result).await;
            send_message(socket, &ServerMessage::RoomJoined { seq, result: ack }).await?;
        }

        ClientMessage::ToggleReady { seq } => {
            let ack = match state.registry.toggle_ready(conn_id).await {
                Ok((ready, broadcast)) => {
                    publish_roster(state, &broadcast).await;
                    AckResult::Ok(ReadyOk { ready })
                }
                Err(err) => AckResult::Err(err),
            };
            send_message(socket, &ServerMessage::ReadyToggled { seq, result: ack }).await?;
        }

        ClientMessage::SwitchTeam { seq, team } => {
            let ack = match state.registry.switch_team(conn_id, team).await {
                Ok((team, broadcast)) => {
                    publish_roster(state, &broadcast).await;
                    AckResult::Ok(TeamOk { team })
                }
                Err(err) => AckResult::Err(err),
            };
            send_message(socket, &ServerMessage::TeamSwitched { seq, result: ack }).await?;
        }

        ClientMessage::StartGame { seq } => {
            let ack = match state.registry.start_game(conn_id).await {
                Ok(outcome) => {
                    let msg = ServerMessage::GameStart {
                        room: outcome.broadcast.room.clone(),
                    };
                    state
                        .connections
                        .send_many(&outcome.broadcast.members, &msg)
                        .await;
                    if outcome.lobbies_changed {
                        lobbies_update(state).await;
                    }
                    AckResult::Ok(())
                }
                Err(err) => AckResult::Err(err),
            };
            send_message(socket, &ServerMessage::GameStarted { seq, result: ack }).await?;
        }

        ClientMessage::GetLobbies { seq } => {
            let lobbies = state.registry.public_lobbies().await;
            let ack = AckResult::Ok(LobbyListOk { lobbies });
            send_message(socket, &ServerMessage::Lobbies { seq, result: ack }).await?;
        }

        ClientMessage::GetPlayerCount { seq } => {
            let count = state.connections.count().await;
            let ack = AckResult::Ok(PlayerCountOk { count });
            send_message(socket, &ServerMessage::PlayerCount { seq, result: ack }).await?;
        }

        ClientMessage::LeaveRoom => {
            leave_current(state, conn_id).await;
        }

        ClientMessage::BuildingPlaced(mut dto) => {
            if let Some((team, others)) = state.registry.gameplay_targets(conn_id).await {
                dto.sender_team = team;
                state
                    .connections
                    .send_many(&others, &ServerMessage::BuildingPlaced(dto))
                    .await;
            }
        }

        ClientMessage::UnitSpawned(mut dto) => {
            if let Some((team, others)) = state.registry.gameplay_targets(conn_id).await {
                dto.sender_team = team;
                state
                    .connections
                    .send_many(&others, &ServerMessage::UnitSpawned(dto))
                    .await;
            }
        }

        ClientMessage::CastleDamage(dto) => {
            if let Some(members) = state.registry.castle_damage_targets(conn_id).await {
                state
                    .connections
                    .send_many(&members, &ServerMessage::CastleDamage(dto))
                    .await;
            }
        }

        ClientMessage::GameStateSync(snapshot) => {
            if let Some(others) = state.registry.accept_sync(conn_id).await {
                state
                    .connections
                    .send_many(&others, &ServerMessage::GameStateUpdate(snapshot))
                    .await;
            }
        }

        ClientMessage::GameOver { winner } => {
            if let Some(members) = state.registry.finish(conn_id, winner).await {
                state
                    .connections
                    .send_many(&members, &ServerMessage::GameOver { winner })
                    .await;
            }
        }
    }

    Ok(LoopControl::Continue)
}

async fn join_ack(
    state: &Arc<AppState>,
    result: Result<crate::use_cases::JoinOutcome, RoomError>,
) -> AckResult<RoomJoinedOk> {
    match result {
        Ok(outcome) => {
            publish_roster(state, &outcome.broadcast).await;
            if outcome.lobbies_changed {
                lobbies_update(state).await;
            }
            AckResult::Ok(RoomJoinedOk {
                room: outcome.broadcast.room,
                team: outcome.team,
            })
        }
        Err(err) => AckResult::Err(err),
    }
}

async fn publish_roster(state: &Arc<AppState>, broadcast: &RosterBroadcast) {
    state
        .connections
        .send_many(
            &broadcast.members,
            &ServerMessage::RoomUpdate(broadcast.room.clone()),
        )
        .await;
}

async fn lobbies_update(state: &Arc<AppState>) {
    state.connections.broadcast_all(&ServerMessage::LobbiesUpdate).await;
}

async fn broadcast_player_count(state: &Arc<AppState>) {
    let count = state.connections.count().await;
    state
        .connections
        .broadcast_all(&ServerMessage::PlayerCountUpdate { count })
        .await;
}

/// Removes the connection from its room and emits the follow-up
/// broadcasts. Used by `LeaveRoom`, by implicit re-joins, and by
/// disconnect cleanup.
async fn leave_current(state: &Arc<AppState>, conn_id: u64) {
    match state.registry.leave(conn_id).await {
        LeaveOutcome::NotInRoom => {}
        LeaveOutcome::RoomDeleted {
            lobbies_changed, ..
        } => {
            if lobbies_changed {
                lobbies_update(state).await;
            }
        }
        LeaveOutcome::HostMigrated {
            new_host_id,
            broadcast,
            lobbies_changed,
        } => {
            state
                .connections
                .send_many(&broadcast.members, &ServerMessage::HostChanged { new_host_id })
                .await;
            publish_roster(state, &broadcast).await;
            if lobbies_changed {
                lobbies_update(state).await;
            }
        }
        LeaveOutcome::PlayerLeft {
            broadcast,
            lobbies_changed,
        } => {
            publish_roster(state, &broadcast).await;
            if lobbies_changed {
                lobbies_update(state).await;
            }
        }
    }
}
