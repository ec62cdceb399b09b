//! Per-connection handler: handshake, identity, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version
//!   2. Open or resume the player's session → send HandshakeAck
//!   3. Spawn the writer task; put a resumed player back in their room
//!   4. Loop: receive envelopes → heartbeat, disconnect, or game command

use std::sync::Arc;

use spyfall_protocol::{
    ClientCommand, Codec, Envelope, PROTOCOL_VERSION, Payload, PlayerId, ProtocolError,
    ServerEvent, SystemMessage,
};
use spyfall_room::{PlayerSender, RoomError, RoomRequest};
use spyfall_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::SpyfallError;
use crate::server::ServerState;

/// Drop guard that releases a player's connection when the handler exits.
///
/// Runs even if the handler panics. `Drop` is synchronous, so the async
/// cleanup is a fire-and-forget task. Both locks are held together so a
/// resume on a new connection cannot slip in between the session update and
/// the room departure.
struct SessionGuard<C: Codec> {
    player_id: PlayerId,
    connection: ConnectionId,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for SessionGuard<C> {
    fn drop(&mut self) {
        let player_id = self.player_id;
        let connection = self.connection;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut sessions = state.sessions.lock().await;
            match sessions.disconnect(player_id, connection) {
                Ok(true) => {
                    state.rooms.lock().await.disconnect(player_id).await;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(%player_id, error = %e, "session already gone");
                }
            }
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), SpyfallError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    // --- Step 1: Handshake ---
    let resume_token = match perform_handshake(&conn, &state).await {
        Ok(token) => token,
        Err(e) => {
            let _ = conn.close().await;
            return Err(e);
        }
    };

    // --- Step 2: Session ---
    let (session, resumed) = state
        .sessions
        .lock()
        .await
        .handshake(resume_token.as_deref(), conn_id);
    let player_id = session.player_id;
    let _guard = SessionGuard {
        player_id,
        connection: conn_id,
        state: Arc::clone(&state),
    };
    tracing::info!(%conn_id, %player_id, resumed, "player connected");

    let ack = Envelope::new(
        0,
        state.clock_ms(),
        Payload::System(SystemMessage::HandshakeAck {
            player_id,
            resume_token: session.resume_token,
            server_time: state.clock_ms(),
        }),
    );
    conn.send(&state.codec.encode(&ack)?).await?;

    // --- Step 3: Outbound queues ---
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (system_tx, system_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_outbound(
        Arc::clone(&conn),
        Arc::clone(&state),
        events_rx,
        system_rx,
    ));

    if resumed {
        let reattached = state
            .rooms
            .lock()
            .await
            .reattach(player_id, events_tx.clone())
            .await;
        if let Some(code) = reattached {
            tracing::info!(%player_id, room_code = %code, "resumed player back in room");
        }
    }

    // --- Step 4: Message loop ---
    let result = read_loop(&conn, &state, player_id, &events_tx, &system_tx).await;

    // Closing the system queue stops the writer.
    drop(system_tx);
    let _ = writer.await;
    let _ = conn.close().await;

    // _guard drops here → session and room departure.
    result
}

/// Receives the handshake frame and returns its resume token, if any.
async fn perform_handshake<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
) -> Result<Option<String>, SpyfallError> {
    let data = match tokio::time::timeout(state.config.handshake_timeout(), conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage(
                "connection closed before handshake".into(),
            )
            .into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope = match state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            send_error(conn, state, 400, "malformed handshake").await?;
            return Err(e.into());
        }
    };

    let (version, resume_token) = match envelope.payload {
        Payload::System(SystemMessage::Handshake {
            version,
            resume_token,
        }) => (version, resume_token),
        _ => {
            send_error(conn, state, 400, "expected Handshake").await?;
            return Err(
                ProtocolError::InvalidMessage("first message must be Handshake".into()).into(),
            );
        }
    };

    if version != PROTOCOL_VERSION {
        send_error(
            conn,
            state,
            400,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    Ok(resume_token)
}

/// Reads frames until the client leaves, goes idle, or the socket fails.
async fn read_loop<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    player_id: PlayerId,
    events: &PlayerSender,
    system: &mpsc::UnboundedSender<SystemMessage>,
) -> Result<(), SpyfallError> {
    let idle = state.config.idle_timeout();

    loop {
        let data = match tokio::time::timeout(idle, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%player_id, "connection closed cleanly");
                return Ok(());
            }
            Ok(Err(e)) => {
                tracing::debug!(%player_id, error = %e, "recv error");
                return Ok(());
            }
            Err(_) => {
                tracing::info!(%player_id, "connection idle, closing");
                return Ok(());
            }
        };

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%player_id, error = %e, "failed to decode envelope");
                let _ = events.send(ServerEvent::error("Malformed message"));
                continue;
            }
        };

        match envelope.payload {
            Payload::System(msg) => {
                if handle_system_message(state, player_id, msg, system) {
                    return Ok(());
                }
            }
            Payload::Command(cmd) => {
                let command = cmd.name();
                if let Err(e) = dispatch_command(state, player_id, cmd, events).await {
                    tracing::debug!(%player_id, command, error = %e, "command rejected");
                    let _ = events.send(ServerEvent::error(e.to_string()));
                }
            }
            Payload::Event(_) => {
                tracing::warn!(%player_id, "client sent a server event, ignoring");
            }
        }
    }
}

/// Handles a system message. Returns `true` if the connection should close.
fn handle_system_message<C: Codec>(
    state: &ServerState<C>,
    player_id: PlayerId,
    msg: SystemMessage,
    system: &mpsc::UnboundedSender<SystemMessage>,
) -> bool {
    match msg {
        SystemMessage::Heartbeat { client_time } => {
            let _ = system.send(SystemMessage::HeartbeatAck {
                client_time,
                server_time: state.clock_ms(),
            });
            false
        }
        SystemMessage::Disconnect { reason } => {
            tracing::info!(%player_id, %reason, "client disconnected");
            true
        }
        other => {
            tracing::warn!(%player_id, message = ?other, "ignoring unexpected system message");
            false
        }
    }
}

/// Runs one game command against the registry or the player's room.
async fn dispatch_command<C: Codec>(
    state: &ServerState<C>,
    player: PlayerId,
    cmd: ClientCommand,
    events: &PlayerSender,
) -> Result<(), RoomError> {
    tracing::debug!(%player, command = cmd.name(), "command received");

    let (room_code, request) = match cmd {
        ClientCommand::CreateRoom { player_name } => {
            let mut rooms = state.rooms.lock().await;
            rooms
                .create_room(player, &player_name, events.clone())
                .await?;
            return Ok(());
        }
        ClientCommand::JoinRoom {
            room_code,
            player_name,
        } => {
            let mut rooms = state.rooms.lock().await;
            return rooms
                .join_room(&room_code, player, &player_name, events.clone())
                .await;
        }
        ClientCommand::LeaveRoom { room_code } => {
            let mut rooms = state.rooms.lock().await;
            return rooms.leave_room(&room_code, player).await;
        }
        ClientCommand::UpdateSettings {
            room_code,
            settings,
        } => (room_code, RoomRequest::UpdateSettings(settings)),
        ClientCommand::StartGame { room_code } => (room_code, RoomRequest::StartGame),
        ClientCommand::SendMessage { room_code, message } => {
            (room_code, RoomRequest::SendMessage(message))
        }
        ClientCommand::CastVote {
            room_code,
            target_id,
        } => (room_code, RoomRequest::CastVote(target_id)),
        ClientCommand::ResetRoom { room_code } => (room_code, RoomRequest::Reset),
    };

    // Room-scoped requests only need the handle; the registry is released
    // before waiting on the actor.
    let handle = state.rooms.lock().await.lookup(&room_code)?;
    handle.request(player, request).await
}

/// Stamps sequence numbers and writes both outbound queues to the socket.
///
/// Stops when the handler closes the system queue or a send fails.
async fn write_outbound<C: Codec>(
    conn: Arc<WebSocketConnection>,
    state: Arc<ServerState<C>>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    mut system: mpsc::UnboundedReceiver<SystemMessage>,
) {
    let mut seq: u64 = 1;

    loop {
        let payload = tokio::select! {
            biased;
            msg = system.recv() => match msg {
                Some(msg) => Payload::System(msg),
                None => break,
            },
            event = events.recv() => match event {
                Some(event) => Payload::Event(event),
                None => break,
            },
        };

        let envelope = Envelope::new(next_seq(&mut seq), state.clock_ms(), payload);
        let bytes = match state.codec.encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outbound envelope");
                continue;
            }
        };
        if let Err(e) = conn.send(&bytes).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed, writer stopping");
            break;
        }
    }
}

/// Sends a `SystemMessage::Error` envelope straight to the socket, before
/// the writer task exists.
async fn send_error<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    code: u16,
    message: &str,
) -> Result<(), SpyfallError> {
    let envelope = Envelope::new(
        0,
        state.clock_ms(),
        Payload::System(SystemMessage::Error {
            code,
            message: message.to_string(),
        }),
    );
    let bytes = state.codec.encode(&envelope)?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
