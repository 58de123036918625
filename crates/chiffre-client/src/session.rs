//! Realtime protocol state machine.
//!
//! [`RealtimeSession`] layers the chat protocol over an injected relay
//! connection: join and presence snapshots, encrypted message relay with
//! optimistic echo and redelivery dedup, and per-room typing debounce.
//!
//! The session runs in a dedicated tokio task addressed through typed
//! command and event channels.  Exactly one loop owns the inbound end of
//! the connection, and a reconnect swaps the connection handle wholesale --
//! re-establishing the session therefore replaces the previous event
//! binding rather than stacking a second consumer of the same frames.
//!
//! Each command, inbound frame, or timer expiry is processed to completion
//! before the next one; presence and typing state are only ever mutated as
//! wholesale snapshot replacements or single set operations inside that
//! flow.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

use chiffre_shared::constants::TYPING_QUIET_PERIOD_MS;
use chiffre_shared::crypto::{self, SymmetricKey};
use chiffre_shared::protocol::{ClientFrame, Envelope, RelayFrame};

use crate::error::SessionError;
use crate::transport::RelayConn;

/// Protocol states.  `Joined` is the only state in which sending and
/// typing are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Joined,
}

/// A decrypted, display-ready timeline record.
///
/// The timeline is append-only; ordering is arrival order, not causal
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Commands sent *into* the session task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Encrypt and send a room message.
    Send { room: String, text: String },
    /// Encrypt and send a direct message to a single recipient.
    SendDirect { to: String, text: String },
    /// Signal that the local user is typing in a room.
    Typing { room: String },
    /// Explicitly stop the typing signal for a room.
    StopTyping { room: String },
    /// Request a snapshot of the current session state.
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Attach a fresh relay connection and re-issue the join.
    Reconnect(RelayConn),
    /// Release the transport; safe to call when already disconnected.
    Disconnect,
}

/// Notifications sent *from* the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The relay acknowledged the join with its first presence snapshot.
    Joined,
    /// The transport was released or lost.
    Disconnected,
    /// A message was decrypted and appended to the timeline.
    MessageReceived(ConversationEntry),
    /// The relay pushed a presence snapshot, replacing any prior roster.
    PresenceReplaced(Vec<String>),
    /// A remote user started typing in a room.
    TypingStarted { room: String, sender: String },
    /// A remote user stopped typing in a room.
    TypingStopped { room: String, sender: String },
    /// An inbound message failed validation or decryption and was dropped.
    /// The session continues; nothing reaches the timeline.
    MessageDiscarded { sender: String, reason: String },
    /// An outbound send was rejected.
    SendFailed { room: String, error: SessionError },
}

/// Point-in-time view of the session state.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub presence: Vec<String>,
    pub typing: HashMap<String, HashSet<String>>,
    pub timeline: Vec<ConversationEntry>,
}

/// Configuration for spawning a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identity announced to the relay.
    pub username: String,
    /// Shared symmetric key for payload encryption.
    pub key: SymmetricKey,
    /// Quiet period after the last keystroke before stop-typing fires.
    pub quiet_period: Duration,
}

impl SessionConfig {
    pub fn new(username: impl Into<String>, key: SymmetricKey) -> Self {
        Self {
            username: username.into(),
            key,
            quiet_period: Duration::from_millis(TYPING_QUIET_PERIOD_MS),
        }
    }
}

// ---------------------------------------------------------------------------
// Core state machine
// ---------------------------------------------------------------------------

/// Deterministic inner state machine.
///
/// Owns the presence snapshot, the per-room typing sets, the timeline, and
/// the per-room debounce deadlines.  Performs no I/O, so every protocol
/// rule is testable without a transport.
struct SessionCore {
    username: String,
    key: SymmetricKey,
    quiet_period: Duration,
    state: SessionState,
    presence: Vec<String>,
    typing: HashMap<String, HashSet<String>>,
    timeline: Vec<ConversationEntry>,
    typing_deadlines: HashMap<String, Instant>,
}

impl SessionCore {
    fn new(config: SessionConfig) -> Self {
        Self {
            username: config.username,
            key: config.key,
            quiet_period: config.quiet_period,
            state: SessionState::Disconnected,
            presence: Vec::new(),
            typing: HashMap::new(),
            timeline: Vec::new(),
            typing_deadlines: HashMap::new(),
        }
    }

    /// Frame announcing our identity; moves to `Connecting`.
    fn begin_join(&mut self) -> ClientFrame {
        self.state = SessionState::Connecting;
        ClientFrame::Join {
            username: self.username.clone(),
        }
    }

    /// Apply one inbound relay frame.
    fn handle_frame(&mut self, frame: RelayFrame) -> Vec<SessionEvent> {
        match frame {
            RelayFrame::UserList(users) => {
                let mut events = Vec::new();
                if self.state == SessionState::Connecting {
                    // the snapshot is the relay's join acknowledgment
                    self.state = SessionState::Joined;
                    info!(user = %self.username, "Join acknowledged");
                    events.push(SessionEvent::Joined);
                }
                // authoritative full snapshot: replace wholesale, never merge
                self.presence = users.clone();
                events.push(SessionEvent::PresenceReplaced(users));
                events
            }

            RelayFrame::Message(envelope) | RelayFrame::DirectMessage(envelope) => {
                self.receive(envelope)
            }

            RelayFrame::Typing { room, sender } => {
                let inserted = self
                    .typing
                    .entry(room.clone())
                    .or_default()
                    .insert(sender.clone());
                if inserted {
                    vec![SessionEvent::TypingStarted { room, sender }]
                } else {
                    Vec::new()
                }
            }

            RelayFrame::StopTyping { room, sender } => {
                // removal of an absent identity is a no-op
                let removed = self
                    .typing
                    .get_mut(&room)
                    .map(|senders| senders.remove(&sender))
                    .unwrap_or(false);
                if removed {
                    vec![SessionEvent::TypingStopped { room, sender }]
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Validate, decrypt, dedup, and append one inbound envelope.
    fn receive(&mut self, envelope: Envelope) -> Vec<SessionEvent> {
        // the relay reflects our own messages back; the optimistic echo
        // already covers them
        if envelope.sender == self.username {
            debug!(room = %envelope.room, "Discarding reflected own message");
            return Vec::new();
        }

        if let Err(e) = envelope.validate() {
            warn!(sender = %envelope.sender, error = %e, "Dropping malformed envelope");
            return vec![SessionEvent::MessageDiscarded {
                sender: envelope.sender,
                reason: e.to_string(),
            }];
        }

        let plaintext = match crypto::decrypt(&self.key, &envelope.ciphertext, &envelope.nonce) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(
                    sender = %envelope.sender,
                    room = %envelope.room,
                    error = %e,
                    "Dropping undecryptable message"
                );
                return vec![SessionEvent::MessageDiscarded {
                    sender: envelope.sender,
                    reason: e.to_string(),
                }];
            }
        };

        let text = match String::from_utf8(plaintext) {
            Ok(text) => text,
            Err(_) => {
                warn!(sender = %envelope.sender, "Dropping non-UTF-8 payload");
                return vec![SessionEvent::MessageDiscarded {
                    sender: envelope.sender,
                    reason: "payload is not valid UTF-8".to_string(),
                }];
            }
        };

        // at-least-once relays redeliver; suppress an immediately
        // consecutive duplicate
        if let Some(last) = self.timeline.last() {
            if last.sender == envelope.sender && last.text == text {
                debug!(sender = %envelope.sender, "Suppressing duplicate delivery");
                return Vec::new();
            }
        }

        let entry = ConversationEntry {
            sender: envelope.sender,
            text,
            timestamp: Utc::now(),
        };
        self.timeline.push(entry.clone());
        vec![SessionEvent::MessageReceived(entry)]
    }

    /// Encrypt a message and append the optimistic local echo.
    ///
    /// The echo is the locally known plaintext under our own identity; it
    /// bypasses the decrypt path entirely.
    fn prepare_send(&mut self, room: &str, text: &str) -> Result<Envelope, SessionError> {
        if self.state != SessionState::Joined {
            return Err(SessionError::NotJoined);
        }

        let (ciphertext, nonce) = crypto::encrypt(&self.key, text.as_bytes())
            .map_err(|e| SessionError::Encryption(e.to_string()))?;

        self.timeline.push(ConversationEntry {
            sender: self.username.clone(),
            text: text.to_string(),
            timestamp: Utc::now(),
        });

        Ok(Envelope {
            room: room.to_string(),
            sender: self.username.clone(),
            ciphertext,
            nonce,
        })
    }

    /// Emit a typing signal and (re)schedule the room's stop-typing
    /// deadline.  Last-write-wins: a new keystroke replaces the pending
    /// deadline instead of stacking a second timer.
    fn start_typing(&mut self, room: &str, now: Instant) -> Option<ClientFrame> {
        if self.state != SessionState::Joined {
            return None;
        }
        self.typing_deadlines
            .insert(room.to_string(), now + self.quiet_period);
        Some(ClientFrame::Typing {
            room: room.to_string(),
        })
    }

    /// Explicit stop-typing; cancels the pending deadline for the room.
    fn stop_typing(&mut self, room: &str) -> Option<ClientFrame> {
        self.typing_deadlines.remove(room);
        if self.state != SessionState::Joined {
            return None;
        }
        Some(ClientFrame::StopTyping {
            room: room.to_string(),
        })
    }

    /// Stop-typing frames for every room whose quiet period has elapsed.
    fn expire_typing(&mut self, now: Instant) -> Vec<ClientFrame> {
        let expired: Vec<String> = self
            .typing_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(room, _)| room.clone())
            .collect();

        expired
            .into_iter()
            .map(|room| {
                self.typing_deadlines.remove(&room);
                debug!(room = %room, "Typing quiet period elapsed");
                ClientFrame::StopTyping { room }
            })
            .collect()
    }

    /// Earliest pending stop-typing deadline, if any.
    fn next_typing_deadline(&self) -> Option<Instant> {
        self.typing_deadlines.values().min().copied()
    }

    /// Transition to `Disconnected` and drop pending debounce deadlines.
    /// Idempotent: returns `None` when already disconnected.
    fn mark_disconnected(&mut self) -> Option<SessionEvent> {
        self.typing_deadlines.clear();
        if self.state == SessionState::Disconnected {
            return None;
        }
        self.state = SessionState::Disconnected;
        Some(SessionEvent::Disconnected)
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            presence: self.presence.clone(),
            typing: self.typing.clone(),
            timeline: self.timeline.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

/// Handle for driving a spawned session task.
///
/// Cheap to clone; all clones address the same session.  Dropping every
/// handle terminates the task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    /// Encrypt and send a room message.
    pub async fn send(
        &self,
        room: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.command(SessionCommand::Send {
            room: room.into(),
            text: text.into(),
        })
        .await
    }

    /// Encrypt and send a direct message to a single recipient.
    pub async fn send_direct(
        &self,
        to: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.command(SessionCommand::SendDirect {
            to: to.into(),
            text: text.into(),
        })
        .await
    }

    /// Signal that the local user is typing in a room.
    pub async fn typing(&self, room: impl Into<String>) -> Result<(), SessionError> {
        self.command(SessionCommand::Typing { room: room.into() }).await
    }

    /// Explicitly stop the typing signal for a room.
    pub async fn stop_typing(&self, room: impl Into<String>) -> Result<(), SessionError> {
        self.command(SessionCommand::StopTyping { room: room.into() })
            .await
    }

    /// Fetch a snapshot of the current session state.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(SessionCommand::Snapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Attach a fresh relay connection and re-issue the join.
    pub async fn reconnect(&self, conn: RelayConn) -> Result<(), SessionError> {
        self.command(SessionCommand::Reconnect(conn)).await
    }

    /// Release the transport.  Safe to call when already disconnected.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.command(SessionCommand::Disconnect).await
    }

    async fn command(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx.send(cmd).await.map_err(|_| SessionError::Closed)
    }
}

/// The realtime session entry point.
pub struct RealtimeSession;

impl RealtimeSession {
    /// Spawn the session event loop over an owned relay connection.
    ///
    /// Announces `Join` immediately and transitions to `Joined` once the
    /// relay answers with its first presence snapshot.
    ///
    /// # Returns
    ///
    /// `(handle, event_rx)` -- the command handle and the notification
    /// stream.
    pub fn spawn(
        config: SessionConfig,
        conn: RelayConn,
    ) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(64);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(256);

        let core = SessionCore::new(config);
        tokio::spawn(session_loop(core, conn, cmd_rx, event_tx));

        (SessionHandle { cmd_tx }, event_rx)
    }
}

/// One unit of work resolved by the select loop.
enum Activity {
    Cmd(Option<SessionCommand>),
    Frame(Option<RelayFrame>),
    TypingExpired,
}

async fn session_loop(
    mut core: SessionCore,
    conn: RelayConn,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    let mut conn = Some(conn);

    // announce ourselves on the fresh connection
    let join = core.begin_join();
    send_frame(&mut core, &mut conn, &event_tx, join).await;

    loop {
        let deadline = core.next_typing_deadline();

        let activity = tokio::select! {
            cmd = cmd_rx.recv() => Activity::Cmd(cmd),
            frame = recv_frame(&mut conn) => Activity::Frame(frame),
            () = typing_timer(deadline) => Activity::TypingExpired,
        };

        match activity {
            Activity::Cmd(None) => {
                debug!("Command channel closed, stopping session task");
                break;
            }

            Activity::Cmd(Some(cmd)) => match cmd {
                SessionCommand::Send { room, text } => {
                    match core.prepare_send(&room, &text) {
                        Ok(envelope) => {
                            send_frame(&mut core, &mut conn, &event_tx, ClientFrame::Message(envelope))
                                .await;
                        }
                        Err(error) => {
                            warn!(room = %room, error = %error, "Send rejected");
                            let _ = event_tx
                                .send(SessionEvent::SendFailed { room, error })
                                .await;
                        }
                    }
                }

                SessionCommand::SendDirect { to, text } => {
                    match core.prepare_send(&to, &text) {
                        Ok(envelope) => {
                            let frame = ClientFrame::DirectMessage { to, envelope };
                            send_frame(&mut core, &mut conn, &event_tx, frame).await;
                        }
                        Err(error) => {
                            warn!(to = %to, error = %error, "Direct send rejected");
                            let _ = event_tx
                                .send(SessionEvent::SendFailed { room: to, error })
                                .await;
                        }
                    }
                }

                SessionCommand::Typing { room } => {
                    if let Some(frame) = core.start_typing(&room, Instant::now()) {
                        send_frame(&mut core, &mut conn, &event_tx, frame).await;
                    }
                }

                SessionCommand::StopTyping { room } => {
                    if let Some(frame) = core.stop_typing(&room) {
                        send_frame(&mut core, &mut conn, &event_tx, frame).await;
                    }
                }

                SessionCommand::Snapshot(reply) => {
                    let _ = reply.send(core.snapshot());
                }

                SessionCommand::Reconnect(new_conn) => {
                    // the previous connection (if any) is dropped wholesale
                    // before the new one is installed, so no stale binding
                    // survives a re-initialisation
                    info!(user = %core.username, "Reconnecting");
                    conn = Some(new_conn);
                    let join = core.begin_join();
                    send_frame(&mut core, &mut conn, &event_tx, join).await;
                }

                SessionCommand::Disconnect => {
                    conn = None;
                    if let Some(event) = core.mark_disconnected() {
                        info!(user = %core.username, "Session disconnected");
                        let _ = event_tx.send(event).await;
                    }
                }
            },

            Activity::Frame(None) => {
                // transport loss: degrade to Disconnected, eligible for
                // reconnect
                conn = None;
                if let Some(event) = core.mark_disconnected() {
                    warn!(user = %core.username, "Transport lost");
                    let _ = event_tx.send(event).await;
                }
            }

            Activity::Frame(Some(frame)) => {
                for event in core.handle_frame(frame) {
                    let _ = event_tx.send(event).await;
                }
            }

            Activity::TypingExpired => {
                for frame in core.expire_typing(Instant::now()) {
                    send_frame(&mut core, &mut conn, &event_tx, frame).await;
                }
            }
        }
    }
}

/// Receive from the current connection, or park forever when detached.
async fn recv_frame(conn: &mut Option<RelayConn>) -> Option<RelayFrame> {
    match conn.as_mut() {
        Some(c) => c.inbound.recv().await,
        None => std::future::pending().await,
    }
}

/// Sleep until the earliest typing deadline, or park forever without one.
async fn typing_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Push a frame to the relay; a closed transport degrades the session.
async fn send_frame(
    core: &mut SessionCore,
    conn: &mut Option<RelayConn>,
    event_tx: &mpsc::Sender<SessionEvent>,
    frame: ClientFrame,
) {
    let Some(c) = conn.as_ref() else {
        return;
    };

    if c.outbound.send(frame).await.is_err() {
        *conn = None;
        if let Some(event) = core.mark_disconnected() {
            warn!(user = %core.username, "Transport lost while sending");
            let _ = event_tx.send(event).await;
        }
    }
}
