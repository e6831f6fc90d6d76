//! Protocol client: connection, handshake and receive loop.
//!
//! [`RadarClient::connect`] opens the socket, sends the login packet and hands
//! off to two background tasks before returning:
//!
//! - the reader task owns the read half and forwards decoded frames;
//! - the dispatcher task owns the write half, drives the handshake, answers
//!   every readback, sends the keepalive and is the only writer of the
//!   registries.
//!
//! State changes are broadcast via a [`watch`] channel; everything a user
//! should see goes through the [`NotificationBus`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{RwLock, mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};

use crate::framing::{
    Frame, FrameConfig, FrameError, echo_frame, read_frame, write_ack, write_frame,
};
use crate::messages::{MessageType, Readback, VERSION_ACK_CODE};
use crate::notify::{DEFAULT_HISTORY_LIMIT, Notification, NotificationBus};
use crate::records::{
    RecordError, build_chat_packet, build_keepalive, build_login_packet,
    build_query_air_state, build_roster_request, decode_chat_text, decode_field_name,
    decode_flight_state, decode_ground_object, decode_removed_ground_id, decode_removed_id, decode_user_entry,
};
use crate::registry::{
    Aircraft, LiveRegistries, NavFilter, NavPoint, USER_TIMEOUT, User,
    radar_point_from_ground_object,
};
use crate::socket::{SocketConfig, configure_stream};

/// Default server port.
pub const DEFAULT_PORT: u16 = 7915;

/// Default interval between roster-request keepalives.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Default time `disconnect` waits for the dispatcher before aborting it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Frames buffered between the reader and the dispatcher.
const FRAME_QUEUE_DEPTH: usize = 64;

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket. Initial and terminal state.
    Disconnected,
    /// Attempting to establish a TCP connection.
    Connecting,
    /// Login sent, answering the server's readback sequence.
    AwaitingHandshake,
    /// Handshake complete, telemetry flowing.
    Connected,
}

/// Observable connection state backed by a [`watch`] channel.
///
/// Multiple subscribers can observe state transitions without polling.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    /// Set the current connection state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            tracing::info!("connection state {previous:?} -> {state:?}");
        }
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

// ---------------------------------------------------------------------------
// Configuration and errors
// ---------------------------------------------------------------------------

/// Tunables for [`RadarClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Minimum time between keepalives once connected. Default: 5 s.
    pub keepalive_interval: Duration,
    /// Roster idle time before a user is flagged. Default: 15 s.
    pub user_timeout: Duration,
    pub frame: FrameConfig,
    pub socket: SocketConfig,
    /// Which ground objects become navigation points.
    pub nav_filter: NavFilter,
    /// Status messages kept by the notification bus.
    pub history_limit: usize,
    /// How long `disconnect` waits for pending writes before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: KEEPALIVE_INTERVAL,
            user_timeout: USER_TIMEOUT,
            frame: FrameConfig::default(),
            socket: SocketConfig::default(),
            nav_filter: NavFilter::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            shutdown_grace: SHUTDOWN_GRACE,
        }
    }
}

/// Errors returned by [`RadarClient`] operations.
///
/// Every failure is also published on the notification bus.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The TCP connection could not be established.
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// The login packet could not be built.
    #[error("invalid login: {0}")]
    Login(#[from] RecordError),
    /// A session is already running.
    #[error("already connected")]
    AlreadyConnected,
    /// The operation needs a completed handshake.
    #[error("not connected")]
    NotConnected,
    /// Writing to the socket failed.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Human-readable cause of a failed connect.
fn connect_failure_message(err: &std::io::Error) -> &'static str {
    match err.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            "Connection failed, have you used the correct port?"
        }
        _ => "Connection failed, have you used the correct address?",
    }
}

// ---------------------------------------------------------------------------
// RadarClient
// ---------------------------------------------------------------------------

enum Command {
    Chat(String),
}

struct Session {
    commands: mpsc::UnboundedSender<Command>,
    shutdown_tx: watch::Sender<bool>,
    dispatcher: JoinHandle<()>,
    reader: AbortHandle,
}

/// Resets the state to `Disconnected` unless disarmed, so a `connect` that
/// fails or is dropped part-way never leaves the client stuck in `Connecting`.
struct ConnectAttempt<'a> {
    state: &'a ConnectionStateWatch,
    armed: bool,
}

impl<'a> ConnectAttempt<'a> {
    fn begin(state: &'a ConnectionStateWatch) -> Self {
        state.set(ConnectionState::Connecting);
        Self { state, armed: true }
    }

    fn succeed(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.set(ConnectionState::Disconnected);
        }
    }
}

/// Handle to a radar connection and the live model it maintains.
///
/// Registries are read through snapshot accessors ([`RadarClient::planes`],
/// [`RadarClient::users`], [`RadarClient::nav_points`]) so callers never hold
/// the lock while iterating.
pub struct RadarClient {
    config: Arc<ClientConfig>,
    state: Arc<ConnectionStateWatch>,
    live: Arc<RwLock<LiveRegistries>>,
    bus: Arc<NotificationBus>,
    session: Option<Session>,
}

impl Default for RadarClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl RadarClient {
    pub fn new(config: ClientConfig) -> Self {
        let bus = Arc::new(NotificationBus::new(config.history_limit));
        Self {
            config: Arc::new(config),
            state: Arc::new(ConnectionStateWatch::new()),
            live: Arc::new(RwLock::new(LiveRegistries::new())),
            bus,
            session: None,
        }
    }

    /// Connect to `host:port` and log in as `username`.
    ///
    /// Returns once the login packet is written and the receive loop is
    /// running; the handshake completes in the background. Failures are
    /// published on the notification bus as well as returned.
    pub async fn connect(
        &mut self,
        host: &str,
        port: u16,
        username: &str,
        version: u32,
    ) -> Result<(), ClientError> {
        if self.state.current() != ConnectionState::Disconnected {
            return Err(ClientError::AlreadyConnected);
        }
        // Reap a session that ended on its own.
        if let Some(old) = self.session.take() {
            let _ = old.dispatcher.await;
        }

        let login = match build_login_packet(username, version) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("login rejected locally: {e}");
                self.bus.publish(Notification::status(format!("Login failed: {e}")));
                return Err(e.into());
            }
        };

        let addr = format!("{host}:{port}");
        let attempt = ConnectAttempt::begin(&self.state);
        tracing::info!("connecting to {addr} as '{username}' (version {version})");

        let stream = match TcpStream::connect((host, port)).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("connect to {addr} failed: {e}");
                self.bus.publish(Notification::status(connect_failure_message(&e)));
                return Err(ClientError::Connect { addr, source: e });
            }
        };
        if let Err(e) = configure_stream(&stream, &self.config.socket) {
            tracing::warn!("could not apply socket options: {e}");
        }

        let (reader, mut writer) = stream.into_split();
        if let Err(e) =
            write_frame(&mut writer, login.message_type(), &login.payload, &self.config.frame).await
        {
            tracing::warn!("sending login failed: {e}");
            self.bus.publish(Notification::status("Connection lost"));
            return Err(e.into());
        }

        self.live.write().await.clear();
        self.state.set(ConnectionState::AwaitingHandshake);
        attempt.succeed();
        self.bus.publish(Notification::status("Logging in"));

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let frame_config = self.config.frame.clone();
        let reader_task = tokio::spawn(read_loop(reader, frame_config, frame_tx));
        let reader = reader_task.abort_handle();

        let dispatcher = Dispatcher {
            writer,
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
            live: Arc::clone(&self.live),
            bus: Arc::clone(&self.bus),
            last_keepalive: tokio::time::Instant::now(),
        };
        let dispatcher =
            tokio::spawn(dispatcher.run(frame_rx, command_rx, shutdown_rx, reader_task));

        self.session = Some(Session {
            commands: command_tx,
            shutdown_tx,
            dispatcher,
            reader,
        });
        Ok(())
    }

    /// Close the connection and wait for the background tasks to finish.
    ///
    /// A dispatcher stuck writing to a peer that stopped reading is aborted
    /// after [`ClientConfig::shutdown_grace`], which drops the socket.
    pub async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let _ = session.shutdown_tx.send(true);
        let grace = self.config.shutdown_grace;
        if tokio::time::timeout(grace, &mut session.dispatcher)
            .await
            .is_err()
        {
            tracing::warn!("dispatcher did not stop within {grace:?}, aborting");
            session.dispatcher.abort();
            session.reader.abort();
            let _ = session.dispatcher.await;
        }

        self.state.set(ConnectionState::Disconnected);
        self.bus.publish(Notification::status("Disconnected"));
    }

    /// Send a chat line to the server. Only valid once logged in.
    pub fn send_chat_message(&self, text: &str) -> Result<(), ClientError> {
        if self.state.current() != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let session = self.session.as_ref().ok_or(ClientError::NotConnected)?;
        session
            .commands
            .send(Command::Chat(text.to_string()))
            .map_err(|_| ClientError::NotConnected)
    }

    /// Return the connection state watch.
    pub fn state(&self) -> &Arc<ConnectionStateWatch> {
        &self.state
    }

    pub fn notifications(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    /// Shared handle to the registries, for callers that need more than the
    /// snapshot accessors. Hold the read lock briefly.
    pub fn registries(&self) -> Arc<RwLock<LiveRegistries>> {
        Arc::clone(&self.live)
    }

    /// Snapshot of the roster. Stale users are flagged first, so rows due for
    /// removal carry `marked_for_removal`.
    pub async fn users(&self) -> Vec<User> {
        let mut live = self.live.write().await;
        live.users.evict_stale(Instant::now(), self.config.user_timeout);
        live.users.iter().cloned().collect()
    }

    /// Remove flagged users and return them so mirrors can drop their rows.
    pub async fn purge_users(&self) -> Vec<User> {
        self.live.write().await.users.purge_flagged()
    }

    pub async fn planes(&self) -> Vec<Aircraft> {
        self.live.read().await.aircraft.iter().cloned().collect()
    }

    pub async fn nav_points(&self) -> Vec<NavPoint> {
        self.live.read().await.navigation.iter().cloned().collect()
    }

    /// Set or clear the display callsign of an aircraft.
    pub async fn set_callsign(&self, id: u32, callsign: Option<String>) -> bool {
        self.live.write().await.aircraft.set_callsign(id, callsign)
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

/// Read frames until the stream fails or the dispatcher goes away.
async fn read_loop(
    mut reader: OwnedReadHalf,
    config: FrameConfig,
    frames: mpsc::Sender<Result<Frame, FrameError>>,
) {
    loop {
        let result = read_frame(&mut reader, &config).await;
        let fatal = matches!(&result, Err(e) if !e.is_recoverable());
        if frames.send(result).await.is_err() || fatal {
            break;
        }
    }
}

/// Why the receive loop stopped.
enum LoopExit {
    Shutdown,
    Lost,
}

struct Dispatcher {
    writer: OwnedWriteHalf,
    config: Arc<ClientConfig>,
    state: Arc<ConnectionStateWatch>,
    live: Arc<RwLock<LiveRegistries>>,
    bus: Arc<NotificationBus>,
    last_keepalive: tokio::time::Instant,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut frames: mpsc::Receiver<Result<Frame, FrameError>>,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut shutdown: watch::Receiver<bool>,
        reader: JoinHandle<()>,
    ) {
        let keepalive = tokio::time::sleep_until(self.next_keepalive_at());
        tokio::pin!(keepalive);

        let exit = loop {
            let step = tokio::select! {
                frame = frames.recv() => match frame {
                    Some(Ok(frame)) => self.on_frame(frame).await,
                    Some(Err(e)) if e.is_recoverable() => {
                        tracing::warn!("dropping frame: {e}");
                        Ok(())
                    }
                    Some(Err(e)) => {
                        tracing::info!("receive loop ending: {e}");
                        break LoopExit::Lost;
                    }
                    None => break LoopExit::Lost,
                },
                () = &mut keepalive => {
                    let sent = self.maybe_keepalive().await;
                    keepalive.as_mut().reset(self.next_keepalive_at());
                    sent
                }
                command = commands.recv() => match command {
                    Some(Command::Chat(text)) => self.send(&build_chat_packet(&text)).await,
                    None => break LoopExit::Shutdown,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break LoopExit::Shutdown;
                    }
                    Ok(())
                }
            };
            if let Err(e) = step {
                tracing::warn!("write failed: {e}");
                break LoopExit::Lost;
            }
        };

        reader.abort();
        let _ = self.writer.shutdown().await;

        if let LoopExit::Lost = exit {
            self.state.set(ConnectionState::Disconnected);
            self.bus.publish(Notification::status("Connection lost"));
        }
    }

    async fn on_frame(&mut self, frame: Frame) -> Result<(), FrameError> {
        self.maybe_keepalive().await?;
        self.dispatch(frame).await
    }

    async fn send(&mut self, frame: &Frame) -> Result<(), FrameError> {
        write_frame(
            &mut self.writer,
            frame.message_type(),
            &frame.payload,
            &self.config.frame,
        )
        .await
    }

    async fn ack(&mut self, code: i32) -> Result<(), FrameError> {
        write_ack(&mut self.writer, code, 0).await
    }

    fn notify(&self, text: &str) {
        self.bus.publish(Notification::status(text));
    }

    /// When the keepalive timer should next fire.
    fn next_keepalive_at(&self) -> tokio::time::Instant {
        let interval = self.config.keepalive_interval;
        if self.state.current() == ConnectionState::Connected {
            self.last_keepalive + interval
        } else {
            tokio::time::Instant::now() + interval
        }
    }

    /// Send a roster request if connected and the interval has elapsed.
    async fn maybe_keepalive(&mut self) -> Result<(), FrameError> {
        if self.state.current() != ConnectionState::Connected
            || self.last_keepalive.elapsed() < self.config.keepalive_interval
        {
            return Ok(());
        }
        tracing::trace!("keepalive");
        self.last_keepalive = tokio::time::Instant::now();
        self.send(&build_keepalive()).await
    }

    async fn dispatch(&mut self, frame: Frame) -> Result<(), FrameError> {
        let kind = frame.message_type();
        tracing::trace!(?kind, len = frame.payload.len(), "frame");

        match kind {
            MessageType::VersionNotify => {
                self.ack(VERSION_ACK_CODE).await?;
                self.notify("Verifying version");
            }
            MessageType::UseMissile => {
                self.ack(Readback::UseMissile.code()).await?;
                self.notify("Verifying missile usage");
            }
            MessageType::UseUnguidedWeapon => {
                self.ack(Readback::UseUnguidedWeapon.code()).await?;
                self.notify("Verifying unguided weapon usage");
            }
            MessageType::CtrlShowUsername => {
                self.ack(Readback::CtrlShowUsername.code()).await?;
                self.notify("Verifying username display");
            }
            MessageType::LoadField => {
                echo_frame(&mut self.writer, &frame).await?;
                let field = decode_field_name(&frame.payload).unwrap_or_else(|| {
                    tracing::debug!("field name is not UTF-8");
                    "Unknown".to_string()
                });
                tracing::info!("server field: {field}");
                self.notify("Verifying map");
                self.bus.publish(Notification::Map(field));
            }
            MessageType::ConfigString => {
                self.send(&Frame::new(kind, frame.payload)).await?;
                self.notify("Verifying config");
            }
            MessageType::List => {
                self.send(&Frame::new(kind, frame.payload)).await?;
                self.notify("Verifying aircraft list");
            }
            MessageType::PrepareSimulation | MessageType::Logon => {
                self.complete_login().await?;
            }
            MessageType::Environment => {
                self.ack(Readback::Environment.code()).await?;
                self.notify("Verifying environment");
            }
            MessageType::ListUser => match decode_user_entry(&frame.payload) {
                Some(entry) if !entry.name.is_empty() => {
                    self.live.write().await.users.upsert(&entry, Instant::now());
                }
                _ => tracing::debug!("undecodable roster entry"),
            },
            MessageType::AddObject => {
                let point = decode_ground_object(&frame.payload)
                    .and_then(|g| radar_point_from_ground_object(&g, &self.config.nav_filter));
                if let Some(point) = point {
                    tracing::debug!(id = point.id, kind = %point.kind, name = %point.name, "nav point");
                    self.live.write().await.navigation.upsert(point);
                }
            }
            MessageType::AirplaneState => match decode_flight_state(&frame.payload) {
                Some(state) => {
                    let mut live = self.live.write().await;
                    let LiveRegistries {
                        users, aircraft, ..
                    } = &mut *live;
                    aircraft.upsert(&state, users, Instant::now());
                }
                None => tracing::debug!("undecodable flight state"),
            },
            MessageType::RemoveAirplane => {
                if let Some(id) = decode_removed_id(&frame.payload) {
                    let mut live = self.live.write().await;
                    let plane = live.aircraft.remove(id);
                    let user = i32::try_from(id)
                        .ok()
                        .and_then(|id| live.users.remove_by_id(id));
                    tracing::debug!(
                        id,
                        plane = plane.is_some(),
                        user = user.is_some(),
                        "aircraft removed"
                    );
                }
            }
            MessageType::RemoveGround => {
                if let Some(id) = decode_removed_ground_id(&frame.payload) {
                    let point = self.live.write().await.navigation.remove(id);
                    tracing::debug!(id, nav = point.is_some(), "ground object removed");
                }
            }
            MessageType::RejectJoinReq => {
                tracing::info!("join request rejected");
                self.bus.publish(Notification::Rejected);
            }
            MessageType::TextMessage => {
                self.bus
                    .publish(Notification::Chat(decode_chat_text(&frame.payload)));
            }
            _ if frame.is_null() => {}
            other => tracing::trace!(?other, "ignoring frame"),
        }
        Ok(())
    }

    /// Handle `PREPARESIMULATION`/`LOGON`: acknowledge, request the initial
    /// air state and roster, and enter [`ConnectionState::Connected`] once.
    async fn complete_login(&mut self) -> Result<(), FrameError> {
        self.ack(Readback::Prepare.code()).await?;
        if self.state.current() == ConnectionState::Connected {
            tracing::debug!("login already complete");
            return Ok(());
        }

        self.send(&build_query_air_state()).await?;
        self.send(&build_roster_request()).await?;
        self.last_keepalive = tokio::time::Instant::now();
        self.state.set(ConnectionState::Connected);
        self.notify("Logged in!");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn test_config() -> ClientConfig {
        ClientConfig {
            keepalive_interval: Duration::from_millis(100),
            shutdown_grace: Duration::from_millis(200),
            ..Default::default()
        }
    }

    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while !check().await {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not met in time"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn record(client: &RadarClient) -> Arc<Mutex<Vec<Notification>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        client
            .notifications()
            .subscribe(move |n| sink.lock().unwrap().push(n.clone()));
        log
    }

    async fn wait_for_notification(log: &Arc<Mutex<Vec<Notification>>>, expected: Notification) {
        wait_until(|| {
            let found = log.lock().unwrap().contains(&expected);
            async move { found }
        })
        .await;
    }

    async fn next_frame(stream: &mut TcpStream) -> Frame {
        tokio::time::timeout(
            Duration::from_secs(3),
            read_frame(stream, &FrameConfig::default()),
        )
        .await
        .expect("timed out waiting for frame")
        .unwrap()
    }

    async fn send(stream: &mut TcpStream, kind: MessageType, payload: &[u8]) {
        write_frame(stream, kind, payload, &FrameConfig::default())
            .await
            .unwrap();
    }

    fn ack_bytes(code: i32) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&12u32.to_le_bytes());
        v.extend_from_slice(&6u32.to_le_bytes());
        v.extend_from_slice(&code.to_le_bytes());
        v.extend_from_slice(&0u32.to_le_bytes());
        v
    }

    /// Start a listener, connect a client to it and consume the login frame.
    async fn connected() -> (RadarClient, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = RadarClient::new(test_config());
        client
            .connect("127.0.0.1", addr.port(), "radar", 20180930)
            .await
            .unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let login = next_frame(&mut server).await;
        assert_eq!(login.message_type(), MessageType::Logon);
        assert_eq!(login.length, 24);
        assert_eq!(&login.payload[..5], b"radar");
        (client, server, addr)
    }

    /// Drive the handshake to completion and drain the post-login requests.
    async fn logged_in() -> (RadarClient, TcpStream) {
        let (client, mut server, _) = connected().await;
        send(&mut server, MessageType::PrepareSimulation, &[]).await;

        assert_eq!(
            next_frame(&mut server).await.to_bytes(),
            ack_bytes(Readback::Prepare.code())
        );
        assert_eq!(
            next_frame(&mut server).await.message_type(),
            MessageType::QueryAirState
        );
        assert_eq!(
            next_frame(&mut server).await.message_type(),
            MessageType::ListUser
        );
        let state = client.state();
        wait_until(|| {
            let done = state.current() == ConnectionState::Connected;
            async move { done }
        })
        .await;
        (client, server)
    }

    fn flight_payload(id: u32) -> Vec<u8> {
        let mut p = vec![0u8; 52];
        p[4..8].copy_from_slice(&id.to_le_bytes());
        p[14..18].copy_from_slice(&1500.0f32.to_le_bytes());
        p
    }

    #[tokio::test]
    async fn test_connect_enters_awaiting_handshake() {
        let (client, _server, _) = connected().await;
        assert_eq!(client.state().current(), ConnectionState::AwaitingHandshake);
    }

    #[tokio::test]
    async fn test_version_notify_is_acknowledged() {
        let (client, mut server, _) = connected().await;
        let log = record(&client);

        send(&mut server, MessageType::VersionNotify, &20180930u32.to_le_bytes()).await;
        let ack = next_frame(&mut server).await;
        assert_eq!(ack.to_bytes(), ack_bytes(9));
        wait_for_notification(&log, Notification::status("Verifying version")).await;
    }

    #[tokio::test]
    async fn test_readback_codes_for_server_commands() {
        let (_client, mut server, _) = connected().await;

        let cases = [
            (MessageType::UseMissile, Readback::UseMissile),
            (MessageType::UseUnguidedWeapon, Readback::UseUnguidedWeapon),
            (MessageType::CtrlShowUsername, Readback::CtrlShowUsername),
            (MessageType::Environment, Readback::Environment),
        ];
        for (kind, readback) in cases {
            send(&mut server, kind, &[1, 0, 0, 0]).await;
            assert_eq!(next_frame(&mut server).await.to_bytes(), ack_bytes(readback.code()));
        }
    }

    #[tokio::test]
    async fn test_load_field_is_echoed_and_announced() {
        let (client, mut server, _) = connected().await;
        let log = record(&client);

        let payload = b"myfield.fld\0\0\0\0\0\0\0\0\0\0\0\0\0";
        send(&mut server, MessageType::LoadField, payload).await;

        let echoed = next_frame(&mut server).await;
        assert_eq!(echoed.message_type(), MessageType::LoadField);
        assert_eq!(echoed.payload, payload);
        assert_eq!(echoed.length, 4 + payload.len() as u32);

        let expected = Notification::Map("myfield.fld".to_string());
        wait_for_notification(&log, expected.clone()).await;
        assert_eq!(expected.as_event(), Some(("MAP", "myfield.fld")));
    }

    #[tokio::test]
    async fn test_config_string_and_list_read_back() {
        let (_client, mut server, _) = connected().await;

        send(&mut server, MessageType::ConfigString, b"BLACKOUT TRUE\0").await;
        let back = next_frame(&mut server).await;
        assert_eq!(back.message_type(), MessageType::ConfigString);
        assert_eq!(back.payload, b"BLACKOUT TRUE\0");

        send(&mut server, MessageType::List, b"\x01\x00F-16\0").await;
        let back = next_frame(&mut server).await;
        assert_eq!(back.message_type(), MessageType::List);
        assert_eq!(back.payload, b"\x01\x00F-16\0");
    }

    #[tokio::test]
    async fn test_handshake_completes_on_prepare() {
        let (client, _server) = logged_in().await;
        assert!(
            client
                .notifications()
                .history()
                .contains(&"Logged in!".to_string())
        );
    }

    #[tokio::test]
    async fn test_logon_also_completes_handshake_once() {
        let (client, mut server, _) = connected().await;
        let log = record(&client);

        send(&mut server, MessageType::Logon, &[]).await;
        assert_eq!(next_frame(&mut server).await.to_bytes(), ack_bytes(7));
        assert_eq!(
            next_frame(&mut server).await.message_type(),
            MessageType::QueryAirState
        );
        assert_eq!(
            next_frame(&mut server).await.message_type(),
            MessageType::ListUser
        );

        // A later PREPARESIMULATION is acknowledged but does not log in again.
        send(&mut server, MessageType::PrepareSimulation, &[]).await;
        assert_eq!(next_frame(&mut server).await.to_bytes(), ack_bytes(7));
        send(&mut server, MessageType::VersionNotify, &[]).await;
        assert_eq!(next_frame(&mut server).await.to_bytes(), ack_bytes(9));

        let logins = log
            .lock()
            .unwrap()
            .iter()
            .filter(|n| **n == Notification::status("Logged in!"))
            .count();
        assert_eq!(logins, 1);
        assert_eq!(client.state().current(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_keepalive_sent_while_connected() {
        let (_client, mut server) = logged_in().await;
        let keepalive = next_frame(&mut server).await;
        assert_eq!(keepalive.to_bytes(), [4, 0, 0, 0, 37, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_keepalive_spacing_matches_interval() {
        let (_client, mut server) = logged_in().await;
        let mut arrivals = Vec::new();
        while arrivals.len() < 4 {
            let frame = next_frame(&mut server).await;
            if frame.message_type() == MessageType::ListUser {
                arrivals.push(tokio::time::Instant::now());
            }
        }
        for pair in arrivals.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap >= Duration::from_millis(60) && gap < Duration::from_millis(180),
                "keepalive gap {gap:?} for a 100ms interval"
            );
        }
    }

    #[tokio::test]
    async fn test_no_keepalive_before_login() {
        let (_client, mut server, _) = connected().await;
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_millis(400), server.read(&mut buf)).await;
        assert!(read.is_err(), "client should stay quiet during the handshake");
    }

    #[tokio::test]
    async fn test_airplane_state_populates_registry() {
        let (client, mut server, _) = connected().await;
        send(&mut server, MessageType::AirplaneState, &flight_payload(5)).await;

        let c = &client;
        wait_until(|| async move { !c.planes().await.is_empty() }).await;
        let planes = client.planes().await;
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].id, 5);
        assert_eq!(planes[0].heading, 0.0);
        assert_eq!(planes[0].altitude(), 1500.0);
        assert_eq!(planes[0].callsign(), "AI");
    }

    #[tokio::test]
    async fn test_roster_and_removal() {
        let (client, mut server, _) = connected().await;

        let mut roster = Vec::new();
        roster.extend_from_slice(&1i16.to_le_bytes());
        roster.extend_from_slice(&0i16.to_le_bytes());
        roster.extend_from_slice(&5i32.to_le_bytes());
        roster.extend_from_slice(&[0u8; 4]);
        roster.extend_from_slice(b"pilot\0");
        send(&mut server, MessageType::ListUser, &roster).await;
        send(&mut server, MessageType::AirplaneState, &flight_payload(5)).await;

        let c = &client;
        wait_until(|| async move { !c.planes().await.is_empty() }).await;
        assert_eq!(client.planes().await[0].username, "pilot");
        let users = client.users().await;
        assert_eq!(users.len(), 1);
        assert!(users[0].flying);

        assert!(client.set_callsign(5, Some("VIPER1".to_string())).await);
        assert_eq!(client.planes().await[0].callsign(), "VIPER1");

        send(&mut server, MessageType::RemoveAirplane, &5u32.to_le_bytes()).await;
        wait_until(|| async move { c.planes().await.is_empty() }).await;
        assert!(client.users().await.is_empty());
    }

    #[tokio::test]
    async fn test_nav_points_from_ground_objects() {
        let (client, mut server, _) = connected().await;

        let mut obj = vec![0u8; 164];
        obj[0..4].copy_from_slice(&65537i32.to_le_bytes());
        obj[4..8].copy_from_slice(&21i32.to_le_bytes());
        obj[36..39].copy_from_slice(b"ILS");
        let start = obj.len() - 57;
        obj[start..start + 4].copy_from_slice(b"HILO");
        send(&mut server, MessageType::AddObject, &obj).await;

        let mut light = obj.clone();
        light[4..8].copy_from_slice(&22i32.to_le_bytes());
        light[36..48].copy_from_slice(b"RUNWAY_LIGHT");
        send(&mut server, MessageType::AddObject, &light).await;
        send(&mut server, MessageType::VersionNotify, &[]).await;
        next_frame(&mut server).await;

        let points = client.nav_points().await;
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, 21);
        assert_eq!(points[0].name, "HILO");
    }

    #[tokio::test]
    async fn test_remove_ground_drops_nav_point() {
        let (client, mut server, _) = connected().await;

        let mut obj = vec![0u8; 164];
        obj[0..4].copy_from_slice(&65537i32.to_le_bytes());
        obj[4..8].copy_from_slice(&21i32.to_le_bytes());
        obj[36..39].copy_from_slice(b"ILS");
        send(&mut server, MessageType::AddObject, &obj).await;
        send(&mut server, MessageType::VersionNotify, &[]).await;
        next_frame(&mut server).await;
        assert_eq!(client.nav_points().await.len(), 1);

        send(&mut server, MessageType::RemoveGround, &99i32.to_le_bytes()).await;
        send(&mut server, MessageType::RemoveGround, &21i32.to_le_bytes()).await;
        send(&mut server, MessageType::RemoveGround, &[1]).await;
        send(&mut server, MessageType::VersionNotify, &[]).await;
        assert_eq!(next_frame(&mut server).await.to_bytes(), ack_bytes(9));

        assert!(client.nav_points().await.is_empty());
        assert_eq!(client.state().current(), ConnectionState::AwaitingHandshake);
    }

    #[tokio::test]
    async fn test_bad_frames_do_not_stop_the_loop() {
        let (client, mut server, _) = connected().await;

        send(&mut server, MessageType::from_code(75), b"reserved").await;
        send(&mut server, MessageType::from_code(500), b"unknown").await;
        send(&mut server, MessageType::AirplaneState, &[1, 2, 3]).await;
        send(&mut server, MessageType::ListUser, &[1]).await;
        send(&mut server, MessageType::AddObject, &[0; 10]).await;
        send(&mut server, MessageType::VersionNotify, &[]).await;

        assert_eq!(next_frame(&mut server).await.to_bytes(), ack_bytes(9));
        assert!(client.planes().await.is_empty());
        assert_eq!(client.state().current(), ConnectionState::AwaitingHandshake);
    }

    #[tokio::test]
    async fn test_chat_roundtrip() {
        let (client, mut server) = logged_in().await;
        let log = record(&client);

        client.send_chat_message("hello tower").unwrap();
        let frame = loop {
            let f = next_frame(&mut server).await;
            if f.message_type() == MessageType::TextMessage {
                break f;
            }
        };
        assert_eq!(frame.length, 13 + "hello tower".len() as u32);
        assert_eq!(decode_chat_text(&frame.payload), "hello tower");

        let incoming = build_chat_packet("(pilot)cleared to land");
        send(&mut server, MessageType::TextMessage, &incoming.payload).await;
        wait_for_notification(&log, Notification::Chat("(pilot)cleared to land".to_string())).await;
    }

    #[tokio::test]
    async fn test_chat_requires_login() {
        let (client, _server, _) = connected().await;
        assert!(matches!(
            client.send_chat_message("too early"),
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            RadarClient::default().send_chat_message("x"),
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_reject_is_reported() {
        let (client, mut server, _) = connected().await;
        let log = record(&client);
        send(&mut server, MessageType::RejectJoinReq, &[]).await;
        wait_for_notification(&log, Notification::Rejected).await;
    }

    #[tokio::test]
    async fn test_refused_port_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client = RadarClient::new(test_config());
        let log = record(&client);
        let result = client.connect("127.0.0.1", port, "radar", 20180930).await;
        assert!(matches!(result, Err(ClientError::Connect { .. })));
        assert_eq!(client.state().current(), ConnectionState::Disconnected);
        assert_eq!(
            log.lock().unwrap().as_slice(),
            [Notification::status(
                "Connection failed, have you used the correct port?"
            )]
        );
    }

    #[tokio::test]
    async fn test_long_username_rejected_before_connecting() {
        let mut client = RadarClient::new(test_config());
        let result = client
            .connect("127.0.0.1", 1, "a_very_long_username", 20180930)
            .await;
        assert!(matches!(result, Err(ClientError::Login(_))));
        assert_eq!(client.state().current(), ConnectionState::Disconnected);
        assert_eq!(client.notifications().history().len(), 1);
    }

    #[tokio::test]
    async fn test_second_connect_is_refused() {
        let (mut client, _server, addr) = connected().await;
        let result = client
            .connect("127.0.0.1", addr.port(), "radar", 20180930)
            .await;
        assert!(matches!(result, Err(ClientError::AlreadyConnected)));
    }

    #[tokio::test]
    async fn test_disconnect_closes_socket() {
        let (mut client, mut server) = logged_in().await;
        let mut rx = client.state().subscribe();

        client.disconnect().await;
        assert_eq!(client.state().current(), ConnectionState::Disconnected);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);

        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(3), server.read_to_end(&mut rest))
            .await
            .expect("socket should close")
            .unwrap();
        assert!(
            client
                .notifications()
                .history()
                .contains(&"Disconnected".to_string())
        );
    }

    #[tokio::test]
    async fn test_disconnect_does_not_hang_on_stalled_peer() {
        let (mut client, server) = logged_in().await;

        // The server never reads, so the dispatcher ends up blocked in a write.
        let text = "x".repeat(64 * 1024);
        for _ in 0..400 {
            client.send_chat_message(&text).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        tokio::time::timeout(Duration::from_secs(5), client.disconnect())
            .await
            .expect("disconnect should give up on the stalled write");
        assert_eq!(client.state().current(), ConnectionState::Disconnected);
        drop(server);
    }

    #[tokio::test]
    async fn test_cancelled_connect_resets_state() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut client = RadarClient::new(test_config());

        let first = tokio::time::timeout(
            Duration::ZERO,
            client.connect("127.0.0.1", port, "radar", 20180930),
        )
        .await;
        match first {
            Err(_) => {
                assert_eq!(client.state().current(), ConnectionState::Disconnected);
                client
                    .connect("127.0.0.1", port, "radar", 20180930)
                    .await
                    .unwrap();
                assert_eq!(client.state().current(), ConnectionState::AwaitingHandshake);
            }
            Ok(result) => {
                result.unwrap();
                assert_eq!(client.state().current(), ConnectionState::AwaitingHandshake);
            }
        }
    }

    #[test]
    fn test_connect_attempt_guard() {
        let state = ConnectionStateWatch::new();

        drop(ConnectAttempt::begin(&state));
        assert_eq!(state.current(), ConnectionState::Disconnected);

        let attempt = ConnectAttempt::begin(&state);
        assert_eq!(state.current(), ConnectionState::Connecting);
        state.set(ConnectionState::AwaitingHandshake);
        attempt.succeed();
        assert_eq!(state.current(), ConnectionState::AwaitingHandshake);
    }

    #[tokio::test]
    async fn test_server_close_is_reported() {
        let (client, server, _) = connected().await;
        let log = record(&client);
        drop(server);

        wait_for_notification(&log, Notification::status("Connection lost")).await;
        assert_eq!(client.state().current(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stale_users_flagged_and_purged() {
        let (client, mut server, _) = connected().await;

        let mut roster = vec![0u8; 12];
        roster.extend_from_slice(b"ghost\0");
        send(&mut server, MessageType::ListUser, &roster).await;

        let c = &client;
        wait_until(|| async move { c.users().await.len() == 1 }).await;

        {
            let live = client.registries();
            let mut live = live.write().await;
            let past = Instant::now() - Duration::from_secs(60);
            live.users.upsert(
                &crate::records::UserEntry {
                    kind_code: 0,
                    iff: 0,
                    id: 0,
                    name: "ghost".to_string(),
                },
                past,
            );
        }

        let users = client.users().await;
        assert!(users[0].marked_for_removal);
        let purged = client.purge_users().await;
        assert_eq!(purged.len(), 1);
        assert!(client.users().await.is_empty());
    }
}
