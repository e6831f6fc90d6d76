//! Client for the flight simulator's multiplayer protocol: message framing,
//! record codecs, the handshake and receive loop, and the live registries of
//! users, aircraft and navigation aids.

pub mod client;
pub mod framing;
pub mod messages;
pub mod notify;
pub mod records;
pub mod registry;
pub mod socket;

pub use client::{
    ClientConfig, ClientError, ConnectionState, ConnectionStateWatch, DEFAULT_PORT,
    KEEPALIVE_INTERVAL, RadarClient,
};
pub use framing::{Frame, FrameConfig, FrameError, read_frame, write_ack, write_frame};
pub use messages::{MessageType, Readback};
pub use notify::{Notification, NotificationBus, SubscriptionId};
pub use records::RecordError;
pub use registry::{Aircraft, LiveRegistries, NavFilter, NavPoint, NavType, User};
pub use socket::SocketConfig;
