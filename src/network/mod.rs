//! Network Layer
//!
//! WebSocket transport, JSON protocol, presence, matchmaking and match
//! sessions. All mutable state lives in the reactor task; the simulation it
//! drives is in `game/`.

pub mod presence;
pub mod protocol;
pub mod queue;
pub mod reactor;
pub mod server;
pub mod session;

pub use presence::{OnlineUser, PresenceTracker};
pub use protocol::{ClientMessage, GameId, ProtocolError, ServerMessage, UserId};
pub use queue::{Enqueued, Ticket, WaitQueue, WaitingPlayer};
pub use reactor::{Reactor, ReactorConfig, ReactorEvent, ReactorHandle, ReactorStats};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use session::{ConnectionId, MatchSession, Peer, SessionConfig, SessionRegistry, SessionState};
