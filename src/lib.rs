//! # Pong Arena Server
//!
//! Real-time two-player Pong over WebSockets: presence tracking,
//! matchmaking with a bot fallback, server-authoritative simulation and
//! match result persistence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PONG ARENA SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  └── rng.rs      - Seeded per-session PRNG                   │
//! │                                                              │
//! │  game/           - Court simulation                          │
//! │  ├── settings.rs - Match options and speed tiers             │
//! │  ├── state.rs    - Ball, paddles, scores                     │
//! │  ├── physics.rs  - Movement, bounce, collision, serve        │
//! │  ├── ai.rs       - Bot paddle controller                     │
//! │  └── tick.rs     - One authoritative step                    │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── protocol.rs - JSON message types                        │
//! │  ├── presence.rs - Online users                              │
//! │  ├── queue.rs    - Matchmaking queue                         │
//! │  ├── session.rs  - Match session lifecycle                   │
//! │  ├── reactor.rs  - Single-owner event loop                   │
//! │  └── server.rs   - WebSocket server                          │
//! │                                                              │
//! │  store/          - Match result persistence                  │
//! │  ├── memory.rs   - In-process sink                           │
//! │  └── jsonl.rs    - Append-only JSON-lines file               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! One reactor task owns presence, the queue and every session. Socket
//! readers, tick timers, fallback timers and store writes all report back
//! to it as events, so game state is never shared between tasks.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use crate::core::rng::SessionRng;
pub use game::settings::GameSettings;
pub use game::state::Court;
pub use network::server::{GameServer, ServerConfig};
pub use store::{JsonlResultSink, MemoryResultSink, ResultSink};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
