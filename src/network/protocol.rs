//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON object discriminated by its `type` field; field
//! names are camelCase as the browser client expects.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::physics::Direction;
use crate::game::settings::GameSettings;
use crate::game::state::{Ball, Paddles, Scores};
use crate::network::session::SessionState;

/// Numeric user identity. The bot uses [`BOT_USER_ID`].
pub type UserId = i64;

/// Numeric session identity, also the persisted record id.
pub type GameId = i64;

/// Identity the synthetic opponent plays under.
pub const BOT_USER_ID: UserId = 0;

/// Display name of the synthetic opponent.
pub const BOT_USERNAME: &str = "Bot";

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Register the connection with presence tracking.
    UserConnect(UserIdentity),

    /// Enter the matchmaking queue.
    JoinGame(JoinRequest),

    /// Start a match against the bot right away.
    JoinBotGame(JoinRequest),

    /// Move the sender's paddle one step.
    MovePaddle {
        /// Step direction.
        direction: Direction,
    },

    /// Set or toggle pause. Absent `paused` toggles.
    Pause {
        /// Target pause state.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        paused: Option<bool>,
    },

    /// Leave everything (queue, match, presence).
    Disconnect,
}

/// Who is on the other end of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// User id from the auth service.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
}

/// Payload of `joinGame` / `joinBotGame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// User id from the auth service.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// Optional settings; defaults apply field by field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_settings: Option<GameSettings>,
}

impl JoinRequest {
    /// The identity half of the request.
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            user_id: self.user_id,
            username: self.username.clone(),
        }
    }

    /// Settings, defaulted if the client sent none.
    pub fn settings(&self) -> GameSettings {
        self.game_settings.clone().unwrap_or_default()
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Presence registration confirmed.
    ConnectionAck {
        /// Human-readable text.
        message: String,
    },

    /// Queued, no opponent yet.
    Waiting {
        /// Human-readable text.
        message: String,
    },

    /// A match was created.
    GameStart(GameStartInfo),

    /// Full court snapshot.
    GameState(GameStateUpdate),

    /// Match entered pause.
    GamePaused(PauseNotice),

    /// Match left pause.
    GameResumed(PauseNotice),

    /// Match is over.
    GameEnd(GameEndInfo),

    /// Request refused.
    Error {
        /// Human-readable text.
        message: String,
    },
}

/// One side of a match as shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    /// User id, [`BOT_USER_ID`] for the bot.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
}

/// Both sides of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPlayers {
    /// Left paddle.
    pub player1: PlayerInfo,
    /// Right paddle.
    pub player2: PlayerInfo,
}

/// Body of `gameStart`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStartInfo {
    /// Session id.
    pub game_id: GameId,
    /// Both sides.
    pub players: MatchPlayers,
    /// Settings the match runs with.
    pub game_settings: GameSettings,
}

/// Body of `gameState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateUpdate {
    /// Ball position and velocity.
    pub ball: Ball,
    /// Both paddles.
    pub paddles: Paddles,
    /// Current score.
    pub scores: Scores,
    /// Lifecycle state.
    pub game_state: SessionState,
}

/// Body of `gamePaused` / `gameResumed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseNotice {
    /// New pause state.
    pub is_paused: bool,
    /// Session id.
    pub game_id: GameId,
}

/// Body of `gameEnd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEndInfo {
    /// Winner's user id.
    pub winner: UserId,
    /// Final score.
    pub scores: Scores,
    /// Session id.
    pub game_id: GameId,
}

impl ServerMessage {
    /// `connectionAck` with the standard text.
    pub fn connection_ack() -> Self {
        ServerMessage::ConnectionAck {
            message: "You are now tracked as online".to_string(),
        }
    }

    /// `waiting` with the standard text.
    pub fn waiting() -> Self {
        ServerMessage::Waiting {
            message: "Waiting for opponent...".to_string(),
        }
    }

    /// `error` carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Why an inbound frame was rejected.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not valid JSON at all.
    #[error("malformed JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    /// JSON, but no string `type` field.
    #[error("message has no type")]
    MissingType,

    /// A `type` this server does not handle.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Known `type` with fields that do not fit.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// The message `type`.
        kind: String,
        /// Field-level failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Inbound `type` values this server understands.
pub const CLIENT_MESSAGE_TYPES: [&str; 6] = [
    "userConnect",
    "joinGame",
    "joinBotGame",
    "movePaddle",
    "pause",
    "disconnect",
];

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Parse one inbound text frame, classifying the failure.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(ProtocolError::MalformedJson)?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if !CLIENT_MESSAGE_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::settings::SpeedTier;
    use crate::game::state::Court;
    use serde_json::json;

    #[test]
    fn test_parse_join_game() {
        let text = r#"{"type":"joinGame","userId":7,"username":"ana",
                       "gameSettings":{"ballSpeed":"fast","scoreToWin":3}}"#;

        let msg = ClientMessage::parse(text).unwrap();

        let ClientMessage::JoinGame(join) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(join.user_id, 7);
        assert_eq!(join.username, "ana");
        let settings = join.settings();
        assert_eq!(settings.ball_speed, SpeedTier::Fast);
        assert_eq!(settings.score_to_win, 3);
        assert_eq!(settings.paddle_speed, SpeedTier::Medium);
    }

    #[test]
    fn test_parse_join_without_settings() {
        let msg = ClientMessage::parse(r#"{"type":"joinBotGame","userId":1,"username":"b"}"#).unwrap();

        let ClientMessage::JoinBotGame(join) = msg else {
            panic!("Wrong message type");
        };
        assert_eq!(join.game_settings, None);
        assert_eq!(join.settings(), GameSettings::default());
    }

    #[test]
    fn test_parse_move_and_pause() {
        assert_eq!(
            ClientMessage::parse(r#"{"type":"movePaddle","direction":"up"}"#).unwrap(),
            ClientMessage::MovePaddle { direction: Direction::Up }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"pause"}"#).unwrap(),
            ClientMessage::Pause { paused: None }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"pause","paused":true}"#).unwrap(),
            ClientMessage::Pause { paused: Some(true) }
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type":"disconnect"}"#).unwrap(),
            ClientMessage::Disconnect
        );
    }

    #[test]
    fn test_parse_errors_are_classified() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(ProtocolError::MalformedJson(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"direction":"up"}"#),
            Err(ProtocolError::MissingType)
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"chat","text":"hi"}"#),
            Err(ProtocolError::UnknownType(kind)) if kind == "chat"
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"movePaddle","direction":"left"}"#),
            Err(ProtocolError::InvalidPayload { kind, .. }) if kind == "movePaddle"
        ));
    }

    #[test]
    fn test_game_start_shape() {
        let msg = ServerMessage::GameStart(GameStartInfo {
            game_id: 12,
            players: MatchPlayers {
                player1: PlayerInfo { user_id: 7, username: "ana".into() },
                player2: PlayerInfo { user_id: BOT_USER_ID, username: BOT_USERNAME.into() },
            },
            game_settings: GameSettings::default(),
        });

        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "gameStart");
        assert_eq!(value["gameId"], 12);
        assert_eq!(value["players"]["player1"]["userId"], 7);
        assert_eq!(value["players"]["player2"]["username"], "Bot");
        assert_eq!(value["gameSettings"]["ballSpeed"], "medium");
        assert_eq!(value["gameSettings"]["scoreToWin"], 5);
    }

    #[test]
    fn test_game_state_shape() {
        let court = Court::new(5.0, 0.0);
        let msg = ServerMessage::GameState(GameStateUpdate {
            ball: court.ball,
            paddles: court.paddles,
            scores: court.scores,
            game_state: SessionState::Paused,
        });

        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "gameState");
        assert_eq!(value["ball"], json!({"x": 400.0, "y": 300.0, "dx": 5.0, "dy": 0.0}));
        assert_eq!(value["paddles"]["player2"]["x"], 750.0);
        assert_eq!(value["scores"], json!({"player1": 0, "player2": 0}));
        assert_eq!(value["gameState"], "paused");
    }

    #[test]
    fn test_pause_and_end_shapes() {
        let paused = ServerMessage::GamePaused(PauseNotice { is_paused: true, game_id: 3 });
        let value: serde_json::Value = serde_json::from_str(&paused.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"type": "gamePaused", "isPaused": true, "gameId": 3}));

        let end = ServerMessage::GameEnd(GameEndInfo {
            winner: 7,
            scores: Scores { player1: 5, player2: 2 },
            game_id: 3,
        });
        let value: serde_json::Value = serde_json::from_str(&end.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "gameEnd", "winner": 7, "scores": {"player1": 5, "player2": 2}, "gameId": 3})
        );
    }

    #[test]
    fn test_standard_texts() {
        let json = ServerMessage::waiting().to_json().unwrap();
        assert_eq!(json, r#"{"type":"waiting","message":"Waiting for opponent..."}"#);

        let json = ServerMessage::error("Already waiting for a match.").to_json().unwrap();
        assert_eq!(json, r#"{"type":"error","message":"Already waiting for a match."}"#);

        let parsed = ServerMessage::from_json(&ServerMessage::connection_ack().to_json().unwrap()).unwrap();
        assert_eq!(parsed, ServerMessage::connection_ack());
    }
}
