//! Presence Tracking
//!
//! Which users are online, and through which connections. A user stays
//! online while at least one of their connections is open. Pure
//! bookkeeping; nothing here touches matches.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::network::protocol::UserId;
use crate::network::session::ConnectionId;

/// Presence entry for one user.
#[derive(Debug, Clone)]
struct UserPresence {
    username: String,
    connections: HashSet<ConnectionId>,
    last_seen: DateTime<Utc>,
}

/// Identity shown in the online list. Bots use string ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PresenceId {
    /// A real user.
    User(UserId),
    /// A synthetic bot tier.
    Bot(String),
}

/// One row of the online list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineUser {
    /// User id, or `bot_<tier>`.
    pub user_id: PresenceId,
    /// Username.
    pub username: String,
    /// Name to display.
    pub display_name: String,
    /// Always `online`.
    pub status: String,
    /// Last connection activity.
    pub last_seen: DateTime<Utc>,
    /// Synthetic bot entry.
    pub is_bot: bool,
}

/// Bot tiers that always show as online.
const BOT_ENTRIES: [(&str, &str, &str); 3] = [
    ("bot_easy", "EasyBot", "Easy Bot"),
    ("bot_medium", "MediumBot", "Medium Bot"),
    ("bot_hard", "HardBot", "Hard Bot"),
];

/// Maps users to their open connections.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    users: BTreeMap<UserId, UserPresence>,
    owners: HashMap<ConnectionId, UserId>,
}

impl PresenceTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `conn` to `user_id`, creating the entry if absent.
    ///
    /// A connection belongs to one user; re-registering it under another
    /// id moves it.
    pub fn add_connection(&mut self, user_id: UserId, username: &str, conn: ConnectionId) {
        if let Some(&owner) = self.owners.get(&conn) {
            if owner != user_id {
                self.remove_connection(conn);
            }
        }

        let now = Utc::now();
        let entry = self.users.entry(user_id).or_insert_with(|| UserPresence {
            username: username.to_string(),
            connections: HashSet::new(),
            last_seen: now,
        });
        entry.connections.insert(conn);
        entry.last_seen = now;
        let connections = entry.connections.len();
        self.owners.insert(conn, user_id);

        info!(user_id, username, connections, online = self.users.len(), "User online");
    }

    /// Detach `conn` from whichever user owns it. Idempotent.
    ///
    /// Returns the user id if that user just went offline.
    pub fn remove_connection(&mut self, conn: ConnectionId) -> Option<UserId> {
        let user_id = self.owners.remove(&conn)?;
        let entry = self.users.get_mut(&user_id)?;
        entry.connections.remove(&conn);
        entry.last_seen = Utc::now();

        if entry.connections.is_empty() {
            self.users.remove(&user_id);
            info!(user_id, online = self.users.len(), "User offline");
            Some(user_id)
        } else {
            None
        }
    }

    /// Whether `user_id` has at least one open connection.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    /// Open connections for `user_id`.
    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.users.get(&user_id).map_or(0, |u| u.connections.len())
    }

    /// Number of real users online.
    pub fn online_count(&self) -> usize {
        self.users.len()
    }

    /// Online list: real users by id, then the bot tiers.
    pub fn snapshot(&self) -> Vec<OnlineUser> {
        let now = Utc::now();
        let real = self.users.iter().map(|(&user_id, user)| OnlineUser {
            user_id: PresenceId::User(user_id),
            username: user.username.clone(),
            display_name: user.username.clone(),
            status: "online".to_string(),
            last_seen: user.last_seen,
            is_bot: false,
        });
        let bots = BOT_ENTRIES.iter().map(|&(id, username, display)| OnlineUser {
            user_id: PresenceId::Bot(id.to_string()),
            username: username.to_string(),
            display_name: display.to_string(),
            status: "online".to_string(),
            last_seen: now,
            is_bot: true,
        });
        real.chain(bots).collect()
    }
}
