//! Who else is in the space.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::model::Timestamp;

/// A viewer's position in the 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ViewerPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One connected user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub id: String,
    pub username: String,
    #[serde(default, alias = "display_name")]
    pub display_name: Option<String>,
    #[serde(default, alias = "avatar_url")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub position: Option<ViewerPosition>,
    #[serde(default, alias = "joined_at")]
    pub joined_at: Timestamp,
    #[serde(default, alias = "last_seen")]
    pub last_seen: Timestamp,
}

impl Viewer {
    pub fn new(id: impl Into<String>, username: impl Into<String>, joined_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            display_name: None,
            avatar_url: None,
            position: None,
            joined_at,
            last_seen: joined_at,
        }
    }
}

/// Viewers in the current space, keyed by user id, in join order. The local
/// user is never listed.
#[derive(Debug, Clone, Default)]
pub struct PresenceRoster {
    local_user: Option<String>,
    viewers: IndexMap<String, Viewer>,
    connected: bool,
    channel: Option<String>,
}

impl PresenceRoster {
    pub fn new(local_user: impl Into<String>) -> Self {
        Self {
            local_user: Some(local_user.into()),
            ..Self::default()
        }
    }

    pub fn set_local_user(&mut self, id: impl Into<String>) {
        let id = id.into();
        self.viewers.shift_remove(&id);
        self.local_user = Some(id);
    }

    fn is_local(&self, id: &str) -> bool {
        self.local_user.as_deref() == Some(id)
    }

    /// Replace the roster with a full presence state.
    pub fn sync(&mut self, viewers: impl IntoIterator<Item = Viewer>) {
        self.viewers.clear();
        for viewer in viewers {
            self.join(viewer);
        }
        debug!(viewers = self.viewers.len(), "presence sync");
    }

    /// Add a viewer. Returns false for duplicates and the local user.
    pub fn join(&mut self, viewer: Viewer) -> bool {
        if self.is_local(&viewer.id) || self.viewers.contains_key(&viewer.id) {
            return false;
        }
        self.viewers.insert(viewer.id.clone(), viewer);
        true
    }

    /// Remove a viewer. Absent ids are a no-op.
    pub fn leave(&mut self, id: &str) -> bool {
        self.viewers.shift_remove(id).is_some()
    }

    /// Move a viewer. Updates older than the last one seen are dropped.
    /// Returns true if the position was applied.
    pub fn update_position(&mut self, id: &str, position: ViewerPosition, seen_at: Timestamp) -> bool {
        let Some(viewer) = self.viewers.get_mut(id) else {
            return false;
        };
        if seen_at < viewer.last_seen {
            trace!(viewer = %id, seen_at, last_seen = viewer.last_seen, "stale position dropped");
            return false;
        }
        viewer.position = Some(position);
        viewer.last_seen = seen_at;
        true
    }

    pub fn set_connected(&mut self, connected: bool, channel: Option<String>) {
        self.connected = connected;
        self.channel = if connected { channel } else { None };
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&Viewer> {
        self.viewers.get(id)
    }

    /// Viewers in join order.
    pub fn viewers(&self) -> impl Iterator<Item = &Viewer> {
        self.viewers.values()
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    /// Forget everyone and disconnect. The local user id is kept.
    pub fn reset(&mut self) {
        self.viewers.clear();
        self.connected = false;
        self.channel = None;
    }
}
