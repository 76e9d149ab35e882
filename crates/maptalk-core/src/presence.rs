//! Online-user roster.

use crate::ids::ConnectionId;
use crate::model::User;

/// Ordered roster of logged-in users, keyed by connection id.
///
/// Order reflects first login. Names are not deduplicated.
#[derive(Debug, Default, Clone)]
pub struct PresenceStore {
    users: Vec<User>,
}

impl PresenceStore {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a login.
    ///
    /// A second login from the same connection overwrites its entry in place,
    /// so there is never more than one user per connection.
    pub fn insert(&mut self, user: User) {
        if let Some(existing) = self.users.iter_mut().find(|u| u.id == user.id) {
            *existing = user;
        } else {
            self.users.push(user);
        }
    }

    /// Remove the user attached to `id`, if any.
    pub fn remove_by_connection(&mut self, id: &ConnectionId) -> Option<User> {
        let idx = self.users.iter().position(|u| &u.id == id)?;
        Some(self.users.remove(idx))
    }

    /// User attached to `id`.
    pub fn get(&self, id: &ConnectionId) -> Option<&User> {
        self.users.iter().find(|u| &u.id == id)
    }

    /// Value copy of the roster.
    pub fn snapshot(&self) -> Vec<User> {
        self.users.clone()
    }

    /// Number of logged-in users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether nobody is logged in.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
