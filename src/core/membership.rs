//! Node-local room membership index
//!
//! Tracks which rooms each connected user has joined on this node.
//! Populated by join events, drained on disconnect; no persistence —
//! membership is reconstructed from join events on (re)connect. Checks are
//! authoritative per connection, not deduplicated across nodes.

use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

pub struct RoomMembershipIndex {
    rooms_by_user: RwLock<HashMap<String, HashSet<String>>>,
}

impl RoomMembershipIndex {
    pub fn new() -> Self {
        Self {
            rooms_by_user: RwLock::new(HashMap::new()),
        }
    }

    pub async fn join(&self, user_id: &str, room_id: &str) {
        let mut rooms = self.rooms_by_user.write().await;
        rooms
            .entry(user_id.to_string())
            .or_insert_with(HashSet::new)
            .insert(room_id.to_string());
    }

    pub async fn leave(&self, user_id: &str, room_id: &str) {
        let mut rooms = self.rooms_by_user.write().await;
        let emptied = match rooms.get_mut(user_id) {
            Some(joined) => {
                joined.remove(room_id);
                joined.is_empty()
            }
            None => false,
        };
        if emptied {
            rooms.remove(user_id);
        }
    }

    /// Drop every membership of a user; returns the rooms that were left.
    pub async fn leave_all(&self, user_id: &str) -> Vec<String> {
        let mut rooms = self.rooms_by_user.write().await;
        rooms
            .remove(user_id)
            .map(|joined| joined.into_iter().collect())
            .unwrap_or_default()
    }

    pub async fn is_member(&self, user_id: &str, room_id: &str) -> bool {
        let rooms = self.rooms_by_user.read().await;
        rooms
            .get(user_id)
            .map(|joined| joined.contains(room_id))
            .unwrap_or(false)
    }

    pub async fn rooms_of(&self, user_id: &str) -> Vec<String> {
        let rooms = self.rooms_by_user.read().await;
        rooms
            .get(user_id)
            .map(|joined| joined.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for RoomMembershipIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_leave_cycle() {
        let index = RoomMembershipIndex::new();

        index.join("u1", "general").await;
        index.join("u1", "random").await;
        assert!(index.is_member("u1", "general").await);
        assert!(!index.is_member("u2", "general").await);

        index.leave("u1", "general").await;
        assert!(!index.is_member("u1", "general").await);
        assert!(index.is_member("u1", "random").await);
    }

    #[tokio::test]
    async fn test_leave_all_reports_rooms() {
        let index = RoomMembershipIndex::new();
        index.join("u1", "a").await;
        index.join("u1", "b").await;

        let mut left = index.leave_all("u1").await;
        left.sort();
        assert_eq!(left, ["a", "b"]);
        assert!(index.rooms_of("u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_joins_for_one_user() {
        use std::sync::Arc;

        // Several tabs joining and leaving at once must not lose entries.
        let index = Arc::new(RoomMembershipIndex::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                let room = format!("room-{}", i % 4);
                index.join("u1", &room).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for i in 0..4 {
            assert!(index.is_member("u1", &format!("room-{}", i)).await);
        }
    }
}
