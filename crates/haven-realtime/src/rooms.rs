//! Room membership
//!
//! The rooms this session is logically interested in, independent of whether
//! the transport is currently joined to them. Insertion order is kept so that
//! replays happen in the order rooms were joined.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomMembership {
    rooms: Vec<String>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a room. Returns false if it was already a member.
    pub fn insert(&mut self, room_id: &str) -> bool {
        if self.contains(room_id) {
            return false;
        }
        self.rooms.push(room_id.to_string());
        true
    }

    /// Forget a room. Returns false if it was not a member.
    pub fn remove(&mut self, room_id: &str) -> bool {
        let before = self.rooms.len();
        self.rooms.retain(|id| id != room_id);
        self.rooms.len() != before
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.iter().any(|id| id == room_id)
    }

    pub fn ids(&self) -> &[String] {
        &self.rooms
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
