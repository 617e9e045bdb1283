//! Conversation room ids
//!
//! A room is one conversation about one property between two participants.
//! Participants are sorted so that both sides derive the same id.

pub const ROOM_ID_SEPARATOR: &str = "::";

pub fn room_id(property_id: &str, user_a: &str, user_b: &str) -> String {
    let (first, second) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };

    [property_id, first, second].join(ROOM_ID_SEPARATOR)
}
