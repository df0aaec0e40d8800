//! Value objects - immutable types that represent domain concepts

mod ids;
mod room;
mod user_id;

pub use ids::{generate_call_id, generate_entry_id, now_millis};
pub use room::{Room, CALL_ROOM_PREFIX, GROUP_ROOM_PREFIX, USER_ROOM_PREFIX};
pub use user_id::UserId;
