pub use switchboard_core::model::{ConnectionId, RoomId};

pub mod model {
    pub use switchboard_core::model::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use switchboard_server::*;
}
