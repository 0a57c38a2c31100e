mod outbox;
mod room;
mod room_command;
mod room_manager;
mod topology;

pub use room::*;
pub use room_command::*;
pub use room_manager::*;
pub use topology::*;
