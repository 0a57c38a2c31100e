mod candidate_buffer;
mod participant_session;

pub use candidate_buffer::*;
pub use participant_session::*;
