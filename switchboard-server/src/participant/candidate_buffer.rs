use std::collections::VecDeque;
use std::mem;
use switchboard_core::IceCandidate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateDisposition {
    /// The endpoint exists; hand the candidate to the engine now.
    Forward(IceCandidate),
    Buffered,
}

/// ICE candidates received before the owning stream has an endpoint.
///
/// Unbounded, duplicates kept, FIFO. Callers serialize access (the room
/// actor owns every buffer), so attaching and flushing happen in one step.
#[derive(Debug, Default)]
pub struct CandidateBuffer {
    pending: VecDeque<IceCandidate>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_or_buffer(
        &mut self,
        endpoint_present: bool,
        candidate: IceCandidate,
    ) -> CandidateDisposition {
        if endpoint_present {
            return CandidateDisposition::Forward(candidate);
        }
        self.pending.push_back(candidate);
        CandidateDisposition::Buffered
    }

    /// Drains every pending candidate in arrival order.
    pub fn flush_on_attach(&mut self) -> Vec<IceCandidate> {
        mem::take(&mut self.pending).into()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
