use crate::error::ProtocolViolation;
use std::collections::{BTreeSet, HashMap};
use switchboard_core::{CallMode, ConnectionId, Role};

/// `sink` receives the tracks published by `source`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub source: ConnectionId,
    pub sink: ConnectionId,
}

impl Edge {
    pub fn new(source: ConnectionId, sink: ConnectionId) -> Self {
        Self { source, sink }
    }

    fn touches(&self, id: &ConnectionId) -> bool {
        &self.source == id || &self.sink == id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub role: Role,
    /// Edges the engine must now connect.
    pub connect: Vec<Edge>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Next joiner taking over as presenter.
    pub promoted: Option<ConnectionId>,
    /// Edges from the new presenter the engine must now connect.
    pub connect: Vec<Edge>,
}

/// Who receives whom in one call, per [`CallMode`].
///
/// Pure bookkeeping: the room applies the returned edges to the engine.
#[derive(Debug, Clone)]
pub struct CallTopology {
    mode: CallMode,
    presenter: Option<ConnectionId>,
    members: Vec<ConnectionId>,
    edges: BTreeSet<Edge>,
    pairs: HashMap<ConnectionId, ConnectionId>,
}

impl CallTopology {
    pub fn new(mode: CallMode) -> Self {
        Self {
            mode,
            presenter: None,
            members: Vec::new(),
            edges: BTreeSet::new(),
            pairs: HashMap::new(),
        }
    }

    pub fn presenter(&self) -> Option<&ConnectionId> {
        self.presenter.as_ref()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains(id)
    }

    pub fn peer_of(&self, id: &ConnectionId) -> Option<&ConnectionId> {
        self.pairs.get(id)
    }

    pub fn role_of(&self, id: &ConnectionId) -> Option<Role> {
        if !self.contains(id) {
            return None;
        }
        Some(match self.mode {
            CallMode::Presenter | CallMode::SharedSession => {
                if self.presenter.as_ref() == Some(id) {
                    Role::Presenter
                } else {
                    Role::Viewer
                }
            }
            CallMode::OneToOne | CallMode::Loopback | CallMode::Mesh => Role::Peer,
        })
    }

    pub fn join(&mut self, id: ConnectionId) -> Result<JoinOutcome, ProtocolViolation> {
        if self.contains(&id) {
            return Err(ProtocolViolation::AlreadyRegistered);
        }

        let connect = match self.mode {
            CallMode::OneToOne | CallMode::SharedSession => Vec::new(),
            CallMode::Loopback => vec![Edge::new(id.clone(), id.clone())],
            CallMode::Presenter => match &self.presenter {
                Some(presenter) => vec![Edge::new(presenter.clone(), id.clone())],
                None => self
                    .members
                    .iter()
                    .map(|viewer| Edge::new(id.clone(), viewer.clone()))
                    .collect(),
            },
            CallMode::Mesh => self
                .members
                .iter()
                .flat_map(|existing| {
                    [
                        Edge::new(existing.clone(), id.clone()),
                        Edge::new(id.clone(), existing.clone()),
                    ]
                })
                .collect(),
        };

        if matches!(self.mode, CallMode::Presenter | CallMode::SharedSession)
            && self.presenter.is_none()
        {
            self.presenter = Some(id.clone());
        }
        self.members.push(id.clone());
        self.edges.extend(connect.iter().cloned());

        let role = self
            .role_of(&id)
            .ok_or(ProtocolViolation::NotRegistered)?;
        Ok(JoinOutcome { role, connect })
    }

    /// Locks two lobby members into a one-to-one call.
    pub fn pair(
        &mut self,
        caller: &ConnectionId,
        callee: &ConnectionId,
    ) -> Result<Vec<Edge>, ProtocolViolation> {
        if self.mode != CallMode::OneToOne {
            return Err(ProtocolViolation::UnsupportedInMode {
                method: "call".to_string(),
                mode: self.mode,
            });
        }
        if !self.contains(caller) || !self.contains(callee) || caller == callee {
            return Err(ProtocolViolation::NotRegistered);
        }
        for id in [caller, callee] {
            if self.pairs.contains_key(id) {
                return Err(ProtocolViolation::PeerBusy(id.to_string()));
            }
        }

        self.pairs.insert(caller.clone(), callee.clone());
        self.pairs.insert(callee.clone(), caller.clone());
        let connect = vec![
            Edge::new(caller.clone(), callee.clone()),
            Edge::new(callee.clone(), caller.clone()),
        ];
        self.edges.extend(connect.iter().cloned());
        Ok(connect)
    }

    /// Ends the one-to-one call `id` is in, returning the partner.
    pub fn hang_up(&mut self, id: &ConnectionId) -> Option<ConnectionId> {
        let peer = self.pairs.remove(id)?;
        self.pairs.remove(&peer);
        self.edges
            .retain(|edge| !(edge.touches(id) && edge.touches(&peer)));
        Some(peer)
    }

    /// Drops the member and every edge touching it, ending its one-to-one
    /// call. Removing a non-member is a no-op.
    pub fn leave(&mut self, id: &ConnectionId) -> LeaveOutcome {
        if !self.contains(id) {
            return LeaveOutcome::default();
        }

        self.hang_up(id);
        self.members.retain(|member| member != id);
        self.edges.retain(|edge| !edge.touches(id));

        let mut promoted = None;
        let mut connect = Vec::new();
        if self.presenter.as_ref() == Some(id) {
            self.presenter = self.members.first().cloned();
            promoted = self.presenter.clone();

            if let (CallMode::Presenter, Some(presenter)) = (self.mode, &promoted) {
                connect = self
                    .members
                    .iter()
                    .filter(|member| *member != presenter)
                    .map(|viewer| Edge::new(presenter.clone(), viewer.clone()))
                    .collect();
                self.edges.extend(connect.iter().cloned());
            }
        }

        LeaveOutcome { promoted, connect }
    }

    /// Presenter-led modes accept client offers from the presenter only.
    /// Anyone may ask for a server offer.
    pub fn authorize_offer(
        &self,
        id: &ConnectionId,
        client_offer: bool,
    ) -> Result<(), ProtocolViolation> {
        if !self.contains(id) {
            return Err(ProtocolViolation::NotRegistered);
        }
        let presenter_led = matches!(self.mode, CallMode::Presenter | CallMode::SharedSession);
        if presenter_led && client_offer && self.presenter.as_ref() != Some(id) {
            return Err(ProtocolViolation::NotPresenter);
        }
        Ok(())
    }

    /// Members whose endpoints may need a fresh offer after `id` negotiated.
    pub fn renegotiation_candidates(&self, id: &ConnectionId) -> Vec<ConnectionId> {
        match self.mode {
            CallMode::OneToOne => self.peer_of(id).cloned().into_iter().collect(),
            CallMode::Presenter => self
                .edges
                .iter()
                .filter(|edge| &edge.source == id && &edge.sink != id)
                .map(|edge| edge.sink.clone())
                .collect(),
            CallMode::SharedSession if self.presenter.as_ref() == Some(id) => self
                .members
                .iter()
                .filter(|member| *member != id)
                .cloned()
                .collect(),
            CallMode::Mesh => self
                .members
                .iter()
                .filter(|member| *member != id)
                .cloned()
                .collect(),
            CallMode::SharedSession | CallMode::Loopback => Vec::new(),
        }
    }
}
