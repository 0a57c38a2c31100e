use crate::engine::{
    EndpointId, EndpointKind, EngineError, EngineEvent, MediaEngine, MediaTarget, PipelineId,
    SubSessionId,
};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};
use switchboard_core::{IceCandidate, IceServerConfig};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine as RtcMediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpHeaderExtensionCapability, RTPCodecType,
};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};
use webrtc::track::track_remote::TrackRemote;

const RELAY_CHANNEL_CAPACITY: usize = 512;

/// Header extensions a browser needs to send simulcast layers.
const SIMULCAST_EXTENSIONS: [&str; 3] = [
    "urn:ietf:params:rtp-hdrext:sdes:mid",
    "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id",
    "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id",
];

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".to_owned()],
                username: None,
                credential: None,
            }],
        }
    }
}

type EventSlot = Arc<Mutex<Option<mpsc::Sender<EngineEvent>>>>;

/// Remote track re-published to every connected sink.
struct RelayedTrack {
    codec: RTCRtpCodecCapability,
    track_id: String,
    stream_id: String,
    packets: broadcast::Sender<Packet>,
}

#[derive(Clone)]
struct RelaySink {
    pc: Weak<RTCPeerConnection>,
    negotiation_needed: Arc<AtomicBool>,
}

#[derive(Default)]
struct Relay {
    published: Vec<Arc<RelayedTrack>>,
    sinks: Vec<RelaySink>,
    /// Forward one layer per track id.
    simulcast: bool,
}

impl Relay {
    fn prune_sinks(&mut self) {
        self.sinks.retain(|sink| sink.pc.strong_count() > 0);
    }
}

/// One negotiated peer connection: a plain endpoint or a sub-session.
struct PeerLink {
    pc: Arc<RTCPeerConnection>,
    negotiation_needed: Arc<AtomicBool>,
    relay: Arc<Mutex<Relay>>,
}

struct SharedSession {
    subs: HashMap<SubSessionId, Arc<PeerLink>>,
    master: Option<SubSessionId>,
    bitrates: HashMap<SubSessionId, u32>,
}

enum EndpointEntry {
    Peer(Arc<PeerLink>),
    Shared(Arc<Mutex<SharedSession>>),
}

struct EndpointRecord {
    pipeline: PipelineId,
    events: EventSlot,
    entry: EndpointEntry,
}

/// [`MediaEngine`] backed by the `webrtc` crate, running in-process.
///
/// A pipeline is a group of peer connections. `connect` relays RTP from the
/// source's remote tracks to local tracks added on the sink.
pub struct WebRtcEngine {
    api: API,
    rtc_config: RTCConfiguration,
    pipelines: DashMap<PipelineId, Vec<EndpointId>>,
    endpoints: DashMap<EndpointId, EndpointRecord>,
}

impl WebRtcEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let mut m = RtcMediaEngine::default();
        m.register_default_codecs()
            .map_err(|e| EngineError::Other(format!("codec registration failed: {e}")))?;
        for uri in SIMULCAST_EXTENSIONS {
            m.register_header_extension(
                RTCRtpHeaderExtensionCapability {
                    uri: uri.to_owned(),
                },
                RTPCodecType::Video,
                None,
            )
            .map_err(|e| EngineError::Other(format!("header extension {uri}: {e}")))?;
        }
        let registry = register_default_interceptors(Registry::new(), &mut m)
            .map_err(|e| EngineError::Other(format!("interceptor registration failed: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .into_iter()
                .map(|server| RTCIceServer {
                    urls: server.urls,
                    username: server.username.unwrap_or_default(),
                    credential: server.credential.unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        Ok(Self {
            api,
            rtc_config,
            pipelines: DashMap::new(),
            endpoints: DashMap::new(),
        })
    }

    async fn new_peer_link(
        &self,
        target: MediaTarget,
        events: EventSlot,
    ) -> Result<Arc<PeerLink>, EngineError> {
        let pc = Arc::new(
            self.api
                .new_peer_connection(self.rtc_config.clone())
                .await
                .map_err(|e| EngineError::EndpointCreation(e.to_string()))?,
        );

        let link = Arc::new(PeerLink {
            pc: pc.clone(),
            negotiation_needed: Arc::new(AtomicBool::new(false)),
            relay: Arc::new(Mutex::new(Relay::default())),
        });

        pc.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let events = events.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let tx = events.lock().clone();
                let Some(tx) = tx else {
                    debug!("Dropping candidate for unsubscribed {}", target);
                    return;
                };
                let event = EngineEvent::IceCandidateDiscovered {
                    target,
                    candidate: IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_m_line_index: init.sdp_mline_index,
                    },
                };
                let _ = tx.send(event).await;
            })
        }));

        let flag = link.negotiation_needed.clone();
        pc.on_negotiation_needed(Box::new(move || {
            let flag = flag.clone();
            Box::pin(async move {
                flag.store(true, Ordering::SeqCst);
            })
        }));

        let relay = link.relay.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let relay = relay.clone();
            Box::pin(async move {
                publish_remote_track(track, relay, target).await;
            })
        }));

        Ok(link)
    }

    fn peer_link(&self, target: &MediaTarget) -> Result<Arc<PeerLink>, EngineError> {
        let record = self
            .endpoints
            .get(&target.endpoint)
            .ok_or(EngineError::UnknownEndpoint(target.endpoint))?;

        match (&record.entry, target.sub_session) {
            (EndpointEntry::Peer(link), None) => Ok(link.clone()),
            (EndpointEntry::Shared(shared), Some(sub)) => shared
                .lock()
                .subs
                .get(&sub)
                .cloned()
                .ok_or(EngineError::UnknownSubSession(sub)),
            (EndpointEntry::Peer(_), Some(sub)) => Err(EngineError::UnknownSubSession(sub)),
            (EndpointEntry::Shared(_), None) => Err(EngineError::Unsupported(format!(
                "{} is shared and needs a sub-session",
                target.endpoint
            ))),
        }
    }

    fn shared(&self, endpoint: &EndpointId) -> Result<Arc<Mutex<SharedSession>>, EngineError> {
        let record = self
            .endpoints
            .get(endpoint)
            .ok_or(EngineError::UnknownEndpoint(*endpoint))?;
        match &record.entry {
            EndpointEntry::Shared(shared) => Ok(shared.clone()),
            EndpointEntry::Peer(_) => Err(EngineError::Unsupported(format!(
                "{endpoint} has no sub-sessions"
            ))),
        }
    }
}

async fn publish_remote_track(track: Arc<TrackRemote>, relay: Arc<Mutex<Relay>>, origin: MediaTarget) {
    let rid = track.rid().to_string();
    {
        let relay = relay.lock();
        let track_id = track.id();
        if relay.simulcast
            && !rid.is_empty()
            && relay.published.iter().any(|p| p.track_id == track_id)
        {
            debug!("Layer '{}' of {} from {} not relayed", rid, track_id, origin);
            return;
        }
    }

    let (packets, _) = broadcast::channel(RELAY_CHANNEL_CAPACITY);
    let relayed = Arc::new(RelayedTrack {
        codec: track.codec().capability.clone(),
        track_id: track.id(),
        stream_id: track.stream_id(),
        packets: packets.clone(),
    });
    info!(
        "Track {} ({}) published by {}",
        relayed.track_id,
        track.kind(),
        origin
    );

    tokio::spawn(async move {
        loop {
            match track.read_rtp().await {
                Ok((pkt, _)) => {
                    let _ = packets.send(pkt);
                }
                Err(e) => {
                    debug!("RTP read on {} stopped: {}", origin, e);
                    break;
                }
            }
        }
    });

    let sinks = {
        let mut relay = relay.lock();
        relay.prune_sinks();
        relay.published.push(relayed.clone());
        relay.sinks.clone()
    };

    for sink in sinks {
        attach_relayed_track(&relayed, &sink).await;
    }
}

async fn attach_relayed_track(relayed: &Arc<RelayedTrack>, sink: &RelaySink) {
    let Some(pc) = sink.pc.upgrade() else {
        return;
    };
    let local = Arc::new(TrackLocalStaticRTP::new(
        relayed.codec.clone(),
        relayed.track_id.clone(),
        relayed.stream_id.clone(),
    ));

    let sender = match pc
        .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
        .await
    {
        Ok(sender) => sender,
        Err(e) => {
            warn!("add_track({}) failed: {}", relayed.track_id, e);
            return;
        }
    };
    sink.negotiation_needed.store(true, Ordering::SeqCst);

    tokio::spawn(async move {
        let mut rtcp_buf = vec![0u8; 1500];
        while sender.read(&mut rtcp_buf).await.is_ok() {}
    });

    let mut rx = relayed.packets.subscribe();
    let label = relayed.track_id.clone();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(pkt) => {
                    if let Err(e) = local.write_rtp(&pkt).await {
                        warn!("{label} write_rtp error: {e}");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("{label} sink lagged, skipped {n} packets");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn link_peers(source: &PeerLink, sink: &PeerLink) {
    let sink = RelaySink {
        pc: Arc::downgrade(&sink.pc),
        negotiation_needed: sink.negotiation_needed.clone(),
    };
    let published = {
        let mut relay = source.relay.lock();
        relay.prune_sinks();
        relay.sinks.push(sink.clone());
        relay.published.clone()
    };

    for relayed in published {
        attach_relayed_track(&relayed, &sink).await;
    }
}

fn candidate_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_m_line_index,
        username_fragment: None,
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    async fn create_pipeline(&self) -> Result<PipelineId, EngineError> {
        let id = PipelineId::new();
        self.pipelines.insert(id, Vec::new());
        info!("Created {}", id);
        Ok(id)
    }

    async fn release_pipeline(&self, pipeline: &PipelineId) -> Result<(), EngineError> {
        let Some((_, endpoints)) = self.pipelines.remove(pipeline) else {
            return Err(EngineError::UnknownPipeline(*pipeline));
        };
        for endpoint in endpoints {
            if self.endpoints.contains_key(&endpoint) {
                warn!("Releasing {} left behind in {}", endpoint, pipeline);
                self.release_endpoint(&endpoint).await?;
            }
        }
        info!("Released {}", pipeline);
        Ok(())
    }

    async fn create_endpoint(
        &self,
        pipeline: &PipelineId,
        kind: EndpointKind,
    ) -> Result<EndpointId, EngineError> {
        if !self.pipelines.contains_key(pipeline) {
            return Err(EngineError::UnknownPipeline(*pipeline));
        }

        let id = EndpointId::new();
        let events: EventSlot = Arc::new(Mutex::new(None));
        let entry = match kind {
            EndpointKind::WebRtc => EndpointEntry::Peer(
                self.new_peer_link(MediaTarget::endpoint(id), events.clone())
                    .await?,
            ),
            EndpointKind::Shared => EndpointEntry::Shared(Arc::new(Mutex::new(SharedSession {
                subs: HashMap::new(),
                master: None,
                bitrates: HashMap::new(),
            }))),
        };

        self.endpoints.insert(
            id,
            EndpointRecord {
                pipeline: *pipeline,
                events,
                entry,
            },
        );
        if let Some(mut members) = self.pipelines.get_mut(pipeline) {
            members.push(id);
        }
        debug!("Created {} ({:?}) in {}", id, kind, pipeline);
        Ok(id)
    }

    async fn release_endpoint(&self, endpoint: &EndpointId) -> Result<(), EngineError> {
        let Some((_, record)) = self.endpoints.remove(endpoint) else {
            return Err(EngineError::UnknownEndpoint(*endpoint));
        };
        if let Some(mut members) = self.pipelines.get_mut(&record.pipeline) {
            members.retain(|id| id != endpoint);
        }
        record.events.lock().take();

        let links: Vec<Arc<PeerLink>> = match record.entry {
            EndpointEntry::Peer(link) => vec![link],
            EndpointEntry::Shared(shared) => shared.lock().subs.drain().map(|(_, l)| l).collect(),
        };
        for link in links {
            if let Err(e) = link.pc.close().await {
                warn!("Closing peer connection of {} failed: {}", endpoint, e);
            }
        }
        debug!("Released {}", endpoint);
        Ok(())
    }

    async fn subscribe(
        &self,
        endpoint: &EndpointId,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<(), EngineError> {
        let record = self
            .endpoints
            .get(endpoint)
            .ok_or(EngineError::UnknownEndpoint(*endpoint))?;
        *record.events.lock() = Some(events);
        Ok(())
    }

    async fn connect(&self, source: &EndpointId, sink: &EndpointId) -> Result<(), EngineError> {
        let source_link = self.peer_link(&MediaTarget::endpoint(*source))?;
        let sink_link = self.peer_link(&MediaTarget::endpoint(*sink))?;
        link_peers(&source_link, &sink_link).await;
        debug!("Connected {} -> {}", source, sink);
        Ok(())
    }

    async fn generate_offer(&self, target: &MediaTarget) -> Result<String, EngineError> {
        let link = self.peer_link(target)?;
        link.negotiation_needed.store(false, Ordering::SeqCst);

        let offer = link
            .pc
            .create_offer(None)
            .await
            .map_err(|e| EngineError::Negotiation(e.to_string()))?;
        link.pc
            .set_local_description(offer.clone())
            .await
            .map_err(|e| EngineError::Negotiation(e.to_string()))?;
        Ok(offer.sdp)
    }

    async fn process_offer(
        &self,
        target: &MediaTarget,
        sdp_offer: &str,
    ) -> Result<String, EngineError> {
        let link = self.peer_link(target)?;
        let desc = RTCSessionDescription::offer(sdp_offer.to_owned())
            .map_err(|e| EngineError::Negotiation(e.to_string()))?;
        link.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| EngineError::Negotiation(e.to_string()))?;

        let answer = link
            .pc
            .create_answer(None)
            .await
            .map_err(|e| EngineError::Negotiation(e.to_string()))?;
        link.pc
            .set_local_description(answer.clone())
            .await
            .map_err(|e| EngineError::Negotiation(e.to_string()))?;
        Ok(answer.sdp)
    }

    async fn process_answer(
        &self,
        target: &MediaTarget,
        sdp_answer: &str,
    ) -> Result<(), EngineError> {
        let link = self.peer_link(target)?;
        let desc = RTCSessionDescription::answer(sdp_answer.to_owned())
            .map_err(|e| EngineError::Negotiation(e.to_string()))?;
        link.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| EngineError::Negotiation(e.to_string()))
    }

    async fn add_ice_candidate(
        &self,
        target: &MediaTarget,
        candidate: IceCandidate,
    ) -> Result<(), EngineError> {
        let link = self.peer_link(target)?;
        link.pc
            .add_ice_candidate(candidate_init(candidate))
            .await
            .map_err(|e| EngineError::Candidate(e.to_string()))
    }

    async fn gather_candidates(&self, target: &MediaTarget) -> Result<(), EngineError> {
        // Gathering starts with set_local_description; nothing to kick off.
        self.peer_link(target)?;
        debug!("Gathering candidates on {}", target);
        Ok(())
    }

    async fn is_negotiation_needed(&self, target: &MediaTarget) -> Result<bool, EngineError> {
        let link = self.peer_link(target)?;
        Ok(link.negotiation_needed.load(Ordering::SeqCst))
    }

    async fn set_simulcast(&self, target: &MediaTarget, enabled: bool) -> Result<(), EngineError> {
        let link = self.peer_link(target)?;
        link.relay.lock().simulcast = enabled;
        debug!("Simulcast {} on {}", if enabled { "on" } else { "off" }, target);
        Ok(())
    }

    async fn create_sub_session(&self, shared: &EndpointId) -> Result<SubSessionId, EngineError> {
        let session = self.shared(shared)?;
        let events = self
            .endpoints
            .get(shared)
            .map(|record| record.events.clone())
            .ok_or(EngineError::UnknownEndpoint(*shared))?;

        let id = SubSessionId::new();
        let link = self
            .new_peer_link(MediaTarget::sub_session(*shared, id), events)
            .await?;

        let master = {
            let mut session = session.lock();
            session.subs.insert(id, link.clone());
            session.master.and_then(|m| session.subs.get(&m).cloned())
        };
        if let Some(master) = master {
            link_peers(&master, &link).await;
        }
        debug!("Created {} on {}", id, shared);
        Ok(id)
    }

    async fn release_sub_session(
        &self,
        shared: &EndpointId,
        sub_session: &SubSessionId,
    ) -> Result<(), EngineError> {
        let session = self.shared(shared)?;
        let link = {
            let mut session = session.lock();
            if session.master == Some(*sub_session) {
                session.master = None;
            }
            session.bitrates.remove(sub_session);
            session.subs.remove(sub_session)
        }
        .ok_or(EngineError::UnknownSubSession(*sub_session))?;

        if let Err(e) = link.pc.close().await {
            warn!("Closing {} failed: {}", sub_session, e);
        }
        Ok(())
    }

    async fn set_master_sub_session(
        &self,
        shared: &EndpointId,
        sub_session: &SubSessionId,
    ) -> Result<(), EngineError> {
        let session = self.shared(shared)?;
        let (master, others) = {
            let mut session = session.lock();
            let master = session
                .subs
                .get(sub_session)
                .cloned()
                .ok_or(EngineError::UnknownSubSession(*sub_session))?;
            session.master = Some(*sub_session);
            let others: Vec<Arc<PeerLink>> = session
                .subs
                .iter()
                .filter(|(id, _)| *id != sub_session)
                .map(|(_, link)| link.clone())
                .collect();
            (master, others)
        };

        for other in others {
            link_peers(&master, &other).await;
        }
        info!("{} is master of {}", sub_session, shared);
        Ok(())
    }

    async fn set_target_bitrate(
        &self,
        shared: &EndpointId,
        sub_session: &SubSessionId,
        bitrate_bps: u32,
    ) -> Result<(), EngineError> {
        let session = self.shared(shared)?;
        let mut session = session.lock();
        if !session.subs.contains_key(sub_session) {
            return Err(EngineError::UnknownSubSession(*sub_session));
        }
        session.bitrates.insert(*sub_session, bitrate_bps);
        debug!("{} target bitrate set to {} bps", sub_session, bitrate_bps);
        Ok(())
    }
}
