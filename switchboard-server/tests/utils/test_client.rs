use anyhow::{Context, Result};
use std::sync::Arc;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_VP8, MediaEngine};
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;

/// What the test client puts into its first offer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientMedia {
    /// Publishes one VP8 video track.
    SendVideo,
    /// Only receives video.
    ReceiveVideo,
}

/// Browser stand-in driving the server's engine with real SDP.
pub struct TestClient {
    peer_connection: Arc<RTCPeerConnection>,
}

impl TestClient {
    pub async fn new(media: ClientMedia) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .context("Failed to create peer connection")?,
        );

        match media {
            ClientMedia::SendVideo => {
                let track = Arc::new(TrackLocalStaticRTP::new(
                    RTCRtpCodecCapability {
                        mime_type: MIME_TYPE_VP8.to_owned(),
                        ..Default::default()
                    },
                    "video".to_owned(),
                    "test-client".to_owned(),
                ));
                peer_connection
                    .add_track(track)
                    .await
                    .context("Failed to add track")?;
            }
            ClientMedia::ReceiveVideo => {
                peer_connection
                    .add_transceiver_from_kind(
                        webrtc::rtp_transceiver::rtp_codec::RTPCodecType::Video,
                        Some(RTCRtpTransceiverInit {
                            direction: RTCRtpTransceiverDirection::Recvonly,
                            send_encodings: vec![],
                        }),
                    )
                    .await
                    .context("Failed to add transceiver")?;
            }
        }

        Ok(Self { peer_connection })
    }

    pub async fn create_offer(&self) -> Result<String> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(offer.sdp)
    }

    pub async fn apply_answer(&self, sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp)?;
        self.peer_connection.set_remote_description(answer).await?;
        Ok(())
    }

    /// Answers a server-generated offer.
    pub async fn answer_offer(&self, sdp: String) -> Result<String> {
        let offer = RTCSessionDescription::offer(sdp)?;
        self.peer_connection.set_remote_description(offer).await?;
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }

    pub async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}
