use crate::capability::MicStream;
use crate::config::MeshConfig;
use crate::transport::link_event::{LinkEvent, LinkId};
use crate::transport::peer_transport::{PeerTransport, Role, TransportFactory};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use ensemble_core::{IceCandidate, MemberId};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;

type ChannelSlot = Arc<Mutex<Option<Arc<RTCDataChannel>>>>;

/// webrtc-rs backed PeerLink transport.
pub struct RtcTransport {
    link: LinkId,
    peer_connection: Arc<RTCPeerConnection>,
    data_channel: ChannelSlot,
    audio_sender: Mutex<Option<Arc<RTCRtpSender>>>,
    events: mpsc::UnboundedSender<LinkEvent>,
    label: String,
}

impl RtcTransport {
    pub async fn new(
        link: LinkId,
        role: Role,
        config: &MeshConfig,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .context("Failed to create peer connection")?,
        );
        let data_channel: ChannelSlot = Arc::new(Mutex::new(None));

        let ice_tx = events.clone();
        peer_connection.on_ice_connection_state_change(Box::new(
            move |state: RTCIceConnectionState| {
                let tx = ice_tx.clone();
                Box::pin(async move {
                    info!("ICE state for {}: {}", link, state);
                    match state {
                        RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
                            let _ = tx.send(LinkEvent::IceConnected(link));
                        }
                        RTCIceConnectionState::Failed
                        | RTCIceConnectionState::Disconnected
                        | RTCIceConnectionState::Closed => {
                            let _ = tx.send(LinkEvent::IceFailed(link, state.to_string()));
                        }
                        _ => {}
                    }
                })
            },
        ));

        let candidate_tx = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = candidate_tx.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let _ = tx.send(LinkEvent::LocalCandidate(link, from_init(init)));
            })
        }));

        let track_tx = events.clone();
        peer_connection.on_track(Box::new(move |track, _, _| {
            let tx = track_tx.clone();
            Box::pin(async move {
                let stream_id = track.stream_id().to_string();
                info!("Remote media '{}' on {}", stream_id, link);
                let _ = tx.send(LinkEvent::RemoteMedia(link, stream_id));
            })
        }));

        if role == Role::Responder {
            let dc_tx = events.clone();
            let slot = data_channel.clone();
            peer_connection.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                let tx = dc_tx.clone();
                let slot = slot.clone();
                Box::pin(async move {
                    debug!("Data channel '{}' offered on {}", dc.label(), link);
                    wire_data_channel(&dc, link, tx);
                    *slot.lock().await = Some(dc);
                })
            }));
        }

        Ok(Self {
            link,
            peer_connection,
            data_channel,
            audio_sender: Mutex::new(None),
            events,
            label: config.data_channel_label.clone(),
        })
    }
}

fn wire_data_channel(dc: &Arc<RTCDataChannel>, link: LinkId, events: mpsc::UnboundedSender<LinkEvent>) {
    let open_tx = events.clone();
    dc.on_open(Box::new(move || {
        let tx = open_tx.clone();
        Box::pin(async move {
            info!("Data channel open on {}", link);
            let _ = tx.send(LinkEvent::DataChannelOpen(link));
        })
    }));

    let close_tx = events.clone();
    dc.on_close(Box::new(move || {
        let tx = close_tx.clone();
        Box::pin(async move {
            debug!("Data channel closed on {}", link);
            let _ = tx.send(LinkEvent::DataChannelClosed(link));
        })
    }));

    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let tx = events.clone();
        Box::pin(async move {
            let bytes = Bytes::from(msg.data.to_vec());
            let _ = tx.send(LinkEvent::Message(link, bytes));
        })
    }));
}

fn from_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_m_line_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn to_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_m_line_index,
        username_fragment: candidate.username_fragment,
    }
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn create_offer(&self) -> Result<String> {
        let dc = self
            .peer_connection
            .create_data_channel(&self.label, None)
            .await
            .context("Failed to create data channel")?;
        wire_data_channel(&dc, self.link, self.events.clone());
        *self.data_channel.lock().await = Some(dc);

        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .context("Failed to create offer")?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .context("Failed to set local description")?;
        Ok(offer.sdp)
    }

    async fn accept_offer(&self, sdp: String) -> Result<String> {
        let offer = RTCSessionDescription::offer(sdp)?;
        self.peer_connection
            .set_remote_description(offer)
            .await
            .context("Failed to set remote offer")?;

        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .context("Failed to create answer")?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await
            .context("Failed to set local description")?;
        Ok(answer.sdp)
    }

    async fn apply_answer(&self, sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp)?;
        self.peer_connection
            .set_remote_description(answer)
            .await
            .context("Failed to set remote answer")?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.peer_connection
            .add_ice_candidate(to_init(candidate))
            .await?;
        Ok(())
    }

    async fn send_text(&self, text: String) -> Result<()> {
        let guard = self.data_channel.lock().await;
        let dc = guard
            .as_ref()
            .ok_or_else(|| anyhow!("no data channel on {}", self.link))?;
        dc.send_text(text).await?;
        Ok(())
    }

    async fn attach_audio(&self, stream: &MicStream) -> Result<()> {
        let mut sender_slot = self.audio_sender.lock().await;
        if sender_slot.is_some() {
            return Ok(());
        }

        let track: Arc<dyn TrackLocal + Send + Sync> = stream.track().clone();
        let sender = self
            .peer_connection
            .add_track(track)
            .await
            .context("Failed to add audio track")?;

        // RTCP has to be drained for interceptors to work.
        let rtcp_sender = sender.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while rtcp_sender.read(&mut buf).await.is_ok() {}
        });

        *sender_slot = Some(sender);
        Ok(())
    }

    async fn detach_audio(&self) -> Result<()> {
        if let Some(sender) = self.audio_sender.lock().await.take() {
            self.peer_connection
                .remove_track(&sender)
                .await
                .context("Failed to remove audio track")?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(dc) = self.data_channel.lock().await.take() {
            if let Err(e) = dc.close().await {
                warn!("Closing data channel on {} failed: {}", self.link, e);
            }
        }
        self.peer_connection.close().await?;
        Ok(())
    }
}

/// Creates one `RtcTransport` per PeerLink.
#[derive(Clone, Default)]
pub struct RtcTransportFactory {
    config: MeshConfig,
}

impl RtcTransportFactory {
    pub fn new(config: MeshConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn connect(
        &self,
        local: MemberId,
        link: LinkId,
        role: Role,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn PeerTransport>> {
        debug!("{} opening {:?} transport to {}", local, role, link);
        let transport = RtcTransport::new(link, role, &self.config, events).await?;
        Ok(Box::new(transport))
    }
}
