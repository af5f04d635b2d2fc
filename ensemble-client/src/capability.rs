use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Sound output. The mesh forwards what peers play; synthesis lives behind this trait.
#[async_trait]
pub trait InstrumentPlayer: Send + Sync {
    /// Make `name` playable. Called before the first note in that instrument.
    async fn load_instrument(&self, name: &str) -> Result<()>;

    fn note_on(&self, instrument: &str, note: &str, duration: Option<&str>);

    fn note_off(&self, instrument: &str, note: &str);
}

/// Local capture device, exposed only as open/close.
#[async_trait]
pub trait Microphone: Send + Sync {
    async fn open(&self) -> Result<MicStream>;

    async fn close(&self);
}

/// The shared outgoing audio track. Cloning shares the same track.
#[derive(Clone)]
pub struct MicStream {
    stream_id: String,
    track: Arc<TrackLocalStaticSample>,
}

impl MicStream {
    pub fn new(stream_id: impl Into<String>) -> Self {
        let stream_id = stream_id.into();
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            stream_id.clone(),
        ));
        Self { stream_id, track }
    }

    pub fn id(&self) -> &str {
        &self.stream_id
    }

    pub fn track(&self) -> &Arc<TrackLocalStaticSample> {
        &self.track
    }
}

impl std::fmt::Debug for MicStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicStream")
            .field("stream_id", &self.stream_id)
            .finish()
    }
}

/// A microphone that yields a track carrying no samples. Lets headless
/// participants take part in audio negotiation without a capture device.
pub struct SilentMicrophone {
    stream_id: String,
}

impl SilentMicrophone {
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
        }
    }
}

#[async_trait]
impl Microphone for SilentMicrophone {
    async fn open(&self) -> Result<MicStream> {
        Ok(MicStream::new(self.stream_id.clone()))
    }

    async fn close(&self) {}
}
