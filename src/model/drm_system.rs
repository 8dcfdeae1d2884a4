//! DRM system signaling entity

use uuid::Uuid;

/// DRM signaling metadata binding one content key to one DRM system
///
/// The payload fields are opaque to this crate: they are produced by an
/// external signaling generator (PSSH/playlist-tag encoders) and stored
/// verbatim. Only the identifiers participate in validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrmSystem {
    /// Well-known UUID of the DRM system (e.g. Widevine, PlayReady)
    pub system_id: Uuid,
    /// Id of the content key this signaling applies to
    pub kid: Uuid,
    /// Base64 PSSH box for this system
    pub pssh: Option<String>,
    /// Base64 DASH ContentProtection element payload
    pub content_protection_data: Option<String>,
    /// Base64 HLS signaling destined for the master playlist
    pub hls_signaling_data_master: Option<String>,
    /// Base64 HLS signaling destined for media playlists
    pub hls_signaling_data_media: Option<String>,
    /// Base64 Smooth Streaming protection header
    pub smooth_streaming_protection_header_data: Option<String>,
}

impl DrmSystem {
    /// Create signaling for one (system, key) pair with no payloads yet
    pub fn new(system_id: Uuid, kid: Uuid) -> Self {
        Self {
            system_id,
            kid,
            pssh: None,
            content_protection_data: None,
            hls_signaling_data_master: None,
            hls_signaling_data_media: None,
            smooth_streaming_protection_header_data: None,
        }
    }
}
