use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::model::{
    BrowseWindow, Entry, LibraryPage, PositionInfo, ResolvedMedia, ServiceCredentials,
    ServiceDefinition, ServiceDescriptor, ServiceMetadata, ZoneAttributes,
};

/// Capability of a zone player on the local network.
///
/// This is the seam between the navigator and the device transport:
/// a real implementation talks ContentDirectory and AVTransport, the
/// test suite provides in-process fakes.
#[async_trait]
pub trait ZonePlayer: Debug + Send + Sync {
    /// List a library object, library search prefix or the play queue
    /// (object id `"queue"`) over `window`. A window with `count == 0`
    /// is a size probe: report the total, return no items.
    async fn get_music_library(&self, object_id: &str, window: BrowseWindow)
        -> Result<LibraryPage>;

    /// Search the local library for `term` within a category such as
    /// `"albums"` or `"artists"`.
    async fn search_music_library(
        &self,
        category: &str,
        term: &str,
        window: BrowseWindow,
    ) -> Result<LibraryPage>;

    /// Start playback of a URI, optionally with raw transport
    /// metadata.
    async fn play_uri(&self, uri: &str, metadata: Option<&str>) -> Result<()>;

    /// Resume playback of the current transport target.
    async fn play(&self) -> Result<()>;

    /// Enqueue a resolved item, at `position` (1-based) or at the end.
    async fn queue(&self, item: &ResolvedMedia, position: Option<u32>) -> Result<()>;

    /// Jump playback to a 1-based queue position.
    async fn goto_track(&self, position: u32) -> Result<()>;

    /// Remove every track from the play queue.
    async fn clear_queue(&self) -> Result<()>;

    /// Where the transport currently is within the queue.
    async fn position_info(&self) -> Result<PositionInfo>;

    /// Name and icon of the zone this player belongs to.
    async fn zone_attributes(&self) -> Result<ZoneAttributes>;

    /// Music services the household advertises as available for
    /// registration.
    async fn available_services(&self) -> Result<Vec<ServiceDescriptor>>;

    /// Trigger a device-state refresh so watchers publish fresh
    /// telemetry. Playback actions fire this last; nothing waits on
    /// its outcome.
    async fn query_state(&self) {}
}

/// Client of an external, token-authenticated music service.
#[async_trait]
pub trait MusicService: Debug + Send + Sync {
    /// Human-readable service name.
    fn name(&self) -> &str;

    /// Identity used to match this service against linked accounts.
    fn service_definition(&self) -> &ServiceDefinition;

    /// Fetch child metadata of an object over `[start, end)`.
    async fn get_metadata(&self, object_id: &str, start: u32, end: u32) -> Result<ServiceMetadata>;

    /// Resolve a streamable URI for an item without a linked account.
    async fn get_media_uri(&self, object_id: &str) -> Result<String>;

    /// Derive the playable URI of a track under a linked account.
    fn track_uri(&self, object_id: &str, service_id: u32, serial_num: &str) -> String;

    /// Derive the account token string carried in transport metadata.
    fn service_string(&self, service_type: &str, username: &str) -> String;

    /// Encode item metadata for the transport, optionally carrying an
    /// account token.
    fn encode_item_metadata(&self, uri: &str, item: &Entry, token: Option<&str>) -> String;
}

/// Builds service clients from raw descriptors.
///
/// Registration hands the stored credentials over at construction
/// time, so a client is authenticated for its whole lifetime or not
/// at all.
pub trait ServiceClientFactory: Debug + Send + Sync {
    fn client_for(
        &self,
        descriptor: &ServiceDescriptor,
        credentials: Option<&ServiceCredentials>,
    ) -> Arc<dyn MusicService>;
}
