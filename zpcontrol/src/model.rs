use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capabilities::MusicService;
use crate::Host;

/// One selectable row of a browse listing.
///
/// Entries come from three origins: the fixed menus, library listings
/// returned by a zone player, and metadata listings returned by a
/// music service. Service-originated entries are tagged with the
/// client that produced them so later fetches go back to the same
/// service.
#[derive(Clone, Debug, Default)]
pub struct Entry {
    /// Object id understood by the backend that produced the entry.
    pub id: Option<String>,
    /// Display title.
    pub title: String,
    /// Backend item type, `"track"` for playable service tracks.
    pub item_type: Option<String>,
    /// DIDL upnp class, when the backend reports one.
    pub class: Option<String>,
    /// Playable or browsable URI.
    pub uri: Option<String>,
    /// Library search prefix for fixed menu entries, e.g. `"A:ALBUM"`.
    pub search_type: Option<String>,
    /// Fixed behavior triggered on selection instead of a plain browse.
    pub action: Option<EntryAction>,
    /// Service client that produced this entry.
    pub service_client: Option<Arc<dyn MusicService>>,
    /// Raw transport metadata, carried by favourites and broadcasts.
    pub metadata_raw: Option<String>,
}

impl Entry {
    /// Build an entry from a service response item, tagging it with
    /// the owning client.
    pub fn from_service_item(item: ServiceItem, client: Arc<dyn MusicService>) -> Entry {
        Entry {
            id: Some(item.id),
            title: item.title,
            item_type: item.item_type,
            class: None,
            uri: item.uri,
            search_type: None,
            action: None,
            service_client: Some(client),
            metadata_raw: None,
        }
    }

    pub fn is_track(&self) -> bool {
        self.item_type.as_deref() == Some("track")
    }
}

/// Fixed behaviors an entry can trigger on selection.
///
/// The set is closed: anything else a listing contains is handled by
/// the generic browse path.
#[derive(Clone, Debug)]
pub enum EntryAction {
    /// Open the fixed music-library menu.
    Library,
    /// Fan a line-in listing out across every known device.
    LineIn,
    /// List external services available for registration.
    BrowseServices,
    /// Offer the described service for registration.
    AddService { descriptor: ServiceDescriptor },
    /// Open the root listing of a registered service.
    Service { service: RegisteredService },
}

/// Published view of the current listing plus its pagination cursor.
///
/// Snapshots are immutable: every navigation or page fetch publishes
/// a fresh value instead of mutating the previous one.
#[derive(Clone, Debug, Default)]
pub struct BrowseState {
    pub title: String,
    pub items: Vec<Entry>,
    /// Total size of the listing. Only authoritative once a fetch has
    /// reported it.
    pub total: Option<u32>,
    /// Entry this listing was opened from, used to fetch further pages.
    pub parent: Option<Entry>,
    /// Service client owning the listing, when service-backed.
    pub service_client: Option<Arc<dyn MusicService>>,
    /// Library search prefix used as a fallback object id.
    pub search_type: Option<String>,
    /// True when this listing came from a search.
    pub search: bool,
    /// Search category the listing was produced with.
    pub search_category: Option<String>,
    /// Term the listing was produced with.
    pub term: Option<String>,
    /// Object id of the listing, used to fetch further pages.
    pub id: Option<String>,
}

impl BrowseState {
    /// Seed a pending state from the entry being opened.
    pub fn from_entry(entry: &Entry) -> BrowseState {
        BrowseState {
            title: entry.title.clone(),
            id: entry.id.clone(),
            search_type: entry.search_type.clone(),
            ..BrowseState::default()
        }
    }
}

/// A selectable entry resolved to a playable URI and transport
/// metadata.
#[derive(Clone, Debug, Default)]
pub struct ResolvedMedia {
    pub uri: String,
    /// Encoded transport metadata, present for service-backed items.
    pub metadata: Option<String>,
    /// Raw transport metadata, present for favourites and broadcasts.
    pub metadata_raw: Option<String>,
    pub class: Option<String>,
    pub title: String,
}

impl ResolvedMedia {
    /// Use an entry as-is: its URI and metadata are already playable.
    pub fn passthrough(entry: &Entry) -> ResolvedMedia {
        ResolvedMedia {
            uri: entry.uri.clone().unwrap_or_default(),
            metadata: None,
            metadata_raw: entry.metadata_raw.clone(),
            class: entry.class.clone(),
            title: entry.title.clone(),
        }
    }
}

/// Logical play state reported by a zone player's transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Paused,
    Stopped,
    /// The transport is switching tracks or streams.
    Transitioning,
    /// Unrecognized state, kept verbatim.
    Unknown(String),
}

impl PlayState {
    /// Map a raw transport-state signal to a logical play state.
    pub fn from_signal(raw: &str) -> PlayState {
        match raw.trim().to_ascii_lowercase().as_str() {
            "playing" => PlayState::Playing,
            "paused" | "paused_playback" => PlayState::Paused,
            "stopped" => PlayState::Stopped,
            "transitioning" => PlayState::Transitioning,
            _ => PlayState::Unknown(raw.trim().to_string()),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlayState::Playing)
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
            PlayState::Stopped => "stopped",
            PlayState::Transitioning => "transitioning",
            PlayState::Unknown(raw) => raw,
        }
    }
}

/// Queue play mode reported by a zone player.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayMode {
    Normal,
    RepeatAll,
    RepeatOne,
    Shuffle,
    ShuffleNoRepeat,
    ShuffleRepeatOne,
    Unknown(String),
}

impl PlayMode {
    pub fn from_signal(raw: &str) -> PlayMode {
        match raw.trim().to_ascii_uppercase().as_str() {
            "NORMAL" => PlayMode::Normal,
            "REPEAT_ALL" => PlayMode::RepeatAll,
            "REPEAT_ONE" => PlayMode::RepeatOne,
            "SHUFFLE" => PlayMode::Shuffle,
            "SHUFFLE_NOREPEAT" => PlayMode::ShuffleNoRepeat,
            "SHUFFLE_REPEAT_ONE" => PlayMode::ShuffleRepeatOne,
            _ => PlayMode::Unknown(raw.trim().to_string()),
        }
    }
}

/// Raw zone-topology record as reported by a device.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ZoneMember {
    pub name: String,
    /// Device description URL, the host is extracted from it.
    pub location: String,
    pub coordinator: bool,
    pub uuid: Option<String>,
}

/// A playback zone retained after topology normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct Zone {
    pub name: String,
    pub host: Host,
    pub coordinator: bool,
    pub uuid: Option<String>,
}

/// Result of a device search, recorded per host.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceRecord {
    pub host: Host,
    pub model: Option<String>,
}

/// Track metadata reported by a zone player's transport.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_art_uri: Option<String>,
    /// Duration in seconds.
    pub duration: Option<u32>,
    pub uri: Option<String>,
    pub class: Option<String>,
}

/// What one host is playing right now.
#[derive(Clone, Debug, PartialEq)]
pub struct NowPlaying {
    pub host: Host,
    pub is_playing: bool,
    pub track: TrackInfo,
}

/// Queue position report from a zone player.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PositionInfo {
    /// Queue position of the current track, 1-based.
    pub track: u32,
    pub rel_time: Option<String>,
    pub track_duration: Option<String>,
    pub track_uri: Option<String>,
    pub track_metadata: Option<String>,
}

/// Zone attributes reported by a device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ZoneAttributes {
    pub zone_name: String,
    pub icon: Option<String>,
}

/// Raw descriptor of an external music service as advertised by a
/// device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceDescriptor {
    pub id: u32,
    pub name: String,
    /// Encoded service-type identifier, matched against linked
    /// accounts.
    pub service_type: String,
    pub uri: Option<String>,
    pub secure_uri: Option<String>,
}

/// Identity of a music service as exposed by its client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub id: u32,
    pub service_id_encoded: String,
}

/// Credentials stored for a registered service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCredentials {
    pub auth_token: String,
    pub private_key: String,
}

/// A configured music service: descriptor plus stored credentials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisteredService {
    pub descriptor: ServiceDescriptor,
    pub credentials: ServiceCredentials,
}

/// Linked streaming account used for token-based URI resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountSettings {
    /// Encoded service-type identifier this account belongs to.
    pub service_type: String,
    pub serial_num: String,
    pub username: String,
}

/// One item of a music-service metadata response.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceItem {
    pub id: String,
    pub title: String,
    pub item_type: Option<String>,
    pub uri: Option<String>,
    pub album_art_uri: Option<String>,
    pub artist: Option<String>,
    pub can_play: Option<bool>,
    /// Index the item claims within the full listing. Services answer
    /// pages sparsely, so placement honors this over arrival order.
    #[serde(alias = "$$position")]
    pub position: Option<usize>,
}

/// Response of a music-service metadata fetch.
///
/// `media_metadata` carries playable items and `media_collection`
/// browsable containers. Servers serialize each as one object or a
/// sequence depending on cardinality.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceMetadata {
    pub media_metadata: Option<OneOrMany<ServiceItem>>,
    pub media_collection: Option<OneOrMany<ServiceItem>>,
    pub total: Option<u32>,
    pub index: Option<u32>,
    pub count: Option<u32>,
}

/// A field that servers serialize either as one object or a sequence.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// One page of a library or search listing.
#[derive(Clone, Debug, Default)]
pub struct LibraryPage {
    pub items: Vec<Entry>,
    /// Total matches reported by the backend.
    pub total: Option<u32>,
}

/// Paging window for library and service fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrowseWindow {
    pub start: u32,
    /// Number of items requested, `0` asks for the listing size only.
    pub count: u32,
}

impl BrowseWindow {
    pub fn page(start: u32, count: u32) -> BrowseWindow {
        BrowseWindow { start, count }
    }

    /// Request only the listing size, no items.
    pub fn total_only() -> BrowseWindow {
        BrowseWindow { start: 0, count: 0 }
    }
}
