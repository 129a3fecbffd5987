//! # ZPControl
//!
//! Control core of ZPMusic: unified browsing across the local music
//! library, line-in inputs and external music services, plus a pure
//! reducer folding device telemetry into per-host playback state.
//!
//! ## Fonctionnalités
//!
//! - Fixed menus and tagged entry actions with exhaustive dispatch
//! - Cursor-based pagination over heterogeneous listing backends
//! - Position-indexed merging of music-service pages
//! - Playback actions resolving entries through linked accounts
//! - Stereo-pair aware zone topology normalization
//! - Superseded in-flight navigations dropped instead of published
//!
//! Devices and service clients are reached through the
//! [`capabilities`] traits; nothing in this crate talks to the
//! network itself.

pub mod browser;
pub mod capabilities;
pub mod config_ext;
pub mod errors;
pub mod events;
pub mod model;
pub(crate) mod pagination;
pub mod resolver;
pub mod session;
pub mod telemetry;

pub use browser::{home_state, library_state, BrowserNavigator};
pub use capabilities::{MusicService, ServiceClientFactory, ZonePlayer};
pub use config_ext::ZoneConfigExt;
pub use errors::{ControlError, Result};
pub use events::{BrowseEvent, BrowseEventBus, TelemetryEvent, TelemetryEventBus};
pub use model::{
    AccountSettings, BrowseState, BrowseWindow, DeviceRecord, Entry, EntryAction, LibraryPage,
    NowPlaying, OneOrMany, PlayMode, PlayState, PositionInfo, RegisteredService, ResolvedMedia,
    ServiceCredentials, ServiceDefinition, ServiceDescriptor, ServiceItem, ServiceMetadata,
    TrackInfo, Zone, ZoneAttributes, ZoneMember,
};
pub use resolver::resolve_media;
pub use session::ControlSession;
pub use telemetry::{spawn_telemetry_fold, TelemetryFold, TelemetryState};

/// Network host of a zone player, e.g. `192.168.1.40`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Host(pub String);

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Default window size for library and service pages.
pub(crate) const DEFAULT_PAGE_SIZE: u32 = 100;
