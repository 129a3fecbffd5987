use std::collections::HashMap;
use std::io;
use std::sync::{Arc, RwLock};
use std::thread;

use indexmap::IndexMap;
use tracing::{debug, warn};
use url::Url;

use crate::events::{TelemetryEvent, TelemetryEventBus};
use crate::model::{
    DeviceRecord, NowPlaying, PlayMode, PlayState, PositionInfo, TrackInfo, Zone, ZoneMember,
};
use crate::Host;

/// Transport class of broadcast placeholder tracks that carry no
/// usable metadata of their own.
const BROADCAST_PLACEHOLDER_CLASS: &str = "object.item";

/// Per-host playback and topology state folded from device telemetry.
#[derive(Clone, Debug, Default)]
pub struct TelemetryState {
    pub current_group: Option<String>,
    pub current_host: Option<Host>,
    /// Zones retained after topology normalization.
    pub zones: Vec<Zone>,
    /// Raw device-search results, keyed by host. Only hosts present
    /// here survive topology normalization.
    pub device_searches: HashMap<Host, DeviceRecord>,
    pub current_tracks: HashMap<Host, NowPlaying>,
    pub next_tracks: HashMap<Host, TrackInfo>,
    pub position_infos: HashMap<Host, PositionInfo>,
    pub play_modes: HashMap<Host, PlayMode>,
    pub crossfade_modes: HashMap<Host, bool>,
}

impl TelemetryState {
    /// Fold one event into a fresh snapshot. The input state is never
    /// mutated.
    pub fn apply(&self, event: &TelemetryEvent) -> TelemetryState {
        match event {
            TelemetryEvent::Topology { members } => self.apply_topology(members),
            TelemetryEvent::GroupSelected { host, group } => {
                let mut next = self.clone();
                next.current_host = Some(host.clone());
                next.current_group = group.clone();
                next
            }
            TelemetryEvent::DeviceFound { device } => {
                let mut next = self.clone();
                next.device_searches
                    .insert(device.host.clone(), device.clone());
                next
            }
            TelemetryEvent::TrackChanged {
                host,
                track,
                transport_metadata,
                play_state,
            } => self.apply_track(host, track, transport_metadata.as_ref(), play_state),
            TelemetryEvent::NextTrackChanged { host, track } => {
                let mut next = self.clone();
                next.next_tracks.insert(host.clone(), track.clone());
                next
            }
            TelemetryEvent::PlayStateChanged { host, play_state } => {
                self.apply_play_state(host, play_state)
            }
            TelemetryEvent::PositionChanged { host, info } => {
                let mut next = self.clone();
                next.position_infos.insert(host.clone(), info.clone());
                next
            }
            TelemetryEvent::CrossfadeModeChanged { host, enabled } => {
                let mut next = self.clone();
                next.crossfade_modes.insert(host.clone(), *enabled);
                next
            }
            TelemetryEvent::PlayModeChanged { host, mode } => {
                let mut next = self.clone();
                next.play_modes.insert(host.clone(), mode.clone());
                next
            }
            // Observed, but not folded into this state slice.
            TelemetryEvent::QueueChanged { .. } | TelemetryEvent::VolumeChanged { .. } => {
                self.clone()
            }
            TelemetryEvent::ServicesUpdated { services } => {
                debug!(count = services.len(), "Household advertised its services");
                self.clone()
            }
        }
    }

    /// Normalize a raw topology snapshot into the retained zone list.
    ///
    /// Members sharing a name are collapsed to their coordinator; a
    /// pair is a stereo pair and keeps the name suffixed with
    /// `" (L + R)"`. Zones whose host no device search resolved are
    /// hidden, as are bridges and boosts.
    fn apply_topology(&self, members: &[ZoneMember]) -> TelemetryState {
        let mut groups: IndexMap<String, Vec<(Host, ZoneMember)>> = IndexMap::new();
        for member in members {
            let Some(host) = host_from_location(&member.location) else {
                warn!(
                    location = member.location.as_str(),
                    "Skipping zone member with unparsable location"
                );
                continue;
            };
            groups
                .entry(member.name.clone())
                .or_default()
                .push((host, member.clone()));
        }

        let zones = groups
            .into_iter()
            .filter_map(|(name, group)| collapse_group(name, group))
            .filter(|zone| self.device_searches.contains_key(&zone.host))
            .filter(|zone| {
                let name = zone.name.to_lowercase();
                !name.contains("bridge") && !name.contains("boost")
            })
            .collect();

        let mut next = self.clone();
        next.zones = zones;
        next
    }

    fn apply_track(
        &self,
        host: &Host,
        track: &TrackInfo,
        transport_metadata: Option<&TrackInfo>,
        play_state: &PlayState,
    ) -> TelemetryState {
        let was_playing = self
            .current_tracks
            .get(host)
            .map(|now| now.is_playing)
            .unwrap_or(false);
        let is_playing = match play_state {
            // Keep the last settled answer while the transport switches.
            PlayState::Transitioning => was_playing,
            other => other.is_playing(),
        };

        let track = if track.class.as_deref() == Some(BROADCAST_PLACEHOLDER_CLASS) {
            match transport_metadata {
                None => {
                    debug!(host = %host, "Ignoring broadcast placeholder without metadata");
                    return self.clone();
                }
                Some(metadata) => TrackInfo {
                    title: metadata.title.clone(),
                    album_art_uri: track.album_art_uri.clone(),
                    ..TrackInfo::default()
                },
            }
        } else {
            track.clone()
        };

        let mut next = self.clone();
        next.current_tracks.insert(
            host.clone(),
            NowPlaying {
                host: host.clone(),
                is_playing,
                track,
            },
        );
        next
    }

    fn apply_play_state(&self, host: &Host, play_state: &PlayState) -> TelemetryState {
        if matches!(play_state, PlayState::Transitioning) {
            return self.clone();
        }
        let mut next = self.clone();
        let entry = next
            .current_tracks
            .entry(host.clone())
            .or_insert_with(|| NowPlaying {
                host: host.clone(),
                is_playing: false,
                track: TrackInfo::default(),
            });
        entry.is_playing = play_state.is_playing();
        next
    }
}

/// Collapse one name-group of raw members into a single zone.
fn collapse_group(name: String, group: Vec<(Host, ZoneMember)>) -> Option<Zone> {
    let stereo_pair = group.len() == 2;
    let (host, member) = group
        .iter()
        .find(|(_, member)| member.coordinator)
        .or_else(|| group.first())?
        .clone();

    let name = if stereo_pair {
        format!("{name} (L + R)")
    } else {
        name
    };

    Some(Zone {
        name,
        host,
        coordinator: member.coordinator,
        uuid: member.uuid,
    })
}

/// Extract the device host from its description URL.
fn host_from_location(location: &str) -> Option<Host> {
    let url = Url::parse(location).ok()?;
    url.host_str().map(|host| Host(host.to_string()))
}

/// Handle on a running telemetry fold.
#[derive(Clone)]
pub struct TelemetryFold {
    state: Arc<RwLock<TelemetryState>>,
}

impl TelemetryFold {
    /// Latest folded snapshot.
    pub fn snapshot(&self) -> TelemetryState {
        self.state.read().unwrap().clone()
    }
}

/// Spawn the worker folding bus events into a shared state.
///
/// The worker stops when the bus is dropped; the returned handle
/// stays readable afterwards.
pub fn spawn_telemetry_fold(bus: &TelemetryEventBus) -> io::Result<TelemetryFold> {
    let receiver = bus.subscribe();
    let state = Arc::new(RwLock::new(TelemetryState::default()));
    let shared = Arc::clone(&state);

    thread::Builder::new()
        .name("telemetry-fold".to_string())
        .spawn(move || {
            debug!("Telemetry fold worker started");
            while let Ok(event) = receiver.recv() {
                let next = shared.read().unwrap().apply(&event);
                *shared.write().unwrap() = next;
            }
            debug!("Telemetry bus closed, stopping fold worker");
        })?;

    Ok(TelemetryFold { state })
}
