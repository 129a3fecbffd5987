use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::capabilities::MusicService;
use crate::model::{
    BrowseState, DeviceRecord, PlayMode, PlayState, PositionInfo, ServiceDescriptor, TrackInfo,
    ZoneMember,
};
use crate::Host;

/// Events published by the navigator for its consumers.
#[derive(Clone, Debug)]
pub enum BrowseEvent {
    /// A selection produced a new listing.
    SelectResult { state: BrowseState },
    /// A page fetch extended an existing listing. `state.search`
    /// tells search listings apart from plain browse listings.
    ScrollResult { state: BrowseState },
    /// A search produced a fresh listing.
    SearchResult { state: BrowseState },
    /// A service was picked for registration. The client is not yet
    /// authenticated.
    AddService {
        descriptor: ServiceDescriptor,
        client: Arc<dyn MusicService>,
    },
    /// Navigate one level up.
    Back,
    /// Navigate to the home menu.
    Home,
    /// The search category changed.
    SearchModeChanged { mode: String },
}

/// Telemetry reported by device watchers, folded by the reducer.
#[derive(Clone, Debug)]
pub enum TelemetryEvent {
    /// Full zone-topology snapshot.
    Topology { members: Vec<ZoneMember> },
    /// The active coordinator or group changed.
    GroupSelected { host: Host, group: Option<String> },
    /// A device search resolved a host.
    DeviceFound { device: DeviceRecord },
    /// The current track of a host changed.
    TrackChanged {
        host: Host,
        track: TrackInfo,
        /// Parsed transport metadata, when the event carried any.
        transport_metadata: Option<TrackInfo>,
        play_state: PlayState,
    },
    /// The upcoming track of a host changed.
    NextTrackChanged { host: Host, track: TrackInfo },
    PlayStateChanged { host: Host, play_state: PlayState },
    PositionChanged { host: Host, info: PositionInfo },
    CrossfadeModeChanged { host: Host, enabled: bool },
    PlayModeChanged { host: Host, mode: PlayMode },
    /// The play queue of a host changed.
    QueueChanged { host: Host },
    VolumeChanged { host: Host, volume: u16 },
    /// The household advertised its music services.
    ServicesUpdated { services: Vec<ServiceDescriptor> },
}

/// Broadcast bus for [`BrowseEvent`].
///
/// Subscribers receive every event published after they subscribe.
/// Disconnected subscribers are pruned on the next broadcast.
#[derive(Clone, Default)]
pub struct BrowseEventBus {
    subscribers: Arc<Mutex<Vec<Sender<BrowseEvent>>>>,
}

impl BrowseEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<BrowseEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub(crate) fn broadcast(&self, event: BrowseEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Broadcast bus for [`TelemetryEvent`].
///
/// Device watchers publish here, the fold worker and any number of
/// observers subscribe.
#[derive(Clone, Default)]
pub struct TelemetryEventBus {
    subscribers: Arc<Mutex<Vec<Sender<TelemetryEvent>>>>,
}

impl TelemetryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<TelemetryEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    pub fn broadcast(&self, event: TelemetryEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
