use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info};

use crate::capabilities::{MusicService, ZonePlayer};
use crate::errors::{ControlError, Result};
use crate::events::{BrowseEvent, BrowseEventBus};
use crate::model::{
    BrowseState, BrowseWindow, Entry, EntryAction, RegisteredService, ServiceDescriptor,
};
use crate::pagination;
use crate::resolver::resolve_media;
use crate::session::ControlSession;
use crate::Host;

const AUDIO_BROADCAST_CLASS: &str = "object.item.audioItem.audioBroadcast";
const AUDIO_ITEM_CLASS: &str = "object.item.audioItem";

/// Object id of the favourites container.
const FAVOURITES_OBJECT_ID: &str = "FV:2";
/// Object id listing the line-in inputs of a device.
const LINE_IN_OBJECT_ID: &str = "AI:";
/// Object id of the play queue.
const QUEUE_OBJECT_ID: &str = "queue";
/// Object id of a music service's root listing.
const ROOT_OBJECT_ID: &str = "root";

/// The fixed home menu.
pub fn home_state() -> BrowseState {
    BrowseState {
        title: "Browse".to_string(),
        items: vec![
            Entry {
                title: "Sonos Favourites".to_string(),
                id: Some(FAVOURITES_OBJECT_ID.to_string()),
                class: Some("object.container".to_string()),
                ..Entry::default()
            },
            Entry {
                title: "Music Library".to_string(),
                action: Some(EntryAction::Library),
                ..Entry::default()
            },
            Entry {
                title: "Line-In".to_string(),
                action: Some(EntryAction::LineIn),
                ..Entry::default()
            },
            Entry {
                title: "Music Services".to_string(),
                action: Some(EntryAction::BrowseServices),
                ..Entry::default()
            },
        ],
        total: Some(4),
        ..BrowseState::default()
    }
}

/// The fixed music-library menu of searchable categories.
pub fn library_state() -> BrowseState {
    let categories = [
        ("Artists", "A:ARTIST"),
        ("Albums", "A:ALBUM"),
        ("Composers", "A:COMPOSER"),
        ("Genres", "A:GENRE"),
        ("Tracks", "A:TRACKS"),
        ("Playlists", "A:PLAYLISTS"),
    ];
    let items: Vec<Entry> = categories
        .into_iter()
        .map(|(title, prefix)| Entry {
            title: title.to_string(),
            search_type: Some(prefix.to_string()),
            ..Entry::default()
        })
        .collect();
    BrowseState {
        title: "Music Library".to_string(),
        total: Some(items.len() as u32),
        items,
        ..BrowseState::default()
    }
}

/// Drives browsing and playback for one control session.
///
/// Every operation works against the session's devices and services
/// and publishes its outcome on the browse bus. Listings are
/// published as immutable snapshots; consumers hand the latest
/// snapshot back to [`BrowserNavigator::more`] to page further.
#[derive(Clone)]
pub struct BrowserNavigator {
    session: Arc<ControlSession>,
    bus: BrowseEventBus,
}

impl BrowserNavigator {
    pub fn new(session: Arc<ControlSession>, bus: BrowseEventBus) -> Self {
        BrowserNavigator { session, bus }
    }

    pub fn session(&self) -> &Arc<ControlSession> {
        &self.session
    }

    /// Open an entry.
    ///
    /// Tagged entries run their fixed behavior, service-backed
    /// containers open through their client, and everything else is
    /// browsed in the local library. Opening starts a new navigation:
    /// results of earlier selections still in flight are dropped.
    pub async fn select(&self, entry: &Entry) -> Result<()> {
        let epoch = self.session.bump_epoch();
        match &entry.action {
            Some(EntryAction::Library) => {
                debug!("Opening the music library menu");
                self.publish_select(epoch, library_state());
                Ok(())
            }
            Some(EntryAction::LineIn) => self.select_line_in(epoch, entry).await,
            Some(EntryAction::BrowseServices) => self.select_service_catalog(epoch, entry).await,
            Some(EntryAction::AddService { descriptor }) => {
                let client = self.session.anonymous_client(descriptor);
                info!(
                    service = descriptor.name.as_str(),
                    "Requesting registration of a music service"
                );
                self.bus.broadcast(BrowseEvent::AddService {
                    descriptor: descriptor.clone(),
                    client,
                });
                Ok(())
            }
            Some(EntryAction::Service { service }) => {
                self.select_service_root(epoch, service).await
            }
            None => match entry.service_client.clone() {
                Some(client) if !entry.is_track() => {
                    self.select_service_child(epoch, entry, client).await
                }
                _ => self.select_library(epoch, entry).await,
            },
        }
    }

    /// Fetch the next page of a published listing.
    pub async fn more(&self, state: &BrowseState) {
        pagination::extend_listing(&self.session, &self.bus, state).await;
    }

    /// Search the library with the current category and publish the
    /// result. A failed search leaves the current listing in place.
    pub async fn search(&self, term: &str) -> Result<()> {
        let epoch = self.session.bump_epoch();
        let category = self.session.search_mode();
        let device = self.session.current_device()?;

        let window = BrowseWindow::page(0, self.session.page_size());
        let page = match device.search_music_library(&category, term, window).await {
            Ok(page) => page,
            Err(err) => {
                debug!(term, category = category.as_str(), error = %err, "Search failed");
                return Ok(());
            }
        };

        let state = BrowseState {
            title: term.to_string(),
            search: true,
            term: Some(term.to_string()),
            search_category: Some(category),
            total: page.total,
            items: page.items,
            ..BrowseState::default()
        };
        self.publish(epoch, BrowseEvent::SearchResult { state });
        Ok(())
    }

    /// Navigate one level up. Supersedes in-flight fetches.
    pub fn back(&self) {
        self.session.bump_epoch();
        self.bus.broadcast(BrowseEvent::Back);
    }

    /// Navigate to the home menu. Supersedes in-flight fetches.
    pub fn home(&self) {
        self.session.bump_epoch();
        self.bus.broadcast(BrowseEvent::Home);
    }

    /// Change the category used by subsequent searches.
    pub fn change_search_mode(&self, mode: &str) {
        self.session.set_search_mode(mode);
        self.bus.broadcast(BrowseEvent::SearchModeChanged {
            mode: mode.to_string(),
        });
    }

    /// Play an entry immediately.
    ///
    /// Broadcasts play directly by URI and raw metadata, plain audio
    /// items by URI, and anything else lands at the end of the queue
    /// before the transport jumps to it.
    pub async fn play_now(&self, entry: &Entry) -> Result<()> {
        let media = resolve_media(&self.session, entry).await?;
        let device = self.session.current_device()?;

        if media.class.as_deref() == Some(AUDIO_BROADCAST_CLASS) && media.metadata_raw.is_some() {
            info!(title = media.title.as_str(), "Playing broadcast");
            device
                .play_uri(&media.uri, media.metadata_raw.as_deref())
                .await?;
        } else if media.class.as_deref() == Some(AUDIO_ITEM_CLASS) {
            info!(title = media.title.as_str(), "Playing audio item");
            device.play_uri(&media.uri, None).await?;
        } else {
            let queue = device
                .get_music_library(QUEUE_OBJECT_ID, BrowseWindow::total_only())
                .await?;
            let position = queue.total.unwrap_or(0) + 1;
            info!(
                title = media.title.as_str(),
                position, "Queueing for immediate playback"
            );
            device.queue(&media, None).await?;
            device.goto_track(position).await?;
            device.play().await?;
        }
        device.query_state().await;
        Ok(())
    }

    /// Insert an entry right after the current track.
    pub async fn play_next(&self, entry: &Entry) -> Result<()> {
        let media = resolve_media(&self.session, entry).await?;
        let device = self.session.current_device()?;

        let position = device.position_info().await?;
        device.queue(&media, Some(position.track + 1)).await?;
        device.query_state().await;
        Ok(())
    }

    /// Append an entry to the end of the queue.
    pub async fn add_queue(&self, entry: &Entry) -> Result<()> {
        let media = resolve_media(&self.session, entry).await?;
        let device = self.session.current_device()?;

        device.queue(&media, None).await?;
        device.query_state().await;
        Ok(())
    }

    /// Replace the queue with an entry and start playing it.
    pub async fn replace_queue(&self, entry: &Entry) -> Result<()> {
        let media = resolve_media(&self.session, entry).await?;
        let device = self.session.current_device()?;

        device.clear_queue().await?;
        device.queue(&media, None).await?;
        device.play().await?;
        device.query_state().await;
        Ok(())
    }

    /// Drop a registered service from the session and configuration.
    pub fn remove_service(&self, service_id: u32) -> Result<()> {
        self.session.remove_service(service_id)
    }

    async fn select_line_in(&self, epoch: u64, entry: &Entry) -> Result<()> {
        let window = BrowseWindow::page(0, self.session.page_size());
        let queries = self
            .session
            .devices()
            .into_iter()
            .map(|(host, player)| fetch_line_in(host, player, window));
        let fetched = join_all(queries).await;

        let items: Vec<Entry> = fetched.into_iter().flatten().collect();
        let state = BrowseState {
            title: entry.title.clone(),
            total: Some(items.len() as u32),
            items,
            ..BrowseState::default()
        };
        self.publish_select(epoch, state);
        Ok(())
    }

    async fn select_service_catalog(&self, epoch: u64, entry: &Entry) -> Result<()> {
        let device = self.session.current_device()?;
        let available = device.available_services().await?;
        let known = self.session.registered_service_ids();

        let mut offered: Vec<ServiceDescriptor> = available
            .into_iter()
            .filter(|descriptor| !known.contains(&descriptor.id))
            .collect();
        offered.sort_by(|a, b| a.name.cmp(&b.name));

        let items: Vec<Entry> = offered
            .into_iter()
            .map(|descriptor| Entry {
                id: Some(descriptor.id.to_string()),
                title: descriptor.name.clone(),
                action: Some(EntryAction::AddService { descriptor }),
                ..Entry::default()
            })
            .collect();

        let state = BrowseState {
            title: entry.title.clone(),
            total: Some(items.len() as u32),
            items,
            ..BrowseState::default()
        };
        self.publish_select(epoch, state);
        Ok(())
    }

    async fn select_service_root(&self, epoch: u64, service: &RegisteredService) -> Result<()> {
        let client = self.session.service_client(service);
        let response = client
            .get_metadata(ROOT_OBJECT_ID, 0, self.session.page_size())
            .await?;

        let declared_total = response.total;
        let items = pagination::service_page_entries(response, &client);
        let total = declared_total.unwrap_or(items.len() as u32);

        let root = Entry {
            id: Some(ROOT_OBJECT_ID.to_string()),
            title: client.name().to_string(),
            service_client: Some(Arc::clone(&client)),
            ..Entry::default()
        };
        let state = BrowseState {
            title: client.name().to_string(),
            parent: Some(root),
            service_client: Some(client),
            total: Some(total),
            items,
            ..BrowseState::default()
        };
        self.publish_select(epoch, state);
        Ok(())
    }

    async fn select_service_child(
        &self,
        epoch: u64,
        entry: &Entry,
        client: Arc<dyn MusicService>,
    ) -> Result<()> {
        let Some(object_id) = entry.id.clone() else {
            return Err(ControlError::malformed(format!(
                "service entry '{}' has no object id",
                entry.title
            )));
        };
        let response = client
            .get_metadata(&object_id, 0, self.session.page_size())
            .await?;

        let declared_total = response.total;
        let items = pagination::service_page_entries(response, &client);

        let state = BrowseState {
            title: entry.title.clone(),
            parent: Some(entry.clone()),
            service_client: Some(client),
            total: declared_total,
            items,
            ..BrowseState::default()
        };
        self.publish_select(epoch, state);
        Ok(())
    }

    async fn select_library(&self, epoch: u64, entry: &Entry) -> Result<()> {
        let pending = if entry.search_type.is_some() {
            // Search categories open as an empty listing first.
            BrowseState {
                title: entry.title.clone(),
                search_type: entry.search_type.clone(),
                ..BrowseState::default()
            }
        } else {
            BrowseState::from_entry(entry)
        };
        self.publish_select(epoch, pending.clone());

        let object_id = if entry.class.is_some() {
            entry
                .id
                .clone()
                .or_else(|| entry.uri.as_deref().and_then(uri_object_id))
        } else {
            entry.search_type.clone()
        };
        let Some(object_id) = object_id else {
            return Err(ControlError::malformed(format!(
                "entry '{}' has no browsable object id",
                entry.title
            )));
        };

        let device = self.session.current_device()?;
        let window = BrowseWindow::page(0, self.session.page_size());
        let page = device.get_music_library(&object_id, window).await?;

        let mut state = pending;
        state.items = page.items;
        state.total = page.total;
        self.publish_select(epoch, state);
        Ok(())
    }

    fn publish_select(&self, epoch: u64, state: BrowseState) {
        self.publish(epoch, BrowseEvent::SelectResult { state });
    }

    fn publish(&self, epoch: u64, event: BrowseEvent) {
        if self.session.epoch() != epoch {
            debug!("Dropping superseded browse result");
            return;
        }
        self.bus.broadcast(event);
    }
}

/// Line-in entries of one device, suffixed with its zone name.
///
/// A failing device contributes an empty listing instead of failing
/// the whole fan-out.
async fn fetch_line_in(host: Host, player: Arc<dyn ZonePlayer>, window: BrowseWindow) -> Vec<Entry> {
    let page = match player.get_music_library(LINE_IN_OBJECT_ID, window).await {
        Ok(page) => page,
        Err(err) => {
            debug!(host = %host, error = %err, "Line-in listing failed");
            return Vec::new();
        }
    };
    if page.items.is_empty() {
        return Vec::new();
    }
    match player.zone_attributes().await {
        Ok(attributes) => page
            .items
            .into_iter()
            .map(|mut item| {
                item.title = format!("{}: {}", item.title, attributes.zone_name);
                item
            })
            .collect(),
        Err(err) => {
            debug!(host = %host, error = %err, "Zone attributes lookup failed");
            page.items
        }
    }
}

/// Object id embedded in a playlist URI after the `#` separator.
fn uri_object_id(uri: &str) -> Option<String> {
    uri.split_once('#')
        .map(|(_, object_id)| object_id.to_string())
}
