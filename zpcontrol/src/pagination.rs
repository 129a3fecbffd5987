use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::capabilities::MusicService;
use crate::events::{BrowseEvent, BrowseEventBus};
use crate::model::{BrowseState, BrowseWindow, Entry, ServiceMetadata};
use crate::session::ControlSession;

/// Fetch the next page of `state` and publish the extended listing.
///
/// Does nothing once the listing is complete. Fetch failures are
/// swallowed: the listing simply does not grow, and no event is
/// published. A result fetched under a navigation that has since been
/// superseded is dropped.
pub(crate) async fn extend_listing(
    session: &ControlSession,
    bus: &BrowseEventBus,
    state: &BrowseState,
) {
    if let Some(total) = state.total {
        if state.items.len() as u32 >= total {
            return;
        }
    }

    let epoch = session.epoch();
    let start = state.items.len() as u32;

    if let Some(client) = state.service_client.clone() {
        extend_service_listing(session, bus, state, client, epoch, start).await;
    } else if state.search {
        extend_search_listing(session, bus, state, epoch, start).await;
    } else {
        extend_library_listing(session, bus, state, epoch, start).await;
    }
}

async fn extend_service_listing(
    session: &ControlSession,
    bus: &BrowseEventBus,
    state: &BrowseState,
    client: Arc<dyn MusicService>,
    epoch: u64,
    start: u32,
) {
    let Some(parent_id) = state.parent.as_ref().and_then(|parent| parent.id.clone()) else {
        debug!(title = state.title.as_str(), "Service listing has no parent id, cannot page");
        return;
    };

    let end = start + session.page_size();
    let response = match client.get_metadata(&parent_id, start, end).await {
        Ok(response) => response,
        Err(err) => {
            debug!(object = parent_id.as_str(), error = %err, "Service page fetch failed");
            return;
        }
    };

    let declared_total = response.total;
    let page = service_page_entries(response, &client);

    let mut next = state.clone();
    next.items.extend(page);
    if declared_total.is_some() {
        next.total = declared_total;
    }
    publish_scroll(session, bus, epoch, next);
}

async fn extend_search_listing(
    session: &ControlSession,
    bus: &BrowseEventBus,
    state: &BrowseState,
    epoch: u64,
    start: u32,
) {
    let Some(term) = state.term.clone() else {
        debug!(title = state.title.as_str(), "Search listing has no term, cannot page");
        return;
    };
    let category = state
        .search_category
        .clone()
        .unwrap_or_else(|| session.search_mode());

    let device = match session.current_device() {
        Ok(device) => device,
        Err(err) => {
            debug!(error = %err, "Search page fetch skipped");
            return;
        }
    };

    let window = BrowseWindow::page(start, session.page_size());
    let page = match device.search_music_library(&category, &term, window).await {
        Ok(page) => page,
        Err(err) => {
            debug!(term = term.as_str(), error = %err, "Search page fetch failed");
            return;
        }
    };

    let mut next = state.clone();
    next.items.extend(page.items);
    publish_scroll(session, bus, epoch, next);
}

async fn extend_library_listing(
    session: &ControlSession,
    bus: &BrowseEventBus,
    state: &BrowseState,
    epoch: u64,
    start: u32,
) {
    let Some(object_id) = state.id.clone().or_else(|| state.search_type.clone()) else {
        debug!(title = state.title.as_str(), "Listing has no object id, cannot page");
        return;
    };

    let device = match session.current_device() {
        Ok(device) => device,
        Err(err) => {
            debug!(error = %err, "Library page fetch skipped");
            return;
        }
    };

    let window = BrowseWindow::page(start, session.page_size());
    let page = match device.get_music_library(&object_id, window).await {
        Ok(page) => page,
        Err(err) => {
            debug!(object = object_id.as_str(), error = %err, "Library page fetch failed");
            return;
        }
    };

    let mut next = state.clone();
    next.items.extend(page.items);
    publish_scroll(session, bus, epoch, next);
}

fn publish_scroll(session: &ControlSession, bus: &BrowseEventBus, epoch: u64, state: BrowseState) {
    if session.epoch() != epoch {
        debug!(title = state.title.as_str(), "Dropping superseded page fetch");
        return;
    }
    bus.broadcast(BrowseEvent::ScrollResult { state });
}

/// Flatten a service metadata response into entries tagged with the
/// owning client.
///
/// Playable items and browsable containers are both honored, whether
/// the server answered with one object or a sequence. Each item lands
/// at the index it declares, falling back to arrival order; the page
/// may arrive sparse or reordered, so the entries are returned in
/// index order with holes dropped. Two items declaring the same index
/// keep the later one.
pub(crate) fn service_page_entries(
    response: ServiceMetadata,
    client: &Arc<dyn MusicService>,
) -> Vec<Entry> {
    let mut page = Vec::new();
    if let Some(metadata) = response.media_metadata {
        page.extend(metadata.into_vec());
    }
    if let Some(collections) = response.media_collection {
        page.extend(collections.into_vec());
    }

    let mut slots: BTreeMap<usize, Entry> = BTreeMap::new();
    for (seq, item) in page.into_iter().enumerate() {
        let at = item.position.unwrap_or(seq);
        slots.insert(at, Entry::from_service_item(item, Arc::clone(client)));
    }

    slots.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Result;
    use crate::model::{OneOrMany, ServiceDefinition, ServiceItem};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct TagService(ServiceDefinition);

    #[async_trait]
    impl MusicService for TagService {
        fn name(&self) -> &str {
            "tag"
        }

        fn service_definition(&self) -> &ServiceDefinition {
            &self.0
        }

        async fn get_metadata(
            &self,
            _object_id: &str,
            _start: u32,
            _end: u32,
        ) -> Result<ServiceMetadata> {
            Ok(ServiceMetadata::default())
        }

        async fn get_media_uri(&self, _object_id: &str) -> Result<String> {
            Ok(String::new())
        }

        fn track_uri(&self, _object_id: &str, _service_id: u32, _serial_num: &str) -> String {
            String::new()
        }

        fn service_string(&self, _service_type: &str, _username: &str) -> String {
            String::new()
        }

        fn encode_item_metadata(&self, _uri: &str, _item: &Entry, _token: Option<&str>) -> String {
            String::new()
        }
    }

    fn client() -> Arc<dyn MusicService> {
        Arc::new(TagService(ServiceDefinition {
            id: 1,
            service_id_encoded: "263".to_string(),
        }))
    }

    fn item(id: &str, position: Option<usize>) -> ServiceItem {
        ServiceItem {
            id: id.to_string(),
            title: id.to_uppercase(),
            position,
            ..ServiceItem::default()
        }
    }

    fn ids(entries: &[Entry]) -> Vec<&str> {
        entries.iter().filter_map(|e| e.id.as_deref()).collect()
    }

    #[test]
    fn declared_positions_override_arrival_order() {
        let response = ServiceMetadata {
            media_metadata: Some(OneOrMany::Many(vec![
                item("a", Some(2)),
                item("b", Some(0)),
                item("c", Some(1)),
            ])),
            ..ServiceMetadata::default()
        };

        let entries = service_page_entries(response, &client());
        assert_eq!(ids(&entries), vec!["b", "c", "a"]);
    }

    #[test]
    fn holes_are_dropped_after_placement() {
        let response = ServiceMetadata {
            media_metadata: Some(OneOrMany::Many(vec![
                item("a", Some(0)),
                item("b", Some(3)),
            ])),
            ..ServiceMetadata::default()
        };

        let entries = service_page_entries(response, &client());
        assert_eq!(ids(&entries), vec!["a", "b"]);
    }

    #[test]
    fn missing_positions_fall_back_to_arrival_order() {
        let response = ServiceMetadata {
            media_metadata: Some(OneOrMany::One(item("a", None))),
            media_collection: Some(OneOrMany::Many(vec![item("b", None), item("c", None)])),
            ..ServiceMetadata::default()
        };

        let entries = service_page_entries(response, &client());
        assert_eq!(ids(&entries), vec!["a", "b", "c"]);
    }

    #[test]
    fn later_item_wins_a_position_clash() {
        let response = ServiceMetadata {
            media_metadata: Some(OneOrMany::One(item("a", Some(0)))),
            media_collection: Some(OneOrMany::One(item("b", Some(0)))),
            ..ServiceMetadata::default()
        };

        let entries = service_page_entries(response, &client());
        assert_eq!(ids(&entries), vec!["b"]);
    }

    #[test]
    fn entries_are_tagged_with_the_owning_client() {
        let response = ServiceMetadata {
            media_collection: Some(OneOrMany::One(item("album:1", None))),
            ..ServiceMetadata::default()
        };

        let entries = service_page_entries(response, &client());
        assert!(entries[0].service_client.is_some());
    }
}
