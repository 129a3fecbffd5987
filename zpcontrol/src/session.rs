use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::capabilities::{MusicService, ServiceClientFactory, ZonePlayer};
use crate::config_ext::ZoneConfigExt;
use crate::errors::{ControlError, Result};
use crate::model::{AccountSettings, RegisteredService, ServiceDescriptor};
use crate::{Host, DEFAULT_PAGE_SIZE};

const DEFAULT_SEARCH_MODE: &str = "albums";

/// Shared context of one control session.
///
/// Holds the known zone players, the selected coordinator, linked
/// accounts and registered services. Navigator calls receive this
/// explicitly, so sessions can live side by side and tests never
/// touch global state.
#[derive(Debug)]
pub struct ControlSession {
    devices: RwLock<HashMap<Host, Arc<dyn ZonePlayer>>>,
    current: RwLock<Option<Host>>,
    accounts: RwLock<Vec<AccountSettings>>,
    services: RwLock<Vec<RegisteredService>>,
    search_mode: RwLock<String>,
    factory: Arc<dyn ServiceClientFactory>,
    config: Option<Arc<zpconfig::Config>>,
    nav_epoch: AtomicU64,
    page_size: u32,
}

impl ControlSession {
    /// Build an empty session around a service-client factory.
    pub fn new(factory: Arc<dyn ServiceClientFactory>) -> Self {
        ControlSession {
            devices: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            accounts: RwLock::new(Vec::new()),
            services: RwLock::new(Vec::new()),
            search_mode: RwLock::new(DEFAULT_SEARCH_MODE.to_string()),
            factory,
            config: None,
            nav_epoch: AtomicU64::new(0),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Build a session seeded from the shared configuration.
    ///
    /// Accounts, registered services and the page size are read from
    /// [`zpconfig`], and later service changes are persisted back.
    pub fn from_config(factory: Arc<dyn ServiceClientFactory>) -> Result<Self> {
        let config = zpconfig::get_config();
        let accounts = config.get_account_settings()?;
        let services = config.get_registered_services()?;
        let page_size = config.get_browse_page_size()? as u32;

        info!(
            accounts = accounts.len(),
            services = services.len(),
            "Loaded session state from configuration"
        );

        Ok(ControlSession {
            devices: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            accounts: RwLock::new(accounts),
            services: RwLock::new(services),
            search_mode: RwLock::new(DEFAULT_SEARCH_MODE.to_string()),
            factory,
            config: Some(config),
            nav_epoch: AtomicU64::new(0),
            page_size,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Window size used when paging listings.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Add a zone player. The first registered device becomes the
    /// current coordinator.
    pub fn register_device(&self, host: Host, player: Arc<dyn ZonePlayer>) {
        let mut devices = self.devices.write().unwrap();
        let mut current = self.current.write().unwrap();
        if current.is_none() {
            *current = Some(host.clone());
        }
        debug!(host = %host, "Registered zone player");
        devices.insert(host, player);
    }

    /// Select the coordinator all playback actions target.
    pub fn set_current(&self, host: &Host) -> Result<()> {
        if !self.devices.read().unwrap().contains_key(host) {
            return Err(ControlError::UnknownHost(host.0.clone()));
        }
        *self.current.write().unwrap() = Some(host.clone());
        Ok(())
    }

    pub fn current_host(&self) -> Option<Host> {
        self.current.read().unwrap().clone()
    }

    /// The currently selected coordinator.
    pub fn current_device(&self) -> Result<Arc<dyn ZonePlayer>> {
        let host = self
            .current
            .read()
            .unwrap()
            .clone()
            .ok_or(ControlError::NoCurrentDevice)?;
        self.device(&host)
    }

    pub fn device(&self, host: &Host) -> Result<Arc<dyn ZonePlayer>> {
        self.devices
            .read()
            .unwrap()
            .get(host)
            .cloned()
            .ok_or_else(|| ControlError::UnknownHost(host.0.clone()))
    }

    /// Snapshot of every known device, for fan-out queries.
    pub fn devices(&self) -> Vec<(Host, Arc<dyn ZonePlayer>)> {
        self.devices
            .read()
            .unwrap()
            .iter()
            .map(|(host, player)| (host.clone(), Arc::clone(player)))
            .collect()
    }

    pub fn set_accounts(&self, accounts: Vec<AccountSettings>) {
        *self.accounts.write().unwrap() = accounts;
    }

    pub fn accounts(&self) -> Vec<AccountSettings> {
        self.accounts.read().unwrap().clone()
    }

    /// First linked account matching an encoded service type.
    pub fn account_for(&self, service_type: &str) -> Option<AccountSettings> {
        self.accounts
            .read()
            .unwrap()
            .iter()
            .find(|account| account.service_type == service_type)
            .cloned()
    }

    pub fn registered_services(&self) -> Vec<RegisteredService> {
        self.services.read().unwrap().clone()
    }

    /// Ids of every registered service, used to filter the
    /// registration catalog.
    pub fn registered_service_ids(&self) -> Vec<u32> {
        self.services
            .read()
            .unwrap()
            .iter()
            .map(|service| service.descriptor.id)
            .collect()
    }

    /// Add or replace a registered service and persist it when the
    /// session is configuration-backed.
    pub fn register_service(&self, service: RegisteredService) -> Result<()> {
        if let Some(config) = &self.config {
            config.set_registered_service(&service)?;
        }
        let mut services = self.services.write().unwrap();
        services.retain(|known| known.descriptor.id != service.descriptor.id);
        info!(
            service = service.descriptor.name.as_str(),
            id = service.descriptor.id,
            "Registered music service"
        );
        services.push(service);
        Ok(())
    }

    /// Drop a registered service from the session and from the
    /// configuration.
    pub fn remove_service(&self, service_id: u32) -> Result<()> {
        {
            let mut services = self.services.write().unwrap();
            let before = services.len();
            services.retain(|known| known.descriptor.id != service_id);
            if services.len() == before {
                return Err(ControlError::UnknownService(service_id));
            }
        }
        if let Some(config) = &self.config {
            config.remove_registered_service(service_id)?;
        }
        info!(id = service_id, "Removed music service");
        Ok(())
    }

    /// Authenticated client for a registered service.
    pub fn service_client(&self, service: &RegisteredService) -> Arc<dyn MusicService> {
        self.factory
            .client_for(&service.descriptor, Some(&service.credentials))
    }

    /// Unauthenticated client, used while a service is being added.
    pub fn anonymous_client(&self, descriptor: &ServiceDescriptor) -> Arc<dyn MusicService> {
        self.factory.client_for(descriptor, None)
    }

    pub fn search_mode(&self) -> String {
        self.search_mode.read().unwrap().clone()
    }

    pub fn set_search_mode(&self, mode: &str) {
        *self.search_mode.write().unwrap() = mode.to_string();
    }

    /// Current navigation epoch. Results fetched under an older epoch
    /// are stale and must not be published.
    pub fn epoch(&self) -> u64 {
        self.nav_epoch.load(Ordering::SeqCst)
    }

    /// Start a new navigation, superseding every in-flight fetch.
    pub fn bump_epoch(&self) -> u64 {
        self.nav_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        BrowseWindow, Entry, LibraryPage, PositionInfo, ResolvedMedia, ServiceCredentials,
        ServiceDefinition, ServiceMetadata, ZoneAttributes,
    };
    use async_trait::async_trait;

    #[derive(Debug)]
    struct StubPlayer;

    #[async_trait]
    impl ZonePlayer for StubPlayer {
        async fn get_music_library(
            &self,
            _object_id: &str,
            _window: BrowseWindow,
        ) -> Result<LibraryPage> {
            Ok(LibraryPage::default())
        }

        async fn search_music_library(
            &self,
            _category: &str,
            _term: &str,
            _window: BrowseWindow,
        ) -> Result<LibraryPage> {
            Ok(LibraryPage::default())
        }

        async fn play_uri(&self, _uri: &str, _metadata: Option<&str>) -> Result<()> {
            Ok(())
        }

        async fn play(&self) -> Result<()> {
            Ok(())
        }

        async fn queue(&self, _item: &ResolvedMedia, _position: Option<u32>) -> Result<()> {
            Ok(())
        }

        async fn goto_track(&self, _position: u32) -> Result<()> {
            Ok(())
        }

        async fn clear_queue(&self) -> Result<()> {
            Ok(())
        }

        async fn position_info(&self) -> Result<PositionInfo> {
            Ok(PositionInfo::default())
        }

        async fn zone_attributes(&self) -> Result<ZoneAttributes> {
            Ok(ZoneAttributes::default())
        }

        async fn available_services(&self) -> Result<Vec<ServiceDescriptor>> {
            Ok(Vec::new())
        }
    }

    #[derive(Debug)]
    struct NullService {
        definition: ServiceDefinition,
    }

    #[async_trait]
    impl MusicService for NullService {
        fn name(&self) -> &str {
            "null"
        }

        fn service_definition(&self) -> &ServiceDefinition {
            &self.definition
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

    #[derive(Debug)]
    struct NullFactory;

    impl ServiceClientFactory for NullFactory {
        fn client_for(
            &self,
            descriptor: &ServiceDescriptor,
            _credentials: Option<&ServiceCredentials>,
        ) -> Arc<dyn MusicService> {
            Arc::new(NullService {
                definition: ServiceDefinition {
                    id: descriptor.id,
                    service_id_encoded: descriptor.service_type.clone(),
                },
            })
        }
    }

    fn session() -> ControlSession {
        ControlSession::new(Arc::new(NullFactory))
    }

    fn registered(id: u32, name: &str) -> RegisteredService {
        RegisteredService {
            descriptor: ServiceDescriptor {
                id,
                name: name.to_string(),
                service_type: format!("{}", (id << 8) + 7),
                ..ServiceDescriptor::default()
            },
            credentials: ServiceCredentials {
                auth_token: "token".to_string(),
                private_key: "key".to_string(),
            },
        }
    }

    #[test]
    fn first_registered_device_becomes_current() {
        let session = session();
        session.register_device(Host("192.168.1.40".to_string()), Arc::new(StubPlayer));
        session.register_device(Host("192.168.1.41".to_string()), Arc::new(StubPlayer));

        assert_eq!(session.current_host(), Some(Host("192.168.1.40".to_string())));
        assert!(session.current_device().is_ok());
    }

    #[test]
    fn set_current_rejects_unknown_hosts() {
        let session = session();
        session.register_device(Host("192.168.1.40".to_string()), Arc::new(StubPlayer));

        let err = session.set_current(&Host("10.0.0.1".to_string())).unwrap_err();
        assert!(matches!(err, ControlError::UnknownHost(_)));
    }

    #[test]
    fn account_lookup_matches_by_service_type() {
        let session = session();
        session.set_accounts(vec![
            AccountSettings {
                service_type: "2311".to_string(),
                serial_num: "1".to_string(),
                username: "first".to_string(),
            },
            AccountSettings {
                service_type: "2311".to_string(),
                serial_num: "2".to_string(),
                username: "second".to_string(),
            },
        ]);

        let account = session.account_for("2311").unwrap();
        assert_eq!(account.username, "first");
        assert!(session.account_for("9999").is_none());
    }

    #[test]
    fn services_register_and_remove() {
        let session = session();
        session.register_service(registered(519, "Radio")).unwrap();
        session.register_service(registered(254, "TuneIn")).unwrap();

        let mut ids = session.registered_service_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![254, 519]);

        session.remove_service(519).unwrap();
        assert_eq!(session.registered_service_ids(), vec![254]);

        let err = session.remove_service(519).unwrap_err();
        assert!(matches!(err, ControlError::UnknownService(519)));
    }

    #[test]
    fn epoch_increases_on_every_navigation() {
        let session = session();
        let first = session.bump_epoch();
        let second = session.bump_epoch();

        assert!(second > first);
        assert_eq!(session.epoch(), second);
    }
}
