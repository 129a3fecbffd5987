use anyhow::Result;
use serde_yaml::{Mapping, Value};

use crate::model::{AccountSettings, RegisteredService, ServiceCredentials, ServiceDescriptor};

/// Access to the controller's accounts and registered services inside
/// the shared configuration.
///
/// Linked accounts live under `accounts.<service_type>` and
/// registered services under `services.<id>`. Malformed entries are
/// skipped rather than failing the whole read.
pub trait ZoneConfigExt {
    /// Every linked streaming account.
    fn get_account_settings(&self) -> Result<Vec<AccountSettings>>;

    /// Add or replace the account linked for its service type.
    fn set_account(&self, account: &AccountSettings) -> Result<()>;

    /// Every registered music service with its stored credentials.
    fn get_registered_services(&self) -> Result<Vec<RegisteredService>>;

    /// Add or replace a registered service.
    fn set_registered_service(&self, service: &RegisteredService) -> Result<()>;

    /// Forget a registered service. Unknown ids are not an error.
    fn remove_registered_service(&self, service_id: u32) -> Result<()>;
}

impl ZoneConfigExt for zpconfig::Config {
    fn get_account_settings(&self) -> Result<Vec<AccountSettings>> {
        let Ok(Value::Mapping(map)) = self.get_value(&["accounts"]) else {
            return Ok(Vec::new());
        };
        let mut accounts = Vec::new();
        for (key, entry) in &map {
            let Value::Mapping(fields) = entry else {
                continue;
            };
            let Some(service_type) = key_as_string(key) else {
                continue;
            };
            accounts.push(AccountSettings {
                service_type,
                serial_num: string_field(fields, "serial_num").unwrap_or_default(),
                username: string_field(fields, "username").unwrap_or_default(),
            });
        }
        Ok(accounts)
    }

    fn set_account(&self, account: &AccountSettings) -> Result<()> {
        self.set_value(
            &["accounts", &account.service_type, "serial_num"],
            Value::String(account.serial_num.clone()),
        )?;
        self.set_value(
            &["accounts", &account.service_type, "username"],
            Value::String(account.username.clone()),
        )
    }

    fn get_registered_services(&self) -> Result<Vec<RegisteredService>> {
        let Ok(Value::Mapping(map)) = self.get_value(&["services"]) else {
            return Ok(Vec::new());
        };
        let mut services = Vec::new();
        for (key, entry) in &map {
            let Value::Mapping(fields) = entry else {
                continue;
            };
            let Some(id) = key_as_id(key) else {
                continue;
            };
            services.push(RegisteredService {
                // L'URI n'est pas conservée, elle est réapprise du réseau.
                descriptor: ServiceDescriptor {
                    id,
                    name: string_field(fields, "name").unwrap_or_default(),
                    service_type: string_field(fields, "service_type").unwrap_or_default(),
                    uri: None,
                    secure_uri: None,
                },
                credentials: ServiceCredentials {
                    auth_token: string_field(fields, "auth_token").unwrap_or_default(),
                    private_key: string_field(fields, "private_key").unwrap_or_default(),
                },
            });
        }
        Ok(services)
    }

    fn set_registered_service(&self, service: &RegisteredService) -> Result<()> {
        let id = service.descriptor.id.to_string();
        let mut fields = Mapping::new();
        fields.insert(
            Value::String("name".to_string()),
            Value::String(service.descriptor.name.clone()),
        );
        fields.insert(
            Value::String("service_type".to_string()),
            Value::String(service.descriptor.service_type.clone()),
        );
        fields.insert(
            Value::String("auth_token".to_string()),
            Value::String(service.credentials.auth_token.clone()),
        );
        fields.insert(
            Value::String("private_key".to_string()),
            Value::String(service.credentials.private_key.clone()),
        );
        self.set_value(&["services", &id], Value::Mapping(fields))
    }

    fn remove_registered_service(&self, service_id: u32) -> Result<()> {
        let mut services = match self.get_value(&["services"]) {
            Ok(Value::Mapping(map)) => map,
            _ => Mapping::new(),
        };
        services.remove(&Value::String(service_id.to_string()));
        self.set_value(&["services"], Value::Mapping(services))
    }
}

fn string_field(fields: &Mapping, key: &str) -> Option<String> {
    match fields.get(&Value::String(key.to_string())) {
        Some(Value::String(value)) if !value.is_empty() => Some(value.clone()),
        _ => None,
    }
}

fn key_as_id(key: &Value) -> Option<u32> {
    match key {
        Value::String(raw) => raw.parse().ok(),
        Value::Number(number) => number.as_u64().map(|id| id as u32),
        _ => None,
    }
}

// Une clé numérique non citée dans le YAML arrive en Number.
fn key_as_string(key: &Value) -> Option<String> {
    match key {
        Value::String(raw) => Some(raw.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use zpconfig::Config;

    fn config(dir: &tempfile::TempDir) -> Config {
        Config::load_config(dir.path().to_str().unwrap()).unwrap()
    }

    fn service(id: u32, name: &str) -> RegisteredService {
        RegisteredService {
            descriptor: ServiceDescriptor {
                id,
                name: name.to_string(),
                service_type: format!("{}", (id << 8) + 7),
                ..ServiceDescriptor::default()
            },
            credentials: ServiceCredentials {
                auth_token: format!("token-{id}"),
                private_key: format!("key-{id}"),
            },
        }
    }

    #[test]
    fn services_roundtrip_through_the_configuration() {
        let dir = tempdir().unwrap();
        let config = config(&dir);

        config.set_registered_service(&service(254, "TuneIn")).unwrap();
        config.set_registered_service(&service(519, "Radio")).unwrap();

        let mut stored = config.get_registered_services().unwrap();
        stored.sort_by_key(|s| s.descriptor.id);
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].descriptor.name, "TuneIn");
        assert_eq!(stored[0].credentials.auth_token, "token-254");
        assert_eq!(stored[1].descriptor.service_type, "132871");
    }

    #[test]
    fn removing_a_service_is_idempotent() {
        let dir = tempdir().unwrap();
        let config = config(&dir);

        config.set_registered_service(&service(254, "TuneIn")).unwrap();
        config.remove_registered_service(254).unwrap();
        config.remove_registered_service(254).unwrap();

        assert!(config.get_registered_services().unwrap().is_empty());
    }

    #[test]
    fn accounts_roundtrip_through_the_configuration() {
        let dir = tempdir().unwrap();
        let config = config(&dir);

        config
            .set_account(&AccountSettings {
                service_type: "2311".to_string(),
                serial_num: "3".to_string(),
                username: "listener".to_string(),
            })
            .unwrap();

        let accounts = config.get_account_settings().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].service_type, "2311");
        assert_eq!(accounts[0].username, "listener");
    }

    #[test]
    fn numeric_account_keys_are_read() {
        let dir = tempdir().unwrap();
        let config = config(&dir);

        // Mimics hand-edited YAML where `2311:` parses as a number.
        let mut fields = Mapping::new();
        fields.insert(
            Value::String("serial_num".to_string()),
            Value::String("3".to_string()),
        );
        fields.insert(
            Value::String("username".to_string()),
            Value::String("listener".to_string()),
        );
        let mut accounts = Mapping::new();
        accounts.insert(Value::Number(2311.into()), Value::Mapping(fields));
        config
            .set_value(&["accounts"], Value::Mapping(accounts))
            .unwrap();

        let accounts = config.get_account_settings().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].service_type, "2311");
        assert_eq!(accounts[0].username, "listener");
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let dir = tempdir().unwrap();
        let config = config(&dir);

        config.set_registered_service(&service(254, "TuneIn")).unwrap();
        config
            .set_value(&["services", "junk"], Value::String("oops".to_string()))
            .unwrap();

        let stored = config.get_registered_services().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].descriptor.id, 254);
    }
}
