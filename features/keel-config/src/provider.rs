use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use keel_di::TypeInfo;

use crate::errors::ConfigError;

/// A registry of all configs
///
/// Configs are registered and retrieved by type. Once handed to
/// [crate::ConfigModule::for_root] the registry is shared and read only.
#[derive(Default)]
pub struct ConfigProvider {
    configs: HashMap<TypeId, Arc<dyn Any + Send + Sync + 'static>>,
}

impl ConfigProvider {
    /// Initializes an empty Config Provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a config with specified type, `None` if it is not registered
    pub fn get_config<T: Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>, ConfigError> {
        self.configs
            .get(&TypeId::of::<T>())
            .map(|entry| entry.clone().downcast())
            .transpose()
            .map_err(|_| ConfigError::ConfigTypeMismatch(TypeInfo::of::<T>()))
    }

    /// Like [ConfigProvider::get_config], a missing config is an error
    pub fn require_config<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ConfigError> {
        self.get_config()?
            .ok_or(ConfigError::ConfigMissing(TypeInfo::of::<T>()))
    }

    /// Add a config to the registry
    ///
    /// Each config type can only be registered once.
    pub fn add_config<T: Send + Sync + 'static>(&mut self, config: T) -> Result<&mut Self, ConfigError> {
        let type_id = TypeId::of::<T>();

        if self.configs.contains_key(&type_id) {
            return Err(ConfigError::ConfigAlreadyRegistered(TypeInfo::of::<T>()));
        }

        self.configs.insert(type_id, Arc::new(config));
        tracing::debug!("Registered config '{}'", TypeInfo::of::<T>().short_name());
        Ok(self)
    }

    /// Can optionally add a config to the registry.
    ///
    /// If the config provided is `Some(T)`, it will be the same as calling [`ConfigProvider::add_config`]
    /// If the config provided is `None`, then the function just returns `Ok(self)` for chaining
    pub fn maybe_add_config<T: Send + Sync + 'static>(&mut self, config: Option<T>) -> Result<&mut Self, ConfigError> {
        match config {
            Some(c) => self.add_config(c),
            None => Ok(self),
        }
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
