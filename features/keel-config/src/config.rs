use std::{ops::Deref, sync::Arc};

use keel_di::{Dependencies, Dependency, DynError};

use crate::provider::ConfigProvider;

/// A typed view of one registered config
///
/// Components depend on the [ConfigProvider] and read their config while being constructed.
///
/// # Example
/// ```ignore
/// struct Server {
///     config: Config<ServerConfig>,
/// }
/// impl Component for Server {
///     fn dependencies() -> Vec<Dependency> {
///         vec![Config::<ServerConfig>::dependency()]
///     }
///
///     async fn construct(deps: Dependencies) -> Result<Self, DynError> {
///         Ok(Server { config: Config::from_dependencies(&deps, 0)? })
///     }
/// }
/// ```
pub struct Config<T> {
    inner: Arc<T>,
}
impl<T> Deref for Config<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Config {
            inner: self.inner.clone(),
        }
    }
}
impl<T> Config<T> {
    pub fn inner(&self) -> Arc<T> {
        self.inner.clone()
    }

    pub fn into_inner(self) -> Arc<T> {
        self.inner
    }
}

impl<T: Send + Sync + 'static> Config<T> {
    /// The dependency a component declares to read configs
    pub fn dependency() -> Dependency {
        Dependency::on::<ConfigProvider>()
    }

    /// Reads the config from the registry
    pub fn from_provider(provider: &ConfigProvider) -> Result<Self, DynError> {
        Ok(Config {
            inner: provider.require_config::<T>()?,
        })
    }

    /// Reads the config from the registry resolved at `index`
    pub fn from_dependencies(deps: &Dependencies, index: usize) -> Result<Self, DynError> {
        let provider = deps.get::<ConfigProvider>(index)?.try_get()?;
        Self::from_provider(&provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_registered_configs() {
        let mut provider = ConfigProvider::new();
        provider.add_config(String::from("keel")).unwrap();

        let config = Config::<String>::from_provider(&provider).unwrap();
        assert_eq!(*config, "keel");
        assert_eq!(config.clone().into_inner().as_str(), "keel");
        assert!(Config::<u16>::from_provider(&provider).is_err());
    }

    #[test]
    fn depends_on_the_registry() {
        assert_eq!(Config::<u16>::dependency(), Dependency::on::<ConfigProvider>());
    }
}
