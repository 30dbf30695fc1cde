//! Keel Config provides a registry of configs that can be injected in the rest of the
//! modules.
//!
//! Keel Config is split into three parts:
//! 1. ConfigProvider: the registry of all configs
//! 2. ConfigModule: the module exporting the registry to the application
//! 3. Config<T>: a typed view of one config, read while a component is constructed
//!
//! # Examples
//!
//! ```ignore
//! let mut configs = ConfigProvider::new();
//! configs.add_config(ServerConfig { port: 8080 })?;
//!
//! ModuleMetadata::new()
//!     .import(ConfigModule::for_root(configs))
//!     .provider(Provider::class::<Server>())
//! ```

mod config;
mod errors;
mod module;
mod provider;

pub use config::Config;
pub use errors::ConfigError;
pub use module::ConfigModule;
pub use provider::ConfigProvider;
