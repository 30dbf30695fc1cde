use keel_di::TypeInfo;

/// Errors when registering or retrieving a config
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConfigError {
    /// The required config type is not registered
    #[error("The config '{}' is not registered", .0.short_name())]
    ConfigMissing(TypeInfo),
    /// The config type is already registered
    #[error("The config '{}' is already registered", .0.short_name())]
    ConfigAlreadyRegistered(TypeInfo),
    /// A registered config could not be read as the requested type
    #[error("The config '{}' could not be read", .0.short_name())]
    ConfigTypeMismatch(TypeInfo),
}
