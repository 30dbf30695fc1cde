use keel_di::{Component, Dependencies, DynError, DynamicModule, Import, InjectionToken, Lifecycle, ModuleMetadata, Provider};

use crate::provider::ConfigProvider;

/// Module exporting the [ConfigProvider]
///
/// Import it once with [ConfigModule::for_root], other modules may import the plain
/// [ConfigModule] to see the same registry.
pub struct ConfigModule;

impl ConfigModule {
    /// Registers `provider` as the registry of the application
    pub fn for_root(provider: ConfigProvider) -> Import {
        tracing::debug!("Registering config module with {} configs", provider.len());
        DynamicModule::new::<ConfigModule>(
            ModuleMetadata::new()
                .provider(Provider::value(provider))
                .export(InjectionToken::of::<ConfigProvider>()),
        )
        .into()
    }
}

impl Lifecycle for ConfigModule {}
impl Component for ConfigModule {
    async fn construct(_: Dependencies) -> Result<Self, DynError> {
        Ok(ConfigModule)
    }

    fn module() -> Option<ModuleMetadata> {
        Some(ModuleMetadata::new())
    }
}
