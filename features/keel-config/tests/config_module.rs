mod common;

use keel_config::{Config, ConfigModule, ConfigProvider};
use keel_di::{
    Application, Component, Dependencies, Dependency, DiError, DynError, Import, InjectionToken, Lifecycle,
    ModuleMetadata, Provider,
};

struct ServerConfig {
    port: u16,
}

struct Server {
    config: Config<ServerConfig>,
}
impl Lifecycle for Server {}
impl Component for Server {
    fn dependencies() -> Vec<Dependency> {
        vec![Config::<ServerConfig>::dependency()]
    }

    async fn construct(deps: Dependencies) -> Result<Self, DynError> {
        Ok(Server {
            config: Config::from_dependencies(&deps, 0)?,
        })
    }
}

fn configs() -> ConfigProvider {
    let mut configs = ConfigProvider::new();
    configs.add_config(ServerConfig { port: 8080 }).unwrap();
    configs
}

struct ServerModule;
impl Lifecycle for ServerModule {}
impl Component for ServerModule {
    async fn construct(_: Dependencies) -> Result<Self, DynError> {
        Ok(ServerModule)
    }

    fn module() -> Option<ModuleMetadata> {
        Some(
            ModuleMetadata::new()
                .import(Import::module::<ConfigModule>())
                .provider(Provider::class::<Server>())
                .export(InjectionToken::of::<Server>()),
        )
    }
}

struct AppModule;
impl Lifecycle for AppModule {}
impl Component for AppModule {
    async fn construct(_: Dependencies) -> Result<Self, DynError> {
        Ok(AppModule)
    }

    fn module() -> Option<ModuleMetadata> {
        Some(
            ModuleMetadata::new()
                .import(Import::module::<ServerModule>())
                .import(ConfigModule::for_root(configs())),
        )
    }
}

#[tokio::test]
async fn configs_are_injected_through_the_config_module() {
    common::init_tracing();
    let app = Application::create::<AppModule>().unwrap();
    app.init().await.unwrap();

    let server = app.require::<Server>().unwrap();
    assert_eq!(server.config.port, 8080);

    let registry = app.require::<ConfigProvider>().unwrap();
    assert!(std::ptr::eq(
        registry.require_config::<ServerConfig>().unwrap().as_ref(),
        &*server.config
    ));
}

struct TwiceConfigured;
impl Lifecycle for TwiceConfigured {}
impl Component for TwiceConfigured {
    async fn construct(_: Dependencies) -> Result<Self, DynError> {
        Ok(TwiceConfigured)
    }

    fn module() -> Option<ModuleMetadata> {
        Some(
            ModuleMetadata::new()
                .import(ConfigModule::for_root(configs()))
                .import(ConfigModule::for_root(ConfigProvider::new())),
        )
    }
}

#[test]
fn the_config_module_is_configured_once() {
    let error = Application::create::<TwiceConfigured>().err().unwrap();
    assert!(matches!(
        error,
        DiError::Config(keel_di::ConfigError::DuplicateDynamicModule { module: "ConfigModule" })
    ));
}
