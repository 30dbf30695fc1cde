mod common;

use std::sync::{Arc, Mutex};

use common::Log;
use futures::{future::BoxFuture, FutureExt};
use keel_di::{
    router_token, value, Application, Args, Component, ControllerRouteMetadata, Dependencies, Dependency, DiError,
    DynError, Import, InjectionToken, Lifecycle, Method, ModuleMetadata, Provider, Ref, RouteMetadata, Router,
};
use serde_json::json;

macro_rules! recorder {
    ($name:ident) => {
        struct $name {
            log: Ref<Log>,
        }
        impl $name {
            fn record(&self, hook: &str) -> BoxFuture<'_, Result<(), DynError>> {
                self.log.push(format!("{}:{hook}", stringify!($name)));
                async { Ok(()) }.boxed()
            }
        }
        impl Lifecycle for $name {
            fn on_module_init(&self) -> BoxFuture<'_, Result<(), DynError>> {
                self.record("init")
            }

            fn on_application_ready(&self) -> BoxFuture<'_, Result<(), DynError>> {
                self.record("ready")
            }

            fn on_application_stop(&self) -> BoxFuture<'_, Result<(), DynError>> {
                self.record("stop")
            }

            fn on_module_destroy(&self) -> BoxFuture<'_, Result<(), DynError>> {
                self.record("destroy")
            }
        }
    };
}

recorder!(Database);
impl Component for Database {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Log>()]
    }

    async fn construct(deps: Dependencies) -> Result<Self, DynError> {
        Ok(Database { log: deps.get(0)? })
    }
}

recorder!(Repository);
impl Component for Repository {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Log>(), Dependency::on::<Database>()]
    }

    async fn construct(deps: Dependencies) -> Result<Self, DynError> {
        Ok(Repository { log: deps.get(0)? })
    }
}

/// Records what it is asked to serve
struct TestRouter {
    log: Ref<Log>,
    controllers: Mutex<Vec<ControllerRouteMetadata>>,
}
impl Lifecycle for TestRouter {
    fn as_router(self: Arc<Self>) -> Option<Arc<dyn Router>> {
        Some(self)
    }
}
impl Component for TestRouter {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Log>()]
    }

    async fn construct(deps: Dependencies) -> Result<Self, DynError> {
        Ok(TestRouter {
            log: deps.get(0)?,
            controllers: Mutex::new(Vec::new()),
        })
    }
}
impl Router for TestRouter {
    fn register(&self, controllers: Vec<ControllerRouteMetadata>) -> BoxFuture<'_, Result<(), DynError>> {
        self.log.push(format!("router:register {}", controllers.len()));
        self.controllers.lock().unwrap().extend(controllers);
        async { Ok(()) }.boxed()
    }

    fn start(&self) -> BoxFuture<'_, Result<(), DynError>> {
        self.log.push("router:start");
        async { Ok(()) }.boxed()
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), DynError>> {
        self.log.push("router:stop");
        async { Ok(()) }.boxed()
    }
}

struct CatsController;
impl Lifecycle for CatsController {}
impl Component for CatsController {
    async fn construct(_: Dependencies) -> Result<Self, DynError> {
        Ok(CatsController)
    }

    fn controller() -> Option<RouteMetadata> {
        Some(RouteMetadata::new().with("path", "/cats"))
    }

    fn route() -> Option<RouteMetadata> {
        Some(RouteMetadata::new().with("tags", json!(["cats"])).with("auth", json!({ "required": true })))
    }

    fn methods() -> Vec<Method<Self>> {
        vec![
            Method::blocking("find_all", |_: &CatsController, _: Args| Ok(value(vec!["Tom", "Felix"])))
                .route(RouteMetadata::new().with("method", "GET").with("tags", json!(["read"])))
                .returns::<Vec<&'static str>>(),
            Method::blocking("create", |_: &CatsController, args: Args| {
                let name = args.get::<String>(0)?;
                Ok(value(format!("created {name}")))
            })
            .route(
                RouteMetadata::new()
                    .with("method", "POST")
                    .with("tags", json!(["write"]))
                    .with("auth", json!({ "required": false }))
                    .replace_arrays(),
            )
            .params(vec![keel_di::TypeInfo::of::<String>()]),
            Method::blocking("helper", |_: &CatsController, _: Args| Ok(value(()))),
        ]
    }
}

struct CatsModule;
impl Lifecycle for CatsModule {}
impl Component for CatsModule {
    async fn construct(_: Dependencies) -> Result<Self, DynError> {
        Ok(CatsModule)
    }

    fn module() -> Option<ModuleMetadata> {
        Some(ModuleMetadata::new().controller::<CatsController>())
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
                .import(Import::module::<CatsModule>())
                .provider(Provider::value(Log::default()))
                .provider(Provider::class::<Database>())
                .provider(Provider::class::<Repository>())
                .provider(Provider::class_as::<TestRouter>(router_token()))
                .export(InjectionToken::of::<Log>()),
        )
    }
}

#[tokio::test]
async fn hooks_run_in_load_order_and_teardown_in_reverse() {
    common::init_tracing();
    let app = Application::create::<AppModule>().unwrap();
    app.start().await.unwrap();
    let log = app.require::<Log>().unwrap();
    app.stop().await.unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "Database:init",
            "Repository:init",
            "router:register 1",
            "Database:ready",
            "Repository:ready",
            "router:start",
            "Database:stop",
            "Repository:stop",
            "router:stop",
            "Repository:destroy",
            "Database:destroy",
        ]
    );
    assert!(!app.is_initiated());
}

#[tokio::test]
async fn controllers_of_imported_modules_are_registered() {
    common::init_tracing();
    let app = Application::create::<AppModule>().unwrap();
    app.init().await.unwrap();

    let router = app
        .select::<AppModule>()
        .unwrap()
        .get(&router_token())
        .unwrap()
        .downcast::<TestRouter>()
        .unwrap();
    let controllers = router.controllers.lock().unwrap().clone();
    assert_eq!(controllers.len(), 1);

    let cats = &controllers[0];
    assert_eq!(cats.metatype.name(), "CatsController");
    assert_eq!(cats.metadata.get("path"), Some(&json!("/cats")));
    assert_eq!(cats.metadata.get("tags"), Some(&json!(["cats"])));

    let routes: Vec<_> = cats.routes.iter().map(|route| route.handler_name).collect();
    assert_eq!(routes, vec!["find_all", "create"]);

    let find_all = &cats.routes[0];
    assert_eq!(find_all.metadata.get("method"), Some(&json!("GET")));
    assert_eq!(find_all.metadata.get("tags"), Some(&json!(["cats", "read"])));
    assert_eq!(find_all.metadata.get("auth"), Some(&json!({ "required": true })));
    assert_eq!(find_all.return_type, Some(keel_di::TypeInfo::of::<Vec<&'static str>>()));

    let create = &cats.routes[1];
    assert_eq!(create.metadata.get("tags"), Some(&json!(["write"])));
    assert_eq!(create.metadata.get("auth"), Some(&json!({ "required": false })));
    assert_eq!(create.param_types, vec![keel_di::TypeInfo::of::<String>()]);

    let created = (create.handler)(Args::new(vec![value(String::from("Tom"))])).await.unwrap();
    assert_eq!(*created.downcast::<String>().unwrap(), "created Tom");
}

struct Flaky;
impl Lifecycle for Flaky {
    fn on_module_init(&self) -> BoxFuture<'_, Result<(), DynError>> {
        async { Err::<(), DynError>("disk full".into()) }.boxed()
    }
}
impl Component for Flaky {
    async fn construct(_: Dependencies) -> Result<Self, DynError> {
        Ok(Flaky)
    }
}

struct FlakyModule;
impl Lifecycle for FlakyModule {}
impl Component for FlakyModule {
    async fn construct(_: Dependencies) -> Result<Self, DynError> {
        Ok(FlakyModule)
    }

    fn module() -> Option<ModuleMetadata> {
        Some(ModuleMetadata::new().provider(Provider::class::<Flaky>()))
    }
}

#[tokio::test]
async fn failing_hooks_name_hook_and_provider() {
    common::init_tracing();
    let app = Application::create::<FlakyModule>().unwrap();
    let error = app.init().await.unwrap_err();
    assert!(matches!(error, DiError::HookFailed { hook: "on_module_init", .. }));
    let message = error.to_string();
    assert!(message.contains("Flaky"));
    assert!(message.contains("disk full"));
}

recorder!(Leaf);
impl Component for Leaf {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Log>()]
    }

    async fn construct(deps: Dependencies) -> Result<Self, DynError> {
        Ok(Leaf { log: deps.get(0)? })
    }
}

recorder!(Trunk);
impl Component for Trunk {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Log>()]
    }

    async fn construct(deps: Dependencies) -> Result<Self, DynError> {
        Ok(Trunk { log: deps.get(0)? })
    }
}

struct LeafModule;
impl Lifecycle for LeafModule {}
impl Component for LeafModule {
    async fn construct(_: Dependencies) -> Result<Self, DynError> {
        Ok(LeafModule)
    }

    fn module() -> Option<ModuleMetadata> {
        Some(
            ModuleMetadata::new()
                .provider(Provider::value(Log::default()))
                .provider(Provider::class::<Leaf>())
                .export(InjectionToken::of::<Log>()),
        )
    }
}

struct TrunkModule;
impl Lifecycle for TrunkModule {}
impl Component for TrunkModule {
    async fn construct(_: Dependencies) -> Result<Self, DynError> {
        Ok(TrunkModule)
    }

    fn module() -> Option<ModuleMetadata> {
        Some(
            ModuleMetadata::new()
                .import(Import::module::<LeafModule>())
                .provider(Provider::class::<Trunk>()),
        )
    }
}

#[tokio::test]
async fn every_module_stops_before_any_is_destroyed() {
    common::init_tracing();
    let app = Application::create::<TrunkModule>().unwrap();
    app.init().await.unwrap();
    let log = app.select::<LeafModule>().unwrap().require::<Log>().unwrap();
    app.stop().await.unwrap();

    assert_eq!(
        log.entries(),
        vec![
            "Leaf:init",
            "Trunk:init",
            "Leaf:ready",
            "Trunk:ready",
            "Trunk:stop",
            "Leaf:stop",
            "Trunk:destroy",
            "Leaf:destroy",
        ]
    );
}

#[tokio::test]
async fn stopping_releases_instances() {
    common::init_tracing();
    let app = Application::create::<TrunkModule>().unwrap();
    app.init().await.unwrap();
    let leaf = Arc::downgrade(&app.select::<LeafModule>().unwrap().require::<Leaf>().unwrap());
    let trunk = Arc::downgrade(&app.select::<TrunkModule>().unwrap().require::<Trunk>().unwrap());
    assert!(leaf.upgrade().is_some());

    app.stop().await.unwrap();
    assert!(leaf.upgrade().is_none());
    assert!(trunk.upgrade().is_none());
}
