use std::{fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    instance::{Dependencies, Instance},
    interceptor::Interceptor,
    method::{Method, MethodDescriptor},
    module::ModuleMetadata,
    router::{RouteMetadata, Router},
    types::{Dependency, DynError, Injectable, TypeInfo},
};

/// Hooks and capabilities of a provider the runtime knows about
///
/// Every hook defaults to a no-op. Capabilities are exposed by overriding the cast,
/// for example a router returns `Some(self)` from [Lifecycle::as_router].
pub trait Lifecycle: Injectable {
    /// Called after the module of the provider finished initializing
    fn on_module_init(&self) -> BoxFuture<'_, Result<(), DynError>> {
        async { Ok(()) }.boxed()
    }

    /// Called before the instance is dropped by the module
    fn on_module_destroy(&self) -> BoxFuture<'_, Result<(), DynError>> {
        async { Ok(()) }.boxed()
    }

    /// Called once every module is initialized and all routes are registered
    fn on_application_ready(&self) -> BoxFuture<'_, Result<(), DynError>> {
        async { Ok(()) }.boxed()
    }

    /// Called before the routers are stopped
    fn on_application_stop(&self) -> BoxFuture<'_, Result<(), DynError>> {
        async { Ok(()) }.boxed()
    }

    fn as_interceptor(self: Arc<Self>) -> Option<Arc<dyn Interceptor>> {
        None
    }

    fn as_router(self: Arc<Self>) -> Option<Arc<dyn Router>> {
        None
    }
}

/// Lifecycle hooks dispatched by modules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    ModuleInit,
    ModuleDestroy,
    ApplicationReady,
    ApplicationStop,
}
impl Hook {
    pub fn name(&self) -> &'static str {
        match self {
            Hook::ModuleInit => "on_module_init",
            Hook::ModuleDestroy => "on_module_destroy",
            Hook::ApplicationReady => "on_application_ready",
            Hook::ApplicationStop => "on_application_stop",
        }
    }

    pub(crate) fn call<'a>(&self, target: &'a dyn Lifecycle) -> BoxFuture<'a, Result<(), DynError>> {
        match self {
            Hook::ModuleInit => target.on_module_init(),
            Hook::ModuleDestroy => target.on_module_destroy(),
            Hook::ApplicationReady => target.on_application_ready(),
            Hook::ApplicationStop => target.on_application_stop(),
        }
    }
}
impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A class the runtime constructs itself
///
/// Providers, controllers and modules are components. The metadata functions describe
/// how the class is wired, the runtime never inspects the type any other way.
pub trait Component: Lifecycle + Sized {
    /// Ordered dependencies passed to [Component::construct]
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    /// Constructs a new instance from its resolved dependencies
    ///
    /// Forward referenced dependencies may not be constructed yet and must not be dereferenced here.
    fn construct(deps: Dependencies) -> impl Future<Output = Result<Self, DynError>> + Send;

    /// A transient class gets one instance per context instead of a singleton
    fn transient() -> bool {
        false
    }

    /// Controller metadata, required for classes declared as controllers
    fn controller() -> Option<RouteMetadata> {
        None
    }

    /// Route metadata shared by every route method of the class
    fn route() -> Option<RouteMetadata> {
        None
    }

    /// Module metadata, required for classes imported as modules
    fn module() -> Option<ModuleMetadata> {
        None
    }

    /// Methods callable through the dispatch table of each instance
    fn methods() -> Vec<Method<Self>> {
        Vec::new()
    }
}

/// Type erased [Component]
#[derive(Clone, Copy)]
pub struct ClassProvider {
    info: TypeInfo,
    dependencies: fn() -> Vec<Dependency>,
    construct: fn(Dependencies) -> BoxFuture<'static, Result<Instance, DynError>>,
    transient: fn() -> bool,
    controller: fn() -> Option<RouteMetadata>,
    route: fn() -> Option<RouteMetadata>,
    module: fn() -> Option<ModuleMetadata>,
    methods: fn() -> Vec<MethodDescriptor>,
}
impl ClassProvider {
    pub fn of<T: Component>() -> Self {
        ClassProvider {
            info: TypeInfo::of::<T>(),
            dependencies: T::dependencies,
            construct: construct::<T>,
            transient: T::transient,
            controller: T::controller,
            route: T::route,
            module: T::module,
            methods: describe::<T>,
        }
    }

    pub fn info(&self) -> TypeInfo {
        self.info
    }

    pub fn name(&self) -> &'static str {
        self.info.short_name()
    }

    pub fn dependencies(&self) -> Vec<Dependency> {
        (self.dependencies)()
    }

    pub fn construct(&self, deps: Dependencies) -> BoxFuture<'static, Result<Instance, DynError>> {
        (self.construct)(deps)
    }

    pub fn is_transient(&self) -> bool {
        (self.transient)()
    }

    pub fn controller(&self) -> Option<RouteMetadata> {
        (self.controller)()
    }

    pub fn route(&self) -> Option<RouteMetadata> {
        (self.route)()
    }

    pub fn module(&self) -> Option<ModuleMetadata> {
        (self.module)()
    }

    pub fn methods(&self) -> Vec<MethodDescriptor> {
        (self.methods)()
    }
}
impl PartialEq for ClassProvider {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info
    }
}
impl Eq for ClassProvider {}
impl fmt::Debug for ClassProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassProvider").field(&self.info.type_name).finish()
    }
}

fn construct<T: Component>(deps: Dependencies) -> BoxFuture<'static, Result<Instance, DynError>> {
    async move {
        // Forward the call to the specific implementation
        T::construct(deps).await.map(Instance::component)
    }
    .boxed()
}

fn describe<T: Component>() -> Vec<MethodDescriptor> {
    T::methods().into_iter().map(MethodDescriptor::from).collect()
}
