use std::{
    any::TypeId,
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, PoisonError, RwLock, Weak},
};

use futures::future::try_join_all;

use crate::{
    component::{ClassProvider, Component, Hook},
    dependency_graph::DependencyGraph,
    errors::{ConfigError, DiError, DiResult, InvariantError, RequireError},
    instance::Instance,
    instance_wrapper::InstanceWrapper,
    provider::Provider,
    router::{merge_optional, router_token, ControllerRouteMetadata, RouteController, Router},
    types::{ContextId, DynError, InjectionToken, Injectable, TypeInfo},
};

/// Declared content of a module
#[derive(Clone, Default, Debug)]
pub struct ModuleMetadata {
    pub imports: Vec<Import>,
    pub providers: Vec<Provider>,
    pub controllers: Vec<ClassProvider>,
    pub exports: Vec<InjectionToken>,
}
impl ModuleMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import(mut self, import: impl Into<Import>) -> Self {
        self.imports.push(import.into());
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn controller<C: Component>(mut self) -> Self {
        self.controllers.push(ClassProvider::of::<C>());
        self
    }

    pub fn export(mut self, token: impl Into<InjectionToken>) -> Self {
        self.exports.push(token.into());
        self
    }

    /// An empty declaration, which a dynamic registration of the module may replace
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.providers.is_empty()
            && self.controllers.is_empty()
            && self.exports.is_empty()
    }
}

/// An imported module
#[derive(Clone, Debug)]
pub enum Import {
    Module(ClassProvider),
    /// A module imported before it can be named, it is scanned but adds no ordering constraint
    Forward(ClassProvider),
    Dynamic(DynamicModule),
}
impl Import {
    pub fn module<M: Component>() -> Self {
        Import::Module(ClassProvider::of::<M>())
    }

    pub fn forward<M: Component>() -> Self {
        Import::Forward(ClassProvider::of::<M>())
    }

    pub fn class(&self) -> ClassProvider {
        match self {
            Import::Module(class) | Import::Forward(class) => *class,
            Import::Dynamic(dynamic) => dynamic.module,
        }
    }

    pub fn is_forward_ref(&self) -> bool {
        matches!(self, Import::Forward(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Import::Dynamic(_))
    }
}
impl From<DynamicModule> for Import {
    fn from(module: DynamicModule) -> Self {
        Import::Dynamic(module)
    }
}

/// A module class registered with metadata supplied at runtime
#[derive(Clone, Debug)]
pub struct DynamicModule {
    pub module: ClassProvider,
    pub metadata: ModuleMetadata,
}
impl DynamicModule {
    pub fn new<M: Component>(metadata: ModuleMetadata) -> Self {
        DynamicModule {
            module: ClassProvider::of::<M>(),
            metadata,
        }
    }
}

/// Resolver scoped to one module, provided to every module under its own type
#[derive(Clone)]
pub struct ModuleRef {
    module: Weak<Module>,
}
impl ModuleRef {
    fn module(&self) -> DiResult<Arc<Module>> {
        self.module
            .upgrade()
            .ok_or_else(|| InvariantError::new("Module dropped while a reference to it is still in use").into())
    }

    /// The instance provided under `token`, visible to this module
    pub fn get(&self, token: &InjectionToken) -> DiResult<Instance> {
        let module = self.module()?;
        let provider = module.require_internal_provider(token)?;
        Ok(provider.instance(None)?)
    }

    pub fn require<T: Injectable>(&self) -> DiResult<Arc<T>> {
        Ok(self.get(&InjectionToken::of::<T>())?.downcast::<T>()?)
    }

    /// Loads a transient provider for `context`, a new context is created if none is given
    ///
    /// Transient dependencies are loaded first, in the context they were wired with, so every
    /// load of the provider shares them. Forward referenced transient dependencies are not loaded
    /// and stay empty until something else constructs them. Interceptors are applied to the
    /// returned instance only.
    pub async fn resolve(&self, token: &InjectionToken, context: Option<ContextId>) -> DiResult<Instance> {
        let module = self.module()?;
        let provider = module.require_internal_provider(token)?;
        if !provider.is_transient() {
            return Err(ConfigError::NotTransient { token: token.clone() }.into());
        }

        let context = context.unwrap_or_else(ContextId::new);
        provider.load_transient_dependencies().await?;
        let instance = provider.load_instance(Some(context)).await?;
        provider.apply_interceptors(self, Some(context))?;
        Ok(instance)
    }

    pub async fn resolve_as<T: Injectable>(&self, context: Option<ContextId>) -> DiResult<Arc<T>> {
        let instance = self.resolve(&InjectionToken::of::<T>(), context).await?;
        Ok(instance.downcast::<T>()?)
    }

    /// Type of the module this reference belongs to
    pub fn metatype(&self) -> DiResult<TypeInfo> {
        Ok(self.module()?.metatype.info())
    }
}
impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.module.upgrade().map(|module| module.name());
        f.debug_tuple("ModuleRef").field(&name).finish()
    }
}

/// One dependency injection scope
pub struct Module {
    this: Weak<Module>,
    metatype: ClassProvider,
    instance: Arc<InstanceWrapper>,
    /// Local providers, the module reference first and the rest in initialization order
    providers: Vec<Arc<InstanceWrapper>>,
    provider_index: HashMap<InjectionToken, usize>,
    controllers: Vec<Arc<InstanceWrapper>>,
    exports: Vec<InjectionToken>,
    export_set: HashSet<InjectionToken>,
    imports: RwLock<Vec<Weak<Module>>>,
}

impl Module {
    pub(crate) fn new(metatype: ClassProvider, metadata: ModuleMetadata) -> DiResult<Arc<Module>> {
        let name = metatype.name();
        let module_ref_token = InjectionToken::of::<ModuleRef>();

        let mut wrappers: HashMap<InjectionToken, Arc<InstanceWrapper>> = HashMap::new();
        let mut graph = DependencyGraph::new();
        for provider in metadata.providers {
            let wrapper = InstanceWrapper::new(provider);
            let token = wrapper.token().clone();
            if token == module_ref_token || wrappers.contains_key(&token) {
                return Err(ConfigError::DuplicateProvider { token, module: name }.into());
            }
            graph.add_node(token.clone());
            wrappers.insert(token, Arc::new(wrapper));
        }

        // Only local dependencies constrain the local order
        for node in graph.get_nodes().to_vec() {
            let Some(wrapper) = wrappers.get(&node) else {
                continue;
            };
            if wrapper.is_resolved(None) {
                continue;
            }
            for dependency in wrapper.dependencies() {
                if dependency.forward_ref || !wrappers.contains_key(&dependency.token) {
                    continue;
                }
                graph.add_dependency(node.clone(), dependency.token);
            }
        }

        let mut ordered = Vec::with_capacity(wrappers.len());
        for token in graph.get_init_order() {
            let wrapper = wrappers.remove(&token).ok_or_else(|| {
                InvariantError::new(format!("Provider '{token}' not found in the provider map of '{name}'"))
            })?;
            ordered.push(wrapper);
        }

        let mut controllers = Vec::with_capacity(metadata.controllers.len());
        for class in metadata.controllers {
            if class.controller().is_none() {
                return Err(ConfigError::NotAController {
                    class: class.name(),
                    module: name,
                }
                .into());
            }
            let token = InjectionToken::Type(class.info());
            controllers.push(Arc::new(InstanceWrapper::new(Provider::Class { token, class })));
        }

        let instance = Arc::new(InstanceWrapper::new(Provider::Class {
            token: InjectionToken::Type(metatype.info()),
            class: metatype,
        }));
        let export_set = metadata.exports.iter().cloned().collect();

        Ok(Arc::new_cyclic(|this: &Weak<Module>| {
            let module_ref = ModuleRef { module: this.clone() };
            let mut providers = vec![Arc::new(InstanceWrapper::new(Provider::value(module_ref)))];
            providers.extend(ordered);
            let provider_index = providers
                .iter()
                .enumerate()
                .map(|(index, provider)| (provider.token().clone(), index))
                .collect();

            Module {
                this: this.clone(),
                metatype,
                instance,
                providers,
                provider_index,
                controllers,
                exports: metadata.exports,
                export_set,
                imports: RwLock::new(Vec::new()),
            }
        }))
    }

    pub fn metatype(&self) -> ClassProvider {
        self.metatype
    }

    pub fn name(&self) -> &'static str {
        self.metatype.name()
    }

    pub fn module_ref(&self) -> ModuleRef {
        ModuleRef {
            module: self.this.clone(),
        }
    }

    pub(crate) fn add_import(&self, module: &Arc<Module>) {
        let mut imports = self.imports.write().unwrap_or_else(PoisonError::into_inner);
        imports.push(Arc::downgrade(module));
    }

    pub fn imports(&self) -> Vec<Arc<Module>> {
        let imports = self.imports.read().unwrap_or_else(PoisonError::into_inner);
        imports.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn providers(&self) -> &[Arc<InstanceWrapper>] {
        &self.providers
    }

    pub fn controllers(&self) -> &[Arc<InstanceWrapper>] {
        &self.controllers
    }

    pub fn exports(&self) -> &[InjectionToken] {
        &self.exports
    }

    /// True once the module's own instance is constructed
    pub fn is_initiated(&self) -> bool {
        self.instance.is_resolved(None)
    }

    /// Every module reachable through imports, each once
    fn child_modules(&self) -> Vec<Arc<Module>> {
        let mut seen = HashSet::new();
        let mut modules = Vec::new();
        let mut stack: Vec<Arc<Module>> = self.imports().into_iter().rev().collect();
        while let Some(module) = stack.pop() {
            if !seen.insert(module.metatype.info().type_id) {
                continue;
            }
            stack.extend(module.imports().into_iter().rev());
            modules.push(module);
        }
        modules
    }

    /// Finds a provider visible in this module, a local one or one exported by an imported module
    pub fn get_internal_provider(&self, token: &InjectionToken) -> Option<Arc<InstanceWrapper>> {
        self.find_provider(token, &mut HashSet::new())
    }

    fn require_internal_provider(&self, token: &InjectionToken) -> Result<Arc<InstanceWrapper>, RequireError> {
        self.get_internal_provider(token).ok_or_else(|| RequireError::NotFound {
            token: token.clone(),
            module: self.name(),
        })
    }

    /// Finds a provider exported by this module
    pub fn get_provider(&self, token: &InjectionToken) -> Result<Arc<InstanceWrapper>, RequireError> {
        if !self.export_set.contains(token) {
            return Err(RequireError::NotFound {
                token: token.clone(),
                module: self.name(),
            });
        }
        self.require_internal_provider(token)
    }

    fn find_provider(&self, token: &InjectionToken, visited: &mut HashSet<TypeId>) -> Option<Arc<InstanceWrapper>> {
        if let Some(&index) = self.provider_index.get(token) {
            return Some(self.providers[index].clone());
        }

        visited.insert(self.metatype.info().type_id);
        for module in self.child_modules() {
            if visited.contains(&module.metatype.info().type_id) || !module.export_set.contains(token) {
                continue;
            }
            if let Some(provider) = module.find_provider(token, visited) {
                return Some(provider);
            }
        }
        None
    }

    /// Providers, controllers and the module itself, in load order
    fn all_wrappers(&self) -> Vec<Arc<InstanceWrapper>> {
        self.providers
            .iter()
            .chain(self.controllers.iter())
            .chain(std::iter::once(&self.instance))
            .cloned()
            .collect()
    }

    fn detect_circular_transients(&self) -> DiResult<()> {
        let mut graph = DependencyGraph::new();
        for provider in self.providers.iter().filter(|provider| provider.is_transient()) {
            for dependency in provider.dependencies() {
                let Some(target) = self.get_internal_provider(&dependency.token) else {
                    continue;
                };
                if target.is_transient() {
                    graph.add_dependency(provider.token().clone(), dependency.token);
                }
            }
        }

        match graph.find_cycles().into_iter().next() {
            Some(cycle) => Err(ConfigError::TransientCircularDependency {
                module: self.name(),
                chain: cycle.iter().map(ToString::to_string).collect(),
            }
            .into()),
            None => Ok(()),
        }
    }

    /// Wires, constructs and intercepts every provider, controller and the module itself
    pub async fn init(&self) -> DiResult<()> {
        tracing::debug!("Initializing module '{}'", self.name());
        self.detect_circular_transients()?;

        let wrappers = self.all_wrappers();
        for wrapper in &wrappers {
            for (index, dependency) in wrapper.dependencies().into_iter().enumerate() {
                match self.get_internal_provider(&dependency.token) {
                    Some(provider) => wrapper.set_dependency(index, &provider)?,
                    None if dependency.optional => {}
                    None => {
                        return Err(ConfigError::UnresolvedDependency {
                            provider: wrapper.token().clone(),
                            token: dependency.token,
                            index,
                            module: self.name(),
                        }
                        .into())
                    }
                }
            }
        }

        // Transients are constructed once all singletons exist, latest encountered first
        let mut transients = Vec::new();
        for wrapper in &wrappers {
            if wrapper.is_transient() {
                transients.insert(0, wrapper.clone());
            } else {
                wrapper.load_instance(None).await?;
            }
        }
        for transient in &transients {
            transient.load_all_instances().await?;
        }

        let module_ref = self.module_ref();
        for wrapper in &wrappers {
            wrapper.apply_interceptors_to_all(&module_ref)?;
        }

        for token in &self.exports {
            if self.get_internal_provider(token).is_none() {
                return Err(ConfigError::UnknownExport {
                    token: token.clone(),
                    module: self.name(),
                }
                .into());
            }
        }

        self.call_hook(Hook::ModuleInit).await?;
        tracing::info!("Module '{}' initialized", self.name());
        Ok(())
    }

    /// Calls the hook on every instance of the module, in registration order
    pub async fn call_hook(&self, hook: Hook) -> DiResult<()> {
        for wrapper in self.all_wrappers() {
            // Aliases share the instance of their target
            if wrapper.is_alias() {
                continue;
            }
            for instance in wrapper.all_instances() {
                let Some(lifecycle) = instance.lifecycle() else {
                    continue;
                };
                hook.call(&*lifecycle)
                    .await
                    .map_err(|error| DiError::HookFailed {
                        hook: hook.name(),
                        token: wrapper.token().clone(),
                        error: Arc::new(error),
                    })?;
            }
        }
        Ok(())
    }

    /// The router provided locally by this module
    fn router(&self) -> DiResult<Option<Arc<dyn Router>>> {
        let token = router_token();
        let Some(&index) = self.provider_index.get(&token) else {
            return Ok(None);
        };
        let instance = self.providers[index].instance(None)?;
        match instance.lifecycle().and_then(|lifecycle| lifecycle.as_router()) {
            Some(router) => Ok(Some(router)),
            None => Err(ConfigError::NotARouter {
                token,
                module: self.name(),
            }
            .into()),
        }
    }

    fn router_failed(&self, operation: &'static str) -> impl FnOnce(DynError) -> DiError {
        let module = self.name();
        move |error| DiError::RouterFailed {
            module,
            operation,
            error: Arc::new(error),
        }
    }

    fn controller_route_metadata(&self, controller: &InstanceWrapper) -> DiResult<ControllerRouteMetadata> {
        let metatype = controller.class().ok_or_else(|| {
            InvariantError::new(format!("Controller '{}' is not a class provider", controller.token()))
        })?;
        let instance = controller.instance(None)?;
        let class_route = metatype.route();

        let mut routes = Vec::new();
        for method in controller.methods() {
            let Some(route) = &method.route else {
                continue;
            };
            let handler = instance.method(method.name).ok_or_else(|| {
                InvariantError::new(format!("Route '{}' of '{}' is not bound", method.name, metatype.name()))
            })?;
            routes.push(RouteController {
                metadata: merge_optional(class_route.clone(), Some(route.clone())),
                handler_name: method.name,
                handler,
                param_types: method.param_types.clone(),
                return_type: method.return_type,
            });
        }

        Ok(ControllerRouteMetadata {
            metatype,
            metadata: merge_optional(metatype.controller(), class_route),
            instance,
            routes,
        })
    }

    /// Hands the controllers of this module and of every imported module to the local router
    pub async fn register_routes(&self) -> DiResult<()> {
        let Some(router) = self.router()? else {
            return Ok(());
        };
        tracing::debug!("Registering routes in module '{}'", self.name());

        let mut controllers = self.controllers.clone();
        for module in self.child_modules() {
            for controller in &module.controllers {
                if !controllers.iter().any(|known| Arc::ptr_eq(known, controller)) {
                    controllers.push(controller.clone());
                }
            }
        }

        let metadata = controllers
            .iter()
            .map(|controller| self.controller_route_metadata(controller))
            .collect::<DiResult<Vec<_>>>()?;
        router
            .register(metadata)
            .await
            .map_err(self.router_failed("register routes"))?;
        tracing::debug!("Routes registered in module '{}'", self.name());
        Ok(())
    }

    pub async fn start(&self) -> DiResult<()> {
        if let Some(router) = self.router()? {
            router.start().await.map_err(self.router_failed("start"))?;
        }
        Ok(())
    }

    pub async fn stop(&self) -> DiResult<()> {
        if let Some(router) = self.router()? {
            router.stop().await.map_err(self.router_failed("stop"))?;
        }
        Ok(())
    }

    /// Destroys every instance in reverse load order and clears the caches
    pub async fn terminate(&self) -> DiResult<()> {
        tracing::debug!("Terminating module '{}'", self.name());
        for wrapper in self.all_wrappers().into_iter().rev() {
            if !wrapper.is_alias() {
                let lifecycles: Vec<_> = wrapper
                    .all_instances()
                    .iter()
                    .filter_map(Instance::lifecycle)
                    .collect();
                try_join_all(lifecycles.iter().map(|lifecycle| lifecycle.on_module_destroy()))
                    .await
                    .map_err(|error| DiError::HookFailed {
                        hook: Hook::ModuleDestroy.name(),
                        token: wrapper.token().clone(),
                        error: Arc::new(error),
                    })?;
            }
            wrapper.clear_instance(None);
        }
        tracing::debug!("Module '{}' terminated", self.name());
        Ok(())
    }
}
impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name())
            .field("providers", &self.providers.iter().map(|p| p.token()).collect::<Vec<_>>())
            .field("exports", &self.exports)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        component::Lifecycle,
        instance::{Dependencies, Ref},
        types::Dependency,
    };

    struct Storage;
    impl Lifecycle for Storage {}
    impl Component for Storage {
        async fn construct(_: Dependencies) -> Result<Self, DynError> {
            Ok(Storage)
        }
    }

    struct Service {
        storage: Ref<Storage>,
    }
    impl Lifecycle for Service {}
    impl Component for Service {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::on::<Storage>()]
        }

        async fn construct(deps: Dependencies) -> Result<Self, DynError> {
            Ok(Service { storage: deps.get(0)? })
        }
    }

    struct Request;
    impl Lifecycle for Request {}
    impl Component for Request {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::on::<Session>()]
        }

        async fn construct(_: Dependencies) -> Result<Self, DynError> {
            Ok(Request)
        }

        fn transient() -> bool {
            true
        }
    }

    struct Session;
    impl Lifecycle for Session {}
    impl Component for Session {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::on::<Request>()]
        }

        async fn construct(_: Dependencies) -> Result<Self, DynError> {
            Ok(Session)
        }

        fn transient() -> bool {
            true
        }
    }

    struct TestModule;
    impl Lifecycle for TestModule {}
    impl Component for TestModule {
        async fn construct(_: Dependencies) -> Result<Self, DynError> {
            Ok(TestModule)
        }
    }

    fn module(metadata: ModuleMetadata) -> DiResult<Arc<Module>> {
        Module::new(ClassProvider::of::<TestModule>(), metadata)
    }

    #[test]
    fn orders_local_providers_by_dependencies() {
        let module = module(
            ModuleMetadata::new()
                .provider(Provider::class::<Service>())
                .provider(Provider::class::<Storage>()),
        )
        .unwrap();

        let tokens: Vec<_> = module.providers().iter().map(|p| p.token().clone()).collect();
        assert_eq!(
            tokens,
            vec![
                InjectionToken::of::<ModuleRef>(),
                InjectionToken::of::<Storage>(),
                InjectionToken::of::<Service>()
            ]
        );
    }

    #[test]
    fn duplicate_providers_are_rejected() {
        let error = module(
            ModuleMetadata::new()
                .provider(Provider::class::<Storage>())
                .provider(Provider::value(Storage)),
        )
        .unwrap_err();
        assert!(matches!(error, DiError::Config(ConfigError::DuplicateProvider { .. })));
    }

    #[test]
    fn controllers_must_declare_controller_metadata() {
        let error = module(ModuleMetadata::new().controller::<Storage>()).unwrap_err();
        assert!(matches!(error, DiError::Config(ConfigError::NotAController { .. })));
    }

    #[tokio::test]
    async fn init_wires_and_constructs_providers() {
        let module = module(
            ModuleMetadata::new()
                .provider(Provider::class::<Storage>())
                .provider(Provider::class::<Service>())
                .export(InjectionToken::of::<Service>()),
        )
        .unwrap();
        assert!(!module.is_initiated());

        module.init().await.unwrap();
        assert!(module.is_initiated());

        let service = module.module_ref().require::<Service>().unwrap();
        let storage = module.module_ref().get(&InjectionToken::of::<Storage>()).unwrap();
        assert!(service.storage.instance().ptr_eq(&storage));
        assert!(module.get_provider(&InjectionToken::of::<Storage>()).is_err());
        assert!(module.get_provider(&InjectionToken::of::<Service>()).is_ok());

        module.terminate().await.unwrap();
        assert!(!module.is_initiated());
    }

    #[tokio::test]
    async fn missing_dependency_names_provider_and_index() {
        let module = module(ModuleMetadata::new().provider(Provider::class::<Service>())).unwrap();
        let error = module.init().await.unwrap_err();
        assert!(matches!(
            error,
            DiError::Config(ConfigError::UnresolvedDependency { index: 0, module: "TestModule", .. })
        ));
    }

    #[tokio::test]
    async fn circular_transients_are_rejected() {
        let module = module(
            ModuleMetadata::new()
                .provider(Provider::class::<Request>())
                .provider(Provider::class::<Session>()),
        )
        .unwrap();
        let error = module.init().await.unwrap_err();
        assert!(matches!(
            error,
            DiError::Config(ConfigError::TransientCircularDependency { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_exports_fail_init() {
        let module = module(ModuleMetadata::new().export("MISSING")).unwrap();
        let error = module.init().await.unwrap_err();
        let message = error.to_string();
        assert!(message.contains("MISSING"));
        assert!(message.contains("TestModule"));
    }

    #[tokio::test]
    async fn resolve_rejects_singletons() {
        let module = module(ModuleMetadata::new().provider(Provider::class::<Storage>())).unwrap();
        module.init().await.unwrap();
        let error = module
            .module_ref()
            .resolve(&InjectionToken::of::<Storage>(), None)
            .await
            .unwrap_err();
        assert!(matches!(error, DiError::Config(ConfigError::NotTransient { .. })));
    }
}
