use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    component::ClassProvider,
    errors::{ConfigError, DiError, DiResult, InvariantError, RequireError},
    instance::{Dependencies, Instance},
    interceptor::{compose, InterceptedMethod},
    method::MethodDescriptor,
    module::ModuleRef,
    provider::{FactoryProvider, Provider},
    types::{ContextId, Dependency, DynError, InjectionToken},
};

enum ProviderKind {
    Value,
    Class {
        class: ClassProvider,
        methods: Vec<MethodDescriptor>,
    },
    Factory(FactoryProvider),
    Alias,
}

#[derive(Clone)]
struct InstancePerContext {
    instance: Instance,
    resolved: bool,
    intercepted: bool,
}

/// Owns the instances of one provider
///
/// Keeps one instance per context, transient providers may hold many,
/// all others exactly one under [ContextId::STATIC].
pub struct InstanceWrapper {
    token: InjectionToken,
    kind: ProviderKind,
    transient: bool,
    inject: Mutex<Vec<Dependency>>,
    /// Wired dependency providers, same order as `inject`
    dependencies: Mutex<Vec<Option<Weak<InstanceWrapper>>>>,
    /// Instances in the order their contexts were first seen
    instances: Mutex<Vec<(ContextId, InstancePerContext)>>,
}

impl InstanceWrapper {
    pub fn new(provider: Provider) -> Self {
        let (token, kind, inject, transient, instances) = match provider {
            Provider::Value { token, value } => {
                tracing::debug!("Instance '{token}' created");
                let entry = InstancePerContext {
                    instance: value,
                    resolved: true,
                    intercepted: false,
                };
                (token, ProviderKind::Value, Vec::new(), false, vec![(ContextId::STATIC, entry)])
            }
            Provider::Class { token, class } => {
                let transient = class.is_transient();
                let mut instances = Vec::new();
                if !transient {
                    let entry = InstancePerContext {
                        instance: Instance::shell(Some(class.info())),
                        resolved: false,
                        intercepted: false,
                    };
                    instances.push((ContextId::STATIC, entry));
                }
                let kind = ProviderKind::Class {
                    class,
                    methods: class.methods(),
                };
                (token, kind, class.dependencies(), transient, instances)
            }
            Provider::Factory { token, factory } => {
                let inject = factory.inject.clone();
                (token, ProviderKind::Factory(factory), inject, false, Vec::new())
            }
            Provider::Alias { token, target } => {
                (token, ProviderKind::Alias, vec![Dependency::token(target)], false, Vec::new())
            }
        };

        InstanceWrapper {
            token,
            kind,
            transient,
            dependencies: Mutex::new(vec![None; inject.len()]),
            inject: Mutex::new(inject),
            instances: Mutex::new(instances),
        }
    }

    pub fn token(&self) -> &InjectionToken {
        &self.token
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, ProviderKind::Class { .. })
    }

    pub fn is_factory(&self) -> bool {
        matches!(self.kind, ProviderKind::Factory(_))
    }

    pub fn is_alias(&self) -> bool {
        matches!(self.kind, ProviderKind::Alias)
    }

    /// The component behind a class provider
    pub fn class(&self) -> Option<ClassProvider> {
        match &self.kind {
            ProviderKind::Class { class, .. } => Some(*class),
            _ => None,
        }
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        match &self.kind {
            ProviderKind::Class { methods, .. } => methods,
            _ => &[],
        }
    }

    /// Declared dependencies, including the contexts assigned while wiring
    pub fn dependencies(&self) -> Vec<Dependency> {
        lock(&self.inject).clone()
    }

    /// Wires the dependency at `index` to `provider`
    ///
    /// A transient dependency gets its own context, shared by every load of this provider.
    pub fn set_dependency(&self, index: usize, provider: &Arc<InstanceWrapper>) -> DiResult<()> {
        let mut inject = lock(&self.inject);
        let dependency = inject.get_mut(index).ok_or_else(|| {
            InvariantError::new(format!("Dependency index {index} of '{}' is out of range", self.token))
        })?;
        if provider.is_transient() {
            dependency.context_id.get_or_insert_with(ContextId::new);
        }
        lock(&self.dependencies)[index] = Some(Arc::downgrade(provider));
        Ok(())
    }

    /// True if the context holds a constructed instance
    ///
    /// Without a context, true if there is at least one instance and all of them are constructed.
    pub fn is_resolved(&self, context: Option<ContextId>) -> bool {
        let instances = lock(&self.instances);
        match context {
            Some(context) => instances
                .iter()
                .any(|(id, entry)| *id == context && entry.resolved),
            None => !instances.is_empty() && instances.iter().all(|(_, entry)| entry.resolved),
        }
    }

    /// The instance of the context, which may still be a shell
    pub fn instance(&self, context: Option<ContextId>) -> Result<Instance, RequireError> {
        let context = context.unwrap_or(ContextId::STATIC);
        self.entry(context)
            .map(|entry| entry.instance)
            .ok_or_else(|| RequireError::InstanceMissing {
                token: self.token.clone(),
                context,
            })
    }

    pub fn all_instances(&self) -> Vec<Instance> {
        lock(&self.instances)
            .iter()
            .map(|(_, entry)| entry.instance.clone())
            .collect()
    }

    pub fn context_ids(&self) -> Vec<ContextId> {
        lock(&self.instances).iter().map(|(id, _)| *id).collect()
    }

    /// Drops the instance of the context, or every instance
    pub fn clear_instance(&self, context: Option<ContextId>) {
        let mut instances = lock(&self.instances);
        let removed: Vec<_> = match context {
            Some(context) => {
                let (removed, kept): (Vec<_>, Vec<_>) = instances.drain(..).partition(|(id, _)| *id == context);
                *instances = kept;
                removed
            }
            None => instances.drain(..).collect(),
        };
        drop(instances);

        for (_, entry) in removed {
            if self.is_class() {
                entry.instance.clear_methods();
            }
        }
    }

    /// Returns the instance of the context without constructing it
    ///
    /// Class providers allocate an empty shell for unseen contexts,
    /// aliases hand out whatever their target provides.
    pub fn load_prototype(&self, context: Option<ContextId>) -> BoxFuture<'_, DiResult<Instance>> {
        let context = context.unwrap_or(ContextId::STATIC);
        async move {
            match &self.kind {
                ProviderKind::Factory(_) => Err(ConfigError::FactoryAsPrototype {
                    token: self.token.clone(),
                }
                .into()),
                ProviderKind::Alias => self.resolve_required(0).await,
                ProviderKind::Value => self.instance(Some(ContextId::STATIC)).map_err(DiError::from),
                ProviderKind::Class { class, .. } => {
                    let mut instances = lock(&self.instances);
                    if let Some((_, entry)) = instances.iter().find(|(id, _)| *id == context) {
                        return Ok(entry.instance.clone());
                    }
                    let instance = Instance::shell(Some(class.info()));
                    let entry = InstancePerContext {
                        instance: instance.clone(),
                        resolved: false,
                        intercepted: false,
                    };
                    instances.push((context, entry));
                    Ok(instance)
                }
            }
        }
        .boxed()
    }

    async fn resolve_dependency(&self, index: usize) -> DiResult<Option<Instance>> {
        let metadata = lock(&self.inject).get(index).cloned().ok_or_else(|| {
            InvariantError::new(format!("Dependency index {index} of '{}' is out of range", self.token))
        })?;
        let slot = lock(&self.dependencies).get(index).cloned().flatten();

        let Some(slot) = slot else {
            if metadata.optional {
                return Ok(None);
            }
            return Err(InvariantError::new(format!(
                "The dependency at index {index} of '{}' is undefined",
                self.token
            ))
            .into());
        };
        let dependency = slot.upgrade().ok_or_else(|| {
            InvariantError::new(format!(
                "The dependency at index {index} of '{}' was dropped",
                self.token
            ))
        })?;

        let instance = match dependency.is_resolved(None) {
            false => dependency.load_prototype(metadata.context_id).await?,
            true => dependency.load_instance(metadata.context_id).await?,
        };
        Ok(Some(instance))
    }

    async fn resolve_required(&self, index: usize) -> DiResult<Instance> {
        self.resolve_dependency(index).await?.ok_or_else(|| {
            InvariantError::new(format!("Alias '{}' has no target", self.token)).into()
        })
    }

    async fn resolve_dependencies(&self) -> DiResult<Dependencies> {
        let count = lock(&self.inject).len();
        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            slots.push(self.resolve_dependency(index).await?);
        }
        Ok(Dependencies::new(self.token.clone(), slots))
    }

    /// Constructs the instance of the context, returns the existing one if already constructed
    ///
    /// A shell handed out earlier is populated in place.
    pub fn load_instance(&self, context: Option<ContextId>) -> BoxFuture<'_, DiResult<Instance>> {
        let context = context.unwrap_or(ContextId::STATIC);
        async move {
            let existing = self.entry(context);
            if let Some(entry) = &existing {
                if entry.resolved {
                    return Ok(entry.instance.clone());
                }
            }

            tracing::debug!("Loading instance of '{}'", self.token);
            let built = match &self.kind {
                ProviderKind::Value => return self.instance(Some(ContextId::STATIC)).map_err(DiError::from),
                ProviderKind::Alias => self.resolve_required(0).await?,
                ProviderKind::Class { class, .. } => {
                    let deps = self.resolve_dependencies().await?;
                    class.construct(deps).await.map_err(|e| self.construction_failed(e))?
                }
                ProviderKind::Factory(factory) => {
                    let deps = self.resolve_dependencies().await?;
                    factory.call(deps).await.map_err(|e| self.construction_failed(e))?
                }
            };

            let instance = match existing {
                Some(shell) => {
                    shell.instance.fill(&built)?;
                    shell.instance
                }
                None => built,
            };
            if let ProviderKind::Class { methods, .. } = &self.kind {
                let value = instance.raw()?;
                for method in methods {
                    if let Some(handler) = method.bind(&value) {
                        instance.set_method(method.name, handler);
                    }
                }
            }

            self.set_entry(
                context,
                InstancePerContext {
                    instance: instance.clone(),
                    resolved: true,
                    intercepted: false,
                },
            );
            tracing::debug!("Instance '{}' loaded", self.token);
            Ok(instance)
        }
        .boxed()
    }

    /// Constructs the instances of every tracked context
    pub async fn load_all_instances(&self) -> DiResult<Vec<Instance>> {
        let mut instances = Vec::new();
        for context in self.context_ids() {
            instances.push(self.load_instance(Some(context)).await?);
        }
        Ok(instances)
    }

    /// Wraps the intercepted methods of the context's instance in their interceptors
    ///
    /// Interceptors are resolved through `module`. Only the dispatch table of this instance is changed,
    /// repeated calls for the same context are no-ops.
    pub fn apply_interceptors(&self, module: &ModuleRef, context: Option<ContextId>) -> DiResult<()> {
        let ProviderKind::Class { class, methods } = &self.kind else {
            tracing::debug!("Instance '{}' is not a class, skipping interceptor application", self.token);
            return Ok(());
        };
        let context = context.unwrap_or(ContextId::STATIC);
        let entry = self.entry(context).ok_or_else(|| RequireError::InstanceMissing {
            token: self.token.clone(),
            context,
        })?;
        if entry.intercepted || !entry.resolved {
            return Ok(());
        }

        for method in methods.iter().filter(|method| !method.interceptors.is_empty()) {
            let mut chain = Vec::with_capacity(method.interceptors.len());
            for config in &method.interceptors {
                let interceptor = module
                    .get(&config.token)?
                    .lifecycle()
                    .and_then(|lifecycle| lifecycle.as_interceptor())
                    .ok_or_else(|| ConfigError::NotAnInterceptor {
                        interceptor: config.token.clone(),
                        class: class.name(),
                        method: method.name,
                    })?;
                chain.push((interceptor, config.options.clone()));
            }

            let handler = entry.instance.method(method.name).ok_or_else(|| {
                InvariantError::new(format!("Method '{}' of '{}' is not bound", method.name, self.token))
            })?;
            let target = InterceptedMethod {
                class: class.info(),
                method: method.name,
                is_async: method.is_async,
            };
            entry.instance.set_method(method.name, compose(&target, handler, chain));
            tracing::debug!("Applied interceptors to '{}.{}()' in context {context}", self.token, method.name);
        }

        if let Some((_, entry)) = lock(&self.instances).iter_mut().find(|(id, _)| *id == context) {
            entry.intercepted = true;
        }
        Ok(())
    }

    /// Constructs the transient dependencies in the contexts they were wired with, deepest first
    pub fn load_transient_dependencies(&self) -> BoxFuture<'_, DiResult<()>> {
        async move {
            for (index, dependency) in self.dependencies().into_iter().enumerate() {
                let slot = lock(&self.dependencies).get(index).cloned().flatten();
                let Some(provider) = slot.and_then(|slot| slot.upgrade()) else {
                    continue;
                };
                if !provider.is_transient() || dependency.forward_ref {
                    continue;
                }
                provider.load_transient_dependencies().await?;
                provider.load_instance(dependency.context_id).await?;
            }
            Ok(())
        }
        .boxed()
    }

    pub fn apply_interceptors_to_all(&self, module: &ModuleRef) -> DiResult<()> {
        if !self.is_class() {
            return Ok(());
        }
        for context in self.context_ids() {
            self.apply_interceptors(module, Some(context))?;
        }
        tracing::debug!("Applied interceptors to all instances of '{}'", self.token);
        Ok(())
    }

    fn entry(&self, context: ContextId) -> Option<InstancePerContext> {
        lock(&self.instances)
            .iter()
            .find(|(id, _)| *id == context)
            .map(|(_, entry)| entry.clone())
    }

    fn set_entry(&self, context: ContextId, entry: InstancePerContext) {
        let mut instances = lock(&self.instances);
        match instances.iter_mut().find(|(id, _)| *id == context) {
            Some((_, existing)) => *existing = entry,
            None => instances.push((context, entry)),
        }
    }

    fn construction_failed(&self, error: DynError) -> DiError {
        DiError::ConstructionFailed {
            token: self.token.clone(),
            error: Arc::new(error),
        }
    }
}
impl fmt::Debug for InstanceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceWrapper")
            .field("token", &self.token)
            .field("transient", &self.transient)
            .field("contexts", &self.context_ids())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
