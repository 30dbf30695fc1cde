use std::{
    any::TypeId,
    collections::HashMap,
    fmt::Debug,
    ops::Deref,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use futures::future::BoxFuture;

use crate::{
    component::Lifecycle,
    errors::{InvariantError, RequireError},
    types::{DynError, DynValue, InjectionToken, Injectable, TypeInfo},
};

/// A bound method of an instance
pub type Handler = Arc<dyn Fn(Args) -> BoxFuture<'static, Result<DynValue, DynError>> + Send + Sync>;

/// Arguments of a handler call
#[derive(Clone)]
pub struct Args(Arc<[DynValue]>);
impl Args {
    pub fn new(values: Vec<DynValue>) -> Self {
        Args(values.into())
    }

    pub fn empty() -> Self {
        Args(Arc::new([]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn raw(&self, index: usize) -> Option<&DynValue> {
        self.0.get(index)
    }

    /// Downcasts the argument at `index`
    pub fn get<T: Injectable>(&self, index: usize) -> Result<Arc<T>, RequireError> {
        let value = self.0.get(index).ok_or(RequireError::ArgumentMissing(index))?;
        value
            .clone()
            .downcast::<T>()
            .map_err(|_| RequireError::DowncastFailed {
                required_type: std::any::type_name::<T>(),
                actual_type: "unknown",
            })
    }
}
impl Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args").field("len", &self.0.len()).finish()
    }
}

/// A slot holding one provider instance
///
/// Class providers hand out their slot before the value is constructed.
/// Once construction finishes the value is written into the same slot,
/// so every clone of the handle observes it.
#[derive(Clone)]
pub struct Instance(Arc<InstanceInner>);

struct InstanceInner {
    /// Declared type of a shell, used to type check before it is populated
    declared: Option<TypeInfo>,
    populated: OnceLock<Populated>,
    /// Per instance dispatch table, interceptors replace entries in here
    methods: RwLock<HashMap<&'static str, Handler>>,
}

#[derive(Clone)]
struct Populated {
    info: TypeInfo,
    value: DynValue,
    lifecycle: Option<Arc<dyn Lifecycle>>,
}

impl Instance {
    /// An instance of a plain value without lifecycle hooks
    pub fn value<T: Injectable>(value: T) -> Self {
        Self::populated(Populated {
            info: TypeInfo::of::<T>(),
            value: Arc::new(value),
            lifecycle: None,
        })
    }

    /// An instance whose lifecycle hooks and capabilities are called by the runtime
    pub fn component<T: Lifecycle>(value: T) -> Self {
        let value = Arc::new(value);
        Self::populated(Populated {
            info: TypeInfo::of::<T>(),
            value: value.clone(),
            lifecycle: Some(value),
        })
    }

    /// An empty slot, populated later through [Instance::fill]
    pub(crate) fn shell(declared: Option<TypeInfo>) -> Self {
        Instance(Arc::new(InstanceInner {
            declared,
            populated: OnceLock::new(),
            methods: RwLock::new(HashMap::new()),
        }))
    }

    fn populated(populated: Populated) -> Self {
        Instance(Arc::new(InstanceInner {
            declared: Some(populated.info),
            populated: OnceLock::from(populated),
            methods: RwLock::new(HashMap::new()),
        }))
    }

    /// Writes the value of `built` into this shell
    pub(crate) fn fill(&self, built: &Instance) -> Result<(), InvariantError> {
        if Arc::ptr_eq(&self.0, &built.0) {
            return Ok(());
        }
        let populated = built
            .0
            .populated
            .get()
            .cloned()
            .ok_or_else(|| InvariantError::new("Tried to fill a shell from an unpopulated instance"))?;
        self.0.populated.set(populated).map_err(|_| {
            InvariantError::new(format!("Shell of '{}' was populated twice", self.type_name()))
        })?;

        let methods = built.0.methods.read().unwrap_or_else(PoisonError::into_inner);
        let mut own = self.0.methods.write().unwrap_or_else(PoisonError::into_inner);
        own.extend(methods.iter().map(|(name, handler)| (*name, handler.clone())));
        Ok(())
    }

    pub fn is_populated(&self) -> bool {
        self.0.populated.get().is_some()
    }

    /// Type of the value, known for populated instances and class shells
    pub fn type_info(&self) -> Option<TypeInfo> {
        match self.0.populated.get() {
            Some(populated) => Some(populated.info),
            None => self.0.declared,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_info().map(|info| info.type_name).unwrap_or("unknown")
    }

    /// The type erased value
    pub fn raw(&self) -> Result<DynValue, RequireError> {
        self.0
            .populated
            .get()
            .map(|populated| populated.value.clone())
            .ok_or_else(|| RequireError::NotConstructed(self.type_name()))
    }

    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, RequireError> {
        let populated = self
            .0
            .populated
            .get()
            .ok_or_else(|| RequireError::NotConstructed(self.type_name()))?;
        populated
            .value
            .clone()
            .downcast::<T>()
            .map_err(|_| RequireError::DowncastFailed {
                required_type: std::any::type_name::<T>(),
                actual_type: populated.info.type_name,
            })
    }

    /// Lifecycle view of the value, only set for components
    pub fn lifecycle(&self) -> Option<Arc<dyn Lifecycle>> {
        self.0
            .populated
            .get()
            .and_then(|populated| populated.lifecycle.clone())
    }

    /// True if both handles point to the same slot
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn method(&self, name: &str) -> Option<Handler> {
        let methods = self.0.methods.read().unwrap_or_else(PoisonError::into_inner);
        methods.get(name).cloned()
    }

    pub fn method_names(&self) -> Vec<&'static str> {
        let methods = self.0.methods.read().unwrap_or_else(PoisonError::into_inner);
        methods.keys().copied().collect()
    }

    pub(crate) fn set_method(&self, name: &'static str, handler: Handler) {
        let mut methods = self.0.methods.write().unwrap_or_else(PoisonError::into_inner);
        methods.insert(name, handler);
    }

    pub(crate) fn clear_methods(&self) {
        let mut methods = self.0.methods.write().unwrap_or_else(PoisonError::into_inner);
        methods.clear();
    }

    /// Calls a method through the dispatch table of this instance
    pub async fn invoke(&self, name: &str, args: Args) -> Result<DynValue, DynError> {
        let handler = self.method(name).ok_or_else(|| RequireError::MethodNotFound {
            type_name: self.type_name(),
            method: name.to_string(),
        })?;
        handler(args).await
    }

    /// Calls a method and downcasts its result
    pub async fn invoke_as<R: Injectable>(&self, name: &str, args: Args) -> Result<Arc<R>, DynError> {
        let result = self.invoke(name, args).await?;
        result.downcast::<R>().map_err(|_| {
            RequireError::DowncastFailed {
                required_type: std::any::type_name::<R>(),
                actual_type: "unknown",
            }
            .into()
        })
    }
}
impl Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_name())
            .field("populated", &self.is_populated())
            .finish()
    }
}

/// Typed handle to a dependency
///
/// Constructors receive their dependencies as [Ref]s. A forward referenced dependency
/// may still be an empty shell during construction, it becomes usable once the
/// module finished initializing.
///
/// ### Panics
///
/// Dereferencing panics if the instance was not constructed yet, use [Ref::try_get] to check.
///
/// ### Circular providers
///
/// A [Ref] holds its value strongly. Providers referencing each other keep each other alive,
/// terminating the module drops their slots and hooks but not the values themselves.
pub struct Ref<T: Injectable> {
    instance: Instance,
    cached: OnceLock<Arc<T>>,
}
impl<T: Injectable> Ref<T> {
    pub fn new(instance: Instance) -> Self {
        Ref {
            instance,
            cached: OnceLock::new(),
        }
    }

    /// Accesses the dependency
    ///
    /// # Panics
    /// - When accessed before the dependency was constructed
    pub fn get(&self) -> Arc<T> {
        match self.resolved() {
            Ok(value) => value.clone(),
            Err(e) => panic!("Ref accessed before it was constructed: {e}"),
        }
    }

    pub fn try_get(&self) -> Result<Arc<T>, RequireError> {
        self.resolved().cloned()
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    fn resolved(&self) -> Result<&Arc<T>, RequireError> {
        if let Some(value) = self.cached.get() {
            return Ok(value);
        }
        let value = self.instance.downcast::<T>()?;
        Ok(self.cached.get_or_init(|| value))
    }
}
impl<T: Injectable> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Ref {
            instance: self.instance.clone(),
            cached: self.cached.clone(),
        }
    }
}
impl<T: Injectable> Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self.resolved() {
            Ok(value) => value,
            Err(e) => panic!("Ref accessed before it was constructed: {e}"),
        }
    }
}
impl<T: Injectable + Debug> Debug for Ref<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.try_get() {
            Ok(value) => f.debug_tuple("Ref").field(&value).finish(),
            Err(_) => f.debug_tuple("Ref").field(&"<shell>").finish(),
        }
    }
}

/// Resolved dependencies of a provider, in declaration order
///
/// Missing optional dependencies are empty slots.
pub struct Dependencies {
    provider: InjectionToken,
    slots: Vec<Option<Instance>>,
}
impl Dependencies {
    pub(crate) fn new(provider: InjectionToken, slots: Vec<Option<Instance>>) -> Self {
        Dependencies { provider, slots }
    }

    pub fn provider(&self) -> &InjectionToken {
        &self.provider
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The raw instance at `index`
    pub fn instance(&self, index: usize) -> Result<&Instance, RequireError> {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| RequireError::MissingDependency {
                provider: self.provider.clone(),
                index,
            })
    }

    /// The required dependency at `index`
    pub fn get<T: Injectable>(&self, index: usize) -> Result<Ref<T>, RequireError> {
        let instance = self.instance(index)?;
        if let Some(info) = instance.type_info() {
            if info.type_id != TypeId::of::<T>() {
                return Err(RequireError::DowncastFailed {
                    required_type: std::any::type_name::<T>(),
                    actual_type: info.type_name,
                });
            }
        }
        Ok(Ref::new(instance.clone()))
    }

    /// The optional dependency at `index`, `None` if it was not provided
    pub fn optional<T: Injectable>(&self, index: usize) -> Result<Option<Ref<T>>, RequireError> {
        match self.slots.get(index) {
            Some(Some(_)) => self.get(index).map(Some),
            _ => Ok(None),
        }
    }
}
impl Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("provider", &self.provider)
            .field("slots", &self.slots)
            .finish()
    }
}
