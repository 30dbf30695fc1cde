use std::{future::Future, sync::Arc};

use crate::{
    component::Component,
    errors::{DiResult, RequireError},
    instance::Instance,
    module::{Import, Module, ModuleRef},
    module_registry::ModuleRegistry,
    types::{InjectionToken, Injectable, TypeInfo},
};

/// An application built from a root module
///
/// ```ignore
/// let app = Application::create::<AppModule>()?;
/// app.init().await?;
/// let service = app.require::<CatService>()?;
/// app.stop().await?;
/// ```
pub struct Application {
    root: TypeInfo,
    registry: ModuleRegistry,
}

impl Application {
    pub fn create<M: Component>() -> DiResult<Self> {
        Self::new(Import::module::<M>())
    }

    /// Scans and builds every module reachable from `root`, nothing is constructed yet
    pub fn new(root: Import) -> DiResult<Self> {
        let registry = ModuleRegistry::new(root.clone())?;
        Ok(Application {
            root: root.class().info(),
            registry,
        })
    }

    fn root_module(&self) -> Result<&Arc<Module>, RequireError> {
        self.registry.get(self.root)
    }

    pub fn is_initiated(&self) -> bool {
        self.root_module().is_ok_and(|module| module.is_initiated())
    }

    /// Constructs every module, registers routes and calls the ready hooks
    pub async fn init(&self) -> DiResult<()> {
        if self.is_initiated() {
            return Ok(());
        }
        tracing::debug!("Initializing application");
        self.registry.init().await?;
        tracing::info!("Application initialized");
        Ok(())
    }

    /// Starts the routers, initializing first if needed
    pub async fn start(&self) -> DiResult<()> {
        self.init().await?;
        self.registry.start().await?;
        tracing::info!("Application started");
        Ok(())
    }

    /// Stops the routers and destroys every instance
    pub async fn stop(&self) -> DiResult<()> {
        if !self.is_initiated() {
            return Ok(());
        }
        tracing::debug!("Stopping application");
        self.registry.terminate().await?;
        tracing::info!("Application stopped");
        Ok(())
    }

    /// Starts the application and stops it once `shutdown` completes
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> DiResult<()> {
        self.start().await?;
        shutdown.await;
        tracing::info!("Shutdown requested");
        self.stop().await
    }

    /// Resolver scoped to module `M`
    pub fn select<M: 'static>(&self) -> DiResult<ModuleRef> {
        Ok(self.registry.get_of::<M>()?.module_ref())
    }

    /// The instance of the first module exporting `token`
    pub fn get(&self, token: impl Into<InjectionToken>) -> DiResult<Instance> {
        if !self.is_initiated() {
            return Err(RequireError::NotInitialized.into());
        }
        let token = token.into();
        let provider = self
            .registry
            .modules()
            .iter()
            .find_map(|module| module.get_provider(&token).ok())
            .ok_or(RequireError::NotExported(token))?;
        Ok(provider.instance(None)?)
    }

    pub fn require<T: Injectable>(&self) -> DiResult<Arc<T>> {
        Ok(self.get(InjectionToken::of::<T>())?.downcast::<T>()?)
    }

    pub fn modules(&self) -> &[Arc<Module>] {
        self.registry.modules()
    }
}
