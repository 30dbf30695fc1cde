//! Module based dependency injection for async applications
//!
//! An application is a tree of modules. Each module declares providers, controllers,
//! the modules it imports and the tokens it exports. The runtime orders providers by their
//! dependencies, hands out not yet constructed instances to break circular dependencies,
//! keeps one instance per context for transient providers, wraps methods in interceptors
//! and passes controllers to the router of their module.
//!
//! ```ignore
//! struct CatService {
//!     storage: Ref<Storage>,
//! }
//! impl Lifecycle for CatService {}
//! impl Component for CatService {
//!     fn dependencies() -> Vec<Dependency> {
//!         vec![Dependency::on::<Storage>()]
//!     }
//!
//!     async fn construct(deps: Dependencies) -> Result<Self, DynError> {
//!         Ok(CatService { storage: deps.get(0)? })
//!     }
//! }
//!
//! let app = Application::create::<AppModule>()?;
//! app.init().await?;
//! ```

mod application;
mod component;
mod dependency_graph;
mod errors;
mod instance;
mod instance_wrapper;
mod interceptor;
mod method;
mod module;
mod module_registry;
mod provider;
mod router;
mod types;

pub use application::Application;
pub use component::{ClassProvider, Component, Hook, Lifecycle};
pub use dependency_graph::DependencyGraph;
pub use errors::{ConfigError, DiError, DiResult, InvariantError, RequireError};
pub use instance::{Args, Dependencies, Handler, Instance, Ref};
pub use instance_wrapper::InstanceWrapper;
pub use interceptor::{CallHandler, Interceptor, InterceptorContext};
pub use method::{InterceptorConfig, Method, MethodDescriptor};
pub use module::{DynamicModule, Import, Module, ModuleMetadata, ModuleRef};
pub use module_registry::ModuleRegistry;
pub use provider::{FactoryProvider, Provider};
pub use router::{router_token, ArrayMerge, ControllerRouteMetadata, RouteController, RouteMetadata, Router};
pub use types::{value, ContextId, Dependency, DynError, DynValue, InjectionToken, Injectable, Symbol, TypeInfo};
