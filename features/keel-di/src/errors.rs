use std::sync::Arc;

use thiserror::Error;

use crate::types::{ContextId, DynError, InjectionToken};

pub type DiResult<T> = Result<T, DiError>;

/// Any error raised while scanning, initializing or running the application
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// The application was declared incorrectly
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A lookup failed
    #[error(transparent)]
    Require(#[from] RequireError),
    /// Something that should never happen did
    #[error(transparent)]
    Invariant(#[from] InvariantError),
    /// A constructor or factory failed
    #[error("Construction of '{token}' failed - error: {error}")]
    ConstructionFailed {
        token: InjectionToken,
        error: Arc<DynError>,
    },
    /// A lifecycle hook failed
    #[error("Lifecycle hook '{hook}' of '{token}' failed - error: {error}")]
    HookFailed {
        hook: &'static str,
        token: InjectionToken,
        error: Arc<DynError>,
    },
    /// The router of a module failed
    #[error("Router of module '{module}' failed to {operation} - error: {error}")]
    RouterFailed {
        module: &'static str,
        operation: &'static str,
        error: Arc<DynError>,
    },
}
impl DiError {
    /// True if the error signals a bug in the runtime rather than in the application
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, DiError::Invariant(_))
    }
}

/// Mistakes in the declared application, these have to be fixed by the application author
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Cannot resolve dependencies of '{provider}' in module '{module}'. The dependency '{token}' at index {index} cannot be resolved. This might be due to a circular dependency, declare it as a forward reference to avoid it")]
    UnresolvedDependency {
        provider: InjectionToken,
        token: InjectionToken,
        index: usize,
        module: &'static str,
    },
    #[error("Duplicate provider '{token}' in module '{module}'")]
    DuplicateProvider {
        token: InjectionToken,
        module: &'static str,
    },
    #[error("You cannot export a provider that is not a part of the currently processed module ({module}). Please verify whether the exported '{token}' is available in this particular context")]
    UnknownExport {
        token: InjectionToken,
        module: &'static str,
    },
    #[error("Class '{class}' is not a module, but is imported by '{imported_by}'")]
    NotAModule {
        class: &'static str,
        imported_by: &'static str,
    },
    #[error("Class '{class}' is not a controller, but is declared as one in module '{module}'")]
    NotAController {
        class: &'static str,
        module: &'static str,
    },
    #[error("Module '{module}' with dynamic configuration has already been registered. Dynamic modules must be imported only once with their configuration, to reuse the module elsewhere import the module class directly")]
    DuplicateDynamicModule { module: &'static str },
    #[error("Circular dependency between transient providers in module '{module}': {}", .chain.join(" -> "))]
    TransientCircularDependency {
        module: &'static str,
        chain: Vec<String>,
    },
    #[error("Factory provider '{token}' cannot be used as a prototype")]
    FactoryAsPrototype { token: InjectionToken },
    #[error("Interceptor '{interceptor}' used on '{class}::{method}' does not implement the intercept capability")]
    NotAnInterceptor {
        interceptor: InjectionToken,
        class: &'static str,
        method: &'static str,
    },
    #[error("Provider '{token}' registered as router of module '{module}' does not implement the router capability")]
    NotARouter {
        token: InjectionToken,
        module: &'static str,
    },
    #[error("The provider '{token}' is not transient")]
    NotTransient { token: InjectionToken },
}

/// Errors when trying to require a certain provider or instance
#[derive(Error, Debug, Clone)]
pub enum RequireError {
    /// The token is neither a local provider nor exported by an imported module
    #[error("Provider '{token}' not found or exported in module '{module}'. Make sure that it is part of the providers of the current module")]
    NotFound {
        token: InjectionToken,
        module: &'static str,
    },
    /// No module of the application exports the token
    #[error("Provider '{0}' not found or exported by any module")]
    NotExported(InjectionToken),
    /// The provider has no instance for the context
    #[error("Instance of '{token}' not found for context {context}")]
    InstanceMissing {
        token: InjectionToken,
        context: ContextId,
    },
    /// The instance is still an empty shell
    #[error("Instance of '{0}' was accessed before it was constructed")]
    NotConstructed(&'static str),
    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
    /// A constructor asked for a dependency slot that holds nothing
    #[error("The dependency at index {index} of '{provider}' was not provided")]
    MissingDependency {
        provider: InjectionToken,
        index: usize,
    },
    #[error("Handler argument at index {0} is missing")]
    ArgumentMissing(usize),
    #[error("Method '{method}' is not defined on '{type_name}'")]
    MethodNotFound {
        type_name: &'static str,
        method: String,
    },
    #[error("Module '{0}' not found")]
    ModuleNotFound(&'static str),
    #[error("Application not yet initialized")]
    NotInitialized,
}

/// An internal invariant of the runtime was broken
#[derive(Error, Debug, Clone)]
#[error("{message}\n\nThis is most likely a bug in keel, please report it.")]
pub struct InvariantError {
    message: String,
}
impl InvariantError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!("Invariant violated: {message}");
        InvariantError { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
