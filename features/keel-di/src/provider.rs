use std::{fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    component::{ClassProvider, Component, Lifecycle},
    instance::{Dependencies, Instance},
    types::{Dependency, DynError, InjectionToken, Injectable},
};

type FactoryFn = Arc<dyn Fn(Dependencies) -> BoxFuture<'static, Result<Instance, DynError>> + Send + Sync>;

/// Declaration of how a token is provided within a module
#[derive(Clone)]
pub enum Provider {
    /// An already existing value
    Value { token: InjectionToken, value: Instance },
    /// A component constructed by the runtime
    Class { token: InjectionToken, class: ClassProvider },
    /// A function producing the value from its dependencies
    Factory {
        token: InjectionToken,
        factory: FactoryProvider,
    },
    /// Another token of the same module scope
    Alias {
        token: InjectionToken,
        target: InjectionToken,
    },
}

impl Provider {
    /// Provides `value` under its own type
    pub fn value<T: Injectable>(value: T) -> Self {
        Self::value_as(InjectionToken::of::<T>(), value)
    }

    pub fn value_as<T: Injectable>(token: impl Into<InjectionToken>, value: T) -> Self {
        Provider::Value {
            token: token.into(),
            value: Instance::value(value),
        }
    }

    /// Provides a value whose lifecycle hooks and capabilities are used
    pub fn component_value<T: Lifecycle>(token: impl Into<InjectionToken>, value: T) -> Self {
        Provider::Value {
            token: token.into(),
            value: Instance::component(value),
        }
    }

    /// Provides the component under its own type
    pub fn class<T: Component>() -> Self {
        Self::class_as::<T>(InjectionToken::of::<T>())
    }

    pub fn class_as<T: Component>(token: impl Into<InjectionToken>) -> Self {
        Provider::Class {
            token: token.into(),
            class: ClassProvider::of::<T>(),
        }
    }

    /// Provides the result of `factory`, called with the resolved `inject` dependencies
    pub fn factory<T, F, Fut>(token: impl Into<InjectionToken>, inject: Vec<Dependency>, factory: F) -> Self
    where
        T: Injectable,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, DynError>> + Send + 'static,
    {
        Provider::Factory {
            token: token.into(),
            factory: FactoryProvider {
                inject,
                factory: Arc::new(move |deps: Dependencies| factory(deps).map(|r| r.map(Instance::value)).boxed()),
            },
        }
    }

    /// Like [Provider::factory], for values with lifecycle hooks or capabilities
    pub fn component_factory<T, F, Fut>(token: impl Into<InjectionToken>, inject: Vec<Dependency>, factory: F) -> Self
    where
        T: Lifecycle,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, DynError>> + Send + 'static,
    {
        Provider::Factory {
            token: token.into(),
            factory: FactoryProvider {
                inject,
                factory: Arc::new(move |deps: Dependencies| {
                    factory(deps).map(|r| r.map(Instance::component)).boxed()
                }),
            },
        }
    }

    /// Provides whatever is provided under `target`
    pub fn alias(token: impl Into<InjectionToken>, target: impl Into<InjectionToken>) -> Self {
        Provider::Alias {
            token: token.into(),
            target: target.into(),
        }
    }

    pub fn token(&self) -> &InjectionToken {
        match self {
            Provider::Value { token, .. }
            | Provider::Class { token, .. }
            | Provider::Factory { token, .. }
            | Provider::Alias { token, .. } => token,
        }
    }
}
impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Value { token, value } => f.debug_struct("Value").field("token", token).field("value", value).finish(),
            Provider::Class { token, class } => f.debug_struct("Class").field("token", token).field("class", class).finish(),
            Provider::Factory { token, factory } => f
                .debug_struct("Factory")
                .field("token", token)
                .field("inject", &factory.inject)
                .finish(),
            Provider::Alias { token, target } => f.debug_struct("Alias").field("token", token).field("target", target).finish(),
        }
    }
}

/// A factory function and the dependencies it is called with
#[derive(Clone)]
pub struct FactoryProvider {
    pub inject: Vec<Dependency>,
    factory: FactoryFn,
}
impl FactoryProvider {
    pub fn call(&self, deps: Dependencies) -> BoxFuture<'static, Result<Instance, DynError>> {
        (self.factory)(deps)
    }
}
