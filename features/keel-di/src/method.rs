use std::{fmt, future::Future, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    instance::{Args, Handler},
    router::RouteMetadata,
    types::{DynError, DynValue, InjectionToken, Injectable, TypeInfo},
};

type MethodFn<T> = Arc<dyn Fn(Arc<T>, Args) -> BoxFuture<'static, Result<DynValue, DynError>> + Send + Sync>;

/// An interceptor applied to a method, with the options passed to it on every call
#[derive(Clone)]
pub struct InterceptorConfig {
    pub token: InjectionToken,
    pub options: Option<DynValue>,
}
impl fmt::Debug for InterceptorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorConfig")
            .field("token", &self.token)
            .field("options", &self.options.is_some())
            .finish()
    }
}

/// A named method of a component
///
/// Methods are bound to every constructed instance and called through its dispatch table,
/// which is where interceptors and routers find them.
pub struct Method<T> {
    name: &'static str,
    handler: MethodFn<T>,
    is_async: bool,
    interceptors: Vec<InterceptorConfig>,
    route: Option<RouteMetadata>,
    param_types: Vec<TypeInfo>,
    return_type: Option<TypeInfo>,
}
impl<T: Injectable> Method<T> {
    pub fn new<F, Fut>(name: &'static str, handler: F) -> Self
    where
        F: Fn(Arc<T>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DynValue, DynError>> + Send + 'static,
    {
        Self::with_handler(name, true, Arc::new(move |this: Arc<T>, args: Args| handler(this, args).boxed()))
    }

    /// A method which completes without awaiting
    pub fn blocking<F>(name: &'static str, handler: F) -> Self
    where
        F: Fn(&T, Args) -> Result<DynValue, DynError> + Send + Sync + 'static,
    {
        Self::with_handler(
            name,
            false,
            Arc::new(move |this: Arc<T>, args: Args| futures::future::ready(handler(&*this, args)).boxed()),
        )
    }

    fn with_handler(name: &'static str, is_async: bool, handler: MethodFn<T>) -> Self {
        Method {
            name,
            handler,
            is_async,
            interceptors: Vec::new(),
            route: None,
            param_types: Vec::new(),
            return_type: None,
        }
    }

    /// Wraps the method in the interceptor registered under `token`
    ///
    /// The first added interceptor is the outermost.
    pub fn intercept(self, token: impl Into<InjectionToken>) -> Self {
        self.intercept_config(token.into(), None)
    }

    pub fn intercept_with<O: Injectable>(self, token: impl Into<InjectionToken>, options: O) -> Self {
        self.intercept_config(token.into(), Some(Arc::new(options)))
    }

    fn intercept_config(mut self, token: InjectionToken, options: Option<DynValue>) -> Self {
        self.interceptors.push(InterceptorConfig { token, options });
        self
    }

    /// Exposes the method as a route
    pub fn route(mut self, metadata: RouteMetadata) -> Self {
        self.route = Some(metadata);
        self
    }

    pub fn params(mut self, param_types: Vec<TypeInfo>) -> Self {
        self.param_types = param_types;
        self
    }

    pub fn returns<R: 'static>(mut self) -> Self {
        self.return_type = Some(TypeInfo::of::<R>());
        self
    }
}

/// Type erased [Method]
#[derive(Clone)]
pub struct MethodDescriptor {
    pub name: &'static str,
    pub is_async: bool,
    pub interceptors: Vec<InterceptorConfig>,
    pub route: Option<RouteMetadata>,
    pub param_types: Vec<TypeInfo>,
    pub return_type: Option<TypeInfo>,
    bind: Arc<dyn Fn(&DynValue) -> Option<Handler> + Send + Sync>,
}
impl MethodDescriptor {
    /// Binds the method to a value, `None` if the value is of another type
    pub fn bind(&self, value: &DynValue) -> Option<Handler> {
        (self.bind)(value)
    }
}
impl<T: Injectable> From<Method<T>> for MethodDescriptor {
    fn from(method: Method<T>) -> Self {
        let handler = method.handler;
        MethodDescriptor {
            name: method.name,
            is_async: method.is_async,
            interceptors: method.interceptors,
            route: method.route,
            param_types: method.param_types,
            return_type: method.return_type,
            bind: Arc::new(move |value: &DynValue| {
                let this = value.clone().downcast::<T>().ok()?;
                let handler = handler.clone();
                let bound: Handler = Arc::new(move |args: Args| handler(this.clone(), args));
                Some(bound)
            }),
        }
    }
}
impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("is_async", &self.is_async)
            .field("interceptors", &self.interceptors)
            .field("route", &self.route)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::value;

    struct Greeter {
        greeting: &'static str,
    }

    #[tokio::test]
    async fn descriptors_bind_to_matching_values() {
        let method = Method::<Greeter>::new("greet", |this, args| async move {
            let name = args.get::<String>(0)?;
            Ok::<_, DynError>(value(format!("{} {name}", this.greeting)))
        })
        .intercept("Logging")
        .intercept_with("Cache", 30u32)
        .returns::<String>();
        let descriptor = MethodDescriptor::from(method);

        assert!(descriptor.is_async);
        assert_eq!(descriptor.interceptors.len(), 2);
        assert_eq!(descriptor.interceptors[0].token, InjectionToken::from("Logging"));
        assert_eq!(descriptor.return_type, Some(TypeInfo::of::<String>()));

        assert!(descriptor.bind(&value(1u32)).is_none());
        let handler = descriptor.bind(&value(Greeter { greeting: "Hello" })).unwrap();
        let result = handler(Args::new(vec![value(String::from("Ferris"))])).await.unwrap();
        assert_eq!(*result.downcast::<String>().unwrap(), "Hello Ferris");
    }

    #[tokio::test]
    async fn blocking_methods_are_not_async() {
        let method = Method::<Greeter>::blocking("greeting", |this, _| Ok(value(this.greeting)));
        let descriptor = MethodDescriptor::from(method);
        assert!(!descriptor.is_async);

        let handler = descriptor.bind(&value(Greeter { greeting: "Hi" })).unwrap();
        let result = handler(Args::empty()).await.unwrap();
        assert_eq!(*result.downcast::<&'static str>().unwrap(), "Hi");
    }
}
