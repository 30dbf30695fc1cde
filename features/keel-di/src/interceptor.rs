use std::{fmt, sync::Arc};

use futures::{future::BoxFuture, FutureExt};

use crate::{
    errors::RequireError,
    instance::{Args, Handler},
    types::{DynError, DynValue, Injectable, TypeInfo},
};

/// Wraps calls of intercepted methods
///
/// Interceptors are regular providers, exposed through [crate::Lifecycle::as_interceptor].
/// They decide whether, when and how often the wrapped method runs by calling [CallHandler::handle].
pub trait Interceptor: Injectable {
    fn intercept<'a>(
        &'a self,
        context: InterceptorContext,
        next: CallHandler,
    ) -> BoxFuture<'a, Result<DynValue, DynError>>;
}

/// Information about the intercepted call
#[derive(Clone)]
pub struct InterceptorContext {
    class: TypeInfo,
    method: &'static str,
    is_async: bool,
    options: Option<DynValue>,
    args: Args,
}
impl InterceptorContext {
    /// Type owning the intercepted method
    pub fn class(&self) -> TypeInfo {
        self.class
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    /// Options this interceptor was configured with on the method
    pub fn options<T: Injectable>(&self) -> Option<Arc<T>> {
        self.options.clone()?.downcast::<T>().ok()
    }

    pub fn args(&self) -> &Args {
        &self.args
    }
}
impl fmt::Debug for InterceptorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorContext")
            .field("class", &self.class.type_name)
            .field("method", &self.method)
            .field("is_async", &self.is_async)
            .field("args", &self.args)
            .finish()
    }
}

/// The next link of the interceptor chain
#[derive(Clone)]
pub struct CallHandler {
    next: Handler,
    args: Args,
}
impl CallHandler {
    /// Runs the rest of the chain with the original arguments
    pub fn handle(&self) -> BoxFuture<'static, Result<DynValue, DynError>> {
        (self.next)(self.args.clone())
    }

    /// Runs the rest of the chain with replaced arguments
    pub fn handle_with(&self, args: Args) -> BoxFuture<'static, Result<DynValue, DynError>> {
        (self.next)(args)
    }

    /// Runs the rest of the chain and downcasts the result
    pub async fn handle_as<T: Injectable>(&self) -> Result<Arc<T>, DynError> {
        let result = self.handle().await?;
        result.downcast::<T>().map_err(|_| {
            RequireError::DowncastFailed {
                required_type: std::any::type_name::<T>(),
                actual_type: "unknown",
            }
            .into()
        })
    }
}

/// Target of an interceptor chain
pub(crate) struct InterceptedMethod {
    pub class: TypeInfo,
    pub method: &'static str,
    pub is_async: bool,
}

/// Composes `handler` with the interceptors, the first interceptor becomes the outermost link
pub(crate) fn compose(
    target: &InterceptedMethod,
    handler: Handler,
    interceptors: Vec<(Arc<dyn Interceptor>, Option<DynValue>)>,
) -> Handler {
    interceptors
        .into_iter()
        .rev()
        .fold(handler, |next, (interceptor, options)| {
            let (class, method, is_async) = (target.class, target.method, target.is_async);
            let link: Handler = Arc::new(move |args: Args| {
                let interceptor = interceptor.clone();
                let context = InterceptorContext {
                    class,
                    method,
                    is_async,
                    options: options.clone(),
                    args: args.clone(),
                };
                let next = CallHandler {
                    next: next.clone(),
                    args,
                };
                async move { interceptor.intercept(context, next).await }.boxed()
            });
            link
        })
}
