use std::fmt;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::{
    component::ClassProvider,
    instance::{Handler, Instance},
    types::{DynError, InjectionToken, Injectable, TypeInfo},
};

/// Transport exposing the routes of controllers
///
/// A module owning a router registers it as a provider under [router_token] and returns it
/// from [crate::Lifecycle::as_router]. The router receives the controllers of the module and of
/// every module it imports.
pub trait Router: Injectable {
    fn register(&self, controllers: Vec<ControllerRouteMetadata>) -> BoxFuture<'_, Result<(), DynError>>;

    fn start(&self) -> BoxFuture<'_, Result<(), DynError>>;

    fn stop(&self) -> BoxFuture<'_, Result<(), DynError>>;
}

/// Token the router of a module is registered under
pub fn router_token() -> InjectionToken {
    InjectionToken::of::<dyn Router>()
}

/// A controller and its routes, as handed to [Router::register]
#[derive(Clone)]
pub struct ControllerRouteMetadata {
    pub metatype: ClassProvider,
    /// Controller metadata merged with the route metadata of the class
    pub metadata: RouteMetadata,
    pub instance: Instance,
    pub routes: Vec<RouteController>,
}
impl fmt::Debug for ControllerRouteMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRouteMetadata")
            .field("metatype", &self.metatype)
            .field("metadata", &self.metadata)
            .field("routes", &self.routes)
            .finish()
    }
}

/// A route method of a controller
#[derive(Clone)]
pub struct RouteController {
    /// Method metadata merged over the route metadata of the class
    pub metadata: RouteMetadata,
    pub handler_name: &'static str,
    /// The method bound to the controller instance, including its interceptors
    pub handler: Handler,
    pub param_types: Vec<TypeInfo>,
    pub return_type: Option<TypeInfo>,
}
impl fmt::Debug for RouteController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteController")
            .field("metadata", &self.metadata)
            .field("handler_name", &self.handler_name)
            .finish()
    }
}

/// How lists are combined when metadata is merged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArrayMerge {
    /// Base entries followed by the overlay entries
    #[default]
    Concat,
    /// Overlay entries only
    Replace,
}

/// Free form route metadata, interpreted by the router
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteMetadata {
    values: Map<String, Value>,
    arrays: ArrayMerge,
}
impl RouteMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata from a JSON object, other values yield empty metadata
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => RouteMetadata {
                values,
                arrays: ArrayMerge::Concat,
            },
            _ => Self::default(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Lists of this metadata replace the lists of the metadata it is merged over
    pub fn replace_arrays(mut self) -> Self {
        self.arrays = ArrayMerge::Replace;
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Deep merges `overlay` over this metadata
    ///
    /// Objects merge recursively, lists follow the [ArrayMerge] of the overlay and
    /// any other value of the overlay wins.
    pub fn merge(&self, overlay: &RouteMetadata) -> RouteMetadata {
        let mut values = self.values.clone();
        merge_map(&mut values, &overlay.values, overlay.arrays);
        RouteMetadata {
            values,
            arrays: self.arrays,
        }
    }
}

/// Merges optional metadata, missing sides are treated as empty
pub(crate) fn merge_optional(base: Option<RouteMetadata>, overlay: Option<RouteMetadata>) -> RouteMetadata {
    match (base, overlay) {
        (Some(base), Some(overlay)) => base.merge(&overlay),
        (Some(base), None) => base,
        (None, Some(overlay)) => RouteMetadata::new().merge(&overlay),
        (None, None) => RouteMetadata::new(),
    }
}

fn merge_map(target: &mut Map<String, Value>, overlay: &Map<String, Value>, arrays: ArrayMerge) {
    for (key, value) in overlay {
        match target.get_mut(key) {
            Some(existing) => merge_value(existing, value, arrays),
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_value(target: &mut Value, overlay: &Value, arrays: ArrayMerge) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => merge_map(target, overlay, arrays),
        (Value::Array(target), Value::Array(overlay)) if arrays == ArrayMerge::Concat => {
            target.extend(overlay.iter().cloned())
        }
        (target, overlay) => *target = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn merges_objects_recursively() {
        let class = RouteMetadata::from_value(json!({ "path": "/blog", "auth": { "roles": ["admin"], "required": true } }));
        let method = RouteMetadata::from_value(json!({ "method": "GET", "auth": { "required": false } }));

        let merged = class.merge(&method);
        assert_eq!(
            *merged.values(),
            *RouteMetadata::from_value(json!({
                "path": "/blog",
                "method": "GET",
                "auth": { "roles": ["admin"], "required": false }
            }))
            .values()
        );
    }

    #[test]
    fn lists_concat_unless_replaced() {
        let class = RouteMetadata::new().with("tags", json!(["blog"]));

        let concat = class.merge(&RouteMetadata::new().with("tags", json!(["admin"])));
        assert_eq!(concat.get("tags"), Some(&json!(["blog", "admin"])));

        let replaced = class.merge(&RouteMetadata::new().with("tags", json!(["admin"])).replace_arrays());
        assert_eq!(replaced.get("tags"), Some(&json!(["admin"])));
    }

    #[test]
    fn missing_metadata_is_empty() {
        let merged = merge_optional(None, Some(RouteMetadata::new().with("path", "/users")));
        assert_eq!(merged.get("path"), Some(&json!("/users")));
        assert!(merge_optional(None, None).values().is_empty());
    }

    #[test]
    fn router_token_is_stable() {
        assert_eq!(router_token(), router_token());
        assert_ne!(router_token(), InjectionToken::from("Router"));
    }
}
