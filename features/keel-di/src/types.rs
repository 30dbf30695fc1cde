use std::{
    any::{Any, TypeId},
    borrow::Cow,
    fmt,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// All errors must be Send + Sync so they can cross await points
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Type erased value, used for instances, method arguments and method results
pub type DynValue = Arc<dyn Any + Send + Sync>;

/// We assume that we are using a multithreaded async runtime
/// So anything injectable needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// Wraps any injectable value into a [DynValue]
pub fn value<T: Injectable>(value: T) -> DynValue {
    Arc::new(value)
}

/// Type Name and Type Id
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_name: &'static str,
    pub type_id: TypeId,
}
impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}
impl TypeInfo {
    pub fn of<T: 'static + ?Sized>() -> TypeInfo {
        TypeInfo {
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
        }
    }

    /// Type name without its module path, generic arguments are left untouched
    pub fn short_name(&self) -> &'static str {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        let start = base.rfind("::").map(|i| i + 2).unwrap_or(0);
        &self.type_name[start..]
    }
}

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// A unique token, two symbols are only equal if they were cloned from the same [Symbol::new] call
#[derive(Debug, Clone, Copy)]
pub struct Symbol {
    id: u64,
    description: &'static str,
}
impl Symbol {
    pub fn new(description: &'static str) -> Self {
        Symbol {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description,
        }
    }

    pub fn description(&self) -> &'static str {
        self.description
    }
}
impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Symbol {}
impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Identity used to look up a provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InjectionToken {
    /// A Rust type, usually the type the provider supplies
    Type(TypeInfo),
    /// A plain string name
    Name(Cow<'static, str>),
    /// A unique symbol
    Symbol(Symbol),
}
impl InjectionToken {
    pub fn of<T: 'static + ?Sized>() -> Self {
        InjectionToken::Type(TypeInfo::of::<T>())
    }

    pub fn name(name: impl Into<Cow<'static, str>>) -> Self {
        InjectionToken::Name(name.into())
    }

    /// The [TypeInfo] behind a type token
    pub fn type_info(&self) -> Option<TypeInfo> {
        match self {
            InjectionToken::Type(info) => Some(*info),
            _ => None,
        }
    }
}
impl fmt::Display for InjectionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionToken::Type(info) => f.write_str(info.short_name()),
            InjectionToken::Name(name) => f.write_str(name),
            InjectionToken::Symbol(symbol) => write!(f, "Symbol({})", symbol.description),
        }
    }
}
impl From<&'static str> for InjectionToken {
    fn from(name: &'static str) -> Self {
        InjectionToken::Name(Cow::Borrowed(name))
    }
}
impl From<String> for InjectionToken {
    fn from(name: String) -> Self {
        InjectionToken::Name(Cow::Owned(name))
    }
}
impl From<Symbol> for InjectionToken {
    fn from(symbol: Symbol) -> Self {
        InjectionToken::Symbol(symbol)
    }
}
impl From<TypeInfo> for InjectionToken {
    fn from(info: TypeInfo) -> Self {
        InjectionToken::Type(info)
    }
}

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

/// Scope identity for provider instances
///
/// [ContextId::STATIC] is the singleton scope. Every [ContextId::new] call mints a fresh identity,
/// so two contexts are equal only if one is a copy of the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);
impl ContextId {
    pub const STATIC: ContextId = ContextId(0);

    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        ContextId(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_static(&self) -> bool {
        *self == Self::STATIC
    }
}
impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.is_static() {
            true => f.write_str("static"),
            false => write!(f, "#{}", self.0),
        }
    }
}

/// Information about a provider dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// The required token
    pub token: InjectionToken,
    /// If it is optional or required
    pub optional: bool,
    /// If the dependency is a forward reference, it is then excluded from ordering
    pub forward_ref: bool,
    /// Context the dependency is resolved in, assigned when it points to a transient provider
    pub context_id: Option<ContextId>,
}
impl Dependency {
    /// Depend on the provider registered under the type `T`
    pub fn on<T: 'static + ?Sized>() -> Self {
        Self::token(InjectionToken::of::<T>())
    }

    pub fn token(token: impl Into<InjectionToken>) -> Self {
        Dependency {
            token: token.into(),
            optional: false,
            forward_ref: false,
            context_id: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn forward_ref(mut self) -> Self {
        self.forward_ref = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Cat;

    #[test]
    fn context_ids_are_identity_based() {
        let a = ContextId::new();
        let b = ContextId::new();
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert!(ContextId::STATIC.is_static());
        assert!(!a.is_static());
    }

    #[test]
    fn symbols_with_same_description_differ() {
        let a = Symbol::new("token");
        let b = Symbol::new("token");
        assert_ne!(InjectionToken::from(a), InjectionToken::from(b));
        assert_eq!(InjectionToken::from(a), InjectionToken::from(a));
    }

    #[test]
    fn tokens_display_readable_names() {
        assert_eq!(InjectionToken::of::<Cat>().to_string(), "Cat");
        assert_eq!(InjectionToken::from("CONFIG").to_string(), "CONFIG");
        assert_eq!(InjectionToken::from(Symbol::new("db")).to_string(), "Symbol(db)");
        assert_eq!(TypeInfo::of::<Vec<Cat>>().short_name(), "Vec<keel_di::types::tests::Cat>");
    }

    #[test]
    fn dependency_builder_sets_flags() {
        let dependency = Dependency::on::<Cat>().optional().forward_ref();
        assert!(dependency.optional);
        assert!(dependency.forward_ref);
        assert_eq!(dependency.context_id, None);
        assert_eq!(dependency.token, InjectionToken::of::<Cat>());
    }
}
