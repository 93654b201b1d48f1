use core::fmt::{Debug, Display};

/// Configuration entry-point for instantiating a computation cycle.
///
/// A concrete `Config` binds the value type that flows through caches,
/// snapshot providers, node functions and the result model. Everything that
/// executes code (`FunctionInvoker`, `DependencyGraphExecutor`, the cycle
/// itself) is generic over the `Config`; plain containers are generic over
/// the value type directly.
pub trait Config: Sized + 'static {
    /// Value stored in a computation cache.
    ///
    /// `PartialEq` drives delta detection between cycles and `Display` is
    /// used by the diagnostic cache dump.
    type Value: Clone + PartialEq + Debug + Display + Send + Sync + 'static;
}

/// Value type bound to a specific `Config`.
pub type Value<C> = <C as Config>::Value;
