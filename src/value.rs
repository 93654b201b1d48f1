use derive_more::Display;
use serde::Serialize;

/// Scheme-qualified identifier of a computation target.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[display("{scheme}::{value}")]
pub struct UniqueId {
    scheme: String,
    value: String,
}

impl UniqueId {
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Kind of object a value is computed for.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ComputationTargetType {
    #[display("PORTFOLIO_NODE")]
    PortfolioNode,
    #[display("POSITION")]
    Position,
    #[display("SECURITY")]
    Security,
    /// A bare identifier, typically a market data ticker.
    #[display("PRIMITIVE")]
    Primitive,
}

/// The object a value is computed for.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[display("{target_type} {identifier}")]
pub struct ComputationTargetSpecification {
    target_type: ComputationTargetType,
    identifier: UniqueId,
}

impl ComputationTargetSpecification {
    pub fn new(target_type: ComputationTargetType, identifier: UniqueId) -> Self {
        Self {
            target_type,
            identifier,
        }
    }

    pub fn primitive(identifier: UniqueId) -> Self {
        Self::new(ComputationTargetType::Primitive, identifier)
    }

    pub fn target_type(&self) -> ComputationTargetType {
        self.target_type
    }

    pub fn identifier(&self) -> &UniqueId {
        &self.identifier
    }
}

/// A request for a value on a target, as declared by a consumer.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[display("ValueReq[{value_name}, {target}]")]
pub struct ValueRequirement {
    value_name: String,
    target: ComputationTargetSpecification,
}

impl ValueRequirement {
    pub fn new(value_name: impl Into<String>, target: ComputationTargetSpecification) -> Self {
        Self {
            value_name: value_name.into(),
            target,
        }
    }

    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    pub fn target(&self) -> &ComputationTargetSpecification {
        &self.target
    }
}

/// Identity of one computed or externally supplied value.
///
/// This is the key of every computation cache.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[display("ValueSpec[{value_name}, {target}]")]
pub struct ValueSpecification {
    value_name: String,
    target: ComputationTargetSpecification,
}

impl ValueSpecification {
    pub fn new(value_name: impl Into<String>, target: ComputationTargetSpecification) -> Self {
        Self {
            value_name: value_name.into(),
            target,
        }
    }

    /// The specification that exactly satisfies `requirement`.
    pub fn from_requirement(requirement: &ValueRequirement) -> Self {
        Self::new(requirement.value_name(), requirement.target().clone())
    }

    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    pub fn target(&self) -> &ComputationTargetSpecification {
        &self.target
    }

    pub fn satisfies(&self, requirement: &ValueRequirement) -> bool {
        self.value_name == requirement.value_name && self.target == requirement.target
    }
}

/// A value together with the specification it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedValue<V> {
    specification: ValueSpecification,
    value: V,
}

impl<V> ComputedValue<V> {
    pub fn new(specification: ValueSpecification, value: V) -> Self {
        Self {
            specification,
            value,
        }
    }

    pub fn specification(&self) -> &ValueSpecification {
        &self.specification
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn into_parts(self) -> (ValueSpecification, V) {
        (self.specification, self.value)
    }
}

/// Portfolio a view is evaluated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Portfolio {
    id: UniqueId,
    name: String,
}

impl Portfolio {
    pub fn new(id: UniqueId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> &UniqueId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
