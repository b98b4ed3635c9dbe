//! Payload type registry
//!
//! Maps the type name stored next to every persisted payload back to a
//! decoder for that type. One registry is built at process start and shared
//! by reference with the [`Service`](crate::service::Service); actions
//! register the input and output types of all their jobs when they are
//! registered, so every snapshot the engine writes can be read back.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{ActionError, Result};
use crate::payload::{Payload, TypeDescriptor};

/// Registry of payload types, keyed by [`Payload::TYPE_NAME`]
pub struct TypeRegistry {
    types: RwLock<HashMap<&'static str, TypeDescriptor>>,
}

impl TypeRegistry {
    /// Creates a registry that already knows [`NilType`](crate::payload::NilType)
    pub fn new() -> Self {
        let nil = TypeDescriptor::nil();
        let mut types = HashMap::new();
        types.insert(nil.name(), nil);
        Self {
            types: RwLock::new(types),
        }
    }

    /// Records a type under its name.
    ///
    /// Registering the same type again is a no-op. Registering a different
    /// type under a name that is already taken fails with
    /// [`ActionError::TypeConflict`].
    pub fn register(&self, descriptor: TypeDescriptor) -> Result<()> {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);

        match types.get(descriptor.name()) {
            Some(existing) if *existing == descriptor => Ok(()),
            Some(_) => Err(ActionError::TypeConflict(descriptor.name().to_string())),
            None => {
                tracing::debug!("Registered payload type: {}", descriptor.name());
                types.insert(descriptor.name(), descriptor);
                Ok(())
            }
        }
    }

    /// Shorthand for `register(TypeDescriptor::of::<P>())`
    pub fn register_type<P: Payload>(&self) -> Result<()> {
        self.register(TypeDescriptor::of::<P>())
    }

    /// Looks up the descriptor registered under `name`
    pub fn resolve(&self, name: &str) -> Result<TypeDescriptor> {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
            .ok_or_else(|| ActionError::TypeNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Names of all registered types, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Instances(Vec<String>);

    impl Payload for Instances {
        const TYPE_NAME: &'static str = "test.Instances";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Impostor(u8);

    impl Payload for Impostor {
        const TYPE_NAME: &'static str = "test.Instances";
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = TypeRegistry::new();
        registry.register_type::<Instances>().unwrap();

        let descriptor = registry.resolve("test.Instances").unwrap();
        assert_eq!(descriptor, TypeDescriptor::of::<Instances>());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = TypeRegistry::new();
        registry.register_type::<Instances>().unwrap();
        registry.register_type::<Instances>().unwrap();

        assert_eq!(registry.names(), vec!["nil", "test.Instances"]);
    }

    #[test]
    fn test_register_name_conflict() {
        let registry = TypeRegistry::new();
        registry.register_type::<Instances>().unwrap();

        let result = registry.register_type::<Impostor>();
        assert!(matches!(result, Err(ActionError::TypeConflict(name)) if name == "test.Instances"));
    }

    #[test]
    fn test_resolve_unknown_type() {
        let registry = TypeRegistry::new();
        let result = registry.resolve("test.Unknown");
        assert!(matches!(result, Err(ActionError::TypeNotFound(name)) if name == "test.Unknown"));
    }

    #[test]
    fn test_nil_is_preregistered() {
        let registry = TypeRegistry::new();
        assert!(registry.contains("nil"));
        assert!(registry.resolve("nil").unwrap().is_nil());
    }
}
