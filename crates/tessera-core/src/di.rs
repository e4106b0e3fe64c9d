//! Dependency injection container.
//!
//! Services are constructed once during application assembly, registered
//! here, and resolved by type from lifecycle hooks and handler factories.
//! There are no global singletons: whatever owns the container owns the
//! services.
//!
//! # Example
//!
//! ```rust
//! use tessera_core::di::Container;
//! use std::sync::Arc;
//!
//! struct PointStore {
//!     capacity: usize,
//! }
//!
//! let mut container = Container::new();
//! container.register(Arc::new(PointStore { capacity: 16 }));
//!
//! let store: Arc<PointStore> = container.resolve().unwrap();
//! assert_eq!(store.capacity, 16);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error when a dependency cannot be resolved.
#[derive(Debug, Clone, Error)]
#[error("Failed to inject {type_name}: {reason}")]
pub struct InjectionError {
    /// The type name that could not be resolved.
    pub type_name: &'static str,
    /// The reason for the failure.
    pub reason: String,
}

impl InjectionError {
    /// Creates a new injection error for a missing service.
    pub fn not_registered<T: ?Sized>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            reason: "service not registered".to_string(),
        }
    }
}

struct Entry {
    type_name: &'static str,
    service: Arc<dyn Any + Send + Sync>,
}

/// A type-keyed container of `Arc`-shared services.
///
/// Registering a second service of the same type replaces the first.
#[derive(Default)]
pub struct Container {
    services: HashMap<TypeId, Entry>,
}

impl Container {
    /// Creates a new empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Registers a service, returning `true` if it replaced an earlier one.
    pub fn register<T: Send + Sync + 'static>(&mut self, service: Arc<T>) -> bool {
        self.services
            .insert(
                TypeId::of::<T>(),
                Entry {
                    type_name: std::any::type_name::<T>(),
                    service,
                },
            )
            .is_some()
    }

    /// Resolves a service, or `None` if it is not registered.
    #[must_use]
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|e| e.service.clone().downcast::<T>().ok())
    }

    /// Resolves a service or returns an error.
    pub fn resolve_required<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, InjectionError> {
        self.resolve().ok_or_else(InjectionError::not_registered::<T>)
    }

    /// Checks if a service is registered.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns `true` if no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Type names of the registered services, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.services.values().map(|e| e.type_name).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("service_count", &self.services.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Registry {
        name: String,
    }

    #[test]
    fn test_register_and_resolve() {
        let mut container = Container::new();
        assert!(container.is_empty());
        assert!(!container.register(Arc::new(Registry {
            name: "employees".to_string()
        })));

        let registry: Arc<Registry> = container.resolve().unwrap();
        assert_eq!(registry.name, "employees");
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn test_register_replaces() {
        let mut container = Container::new();
        container.register(Arc::new(Registry {
            name: "first".to_string(),
        }));
        let replaced = container.register(Arc::new(Registry {
            name: "second".to_string(),
        }));
        assert!(replaced);
        assert_eq!(container.resolve::<Registry>().unwrap().name, "second");
    }

    #[test]
    fn test_resolve_required_missing() {
        let container = Container::new();
        let err = container.resolve_required::<Registry>().unwrap_err();
        assert!(err.to_string().contains("Registry"));
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn test_trait_objects_register_behind_arc() {
        trait Greeter: Send + Sync {
            fn greet(&self) -> String;
        }
        struct Hello;
        impl Greeter for Hello {
            fn greet(&self) -> String {
                "hello".to_string()
            }
        }

        let mut container = Container::new();
        let greeter: Arc<dyn Greeter> = Arc::new(Hello);
        container.register(Arc::new(greeter));

        let resolved = container.resolve::<Arc<dyn Greeter>>().unwrap();
        assert_eq!(resolved.greet(), "hello");
    }

    #[test]
    fn test_type_names_and_debug() {
        struct A;
        let mut container = Container::new();
        container.register(Arc::new(A));
        assert_eq!(container.type_names().len(), 1);
        assert!(container.type_names()[0].ends_with("A"));
        assert!(format!("{container:?}").contains("service_count"));
    }
}
