//! Service key types for the dependency injection container.

use std::any::TypeId;

/// Key for service storage and lookup.
///
/// Keys uniquely identify services in the container. A service is keyed by
/// its concrete type, by a trait object, or by either of those plus a
/// `&'static str` name when several registrations of the same shape must
/// coexist (the "named/typed service instance" descriptor kind).
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{ServiceCollection, Resolver};
///
/// let mut services = ServiceCollection::new();
/// services.add_singleton(8080u32);
/// services.add_named_singleton("admin_port", 9090u32);
///
/// let provider = services.build();
/// assert_eq!(*provider.get_required::<u32>(), 8080);
/// assert_eq!(*provider.get_named_required::<u32>("admin_port"), 9090);
/// ```
#[derive(Debug, Clone)]
pub enum Key {
    /// Concrete type key with TypeId and type name for diagnostics.
    Type(TypeId, &'static str),
    /// Single trait binding key. Traits have no TypeId, so the trait name
    /// is the identity.
    Trait(&'static str),
    /// Named concrete type key.
    TypeNamed(TypeId, &'static str, &'static str),
    /// Named trait binding key.
    TraitNamed(&'static str, &'static str),
}

impl Key {
    /// Get the type or trait name for display.
    ///
    /// Returns the human-readable type or trait name for debugging and
    /// error messages. This is the `std::any::type_name` result.
    pub fn display_name(&self) -> &'static str {
        match self {
            Key::Type(_, name) => name,
            Key::Trait(name) => name,
            Key::TypeNamed(_, name, _) => name,
            Key::TraitNamed(name, _) => name,
        }
    }

    /// Get the service name for named services, or None for unnamed services.
    pub fn service_name(&self) -> Option<&'static str> {
        match self {
            Key::Type(_, _) | Key::Trait(_) => None,
            Key::TypeNamed(_, _, name) => Some(name),
            Key::TraitNamed(_, name) => Some(name),
        }
    }
}

// Hot path equality: TypeId-only comparison for concrete types, the type
// name string is ignored.
impl PartialEq for Key {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Type(a, _), Key::Type(b, _)) => a == b,
            (Key::TypeNamed(a, _, name_a), Key::TypeNamed(b, _, name_b)) => {
                a == b && name_a == name_b
            }
            (Key::Trait(a), Key::Trait(b)) => a == b,
            (Key::TraitNamed(a, name_a), Key::TraitNamed(b, name_b)) => {
                a == b && name_a == name_b
            }
            _ => false,
        }
    }
}

impl Eq for Key {}

impl std::hash::Hash for Key {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Key::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            Key::TypeNamed(id, _, name) => {
                1u8.hash(state);
                id.hash(state);
                name.hash(state);
            }
            Key::Trait(name) => {
                2u8.hash(state);
                name.hash(state);
            }
            Key::TraitNamed(name, named) => {
                3u8.hash(state);
                name.hash(state);
                named.hash(state);
            }
        }
    }
}

/// Helper function for creating type keys.
#[inline(always)]
pub fn key_of_type<T: 'static>() -> Key {
    Key::Type(TypeId::of::<T>(), std::any::type_name::<T>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_keys_compare_by_type_id() {
        let a = key_of_type::<String>();
        let b = Key::Type(TypeId::of::<String>(), "some other spelling");
        assert_eq!(a, b);
        assert_ne!(a, key_of_type::<u32>());
    }

    #[test]
    fn named_keys_include_the_name() {
        let a = Key::TypeNamed(TypeId::of::<u32>(), "u32", "primary");
        let b = Key::TypeNamed(TypeId::of::<u32>(), "u32", "replica");
        assert_ne!(a, b);
        assert_eq!(a.service_name(), Some("primary"));
        assert_eq!(key_of_type::<u32>().service_name(), None);
    }
}
