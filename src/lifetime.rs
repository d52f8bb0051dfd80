//! Service lifetime definitions.

/// Service lifetimes controlling instance caching behavior.
///
/// Defines how service instances are created, cached, and shared within the
/// dependency injection container.
///
/// # Examples
///
/// ```rust
/// use ferrous_web::{ServiceCollection, Resolver};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct Repository { db: Arc<Database> }
///
/// let mut services = ServiceCollection::new();
///
/// // Singleton: one instance for the entire worker process
/// services.add_singleton(Database {
///     url: "postgres://localhost".to_string(),
/// });
///
/// // Scoped: one instance per request scope
/// services.add_scoped_factory::<Repository, _>(|r| Repository {
///     db: r.get_required::<Database>(),
/// });
///
/// let provider = services.build();
/// let scope1 = provider.create_scope();
/// let scope2 = provider.create_scope();
///
/// let repo1a = scope1.get_required::<Repository>();
/// let repo1b = scope1.get_required::<Repository>();
/// assert!(Arc::ptr_eq(&repo1a, &repo1b)); // same within a scope
///
/// let repo2 = scope2.get_required::<Repository>();
/// assert!(!Arc::ptr_eq(&repo1a, &repo2)); // fresh per scope
/// assert!(Arc::ptr_eq(&repo1a.db, &repo2.db)); // singleton shared
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Single instance per root provider, cached for the process lifetime.
    ///
    /// Constructed at most once no matter how many concurrent first
    /// resolutions race; the same instance is shared across all scopes and
    /// tasks. Disposal hooks run at provider shutdown.
    Singleton,
    /// Single instance per scope, cached for the scope lifetime.
    ///
    /// A scope corresponds to one in-flight request; scoped services are
    /// constructed fresh per request and their disposal hooks run when the
    /// request ends.
    Scoped,
    /// New instance per resolution, never cached.
    Transient,
}
