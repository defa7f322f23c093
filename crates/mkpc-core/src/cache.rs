//! Per-relink lookup table from package name to package.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::RelinkError;
use crate::package::Package;
use crate::pkgconf::PackageResolver;

/// Memoizes package resolution for the duration of one relink call.
///
/// Every lookup of a name returns the same `Rc<Package>`, so distribution
/// paths assigned through one handle are visible through all others.
pub struct PackageCache<'r> {
    index: HashMap<String, Rc<Package>>,
    resolver: &'r dyn PackageResolver,
}

impl fmt::Debug for PackageCache<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageCache")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl<'r> PackageCache<'r> {
    /// Empty cache that falls back to `resolver` on a miss.
    pub fn new(resolver: &'r dyn PackageResolver) -> Self {
        Self {
            index: HashMap::new(),
            resolver,
        }
    }

    /// Register a package up front.
    ///
    /// # Errors
    ///
    /// Returns [`RelinkError::DuplicateName`] if the name is already present.
    pub fn add(&mut self, pkg: Package) -> Result<Rc<Package>, RelinkError> {
        if self.contains(&pkg.name) {
            return Err(RelinkError::DuplicateName { name: pkg.name });
        }
        let pkg = Rc::new(pkg);
        self.index.insert(pkg.name.clone(), Rc::clone(&pkg));
        Ok(pkg)
    }

    /// Look up `name`, resolving and memoizing it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RelinkError::UnresolvedPackage`] if the resolver fails.
    pub fn get_or_resolve(&mut self, name: &str) -> Result<Rc<Package>, RelinkError> {
        if let Some(pkg) = self.index.get(name) {
            tracing::debug!("package cache hit: {name}");
            return Ok(Rc::clone(pkg));
        }

        tracing::debug!("package cache miss: {name}");
        let pkg = self
            .resolver
            .resolve(name)
            .map_err(|source| RelinkError::UnresolvedPackage {
                name: name.to_string(),
                source,
            })?;

        let pkg = Rc::new(pkg);
        self.index.insert(name.to_string(), Rc::clone(&pkg));
        Ok(pkg)
    }

    /// True if `name` has been registered or resolved.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of known packages.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if no package is known.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::Library;
    use crate::pkgconf::ResolveError;
    use std::cell::Cell;
    use std::path::{Path, PathBuf};

    struct CountingResolver {
        calls: Cell<usize>,
    }

    impl PackageResolver for CountingResolver {
        fn resolve(&self, name: &str) -> Result<Package, ResolveError> {
            self.calls.set(self.calls.get() + 1);
            if name == "missing" {
                return Err(ResolveError::NotFound {
                    name: name.to_string(),
                    stderr: String::new(),
                });
            }
            Ok(Package::leaf(
                name,
                vec![Library::new(format!("/opt/{name}/lib{name}.dylib"))],
            ))
        }
    }

    fn resolver() -> CountingResolver {
        CountingResolver {
            calls: Cell::new(0),
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let resolver = resolver();
        let mut cache = PackageCache::new(&resolver);
        cache.add(Package::leaf("app", vec![])).unwrap();

        let err = cache.add(Package::leaf("app", vec![])).unwrap_err();
        assert!(matches!(err, RelinkError::DuplicateName { ref name } if name == "app"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_miss_then_hit_returns_same_instance() {
        let resolver = resolver();
        let mut cache = PackageCache::new(&resolver);

        let first = cache.get_or_resolve("foo").unwrap();
        let second = cache.get_or_resolve("foo").unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(resolver.calls.get(), 1);

        first.shared_libs[0]
            .set_dist_path(PathBuf::from("foo/libfoo.dylib"))
            .unwrap();
        assert_eq!(
            second.shared_libs[0].dist_path(),
            Some(Path::new("foo/libfoo.dylib"))
        );
    }

    #[test]
    fn test_registered_package_is_not_resolved() {
        let resolver = resolver();
        let mut cache = PackageCache::new(&resolver);

        let added = cache.add(Package::leaf("app", vec![])).unwrap();
        let a = cache.get_or_resolve("app").unwrap();
        let b = cache.get_or_resolve("app").unwrap();

        assert!(Rc::ptr_eq(&added, &a));
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(resolver.calls.get(), 0);
    }

    #[test]
    fn test_unresolved_package() {
        let resolver = resolver();
        let mut cache = PackageCache::new(&resolver);

        let err = cache.get_or_resolve("missing").unwrap_err();
        assert!(matches!(err, RelinkError::UnresolvedPackage { ref name, .. } if name == "missing"));
        assert!(!cache.contains("missing"));
        assert!(cache.is_empty());
    }
}
