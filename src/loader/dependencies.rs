//! Shared library pool and dependency resolution.
//!
//! The host exposes a pool of named libraries that modules may declare as
//! requirements. The pool is layered from four sources and built once; after
//! that it is immutable for the lifetime of the process.
//!
//! Precedence per key: override > additional > local > built-in. When an
//! override map is supplied it *replaces* the merged result — only the
//! built-in host libraries survive beneath it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AtriumError, AtriumResult};
use crate::metadata::ModuleMetadata;

/// An opaque handle to a host-provided library.
///
/// The host and its linker agree on the concrete types behind these handles;
/// the loader only moves them around by name.
pub type SharedLibrary = Arc<dyn Any + Send + Sync>;

/// Named pool of shared libraries.
pub type DependencyMap = HashMap<String, SharedLibrary>;

/// Wrap a concrete value as a [`SharedLibrary`].
pub fn shared_library<T: Send + Sync + 'static>(value: T) -> SharedLibrary {
    Arc::new(value)
}

/// Caller-supplied layers merged on top of the host's own.
#[derive(Default)]
pub struct DependencyOptions {
    /// Extra libraries merged over the capability-declared locals.
    pub additional: DependencyMap,

    /// When set, replaces locals and additionals entirely; only built-ins
    /// remain underneath.
    pub overrides: Option<DependencyMap>,
}

/// Compute the effective shared pool from its layers.
pub fn merge_dependencies(
    built_in: &DependencyMap,
    local: &DependencyMap,
    options: &DependencyOptions,
) -> DependencyMap {
    let mut merged = built_in.clone();

    match &options.overrides {
        Some(overrides) => {
            merged.extend(overrides.clone());
        }
        None => {
            merged.extend(local.clone());
            merged.extend(options.additional.clone());
        }
    }

    merged
}

/// Resolve one module's declared requirements against the shared pool.
///
/// An unresolved name fails this module only, never the batch.
pub fn resolve_requirements(
    meta: &ModuleMetadata,
    available: &DependencyMap,
) -> AtriumResult<DependencyMap> {
    let mut libraries = DependencyMap::with_capacity(meta.requirements.len());

    for name in &meta.requirements {
        match available.get(name) {
            Some(library) => {
                libraries.insert(name.clone(), library.clone());
            }
            None => {
                return Err(AtriumError::UnresolvedDependency {
                    module: meta.name.clone(),
                    name: name.clone(),
                });
            }
        }
    }

    Ok(libraries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(entries: &[(&str, i32)]) -> DependencyMap {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), shared_library(*value)))
            .collect()
    }

    fn value_of(map: &DependencyMap, name: &str) -> i32 {
        *map[name].downcast_ref::<i32>().unwrap()
    }

    #[test]
    fn additional_wins_over_local_wins_over_built_in() {
        let built_in = pool(&[("render", 1), ("http", 1)]);
        let local = pool(&[("http", 2), ("icons", 2)]);
        let options = DependencyOptions {
            additional: pool(&[("icons", 3)]),
            overrides: None,
        };

        let merged = merge_dependencies(&built_in, &local, &options);
        assert_eq!(value_of(&merged, "render"), 1);
        assert_eq!(value_of(&merged, "http"), 2);
        assert_eq!(value_of(&merged, "icons"), 3);
    }

    #[test]
    fn overrides_replace_locals_and_additionals() {
        let built_in = pool(&[("render", 1)]);
        let local = pool(&[("icons", 2)]);
        let options = DependencyOptions {
            additional: pool(&[("extra", 3)]),
            overrides: Some(pool(&[("render", 9), ("http", 9)])),
        };

        let merged = merge_dependencies(&built_in, &local, &options);
        assert_eq!(value_of(&merged, "render"), 9);
        assert_eq!(value_of(&merged, "http"), 9);
        assert!(!merged.contains_key("icons"));
        assert!(!merged.contains_key("extra"));
    }

    #[test]
    fn built_ins_survive_underneath_overrides() {
        let built_in = pool(&[("render", 1)]);
        let options = DependencyOptions {
            additional: DependencyMap::new(),
            overrides: Some(pool(&[("http", 9)])),
        };

        let merged = merge_dependencies(&built_in, &DependencyMap::new(), &options);
        assert_eq!(value_of(&merged, "render"), 1);
        assert_eq!(value_of(&merged, "http"), 9);
    }

    #[test]
    fn unresolved_requirement_names_the_module() {
        let meta = ModuleMetadata::new("sample", "1.0.0", "").with_requirement("missing");
        let err = resolve_requirements(&meta, &DependencyMap::new()).unwrap_err();

        match err {
            AtriumError::UnresolvedDependency { module, name } => {
                assert_eq!(module, "sample");
                assert_eq!(name, "missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolution_binds_only_declared_names() {
        let available = pool(&[("http", 1), ("render", 1)]);
        let meta = ModuleMetadata::new("sample", "1.0.0", "").with_requirement("http");

        let bound = resolve_requirements(&meta, &available).unwrap();
        assert_eq!(bound.len(), 1);
        assert!(bound.contains_key("http"));
    }
}
