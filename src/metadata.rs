//! Module metadata and instances.
//!
//! A module is described by [`ModuleMetadata`] (obtained from a catalog
//! fetch), turned into an executable [`ModuleInstance`] by a
//! [`ModuleLinker`](crate::loader::ModuleLinker), and tracked by the host as
//! a [`ResolvedModule`] once its libraries are bound and its API is built.

use serde::{Deserialize, Serialize};

use crate::api::ModuleApi;
use crate::loader::dependencies::DependencyMap;

/// Boxed error type used at the module boundary.
///
/// Module authors and provider implementations report failures with whatever
/// error type suits them; the host only ever logs these.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Identity and source reference for a module, as delivered by a catalog.
///
/// Immutable once obtained. `requirements` lists the library names the module
/// expects to be resolved from the shared dependency pool before it can be
/// linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleMetadata {
    pub name: String,

    pub version: String,

    /// URL the module's code is fetched from.
    #[serde(default)]
    pub link: String,

    /// Names of shared libraries this module requires.
    #[serde(default)]
    pub requirements: Vec<String>,

    /// Inline source. When present the code fetch is skipped entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ModuleMetadata {
    /// Create metadata for a module served from `link`.
    pub fn new(name: &str, version: &str, link: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            link: link.to_string(),
            requirements: Vec::new(),
            content: None,
        }
    }

    /// Add a required library name.
    pub fn with_requirement(mut self, name: &str) -> Self {
        self.requirements.push(name.to_string());
        self
    }

    /// Attach inline source, bypassing the code fetch.
    pub fn with_content(mut self, source: &str) -> Self {
        self.content = Some(source.to_string());
        self
    }
}

/// An executable module, produced by linking fetched code.
///
/// `setup` is the module's single entry point. It runs once per resolved
/// module, inside the host's failure boundary: an `Err` (or a panic) marks
/// the module [`ModuleState::Failed`] without affecting siblings.
pub trait ModuleInstance: Send {
    fn setup(&mut self, api: ModuleApi) -> Result<(), BoxError>;
}

/// Lifecycle state of a resolved module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Linked but `setup` has not run yet.
    Loaded,
    /// `setup` completed successfully.
    Active,
    /// `setup` returned an error or panicked; the module is non-functional.
    Failed,
}

/// A module that has been fetched, linked, and given its API object.
///
/// Destroyed only at process teardown; hot-swap creates a new
/// `ResolvedModule` that supersedes the old one for future renders.
pub struct ResolvedModule {
    pub meta: ModuleMetadata,

    /// The per-module API composed from all registered capabilities.
    pub api: ModuleApi,

    /// The module's executable object.
    pub instance: Box<dyn ModuleInstance>,

    /// Library bindings resolved from the shared pool.
    pub libraries: DependencyMap,

    pub state: ModuleState,
}
