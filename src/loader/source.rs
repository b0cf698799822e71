//! External sources the loader draws from.
//!
//! The host supplies three collaborators: a [`CatalogSource`] that lists the
//! available modules, a [`CodeFetcher`] that retrieves a module's code as
//! text, and a [`ModuleLinker`] that turns fetched code plus resolved
//! libraries into an executable [`ModuleInstance`]. HTTP-backed
//! implementations of the first two are provided here; the linker is always
//! host-specific (it knows how the host evaluates module code).

use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;

use crate::error::AtriumResult;
use crate::loader::dependencies::DependencyMap;
use crate::metadata::{ModuleInstance, ModuleMetadata};

/// Cache behavior for a code fetch.
///
/// `Bypass` forces a fresh network read and is used only by the hot-swap
/// channel, where picking up changed source is the whole point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Default,
    Bypass,
}

/// Lists the modules available to this host.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(&self) -> AtriumResult<Vec<ModuleMetadata>>;
}

/// Retrieves module code as text.
#[async_trait]
pub trait CodeFetcher: Send + Sync {
    async fn fetch(&self, url: &str, cache: CachePolicy) -> AtriumResult<String>;
}

/// Links fetched code and resolved libraries into an executable module.
pub trait ModuleLinker: Send + Sync {
    fn link(
        &self,
        meta: &ModuleMetadata,
        source: &str,
        libraries: &DependencyMap,
    ) -> AtriumResult<Box<dyn ModuleInstance>>;
}

/// Catalog served as a JSON array of [`ModuleMetadata`] from one URL.
pub struct HttpCatalogSource {
    client: reqwest::Client,
    url: String,
}

impl HttpCatalogSource {
    pub fn new(url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch_catalog(&self) -> AtriumResult<Vec<ModuleMetadata>> {
        let catalog = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(catalog)
    }
}

/// Plain HTTP GET of module code.
pub struct HttpCodeFetcher {
    client: reqwest::Client,
}

impl HttpCodeFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpCodeFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeFetcher for HttpCodeFetcher {
    async fn fetch(&self, url: &str, cache: CachePolicy) -> AtriumResult<String> {
        let mut request = self.client.get(url);

        if cache == CachePolicy::Bypass {
            request = request.header(CACHE_CONTROL, "no-cache");
        }

        let text = request.send().await?.error_for_status()?.text().await?;
        Ok(text)
    }
}
