//! Name → instance registries for sources and renderers.
//!
//! Plugins are listed in a compile-time catalogue (or exposed by a library
//! namespace). Discovery keeps the concrete descriptors of one capability,
//! names them from their identity and instantiates them; a plugin that fails
//! to instantiate is reported and left out.

use crate::error::DiscoveryError;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Source,
    Renderer,
}

impl Capability {
    /// Identity suffix stripped when `strip_all` is set.
    pub fn suffix(self) -> &'static str {
        match self {
            Capability::Source => "ChangelogSourceSpecification",
            Capability::Renderer => "RendererSpecification",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Source => "source",
            Capability::Renderer => "renderer",
        }
    }
}

const GENERIC_SUFFIX: &str = "Specification";

/// Registry name for a plugin identity.
///
/// `strip_all` removes the capability suffix (`GitChangelogSourceSpecification`
/// → `Git`); otherwise only `Specification` is removed (`GitChangelogSource`).
pub fn plugin_name(identity: &str, capability: Capability, strip_all: bool) -> String {
    let suffix = if strip_all { capability.suffix() } else { GENERIC_SUFFIX };
    identity.strip_suffix(suffix).unwrap_or(identity).to_string()
}

/// A loaded plugin: a config-free factory for the capability's product.
pub trait Plugin<O: ?Sized> {
    fn description(&self) -> &str;

    /// Build a live instance from plugin configuration.
    fn create(&self, config: &serde_json::Value) -> anyhow::Result<Box<O>>;
}

pub type Factory<O> = Arc<dyn Fn() -> anyhow::Result<Box<dyn Plugin<O>>> + Send + Sync>;

pub struct Descriptor<O: ?Sized> {
    pub identity: &'static str,
    pub capability: Capability,
    /// `None` marks an abstract entry that cannot be instantiated.
    factory: Option<Factory<O>>,
}

impl<O: ?Sized> Clone for Descriptor<O> {
    fn clone(&self) -> Self {
        Self {
            identity: self.identity,
            capability: self.capability,
            factory: self.factory.clone(),
        }
    }
}

impl<O: ?Sized> Descriptor<O> {
    pub fn new<F>(identity: &'static str, capability: Capability, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Plugin<O>>> + Send + Sync + 'static,
    {
        Self {
            identity,
            capability,
            factory: Some(Arc::new(factory)),
        }
    }

    pub fn abstract_entry(identity: &'static str, capability: Capability) -> Self {
        Self {
            identity,
            capability,
            factory: None,
        }
    }

    pub fn is_concrete(&self) -> bool {
        self.factory.is_some()
    }

    fn satisfies(&self, capability: Capability) -> bool {
        self.is_concrete() && self.capability == capability
    }
}

// ── Catalogues ──

/// Host-provided enumeration of candidate plugins.
pub trait Catalogue<O: ?Sized> {
    fn id(&self) -> &str;
    fn enumerate(&self) -> Result<Vec<Descriptor<O>>, DiscoveryError>;
}

/// Catalogue built in code with a builder.
pub struct StaticCatalogue<O: ?Sized> {
    id: String,
    descriptors: Vec<Descriptor<O>>,
}

impl<O: ?Sized> StaticCatalogue<O> {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            descriptors: Vec::new(),
        }
    }

    pub fn register<F>(mut self, identity: &'static str, capability: Capability, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Plugin<O>>> + Send + Sync + 'static,
    {
        self.descriptors.push(Descriptor::new(identity, capability, factory));
        self
    }

    pub fn register_abstract(mut self, identity: &'static str, capability: Capability) -> Self {
        self.descriptors
            .push(Descriptor::abstract_entry(identity, capability));
        self
    }
}

impl<O: ?Sized> Catalogue<O> for StaticCatalogue<O> {
    fn id(&self) -> &str {
        &self.id
    }

    fn enumerate(&self) -> Result<Vec<Descriptor<O>>, DiscoveryError> {
        let mut seen = HashSet::new();
        for d in &self.descriptors {
            if !seen.insert(d.identity) {
                return Err(DiscoveryError::Catalogue {
                    catalogue: self.id.clone(),
                    reason: format!("identity `{}` registered twice", d.identity),
                });
            }
        }
        Ok(self.descriptors.clone())
    }
}

/// An in-process namespace whose members may implement a plugin contract.
pub trait Library<O: ?Sized>: Sync {
    fn namespace(&self) -> &'static str;
    fn members(&self) -> Vec<Descriptor<O>>;
}

type LibraryKey = (&'static str, Capability, TypeId);

fn library_cache() -> &'static Mutex<HashMap<LibraryKey, Box<dyn Any + Send + Sync>>> {
    static CACHE: OnceLock<Mutex<HashMap<LibraryKey, Box<dyn Any + Send + Sync>>>> =
        OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Members of `library` satisfying `capability`. A namespace's member set
/// does not change after load, so the answer is cached for the process.
pub fn discover_from_library<O: ?Sized + 'static>(
    library: &dyn Library<O>,
    capability: Capability,
) -> Arc<Vec<Descriptor<O>>> {
    let key = (library.namespace(), capability, TypeId::of::<O>());
    let mut cache = library_cache().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(hit) = cache
        .get(&key)
        .and_then(|v| v.downcast_ref::<Arc<Vec<Descriptor<O>>>>())
    {
        return Arc::clone(hit);
    }

    let found: Vec<Descriptor<O>> = library
        .members()
        .into_iter()
        .filter(|d| {
            let keep = d.satisfies(capability);
            if keep {
                tracing::debug!(
                    namespace = library.namespace(),
                    identity = d.identity,
                    "library plugin"
                );
            }
            keep
        })
        .collect();
    let found = Arc::new(found);
    cache.insert(key, Box::new(Arc::clone(&found)));
    found
}

// ── Registry ──

pub struct PluginRegistry<O: ?Sized> {
    plugins: Vec<(String, Box<dyn Plugin<O>>)>,
    failures: Vec<(String, String)>,
}

impl<O: ?Sized> PluginRegistry<O> {
    /// Discover and instantiate every concrete `capability` plugin in `catalogue`.
    pub fn discover(
        catalogue: &dyn Catalogue<O>,
        capability: Capability,
        strip_all: bool,
    ) -> Result<Self, DiscoveryError> {
        let descriptors = catalogue.enumerate()?;
        tracing::debug!(
            catalogue = catalogue.id(),
            candidates = descriptors.len(),
            "discovering {} plugins",
            capability.as_str()
        );
        Ok(Self::instantiate(descriptors.iter(), capability, strip_all))
    }

    /// Same as [`discover`](Self::discover) over a library namespace.
    pub fn from_library(library: &dyn Library<O>, capability: Capability, strip_all: bool) -> Self
    where
        O: 'static,
    {
        let descriptors = discover_from_library(library, capability);
        Self::instantiate(descriptors.iter(), capability, strip_all)
    }

    fn instantiate<'a>(
        descriptors: impl Iterator<Item = &'a Descriptor<O>>,
        capability: Capability,
        strip_all: bool,
    ) -> Self
    where
        O: 'a,
    {
        let mut registry = Self {
            plugins: Vec::new(),
            failures: Vec::new(),
        };
        for d in descriptors {
            let Some(factory) = d.factory.as_ref().filter(|_| d.capability == capability) else {
                continue;
            };
            let name = plugin_name(d.identity, capability, strip_all);
            tracing::debug!(identity = d.identity, %name, "loading plugin");
            match factory() {
                Ok(plugin) => registry.plugins.push((name, plugin)),
                Err(e) => {
                    tracing::warn!(%name, error = %e, "problem loading plugin");
                    registry.failures.push((name, format!("{e:#}")));
                }
            }
        }
        registry
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&dyn Plugin<O>> {
        self.plugins
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, p)| p.as_ref())
    }

    pub fn require(&self, name: &str) -> Result<&dyn Plugin<O>, DiscoveryError> {
        self.get(name).ok_or_else(|| DiscoveryError::NotRegistered {
            name: name.to_string(),
            available: self.names().map(str::to_string).collect(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Plugin<O>)> {
        self.plugins.iter().map(|(n, p)| (n.as_str(), p.as_ref()))
    }

    /// Plugins that failed to instantiate, with the reason.
    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }
}
