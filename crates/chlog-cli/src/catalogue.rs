use chlog_core::pipeline::Renderer;
use chlog_core::registry::{Capability, PluginRegistry, StaticCatalogue};
use chlog_core::source::ChangelogSource;
use chlog_core::DiscoveryError;
use chlog_git::GitPlugin;
use chlog_github::GithubPlugin;
use chlog_render::RendererLibrary;

/// Base identity every source derives from; listed but never loaded.
const BASE_SOURCE: &str = "ChangelogSourceSpecification";

pub fn source_catalogue() -> StaticCatalogue<dyn ChangelogSource> {
    StaticCatalogue::new("chlog-sources")
        .register_abstract(BASE_SOURCE, Capability::Source)
        .register(GitPlugin::IDENTITY, Capability::Source, GitPlugin::detect)
        .register(GithubPlugin::IDENTITY, Capability::Source, GithubPlugin::factory)
}

pub fn sources(strip_all: bool) -> Result<PluginRegistry<dyn ChangelogSource>, DiscoveryError> {
    PluginRegistry::discover(&source_catalogue(), Capability::Source, strip_all)
}

pub fn renderers(strip_all: bool) -> PluginRegistry<dyn Renderer> {
    PluginRegistry::from_library(&RendererLibrary, Capability::Renderer, strip_all)
}
