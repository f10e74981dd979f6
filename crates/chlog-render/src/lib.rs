//! Renderer plugins. Each drains the pipeline and writes one document
//! (or one file per release for split Markdown).

mod json;
mod markdown;
mod output;
mod rst;
mod template;
mod view;

pub use json::{JsonOptions, JsonPlugin, JsonRenderer};
pub use markdown::{
    release_file_name, MarkdownOptions, MarkdownPlugin, MarkdownRenderer, INDEX_FILE,
};
pub use output::Output;
pub use rst::{RstOptions, RstPlugin, RstRenderer};
pub use template::{Format, Template};

use chlog_core::pipeline::Renderer;
use chlog_core::registry::{Capability, Descriptor, Library, Plugin};

/// Base identity shared by the templated renderers; never instantiated.
pub const TEMPLATED_RENDERER: &str = "TemplatedRendererSpecification";

/// The built-in renderers as a plugin library.
pub struct RendererLibrary;

fn boxed<P>(plugin: P) -> anyhow::Result<Box<dyn Plugin<dyn Renderer>>>
where
    P: Plugin<dyn Renderer> + 'static,
{
    Ok(Box::new(plugin))
}

impl Library<dyn Renderer> for RendererLibrary {
    fn namespace(&self) -> &'static str {
        "chlog_render"
    }

    fn members(&self) -> Vec<Descriptor<dyn Renderer>> {
        vec![
            Descriptor::abstract_entry(TEMPLATED_RENDERER, Capability::Renderer),
            Descriptor::new(JsonPlugin::IDENTITY, Capability::Renderer, || boxed(JsonPlugin)),
            Descriptor::new(MarkdownPlugin::IDENTITY, Capability::Renderer, || {
                boxed(MarkdownPlugin)
            }),
            Descriptor::new(RstPlugin::IDENTITY, Capability::Renderer, || boxed(RstPlugin)),
        ]
    }
}
