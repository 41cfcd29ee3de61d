use std::path::{Path, PathBuf};

use log::debug;
use mrml::prelude::render::RenderOptions;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to compile template {name}: {reason}")]
    Compile { name: String, reason: String },
}

/// A markup source file. `name` is the file stem and doubles as the subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub name: String,
    pub content: String,
}

pub const TEMPLATE_EXTENSION: &str = "mjml";

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> TemplateError {
    let path = path.to_path_buf();
    move |source| TemplateError::Io { path, source }
}

/// Read every `.mjml` file directly under `dir`, sorted by file name.
pub async fn list_templates(dir: &Path) -> Result<Vec<Template>, TemplateError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err(dir))?;
    let mut paths = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(io_err(dir))? {
        let path = entry.path();
        let is_template = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(TEMPLATE_EXTENSION))
            .unwrap_or(false);
        if is_template && entry.file_type().await.map_err(io_err(&path))?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut templates = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(io_err(&path))?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Loaded template {} ({} bytes)", name, content.len());
        templates.push(Template { name, content });
    }

    Ok(templates)
}

/// Turns template markup into HTML.
pub trait MarkupCompiler: Send + Sync {
    fn compile(&self, template: &Template) -> Result<String, TemplateError>;
}

/// MJML compiler backed by mrml.
#[derive(Debug, Default, Clone, Copy)]
pub struct MjmlCompiler;

impl MarkupCompiler for MjmlCompiler {
    fn compile(&self, template: &Template) -> Result<String, TemplateError> {
        let compile_err = |reason: String| TemplateError::Compile {
            name: template.name.clone(),
            reason,
        };

        let root = mrml::parse(&template.content).map_err(|e| compile_err(e.to_string()))?;

        let options = RenderOptions::default();
        root.render(&options)
            .map_err(|e| compile_err(e.to_string()))
    }
}
