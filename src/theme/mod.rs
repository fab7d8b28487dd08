//! Theme engine
//!
//! This module provides template rendering using Tera.
//! Features:
//! - One theme directory per template prefix, all loaded into one Tera instance
//! - Per-marketplace template lookup with fallback to the default prefix
//! - Standard template variables
//!
//! Templates are registered as `{prefix}/{relative path}`, so a marketplace
//! theme can extend or include templates of another theme by full name,
//! e.g. `{% extends "default/base.html" %}`.

use anyhow::{Context, Result};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context as TeraContext, Tera};

use crate::config::ThemeConfig;
use crate::models::{Flash, Marketplace, User};

mod error;

pub use error::ThemeError;

/// File extensions picked up as templates
const TEMPLATE_EXTENSIONS: &[&str] = &["html", "xml", "txt"];

/// Theme engine for rendering templates
pub struct ThemeEngine {
    /// Tera template engine instance
    tera: Tera,
    /// Path to themes directory
    themes_path: PathBuf,
    /// Prefix used when a marketplace theme lacks a template
    default_prefix: String,
}

impl ThemeEngine {
    /// Create a theme engine from every theme directory under `themes_path`
    pub fn new(themes_path: &Path, default_prefix: &str) -> Result<Self> {
        let themes_path = themes_path.to_path_buf();

        let default_theme_path = themes_path.join(default_prefix);
        if !default_theme_path.exists() {
            fs::create_dir_all(&default_theme_path).with_context(|| {
                format!("Failed to create default theme directory: {:?}", default_theme_path)
            })?;
        }

        let mut engine = Self {
            tera: Tera::default(),
            themes_path,
            default_prefix: default_prefix.to_string(),
        };
        engine.load_templates()?;

        tracing::info!(
            "Theme engine loaded {} templates from {:?}",
            engine.tera.get_template_names().count(),
            engine.themes_path
        );
        Ok(engine)
    }

    pub fn from_config(config: &ThemeConfig) -> Result<Self> {
        Self::new(&config.path, &config.default_prefix)
    }

    /// Load the templates of every prefix directory
    fn load_templates(&mut self) -> Result<()> {
        let mut templates: Vec<(String, String)> = Vec::new();
        for entry in fs::read_dir(&self.themes_path)? {
            let path = entry?.path();
            if path.is_dir() {
                collect_templates_from_dir(&self.themes_path, &path, &mut templates)?;
            }
        }

        // One batch, so parents need not be added before their children
        templates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut tera = Tera::default();
        tera.autoescape_on(vec![".html"]);
        tera.add_raw_templates(templates)
            .map_err(|e| ThemeError::TemplateError(format!("Failed to add templates: {}", e)))?;

        self.tera = tera;
        Ok(())
    }

    /// Re-read every theme from disk
    pub fn reload_templates(&mut self) -> Result<()> {
        self.load_templates()
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|t| t == name)
    }

    pub fn default_prefix(&self) -> &str {
        &self.default_prefix
    }

    /// Full template name to render `name` for a marketplace
    pub fn resolve(&self, marketplace: &Marketplace, name: &str) -> Result<String, ThemeError> {
        let own = marketplace.template(name);
        if self.has_template(&own) {
            return Ok(own);
        }

        let fallback = format!("{}/{}", self.default_prefix, name);
        if self.has_template(&fallback) {
            tracing::debug!("Template {} missing, using {}", own, fallback);
            return Ok(fallback);
        }

        Err(ThemeError::NotFound(own))
    }

    /// Render a template with context
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            let mut error_msg = format!("Failed to render '{}': {}", template, e);
            let mut source = e.source();
            while let Some(s) = source {
                error_msg.push_str(&format!("\n  Caused by: {}", s));
                source = s.source();
            }
            ThemeError::TemplateError(error_msg).into()
        })
    }

    /// Render `name` from the marketplace's theme with standard variables
    /// added to the context
    pub fn render_page(
        &self,
        marketplace: &Marketplace,
        name: &str,
        context: &TeraContext,
        standard_vars: &StandardTemplateVars,
    ) -> Result<String> {
        let template = self.resolve(marketplace, name)?;

        let mut full_context = context.clone();
        full_context.insert("marketplace", marketplace);
        full_context.insert("request_path", &standard_vars.request_path);
        full_context.insert("year", &standard_vars.year);
        if let Some(ref user) = standard_vars.current_user {
            full_context.insert("current_user", user);
        }
        if let Some(ref flash) = standard_vars.flash {
            full_context.insert("flash", flash);
        }

        self.render(&template, &full_context)
    }
}

/// Collect templates below `current_path`, named relative to `base_path`
fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<()> {
    for entry in fs::read_dir(current_path)? {
        let path = entry?.path();

        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| TEMPLATE_EXTENSIONS.contains(&ext))
        {
            let relative_path = path
                .strip_prefix(base_path)
                .map_err(|_| ThemeError::TemplateError("Failed to get relative path".to_string()))?;

            let template_name = relative_path.to_string_lossy().replace('\\', "/");

            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {:?}", path))?;

            templates.push((template_name, content));
        }
    }

    Ok(())
}

/// Variables every page receives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardTemplateVars {
    /// Signed-in visitor, if any
    pub current_user: Option<User>,
    /// Pending one-shot message, consumed by this render
    pub flash: Option<Flash>,
    /// Current request path
    pub request_path: String,
    /// Current year (for copyright)
    pub year: i32,
}

impl StandardTemplateVars {
    pub fn new(request_path: impl Into<String>) -> Self {
        Self {
            current_user: None,
            flash: None,
            request_path: request_path.into(),
            year: chrono::Utc::now().year(),
        }
    }

    pub fn with_user(mut self, user: Option<User>) -> Self {
        self.current_user = user;
        self
    }

    pub fn with_flash(mut self, flash: Option<Flash>) -> Self {
        self.flash = flash;
        self
    }
}
