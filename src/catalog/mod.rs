//! Style catalog built from a directory of reference images and prompts
//!
//! Layout: `root/<type_name>/<style_name>.<ext>` with an optional sibling
//! `<style_name>.txt` holding the style prompt. Types and styles are indexed
//! in sorted directory-listing order; the catalog never changes after
//! [`StyleCatalog::build`].

pub mod prompts;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Interior or exterior scene type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "int")]
    Interior,
    #[serde(rename = "ext")]
    Exterior,
}

/// One reference style
#[derive(Debug, Clone, PartialEq)]
pub struct StyleEntry {
    pub type_index: usize,
    pub style_index: usize,
    pub type_name: String,
    pub style_name: String,
    pub category: Category,
    pub reference_image_path: PathBuf,
    pub prompt: String,
}

/// One scene type with its styles
#[derive(Debug, Clone, PartialEq)]
pub struct TypeEntry {
    pub index: usize,
    pub name: String,
    pub category: Category,
    pub styles: Vec<StyleEntry>,
}

/// Style as presented to clients
#[derive(Debug, Clone, Serialize)]
pub struct StyleInfo {
    pub name: String,
    pub image_url: String,
    pub prompt: String,
}

/// Type as presented to clients
#[derive(Debug, Clone, Serialize)]
pub struct TypeInfo {
    pub index: usize,
    pub name: String,
    pub category: Category,
    pub styles: Vec<StyleInfo>,
}

#[derive(Debug, Clone)]
pub struct StyleCatalog {
    root: PathBuf,
    image_extension: String,
    types: Vec<TypeEntry>,
}

impl StyleCatalog {
    /// Scan `root` and index every type and style.
    ///
    /// A missing root yields an empty catalog (degraded mode), never an error.
    pub fn build(root: impl AsRef<Path>, image_extension: &str) -> Self {
        let root = root.as_ref().to_path_buf();
        let image_extension = image_extension.trim_start_matches('.').to_string();

        let types = match scan_types(&root, &image_extension) {
            Ok(types) => types,
            Err(e) => {
                warn!(
                    root = %root.display(),
                    error = %e,
                    "Style catalog directory unavailable, serving an empty catalog"
                );
                Vec::new()
            }
        };

        info!(
            root = %root.display(),
            types = types.len(),
            styles = types.iter().map(|t| t.styles.len()).sum::<usize>(),
            "Built style catalog"
        );

        Self {
            root,
            image_extension,
            types,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn types(&self) -> &[TypeEntry] {
        &self.types
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn lookup(&self, type_index: usize, style_index: usize) -> Option<&StyleEntry> {
        self.types.get(type_index)?.styles.get(style_index)
    }

    /// Prompt for a style, or the type-level simplified prompt.
    ///
    /// Out-of-range indices give an empty prompt.
    pub fn resolve_prompt(&self, type_index: usize, style_index: usize, use_simplified: bool) -> String {
        if use_simplified {
            if let Some(prompt) = prompts::simple_prompt(type_index) {
                return prompt.to_string();
            }
        }

        self.lookup(type_index, style_index)
            .map(|entry| entry.prompt.clone())
            .unwrap_or_default()
    }

    /// Client-facing listing; image URLs are rooted at `static_prefix`
    pub fn listing(&self, static_prefix: &str) -> Vec<TypeInfo> {
        let prefix = static_prefix.trim_end_matches('/');

        self.types
            .iter()
            .map(|t| TypeInfo {
                index: t.index,
                name: t.name.clone(),
                category: t.category,
                styles: t
                    .styles
                    .iter()
                    .map(|s| StyleInfo {
                        name: s.style_name.clone(),
                        image_url: format!(
                            "{}/{}/{}.{}",
                            prefix, t.name, s.style_name, self.image_extension
                        ),
                        prompt: s.prompt.clone(),
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Sorted entry names of `dir` matching `keep`
fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> io::Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !keep(&path) {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            entries.push((name.to_string(), path));
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

fn scan_types(root: &Path, image_extension: &str) -> io::Result<Vec<TypeEntry>> {
    let dirs = sorted_entries(root, |p| p.is_dir())?;
    let mut types = Vec::with_capacity(dirs.len());

    for (index, (name, path)) in dirs.into_iter().enumerate() {
        let category = prompts::category_for(index);
        let styles = match scan_styles(&path, index, &name, category, image_extension) {
            Ok(styles) => styles,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read style type directory");
                Vec::new()
            }
        };

        types.push(TypeEntry {
            index,
            name,
            category,
            styles,
        });
    }

    Ok(types)
}

fn scan_styles(
    dir: &Path,
    type_index: usize,
    type_name: &str,
    category: Category,
    image_extension: &str,
) -> io::Result<Vec<StyleEntry>> {
    let images = sorted_entries(dir, |p| {
        p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(image_extension)
    })?;

    let styles = images
        .into_iter()
        .enumerate()
        .map(|(style_index, (_, path))| {
            let style_name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            StyleEntry {
                type_index,
                style_index,
                type_name: type_name.to_string(),
                style_name,
                category,
                prompt: read_sidecar_prompt(&path),
                reference_image_path: path,
            }
        })
        .collect();

    Ok(styles)
}

fn read_sidecar_prompt(image_path: &Path) -> String {
    let sidecar = image_path.with_extension("txt");
    match fs::read_to_string(&sidecar) {
        Ok(text) => text.trim().to_string(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => {
            debug!(path = %sidecar.display(), error = %e, "Unreadable prompt sidecar");
            String::new()
        }
    }
}
