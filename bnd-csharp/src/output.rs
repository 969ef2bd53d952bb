//! Generated units, the rendered output tree, and writing it to disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::ir::cil::{self, IlClass};
use crate::ir::{CodeFile, csharp};

pub const NATIVE_TYPES: &str = "Native/Types";
pub const NATIVE_TYPEDEFS: &str = "Native/Typedefs";
pub const MANAGED_TYPES: &str = "Managed/Types";
pub const MANAGED_ENUMS: &str = "Managed/Enums";
pub const MANAGED_INTERNAL: &str = "Managed/Internal";
pub const MANAGED_OVERRIDES: &str = "Managed/Overrides";

#[derive(Debug, Clone)]
pub enum UnitContent {
    Source(CodeFile),
    Instructions(IlClass),
}

/// One output file before rendering.
#[derive(Debug, Clone)]
pub struct GeneratedUnit {
    /// Path relative to the output root.
    pub path: PathBuf,
    /// Headers the content was generated from, relative to the source root.
    pub sources: BTreeSet<PathBuf>,
    pub content: UnitContent,
}

impl GeneratedUnit {
    pub fn source(dir: &str, name: &str, sources: BTreeSet<PathBuf>, file: CodeFile) -> Self {
        Self {
            path: Path::new(dir).join(format!("{name}.cs")),
            sources,
            content: UnitContent::Source(file),
        }
    }

    pub fn code(&self) -> Option<&CodeFile> {
        match &self.content {
            UnitContent::Source(file) => Some(file),
            UnitContent::Instructions(_) => None,
        }
    }
}

/// Headers behind the unit at `path`, if there is one.
pub fn sources_of(units: &[GeneratedUnit], path: &Path) -> BTreeSet<PathBuf> {
    units
        .iter()
        .find(|u| u.path == path)
        .map(|u| u.sources.clone())
        .unwrap_or_default()
}

/// License lines, then the provenance comment.
fn header_lines(license: &[String], sources: &BTreeSet<PathBuf>) -> Vec<String> {
    const RULE: &str =
        "--------------------------------------------------------------------------------------------";
    let mut lines = vec![RULE.to_string()];
    lines.extend(license.iter().cloned());
    lines.push(RULE.to_string());
    lines.push("Generated by bnd-csharp. Do not edit; changes are lost on regeneration.".to_string());
    if !sources.is_empty() {
        lines.push("Source:".to_string());
        for source in sources {
            lines.push(format!("  {}", source.to_string_lossy().replace('\\', "/")));
        }
    }
    lines.push(RULE.to_string());
    lines
}

/// The complete rendered output, keyed by relative path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GeneratedTree {
    files: BTreeMap<PathBuf, String>,
}

impl GeneratedTree {
    pub fn render(units: &[GeneratedUnit], license: &[String]) -> Result<Self> {
        let mut files = BTreeMap::new();
        for unit in units {
            let header = header_lines(license, &unit.sources);
            let text = match &unit.content {
                UnitContent::Source(file) => {
                    let mut file = file.clone();
                    file.header = header;
                    csharp::render(&file)
                }
                UnitContent::Instructions(class) => {
                    let mut class = class.clone();
                    class.header = header;
                    cil::render(&class)
                }
            };
            if files.insert(unit.path.clone(), text).is_some() {
                anyhow::bail!("two generated units share the path {}", unit.path.display());
            }
        }
        Ok(Self { files })
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&str> {
        self.files.get(path.as_ref()).map(String::as_str)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Clear `out_dir`, then write every file below it.
    pub fn write_to(&self, out_dir: &Path) -> Result<()> {
        if out_dir.exists() {
            std::fs::remove_dir_all(out_dir)
                .with_context(|| format!("clearing output directory {}", out_dir.display()))?;
        }
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("creating output directory {}", out_dir.display()))?;
        for (rel, text) in &self.files {
            let path = out_dir.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
            debug!(path = %rel.display(), bytes = text.len(), "wrote file");
        }
        info!(files = self.files.len(), out = %out_dir.display(), "wrote output tree");
        Ok(())
    }
}
