//! bnd-csharp — C header → C# interop binding generator.
//!
//! Parses C headers via libclang, mirrors every native declaration as a
//! low-level C# binding, and builds managed wrapper classes whose shape is
//! decided by type-checking the bindings first.
//!
//! # Quick start
//!
//! Generate the output tree from a source checkout (suitable for `build.rs`):
//!
//! ```no_run
//! use std::path::Path;
//!
//! // Reads `<source>/bnd-csharp.toml` if present, parses headers, writes
//! // the tree below `../Generated`.
//! bnd_csharp::run(Path::new("../cef"), Path::new("../Generated"), false, None).unwrap();
//! ```
//!
//! Or render the tree without writing to disk:
//!
//! ```no_run
//! use std::path::Path;
//!
//! let config = bnd_csharp::config::Config::default();
//! let tree = bnd_csharp::generate(Path::new("../cef"), &config, Path::new("../cef"), false).unwrap();
//! println!("{} files", tree.len());
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

pub mod alias;
pub mod classify;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod glue;
pub mod ir;
pub mod marshal;
pub mod model;
pub mod naming;
pub mod native;
pub mod output;
pub mod override_check;
pub mod symbols;
pub mod tables;
pub mod wrapper;

use crate::config::{Config, resolve_path};
use crate::context::PipelineContext;
use crate::glue::GlueSource;
use crate::model::HeaderModel;
use crate::native::NativeSurface;
use crate::output::GeneratedTree;
use crate::symbols::CompileOptions;
use crate::tables::Tables;

/// Name of the configuration file looked up in the source root.
pub const CONFIG_FILE: &str = "bnd-csharp.toml";

/// Run the full pipeline: load config, parse C headers, generate, and
/// replace the contents of `out` with the generated tree.
///
/// `config_path` defaults to `<source>/bnd-csharp.toml` when that file
/// exists, built-in defaults otherwise. Table paths in the config are
/// resolved relative to the config file.
///
/// Returns the number of files written.
pub fn run(source: &Path, out: &Path, stdcall: bool, config_path: Option<&Path>) -> Result<usize> {
    let default_path = source.join(CONFIG_FILE);
    let config_path = config_path.or_else(|| default_path.is_file().then_some(default_path.as_path()));
    let (config, base_dir) = match config_path {
        Some(path) => {
            let config = config::load_config(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            let base_dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
            (config, base_dir)
        }
        None => {
            info!("no configuration file, using defaults");
            (Config::default(), source.to_path_buf())
        }
    };

    let tree = generate(source, &config, &base_dir, stdcall)?;
    tree.write_to(out)?;
    Ok(tree.len())
}

/// Parse the headers of `source` and render the output tree without
/// writing it.
///
/// `base_dir` is the directory relative to which table paths in the config
/// are resolved (typically the parent directory of the TOML file).
pub fn generate(source: &Path, config: &Config, base_dir: &Path, stdcall: bool) -> Result<GeneratedTree> {
    let model = extract::extract(source, &config.input)
        .with_context(|| format!("extracting headers below {}", source.display()))?;

    let table = |p: &Option<PathBuf>| p.as_deref().map(|p| resolve_path(p, base_dir));
    let tables = Tables::load(
        table(&config.tables.name_overrides).as_deref(),
        table(&config.tables.bool_params).as_deref(),
        table(&config.tables.handlers).as_deref(),
    )?;

    let handwritten = match &config.input.handwritten_dir {
        Some(dir) => {
            let dir = resolve_path(dir, source);
            glue::scan(&dir, source, &config.conventions.glue_marker)?
        }
        None => Vec::new(),
    };

    generate_from_model(&model, config, tables, stdcall, &handwritten)
}

/// Run every stage after header extraction.
///
/// This is the entry point for callers that build the [`HeaderModel`]
/// themselves; it touches neither libclang nor the file system.
pub fn generate_from_model(
    model: &HeaderModel,
    config: &Config,
    tables: Tables,
    stdcall: bool,
    handwritten: &[GlueSource],
) -> Result<GeneratedTree> {
    let mut ctx = PipelineContext::new(config, tables, model, stdcall)?;
    let surface = NativeSurface::new(model, &ctx.aliases);

    // Stage 1: low-level bindings and enums, then the first type-check.
    let mut units = native::emit(&surface, &ctx)?;
    let bindings = symbols::compile(
        &units,
        CompileOptions {
            defines: &ctx.output.defines,
            provided: &ctx.runtime.provided_types,
            tool: "binding compilation",
        },
    )?;
    info!(types = bindings.len(), "compiled bindings");

    // Stage 2: classification drives every wrapper decision.
    let classes = classify::classify(&bindings, &surface, &ctx)?;
    ctx.classes = classes;

    // Stage 3: managed wrappers, then the second type-check.
    units.extend(wrapper::build(&bindings, &surface, &ctx)?);
    let wrappers = override_check::recompile(&units, &ctx)?;
    info!(types = wrappers.len(), "compiled wrappers");

    // Stage 4: glue for hand-written hosts and override checks.
    let glue = glue::generate(handwritten, &wrappers, &units, &ctx)?;
    let overrides = override_check::emit(&wrappers, &units, &ctx)?;
    units.extend(glue);
    units.extend(overrides);

    let tree = GeneratedTree::render(&units, &ctx.output.license)?;
    info!(files = tree.len(), "rendered output tree");
    Ok(tree)
}
