//! The state shared by every pipeline stage of one run.

use anyhow::Result;
use tracing::info;

use crate::alias::AliasResolver;
use crate::classify::Classification;
use crate::config::{Config, Conventions, OutputConfig, RuntimeNames};
use crate::model::HeaderModel;
use crate::naming::NameTranslator;
use crate::tables::Tables;

/// Constructed once per run and passed by reference through every stage.
///
/// The alias tables are fixed at construction; `classes` is filled in by the
/// classifier and only read afterwards.
#[derive(Debug)]
pub struct PipelineContext {
    pub output: OutputConfig,
    pub conventions: Conventions,
    pub runtime: RuntimeNames,
    pub tables: Tables,
    pub names: NameTranslator,
    pub aliases: AliasResolver,
    pub classes: Classification,
    /// Force `stdcall` in the emitted override checks.
    pub stdcall: bool,
}

impl PipelineContext {
    pub fn new(config: &Config, tables: Tables, model: &HeaderModel, stdcall: bool) -> Result<Self> {
        let names = NameTranslator::new(
            tables.name_overrides.clone(),
            config.conventions.type_suffix.clone(),
        );
        let aliases = AliasResolver::build(model, &config.conventions, &names)?;
        info!(
            overrides = tables.name_overrides.len(),
            handlers = tables.handlers.len(),
            stdcall,
            "pipeline context ready"
        );
        Ok(Self {
            output: config.output.clone(),
            conventions: config.conventions.clone(),
            runtime: config.runtime.clone(),
            tables,
            names,
            aliases,
            classes: Classification::default(),
            stdcall,
        })
    }

    /// `using` directives of every managed file.
    pub fn managed_usings(&self) -> Vec<String> {
        vec![
            "System".to_string(),
            "System.Runtime.CompilerServices".to_string(),
            "System.Runtime.InteropServices".to_string(),
            self.output.native_namespace.clone(),
        ]
    }
}
