//! Configuration types for `bnd-csharp.toml`.
//!
//! Every section is optional; a missing file yields [`Config::default`].

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub input: InputConfig,
    pub tables: TablesConfig,
    pub conventions: Conventions,
    pub runtime: RuntimeNames,
}

/// Generated code settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Namespace of the managed wrappers (e.g. `Cef`).
    pub namespace: String,
    /// Namespace of the low-level bindings (e.g. `Cef.Native`).
    pub native_namespace: String,
    /// Namespace of generated glue classes.
    pub internal_namespace: String,
    /// Library name for `[DllImport]`.
    pub library: String,
    /// Name of the static class holding the `[DllImport]` declarations.
    pub functions_class: String,
    /// License lines written at the top of every generated file.
    pub license: Vec<String>,
    /// Conditional-compilation symbols assumed defined when the generated
    /// code is type-checked.
    pub defines: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            namespace: "Cef".to_string(),
            native_namespace: "Cef.Native".to_string(),
            internal_namespace: "Cef.Internal".to_string(),
            library: "libcef".to_string(),
            functions_class: "CefNativeApi".to_string(),
            license: vec![
                "This file is part of the generated CEF bindings.".to_string(),
                "Licensed under the MIT license.".to_string(),
            ],
            defines: Vec::new(),
        }
    }
}

/// Where the inputs live, relative to the source root.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory scanned recursively for `*.h` files.
    pub header_dir: PathBuf,
    /// Additional `-I` directories for clang.
    pub include_paths: Vec<PathBuf>,
    /// Extra clang arguments (e.g. `-DOS_LINUX`).
    pub clang_args: Vec<String>,
    /// Directory of hand-written partial wrapper sources, if any.
    pub handwritten_dir: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            header_dir: PathBuf::from("include/capi"),
            include_paths: vec![PathBuf::from(".")],
            clang_args: Vec::new(),
            handwritten_dir: None,
        }
    }
}

/// Paths of the delimited text tables, relative to the config file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    pub name_overrides: Option<PathBuf>,
    pub bool_params: Option<PathBuf>,
    pub handlers: Option<PathBuf>,
}

/// The structural conventions of the native library.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Conventions {
    /// Implementation-reserved prefix of struct tags behind public typedefs.
    pub reserved_prefix: String,
    /// Suffix every enum name must carry.
    pub enum_suffix: String,
    /// Suffix stripped from struct names when deriving managed class names.
    pub type_suffix: String,
    /// Typedefs whose spelling differs per platform.
    pub platform_typedefs: Vec<String>,
    /// First-field type marking a reference-counted struct.
    pub ref_counted_base: String,
    /// First-field type marking a single-owner struct.
    pub scoped_base: String,
    /// Borrowed string struct.
    pub string_type: String,
    /// Owned string pointer the caller must free.
    pub userfree_string_type: String,
    /// Text on the line before a declaration that marks it client-implemented.
    pub handler_marker: String,
    /// Text marking a hand-written source as glue input.
    pub glue_marker: String,
    /// Symbol guarding legacy (delegate-based) interop code.
    pub legacy_define: String,
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            reserved_prefix: "_".to_string(),
            enum_suffix: "_t".to_string(),
            type_suffix: "_t".to_string(),
            platform_typedefs: vec![
                "cef_platform_thread_id_t".to_string(),
                "cef_platform_thread_handle_t".to_string(),
            ],
            ref_counted_base: "cef_base_ref_counted_t".to_string(),
            scoped_base: "cef_base_scoped_t".to_string(),
            string_type: "cef_string_t".to_string(),
            userfree_string_type: "cef_string_userfree_t".to_string(),
            handler_marker: "source=client".to_string(),
            glue_marker: "// @glue-host".to_string(),
            legacy_define: "NET_LESS_5_0".to_string(),
        }
    }
}

/// Names the hand-written runtime library provides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeNames {
    /// Generic base of reference-counted wrappers (`Base<T>`).
    pub ref_counted_wrapper: String,
    /// Generic base of single-owner wrappers (`Base<T>`).
    pub scoped_wrapper: String,
    /// Static class with `Allocate(int)` and `Free(void*)`.
    pub allocator: String,
    /// Static method resolving a raw pointer to its managed wrapper.
    pub instance_lookup: String,
    /// Static class with the string conversion helpers.
    pub string_helper: String,
    /// Attribute tagging members with their native name.
    pub native_name_attribute: String,
    /// Attribute describing the native callback an override check guards.
    pub native_callback_attribute: String,
    /// Types defined by the runtime library instead of the generator.
    pub provided_types: Vec<String>,
}

impl Default for RuntimeNames {
    fn default() -> Self {
        Self {
            ref_counted_wrapper: "CefBaseRefCounted".to_string(),
            scoped_wrapper: "CefBaseScoped".to_string(),
            allocator: "CefStructure".to_string(),
            instance_lookup: "CefWrapperRegistry.GetInstance".to_string(),
            string_helper: "CefString".to_string(),
            native_name_attribute: "NativeName".to_string(),
            native_callback_attribute: "NativeCallbackAttribute".to_string(),
            provided_types: vec![
                "CefBaseRefCounted".to_string(),
                "CefBaseScoped".to_string(),
                "CefStructure".to_string(),
                "CefString".to_string(),
                "CefWrapperRegistry".to_string(),
                "NativeNameAttribute".to_string(),
                "NativeCallbackAttribute".to_string(),
            ],
        }
    }
}

/// Load and parse a `bnd-csharp.toml` configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {}", path.display(), e))?;
    Ok(config)
}

/// Resolve a path from the config relative to `base_dir`. Absolute paths
/// are returned as-is.
pub fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
