//! Compiler configuration.
//!
//! Carries the target identity the emitter stamps on every module and the
//! output selection from the CLI. Loadable from a TOML file so alternate
//! triples or layouts can be supplied without recompiling.

use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Default target: x86-64 SysV. The scalar size/alignment table in
/// `types.rs` assumes this layout (LP64, 8-byte pointers).
pub const DEFAULT_TRIPLE: &str = "x86_64-unknown-linux-gnu";
pub const DEFAULT_DATA_LAYOUT: &str = "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128";

/// What the pipeline should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitKind {
    /// Textual SSA IR (default)
    #[default]
    Ir,
    /// The typed AST rendered back to C-like source
    Ast,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Target triple stamped on the module; `-mtriple` overrides.
    pub triple: String,
    /// Data layout string stamped on the module.
    pub data_layout: String,
    #[serde(skip)]
    pub emit: EmitKind,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            triple: DEFAULT_TRIPLE.to_string(),
            data_layout: DEFAULT_DATA_LAYOUT.to_string(),
            emit: EmitKind::Ir,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {}", e),
            ConfigError::Parse(e) => write!(f, "failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    pub fn with_triple(mut self, triple: &str) -> Self {
        self.triple = triple.to_string();
        self
    }

    pub fn with_emit(mut self, emit: EmitKind) -> Self {
        self.emit = emit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.triple, DEFAULT_TRIPLE);
        assert_eq!(config.emit, EmitKind::Ir);
    }

    #[test]
    fn test_from_toml() {
        let config = CompilerConfig::from_toml(
            r#"
            triple = "aarch64-apple-darwin"
            "#,
        )
        .unwrap();
        assert_eq!(config.triple, "aarch64-apple-darwin");
        // Unspecified fields keep their defaults.
        assert_eq!(config.data_layout, DEFAULT_DATA_LAYOUT);
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        assert!(CompilerConfig::from_toml("tripel = \"typo\"").is_err());
    }

    #[test]
    fn test_builder_overrides() {
        let config = CompilerConfig::new()
            .with_triple("riscv64-unknown-elf")
            .with_emit(EmitKind::Ast);
        assert_eq!(config.triple, "riscv64-unknown-elf");
        assert_eq!(config.emit, EmitKind::Ast);
    }
}
