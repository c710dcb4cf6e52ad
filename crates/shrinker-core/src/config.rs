use crate::errors::CompilationError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How much work the optimizer pipeline does
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptimizationLevel {
    /// No transformation; the program is only validated and re-emitted
    #[serde(rename = "O0")]
    O0,
    /// Horizontal class merging
    #[serde(rename = "O1")]
    O1,
    /// Merging and enum unboxing
    #[serde(rename = "O2")]
    O2,
    /// Everything, and the lens chain is flattened before the mapping is written
    #[serde(rename = "O3")]
    O3,
    #[serde(rename = "auto")]
    Auto,
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        OptimizationLevel::Auto
    }
}

impl OptimizationLevel {
    /// Resolve `Auto` to a concrete level
    pub fn effective(self) -> OptimizationLevel {
        match self {
            OptimizationLevel::Auto => OptimizationLevel::O2,
            level => level,
        }
    }

    pub fn from_flag(flag: &str) -> Option<OptimizationLevel> {
        match flag {
            "0" | "O0" => Some(OptimizationLevel::O0),
            "1" | "O1" => Some(OptimizationLevel::O1),
            "2" | "O2" => Some(OptimizationLevel::O2),
            "3" | "O3" => Some(OptimizationLevel::O3),
            "auto" => Some(OptimizationLevel::Auto),
            _ => None,
        }
    }
}

/// Horizontal class merging options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalMergingOptions {
    /// Merge sibling classes (default: true)
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Only merge classes without instance fields (default: false)
    #[serde(default)]
    pub restricted: bool,
}

impl Default for HorizontalMergingOptions {
    fn default() -> Self {
        Self {
            enable: true,
            restricted: false,
        }
    }
}

/// Enum unboxing options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumUnboxingOptions {
    /// Replace eligible enums by `int` (default: true)
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Report every enum and why it was or was not unboxed (default: false)
    #[serde(default)]
    pub debug_logs: bool,
}

impl Default for EnumUnboxingOptions {
    fn default() -> Self {
        Self {
            enable: true,
            debug_logs: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingOptions {
    /// Where to write the original -> final mapping
    #[serde(default)]
    pub output: Option<String>,

    /// Also list members whose signature did not change (default: false)
    #[serde(default)]
    pub include_unchanged_members: bool,
}

/// Main shrinker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShrinkerConfig {
    #[serde(default)]
    pub optimization_level: OptimizationLevel,

    #[serde(default)]
    pub horizontal_merging: HorizontalMergingOptions,

    #[serde(default)]
    pub enum_unboxing: EnumUnboxingOptions,

    #[serde(default)]
    pub mapping: MappingOptions,

    /// Pretty-print diagnostics (default: true)
    #[serde(default = "default_true")]
    pub pretty: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ShrinkerConfig {
    fn default() -> Self {
        Self {
            optimization_level: OptimizationLevel::default(),
            horizontal_merging: HorizontalMergingOptions::default(),
            enum_unboxing: EnumUnboxingOptions::default(),
            mapping: MappingOptions::default(),
            pretty: true,
        }
    }
}

/// Overrides given on the command line; `None` keeps the file value
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub optimization_level: Option<OptimizationLevel>,
    pub no_horizontal_merging: bool,
    pub no_enum_unboxing: bool,
    pub enum_unboxing_debug_logs: bool,
    pub mapping_output: Option<String>,
}

impl ShrinkerConfig {
    /// Load configuration from a JSON or YAML file, picked by extension
    pub fn from_file(path: &Path) -> Result<Self, CompilationError> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml")
        );
        let config = if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| CompilationError::ConfigError(e.to_string()))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| CompilationError::ConfigError(e.to_string()))?
        };
        Ok(config)
    }

    /// Create a default configuration and write it to a file
    pub fn init_file(path: &Path) -> Result<(), CompilationError> {
        let config = ShrinkerConfig::default();
        let json = serde_json::to_string_pretty(&config)
            .map_err(|e| CompilationError::ConfigError(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Merge CLI flags into the file configuration
    pub fn merge_with_cli(&mut self, cli: CliOverrides) {
        if let Some(level) = cli.optimization_level {
            self.optimization_level = level;
        }
        if cli.no_horizontal_merging {
            self.horizontal_merging.enable = false;
        }
        if cli.no_enum_unboxing {
            self.enum_unboxing.enable = false;
        }
        if cli.enum_unboxing_debug_logs {
            self.enum_unboxing.debug_logs = true;
        }
        if cli.mapping_output.is_some() {
            self.mapping.output = cli.mapping_output;
        }
    }

    pub fn horizontal_merging_enabled(&self) -> bool {
        self.horizontal_merging.enable
            && self.optimization_level.effective() >= OptimizationLevel::O1
    }

    pub fn enum_unboxing_enabled(&self) -> bool {
        self.enum_unboxing.enable && self.optimization_level.effective() >= OptimizationLevel::O2
    }

    pub fn flatten_lens(&self) -> bool {
        self.optimization_level.effective() >= OptimizationLevel::O3
    }
}
