//! Configuration for the execution engine

use crate::error::{ExecError, ExecResult};
use crate::limits::ResourceLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the scratch directory created under the system temp dir
pub const DEFAULT_WORKSPACE_DIR: &str = "code-compiler";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Shared root for per-request scratch files
    #[serde(default = "SandboxConfig::default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Time and output limits
    #[serde(default)]
    pub limits: ResourceLimits,

    /// Interpreters and compilers the language profiles invoke
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Upper bound on requests executing at once (None = unbounded)
    #[serde(default)]
    pub max_concurrent_executions: Option<usize>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            workspace_root: Self::default_workspace_root(),
            limits: ResourceLimits::default(),
            toolchain: ToolchainConfig::default(),
            max_concurrent_executions: None,
        }
    }
}

impl SandboxConfig {
    fn default_workspace_root() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_WORKSPACE_DIR)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> ExecResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExecError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> ExecResult<Self> {
        let config: SandboxConfig = toml::from_str(content)
            .map_err(|e| ExecError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ExecResult<()> {
        if self.limits.timeout.is_zero() || self.limits.compile_timeout.is_zero() {
            return Err(ExecError::Config("timeouts must be non-zero".to_string()));
        }
        if self.limits.max_output_bytes == 0 {
            return Err(ExecError::Config(
                "max_output_bytes must be non-zero".to_string(),
            ));
        }
        if self.max_concurrent_executions == Some(0) {
            return Err(ExecError::Config(
                "max_concurrent_executions must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("python", &self.toolchain.python),
            ("node", &self.toolchain.node),
            ("cxx", &self.toolchain.cxx),
        ] {
            if value.trim().is_empty() {
                return Err(ExecError::Config(format!("toolchain.{} is empty", name)));
            }
        }
        Ok(())
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_toolchain(mut self, toolchain: ToolchainConfig) -> Self {
        self.toolchain = toolchain;
        self
    }
}

/// Commands used to run or build each language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    pub python: String,
    pub node: String,
    pub cxx: String,
    /// Language standard flag passed to the C++ compiler
    pub cxx_std: String,
    /// Extra compiler flags appended after the standard flag
    pub cxx_flags: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            node: "node".to_string(),
            cxx: "g++".to_string(),
            cxx_std: "-std=c++17".to_string(),
            cxx_flags: Vec::new(),
        }
    }
}

impl ToolchainConfig {
    pub(crate) fn cxx_flags(&self) -> Vec<String> {
        std::iter::once(self.cxx_std.clone())
            .filter(|flag| !flag.is_empty())
            .chain(self.cxx_flags.iter().cloned())
            .collect()
    }
}
