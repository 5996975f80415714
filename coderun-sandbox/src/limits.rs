//! Resource limits configuration for supervised execution

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default wall-clock budget for one stage
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default cap on combined stdout+stderr bytes for one stage
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// How long to wait for a killed child to be reaped
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_millis(500);

/// Resource limits for code execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Wall-clock limit for the run stage
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Wall-clock limit for the compile stage
    #[serde(with = "humantime_serde")]
    pub compile_timeout: Duration,

    /// Combined stdout+stderr bytes before the process is killed
    pub max_output_bytes: usize,

    /// Bound on waiting for a killed process to exit
    #[serde(with = "humantime_serde")]
    pub kill_grace: Duration,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            compile_timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

impl ResourceLimits {
    /// Tight limits for quick checks
    pub fn strict() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            compile_timeout: Duration::from_secs(5),
            max_output_bytes: 64 * 1024,
            kill_grace: Duration::from_millis(200),
        }
    }

    /// Generous limits for long-running programs
    pub fn permissive() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            compile_timeout: Duration::from_secs(60),
            max_output_bytes: 16 * 1024 * 1024,
            kill_grace: Duration::from_secs(2),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_compile_timeout(mut self, timeout: Duration) -> Self {
        self.compile_timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Message emitted when a stage runs past `limit`
    pub fn timeout_message(limit: Duration) -> String {
        format!("\nExecution timed out ({} limit)", format_duration(limit))
    }

    /// Message emitted when a stage exceeds the output cap
    pub fn output_limit_message(max_bytes: usize) -> String {
        format!("\nOutput size limit exceeded ({})", format_bytes(max_bytes))
    }
}

fn format_duration(limit: Duration) -> String {
    let ms = limit.as_millis();
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{}ms", ms)
    }
}

fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    if bytes >= MB && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes >= KB && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        format!("{} bytes", bytes)
    }
}
