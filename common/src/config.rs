//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Limits on how much work is in flight at once
#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    /// Maximum number of file moves running concurrently across the whole tree
    pub max_concurrent_moves: usize,
    /// Number of directory entries read and dispatched per batch
    pub batch_size: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_concurrent_moves: throttle::DEFAULT_CAPACITY,
            batch_size: crate::mv::DEFAULT_BATCH_SIZE,
        }
    }
}

impl ThrottleConfig {
    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_moves == 0 {
            return Err("max_concurrent_moves must be greater than zero".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

/// Kind of progress display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "PascalCase")]
pub enum ProgressType {
    /// Animated progress bar if stderr is a terminal, text updates otherwise
    #[default]
    #[value(alias = "auto")]
    Auto,
    /// Animated progress bar
    #[value(alias = "progress-bar")]
    ProgressBar,
    /// Periodic text blocks, suitable for logs
    #[value(alias = "text-updates")]
    TextUpdates,
}

/// Progress reporting settings
#[derive(Debug, Clone, Default)]
pub struct ProgressSettings {
    pub progress_type: ProgressType,
    /// Human readable delay between updates, e.g. "200ms" or "10s"
    pub progress_delay: Option<String>,
}

impl ProgressSettings {
    /// Resolves `Auto` against the terminal attached to stderr.
    #[must_use]
    pub fn resolved_type(&self) -> ProgressType {
        match self.progress_type {
            ProgressType::Auto => {
                if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
                    ProgressType::ProgressBar
                } else {
                    ProgressType::TextUpdates
                }
            }
            other => other,
        }
    }

    /// Delay between updates: the configured value, or 200ms for the progress bar and 10s for
    /// text updates.
    pub fn delay(&self) -> anyhow::Result<std::time::Duration> {
        if let Some(delay) = &self.progress_delay {
            return humantime::parse_duration(delay)
                .map_err(|err| anyhow::anyhow!("invalid progress delay {:?}: {}", delay, err));
        }
        Ok(match self.resolved_type() {
            ProgressType::TextUpdates => std::time::Duration::from_secs(10),
            _ => std::time::Duration::from_millis(200),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_throttle_is_valid() {
        assert!(ThrottleConfig::default().validate().is_ok());
        assert_eq!(ThrottleConfig::default().max_concurrent_moves, 10);
        assert_eq!(ThrottleConfig::default().batch_size, 100);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let config = ThrottleConfig {
            max_concurrent_moves: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = ThrottleConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn progress_delay_parsing() {
        let settings = ProgressSettings {
            progress_type: ProgressType::TextUpdates,
            progress_delay: Some("5min".to_string()),
        };
        assert_eq!(settings.delay().unwrap(), std::time::Duration::from_secs(300));
        let settings = ProgressSettings {
            progress_type: ProgressType::TextUpdates,
            progress_delay: None,
        };
        assert_eq!(settings.delay().unwrap(), std::time::Duration::from_secs(10));
        let settings = ProgressSettings {
            progress_type: ProgressType::ProgressBar,
            progress_delay: Some("soon".to_string()),
        };
        assert!(settings.delay().is_err());
    }
}
