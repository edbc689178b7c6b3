//! crates/logging/src/config.rs
//! Verbosity scale and its mapping onto tracing filter directives.

/// Prefix shared by every tracing target emitted in this workspace.
pub const TARGET_PREFIX: &str = "offload";

/// Coarse verbosity selection for the offload engine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Warnings and fallbacks.
    #[default]
    Normal,
    /// Per-job summaries.
    Verbose,
    /// Submission and verification detail.
    Debug,
    /// Every AECS toggle and Huffman build.
    Trace,
}

impl Verbosity {
    /// Maps a `-v` style repetition count onto the scale.
    #[must_use]
    pub const fn from_verbose_level(level: u8) -> Self {
        match level {
            0 => Self::Normal,
            1 => Self::Verbose,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// Returns the tracing level name used for this verbosity.
    #[must_use]
    pub const fn level_name(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Renders an `EnvFilter` directive restricted to the workspace targets.
    #[must_use]
    pub fn directive(self) -> String {
        format!("{TARGET_PREFIX}={}", self.level_name())
    }
}
