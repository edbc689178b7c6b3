//! Engine-wide options.

use compress::CompressionLevel;

/// Source size up to which dynamic blocks use one-pass header generation.
pub const DEFAULT_ONE_PASS_THRESHOLD: usize = 4096;

/// Where a stream runs.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ExecutionPath {
    /// Software codec only.
    Software,
    /// Accelerator only; failures are returned.
    Hardware,
    /// Accelerator first, software when the first chunk fails on the device.
    #[default]
    Auto,
}

/// Options shared by every job an [`Engine`](crate::Engine) runs.
///
/// ```
/// use engine::{EngineConfig, ExecutionPath};
///
/// let config = EngineConfig::default()
///     .path(ExecutionPath::Software)
///     .verify(false);
/// assert_eq!(config.default_path(), ExecutionPath::Software);
/// assert_eq!(config.one_pass_limit(), 4096);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    path: ExecutionPath,
    one_pass_threshold: usize,
    verify: bool,
    level: CompressionLevel,
    generation: Option<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: ExecutionPath::Auto,
            one_pass_threshold: DEFAULT_ONE_PASS_THRESHOLD,
            verify: true,
            level: CompressionLevel::Default,
            generation: None,
        }
    }
}

impl EngineConfig {
    /// Sets the path used by jobs that do not choose one.
    #[must_use]
    pub const fn path(mut self, path: ExecutionPath) -> Self {
        self.path = path;
        self
    }

    /// Sets the largest source that may use one-pass header generation.
    #[must_use]
    pub const fn one_pass_threshold(mut self, bytes: usize) -> Self {
        self.one_pass_threshold = bytes;
        self
    }

    /// Enables or disables verification for jobs without `OMIT_VERIFY`.
    #[must_use]
    pub const fn verify(mut self, enabled: bool) -> Self {
        self.verify = enabled;
        self
    }

    /// Sets the software compression level for jobs that do not choose one.
    #[must_use]
    pub const fn level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    /// Overrides the hardware generation reported by the queues.
    #[must_use]
    pub const fn generation(mut self, generation: u8) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Path used by jobs that do not choose one.
    #[must_use]
    pub const fn default_path(&self) -> ExecutionPath {
        self.path
    }

    /// One-pass header generation threshold in bytes.
    #[must_use]
    pub const fn one_pass_limit(&self) -> usize {
        self.one_pass_threshold
    }

    /// Whether verification is on by default.
    #[must_use]
    pub const fn verifies(&self) -> bool {
        self.verify
    }

    /// Default software compression level.
    #[must_use]
    pub const fn default_level(&self) -> CompressionLevel {
        self.level
    }

    /// Hardware generation override.
    #[must_use]
    pub const fn generation_override(&self) -> Option<u8> {
        self.generation
    }
}
