//! Compression effort levels.

use std::fmt;

/// Compression levels recognised by the match finder.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CompressionLevel {
    /// Greedy matching with short hash chains.
    #[default]
    Default,
    /// Lazy matching with long hash chains.
    High,
}

impl CompressionLevel {
    /// Maps a numeric level onto a [`CompressionLevel`].
    ///
    /// `1` selects [`Default`](Self::Default) and `3` selects
    /// [`High`](Self::High); every other value is rejected.
    pub const fn from_numeric(level: u32) -> Result<Self, CompressionLevelError> {
        match level {
            1 => Ok(Self::Default),
            3 => Ok(Self::High),
            other => Err(CompressionLevelError::new(other)),
        }
    }

    /// Numeric form accepted by [`from_numeric`](Self::from_numeric).
    #[must_use]
    pub const fn as_numeric(self) -> u32 {
        match self {
            Self::Default => 1,
            Self::High => 3,
        }
    }

    /// Maximum number of hash-chain candidates examined per position.
    #[must_use]
    pub(crate) const fn chain_limit(self) -> usize {
        match self {
            Self::Default => 8,
            Self::High => 128,
        }
    }

    /// Match length at which the search stops early.
    #[must_use]
    pub(crate) const fn nice_length(self) -> usize {
        match self {
            Self::Default => 32,
            Self::High => 258,
        }
    }

    /// Whether to defer a match by one byte when the next position matches longer.
    #[must_use]
    pub(crate) const fn lazy(self) -> bool {
        matches!(self, Self::High)
    }
}

/// Error returned when a requested compression level is not supported.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CompressionLevelError {
    level: u32,
}

impl CompressionLevelError {
    const fn new(level: u32) -> Self {
        Self { level }
    }

    /// Returns the rejected level.
    #[must_use]
    pub const fn level(&self) -> u32 {
        self.level
    }
}

impl fmt::Display for CompressionLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "compression level {} is not supported (expected 1 or 3)",
            self.level
        )
    }
}

impl std::error::Error for CompressionLevelError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_levels_map_to_variants() {
        assert_eq!(CompressionLevel::from_numeric(1), Ok(CompressionLevel::Default));
        assert_eq!(CompressionLevel::from_numeric(3), Ok(CompressionLevel::High));
        assert_eq!(CompressionLevel::High.as_numeric(), 3);
    }

    #[test]
    fn unsupported_levels_are_rejected() {
        let err = CompressionLevel::from_numeric(2).unwrap_err();
        assert_eq!(err.level(), 2);
        assert!(err.to_string().contains("not supported"));
    }
}
