//! Non-error outcomes of a call.

/// How far a call got.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Status {
    /// The chunk was processed completely.
    #[default]
    Ok,
    /// Output space ran out. Call again with more output.
    MoreOutputNeeded,
    /// The stream needs more input before it can finish.
    MoreInputNeeded,
}

impl Status {
    /// Numeric status code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::MoreOutputNeeded => 2,
            Self::MoreInputNeeded => 3,
        }
    }

    /// Whether the call left work for a follow-up call.
    #[must_use]
    pub const fn needs_more(self) -> bool {
        !matches!(self, Self::Ok)
    }
}

/// Result of one [`Engine::execute`](crate::Engine::execute) call.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Progress {
    /// Outcome.
    pub status: Status,
    /// Input bytes consumed from the front of the input slice.
    pub consumed: usize,
    /// Output bytes written to the front of the output slice.
    pub produced: usize,
}

impl Progress {
    pub(crate) const fn new(status: Status, consumed: usize, produced: usize) -> Self {
        Self {
            status,
            consumed,
            produced,
        }
    }

    /// Nothing consumed or produced; the same call can be repeated with a
    /// larger output buffer.
    pub(crate) const fn more_output() -> Self {
        Self::new(Status::MoreOutputNeeded, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_pending_work() {
        assert_eq!(Status::MoreOutputNeeded.code(), 2);
        assert!(!Status::Ok.needs_more());
        assert!(Status::MoreInputNeeded.needs_more());
        assert_eq!(Progress::more_output().produced, 0);
    }
}
