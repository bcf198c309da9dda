use std::fmt;

/// Errors reported by the multipliers, the table builder and the device model
///
/// Every failure is fatal for the call that produced it: no partial result is returned and no
/// retry is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum M4rError {
    /// Operand shapes are unequal or not square, or the dimension is not a multiple of the word
    /// width, the subvector width or the block size required by the chosen strategy
    DimensionMismatch {
        /// short description of the violated requirement
        reason: String,
        left: (usize, usize),
        right: (usize, usize),
    },

    /// A configuration parameter is out of range
    InvalidConfig(String),

    /// A host or device allocation could not be satisfied
    ResourceExhaustion {
        /// number of bytes asked for
        requested: usize,
        /// bytes still free in the device budget, `None` for host allocations
        available: Option<usize>,
    },

    /// A kernel launch was rejected or a kernel failed while running
    LaunchFailure(String),
}

impl M4rError {
    pub(crate) fn dimension(
        reason: impl Into<String>,
        left: (usize, usize),
        right: (usize, usize),
    ) -> Self {
        M4rError::DimensionMismatch {
            reason: reason.into(),
            left,
            right,
        }
    }
}

impl fmt::Display for M4rError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            M4rError::DimensionMismatch {
                reason,
                left,
                right,
            } => write!(
                f,
                "dimension mismatch ({}x{} vs {}x{}): {}",
                left.0, left.1, right.0, right.1, reason
            ),
            M4rError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            M4rError::ResourceExhaustion {
                requested,
                available: Some(available),
            } => write!(
                f,
                "device memory exhausted: requested {} bytes, {} available",
                requested, available
            ),
            M4rError::ResourceExhaustion {
                requested,
                available: None,
            } => write!(f, "host allocation of {} bytes failed", requested),
            M4rError::LaunchFailure(msg) => write!(f, "kernel launch failed: {}", msg),
        }
    }
}

impl std::error::Error for M4rError {}
