use thiserror::Error;

/// Every way an engine operation can be refused. Operations report these before touching any
/// block, so a returned error always means the disk is exactly as it was before the call.
#[derive(Error, Debug)]
pub enum SimError {
    /// Malformed input: empty or illegal names, zero sizes, inverted or out of range blocks.
    #[error("invalid argument: {0}")]
    Validation(String),
    /// A duplicate name among siblings or an overlapping partition range.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("insufficient space: required {required} blocks, available {available} blocks")]
    InsufficientSpace { required: usize, available: usize },
    /// The partition's directory method does not allow the request at the current path.
    #[error("directory policy violation: {0}")]
    PolicyViolation(String),
    #[error("cannot grow contiguous file \"{name}\": blocks {first}..={last} are not all free")]
    UnsupportedExpansion {
        name: String,
        first: usize,
        last: usize,
    },
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("inconsistent disk state: {0}")]
    Inconsistent(String),
    #[error("snapshot io failed")]
    Io(#[from] std::io::Error),
    #[error("malformed snapshot")]
    Snapshot(#[from] serde_json::Error),
}

impl SimError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        SimError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_space_reports_both_counts() {
        let err = SimError::InsufficientSpace {
            required: 4,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "insufficient space: required 4 blocks, available 3 blocks"
        );
    }

    #[test]
    fn not_found_names_the_record_kind() {
        assert_eq!(SimError::not_found("file", 7).to_string(), "file 7 not found");
    }
}
