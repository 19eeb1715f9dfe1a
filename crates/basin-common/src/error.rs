use thiserror::Error;

/// Top-level error type for the basingraph engine.
/// Each variant corresponds to a failure class; kernels surface these to the
/// controller, which decides whether to skip, retry, or abort the plan.
#[derive(Error, Debug)]
pub enum BasinError {
    /// Input tables violate a structural invariant. Fatal; no partial output.
    #[error("bad snapshot: {0}")]
    BadSnapshot(String),

    /// A point query named a cycle id that does not exist at the given N.
    #[error("cycle {cycle_id} not found at N={n}")]
    CycleNotFound { n: u32, cycle_id: i64 },

    /// A point query named a page that is not in the snapshot.
    #[error("page {0} not found in snapshot")]
    NodeNotFound(i64),

    /// A caller required a complete result but only a truncated one exists.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Cooperative cancellation was requested mid-computation.
    #[error("cancelled")]
    Cancelled,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl BasinError {
    /// Process exit code for batch mode: 2 for input validation failures,
    /// 3 for unrecoverable I/O, 4 for cancellation, 1 for anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BadSnapshot(_) => 2,
            Self::Io { .. } => 3,
            Self::Cancelled => 4,
            _ => 1,
        }
    }

    /// Whether this error aborts the whole plan. Non-fatal failures are
    /// isolated per N or per cycle and only logged.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::BadSnapshot(_) | Self::Io { .. } | Self::Cancelled
        )
    }
}

pub type BasinResult<T> = Result<T, BasinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: BasinError = io_err.into();
        assert!(matches!(err, BasinError::Io { .. }));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn display_formatting() {
        let err = BasinError::BadSnapshot("sequences not sorted".to_string());
        assert_eq!(err.to_string(), "bad snapshot: sequences not sorted");

        let err = BasinError::CycleNotFound { n: 5, cycle_id: 42 };
        assert_eq!(err.to_string(), "cycle 42 not found at N=5");

        let err = BasinError::Cancelled;
        assert_eq!(err.to_string(), "cancelled");
    }

    #[test]
    fn exit_codes() {
        assert_eq!(BasinError::BadSnapshot("x".into()).exit_code(), 2);
        let io: BasinError = std::io::Error::new(std::io::ErrorKind::Other, "w").into();
        assert_eq!(io.exit_code(), 3);
        assert_eq!(BasinError::Cancelled.exit_code(), 4);
        assert_eq!(BasinError::NodeNotFound(1).exit_code(), 1);
    }

    #[test]
    fn result_alias_works() {
        fn returns_ok() -> BasinResult<i32> {
            Ok(7)
        }
        fn returns_err() -> BasinResult<i32> {
            Err(BasinError::Internal("oops".into()))
        }
        assert_eq!(returns_ok().unwrap(), 7);
        assert!(returns_err().is_err());
    }
}
