#[derive(Debug, thiserror::Error)]
pub enum AggError {
    #[error("[kind: io, info:{0}]")]
    Io(#[from] std::io::Error),
    #[error("[kind: invalid argument, info:{0}]")]
    InvalidArg(String),
    #[error("[kind: out of range, info:{0}]")]
    Range(String),
    #[error("[kind: erasure code, info:{0}]")]
    ErasureCode(String),
    /// The local target is not the leader parity shard for this object; the
    /// object is skipped silently by the caller.
    #[error("[kind: not leader, info:{0}]")]
    NotLeader(String),
    /// Local or remote fetch failure, or a peer RPC failure; the stripe is
    /// abandoned and iteration continues with the next stripe.
    #[error("[kind: transient, info:{0}]")]
    Transient(String),
    /// Allocation or codec initialization failure; the current object is
    /// aborted.
    #[error("[kind: fatal, info:{0}]")]
    Fatal(String),
    /// A parity-flagged extent surfaced where a data extent was expected.
    #[error("[kind: consistency violated, info:{0}]")]
    ConsistencyViolated(String),
    /// `p` outside the range this codec adapter is exercised for (see Open
    /// Question 1: only `p in {1, 2}` is supported for peer-parity fetch).
    #[error("[kind: unsupported, info:{0}]")]
    Unsupported(String),
    #[error("[kind: other, info: {0}]")]
    Other(String),
}

impl AggError {
    #[allow(dead_code)]
    pub(crate) fn invalid_arg(e: impl ToString) -> Self {
        Self::InvalidArg(e.to_string())
    }

    #[allow(dead_code)]
    pub(crate) fn other(e: impl Into<String>) -> Self {
        Self::Other(e.into())
    }

    pub(crate) fn out_of_range(
        (file, line, column): (&str, u32, u32),
        valid_range: Option<std::ops::Range<usize>>,
        illegal_range: std::ops::Range<usize>,
    ) -> Self {
        let source_location = format!("{}:{}:{}", file, line, column);
        if let Some(valid_range) = valid_range {
            Self::Range(format!(
                "error: {{[{}..{}) is out of range [{}..{})}}, at: {{[{}]}}",
                illegal_range.start,
                illegal_range.end,
                valid_range.start,
                valid_range.end,
                source_location
            ))
        } else {
            Self::Range(format!(
                "error: {{[{}..{}) is out of range}}, at: {{[{}]}}",
                illegal_range.start, illegal_range.end, source_location
            ))
        }
    }

    pub(crate) fn range_not_match(
        (file, line, column): (&str, u32, u32),
        valid_range: std::ops::Range<usize>,
        illegal_range: std::ops::Range<usize>,
    ) -> Self {
        let source_location = format!("{}:{}:{}", file, line, column);
        Self::Range(format!(
            "error: {{[{}..{}) does not match range [{}..{})}}, at: {{[{}]}}",
            illegal_range.start,
            illegal_range.end,
            valid_range.start,
            valid_range.end,
            source_location
        ))
    }

    pub(crate) fn erasure_code(
        source_location: (&str, u32, u32),
        errstr: impl Into<String>,
    ) -> Self {
        Self::ErasureCode(format!(
            "error: {{{}}}, at: {{{}:{}:{}}}",
            errstr.into(),
            source_location.0,
            source_location.1,
            source_location.2
        ))
    }

    pub(crate) fn consistency_violated(
        source_location: (&str, u32, u32),
        errstr: impl Into<String>,
    ) -> Self {
        Self::ConsistencyViolated(format!(
            "error: {{{}}}, at: {{{}:{}:{}}}",
            errstr.into(),
            source_location.0,
            source_location.1,
            source_location.2
        ))
    }

    pub(crate) fn not_leader(errstr: impl Into<String>) -> Self {
        Self::NotLeader(errstr.into())
    }

    pub(crate) fn transient(errstr: impl Into<String>) -> Self {
        Self::Transient(errstr.into())
    }

    pub(crate) fn fatal(errstr: impl Into<String>) -> Self {
        Self::Fatal(errstr.into())
    }

    pub(crate) fn unsupported(errstr: impl Into<String>) -> Self {
        Self::Unsupported(errstr.into())
    }

    pub fn into_io_err(self) -> Option<std::io::Error> {
        if let AggError::Io(io_err) = self {
            Some(io_err)
        } else {
            None
        }
    }

    /// Fetch/RPC failures at stripe granularity: log, abandon the stripe,
    /// keep iterating. Everything else aborts the enclosing object.
    pub fn is_stripe_recoverable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Io(_))
    }
}

pub type AggResult<T> = std::result::Result<T, AggError>;
