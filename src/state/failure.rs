//! Failure taxonomy and task outcomes
//!
//! Every failure the pipeline can observe maps onto one `FailureKind`. Only
//! `FatalAllTasksFailed` aborts a run; the rest are counted and reported.
use std::fmt;

/// Classes of failure observed during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    // ===== Retried locally =====
    /// Timeouts, connection errors and 5xx responses
    TransientNetwork,

    /// The site refused service (429, block page, persistent 403)
    Blocked,

    // ===== Not retried =====
    /// A challenge was detected and not solved in time
    CaptchaUnsolved,

    /// A client error other than a block (404, 410, ...)
    HttpStatus,

    // ===== Not errors =====
    /// A strategy found nothing, or a page yielded no business name
    ExtractionMiss,

    /// An AI provider returned something that is not parseable JSON
    MalformedAiResponse,

    /// Pagination ran out of results before the target was reached
    TaskExhausted,

    // ===== Fatal =====
    /// Every task failed before any record was produced
    FatalAllTasksFailed,
}

impl FailureKind {
    /// Returns true if the fetcher retries this kind locally
    pub fn is_retried(&self) -> bool {
        matches!(self, Self::TransientNetwork | Self::Blocked)
    }

    /// Returns true if this kind is normal control flow rather than a failure
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::ExtractionMiss | Self::MalformedAiResponse | Self::TaskExhausted
        )
    }

    /// Returns true if this kind aborts the run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalAllTasksFailed)
    }

    /// Stable snake_case label used in logs and the run summary
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::Blocked => "blocked",
            Self::CaptchaUnsolved => "captcha_unsolved",
            Self::HttpStatus => "http_status",
            Self::ExtractionMiss => "extraction_miss",
            Self::MalformedAiResponse => "malformed_ai_response",
            Self::TaskExhausted => "task_exhausted",
            Self::FatalAllTasksFailed => "fatal_all_tasks_failed",
        }
    }

    /// Returns all failure kinds
    pub fn all() -> [Self; 8] {
        [
            Self::TransientNetwork,
            Self::Blocked,
            Self::CaptchaUnsolved,
            Self::HttpStatus,
            Self::ExtractionMiss,
            Self::MalformedAiResponse,
            Self::TaskExhausted,
            Self::FatalAllTasksFailed,
        ]
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a task's pagination ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// A page yielded no new detail links
    Exhausted,

    /// The safety bound on search pages was hit
    MaxPages,

    /// The run-wide target was reached, or the run was stopped
    Stopped,

    /// A search page failed permanently
    Failed(FailureKind),
}

impl TaskOutcome {
    /// Returns true if the task ended in failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "exhausted"),
            Self::MaxPages => write!(f, "max pages reached"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed(kind) => write!(f, "failed ({})", kind),
        }
    }
}
