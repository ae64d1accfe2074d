//! Error types shared by all planning stages.
//!
//! Every stage collects its problems instead of failing at the first one,
//! so operators see all issues from a single pass. A stage returns
//! [`PlanningResult`]: `Ok(value)` or `Err(errors)` with every detected
//! issue. The caller inspects the result before invoking the next stage.

use thiserror::Error;

/// Result of a planning stage.
pub type PlanningResult<T> = Result<T, Vec<PlanningError>>;

/// A planning error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanningError {
    /// Malformed, missing or unsupported input data.
    #[error("invalid input: {0}")]
    Input(String),
    /// Input parts that contradict each other (differing layouts,
    /// multiply specified parameters).
    #[error("inconsistent input: {0}")]
    Consistency(String),
    /// A worklist cannot be executed with the current rack volumes.
    #[error("volume check failed: {0}")]
    Volume(String),
    /// Stock racks cannot be assigned.
    #[error("stock rack assignment failed: {0}")]
    Assignment(String),
}

/// Categories of planning errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Input,
    Consistency,
    Volume,
    Assignment,
}

impl PlanningError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency(message.into())
    }

    pub fn volume(message: impl Into<String>) -> Self {
        Self::Volume(message.into())
    }

    pub fn assignment(message: impl Into<String>) -> Self {
        Self::Assignment(message.into())
    }

    /// The error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) => ErrorKind::Input,
            Self::Consistency(_) => ErrorKind::Consistency,
            Self::Volume(_) => ErrorKind::Volume,
            Self::Assignment(_) => ErrorKind::Assignment,
        }
    }

    /// The message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Input(m) | Self::Consistency(m) | Self::Volume(m) | Self::Assignment(m) => m,
        }
    }
}

/// Converts a collected error list into a stage result.
pub(crate) fn finish<T>(value: T, errors: Vec<PlanningError>) -> PlanningResult<T> {
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}

/// Joins sorted items for error messages.
pub(crate) fn joined<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut values: Vec<String> = items.into_iter().map(|s| s.as_ref().to_string()).collect();
    values.sort();
    values.join(", ")
}
