use crate::{ErrorKind, Result};

/// Terminal outcome of a scheduled task.
///
/// Cancellation is its own outcome and never shows up as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The task ran to completion
    Done(T),
    /// The task returned an error
    Failed(ErrorKind),
    /// The task was cancelled before or while running
    Cancelled,
}

impl<T> Outcome<T> {
    /// Returns `true` if the task was cancelled
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns `true` if the task produced a value
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    /// The error the task failed with, if any
    #[must_use]
    pub const fn error(&self) -> Option<&ErrorKind> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Convert into a `Result`, mapping cancellation to `Ok(None)`
    ///
    /// # Errors
    ///
    /// Returns the error the task failed with
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            Self::Done(value) => Ok(Some(value)),
            Self::Failed(e) => Err(e),
            Self::Cancelled => Ok(None),
        }
    }
}

impl<T> From<Outcome<T>> for Result<T> {
    /// Cancellation becomes [`ErrorKind::Cancelled`]
    fn from(outcome: Outcome<T>) -> Self {
        outcome.into_result()?.ok_or(ErrorKind::Cancelled)
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Self::Done(value),
            Err(e) => Self::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_into_result() {
        assert_eq!(Outcome::Done(1).into_result(), Ok(Some(1)));
        assert_eq!(Outcome::<u8>::Cancelled.into_result(), Ok(None));
        assert_eq!(
            Outcome::<u8>::Failed(ErrorKind::InvalidUrlHost).into_result(),
            Err(ErrorKind::InvalidUrlHost)
        );
    }

    #[test]
    fn test_cancelled_outcome_as_error() {
        assert_eq!(Result::from(Outcome::Done(1)), Ok(1));
        assert_eq!(
            Result::<u8>::from(Outcome::Cancelled),
            Err(ErrorKind::Cancelled)
        );
    }

    #[test]
    fn test_outcome_from_result() {
        let outcome: Outcome<u8> = Err(ErrorKind::InvalidUrlHost).into();
        assert_eq!(outcome.error(), Some(&ErrorKind::InvalidUrlHost));
        assert!(!outcome.is_cancelled());
        assert!(Outcome::from(Ok::<_, ErrorKind>(3)).is_done());
    }
}
