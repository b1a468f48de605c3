use std::fmt;

/// Failure taxonomy shared by every stage of the pipeline.
///
/// Crate-level error enums map onto one of these through [`Classify`] so the
/// caller can decide to retry, skip or escalate without knowing the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SourceUnavailable,
    SourceFormatError,
    SourceRateLimited,
    PersistenceError,
    SinkUnavailable,
    DeliveryError,
}

impl ErrorKind {
    /// Fatal kinds abort the rest of the cycle; nothing downstream can be
    /// trusted without a durable raw record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::SourceUnavailable
                | ErrorKind::SourceFormatError
                | ErrorKind::SourceRateLimited
                | ErrorKind::PersistenceError
        )
    }

    /// Worth trying again on a later cycle without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::SourceUnavailable
                | ErrorKind::SourceRateLimited
                | ErrorKind::SinkUnavailable
                | ErrorKind::DeliveryError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SourceUnavailable => "SourceUnavailable",
            ErrorKind::SourceFormatError => "SourceFormatError",
            ErrorKind::SourceRateLimited => "SourceRateLimited",
            ErrorKind::PersistenceError => "PersistenceError",
            ErrorKind::SinkUnavailable => "SinkUnavailable",
            ErrorKind::DeliveryError => "DeliveryError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_and_persistence_failures_are_fatal() {
        assert!(ErrorKind::SourceUnavailable.is_fatal());
        assert!(ErrorKind::SourceFormatError.is_fatal());
        assert!(ErrorKind::SourceRateLimited.is_fatal());
        assert!(ErrorKind::PersistenceError.is_fatal());
        assert!(!ErrorKind::SinkUnavailable.is_fatal());
        assert!(!ErrorKind::DeliveryError.is_fatal());
    }

    #[test]
    fn format_errors_are_permanent() {
        assert!(!ErrorKind::SourceFormatError.is_transient());
        assert!(!ErrorKind::PersistenceError.is_transient());
        assert!(ErrorKind::SourceRateLimited.is_transient());
    }
}
