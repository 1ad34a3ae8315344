//! Readiness status and the aggregation rule across endpoints.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of probing one endpoint, or the aggregate over many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The endpoint answered with HTTP 200.
    Ready,
    /// The endpoint answered, but not with HTTP 200.
    NotReady,
    /// No definitive answer yet: network error, cancellation, or in flight.
    #[default]
    Unknown,
}

impl Status {
    /// Whether this status is a definitive answer from the endpoint.
    pub fn is_known(self) -> bool {
        self != Status::Unknown
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ready => "ready",
            Status::NotReady => "not_ready",
            Status::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Combine per-endpoint statuses into a single session status.
///
/// `Ready` iff there is at least one endpoint and all are `Ready`.
/// `NotReady` iff at least one is `NotReady` and none is `Unknown`.
/// Everything else, including the empty set, is `Unknown`.
pub fn aggregate<I>(statuses: I) -> Status
where
    I: IntoIterator<Item = Status>,
{
    let mut seen = false;
    let mut not_ready = false;
    for status in statuses {
        seen = true;
        match status {
            Status::Unknown => return Status::Unknown,
            Status::NotReady => not_ready = true,
            Status::Ready => {}
        }
    }

    match (seen, not_ready) {
        (false, _) => Status::Unknown,
        (true, true) => Status::NotReady,
        (true, false) => Status::Ready,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_is_unknown() {
        assert_eq!(aggregate([]), Status::Unknown);
    }

    #[test]
    fn all_ready_is_ready() {
        assert_eq!(aggregate([Status::Ready]), Status::Ready);
        assert_eq!(aggregate([Status::Ready, Status::Ready, Status::Ready]), Status::Ready);
    }

    #[test]
    fn any_unknown_wins() {
        assert_eq!(aggregate([Status::Ready, Status::Unknown]), Status::Unknown);
        assert_eq!(aggregate([Status::NotReady, Status::Unknown]), Status::Unknown);
        assert_eq!(aggregate([Status::Unknown, Status::NotReady]), Status::Unknown);
    }

    #[test]
    fn not_ready_without_unknown() {
        assert_eq!(aggregate([Status::NotReady]), Status::NotReady);
        assert_eq!(aggregate([Status::Ready, Status::NotReady]), Status::NotReady);
    }

    #[test]
    fn default_is_unknown() {
        assert_eq!(Status::default(), Status::Unknown);
        assert!(!Status::Unknown.is_known());
        assert!(Status::NotReady.is_known());
    }

    #[test]
    fn display_is_snake_case() {
        assert_eq!(Status::NotReady.to_string(), "not_ready");
        assert_eq!(Status::Ready.to_string(), "ready");
    }
}
