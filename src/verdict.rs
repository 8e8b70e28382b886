//! Judge status codes and the priority rule used to fold per-case
//! statuses into a submission verdict.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a submission or a single test case.
///
/// `Pending` and `Running` only appear on the transport layer while a
/// submission is queued or in flight; per-case results always carry one of
/// the terminal statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "AC")]
    Ac,
    #[serde(rename = "WA")]
    Wa,
    #[serde(rename = "TLE")]
    Tle,
    #[serde(rename = "MLE")]
    Mle,
    #[serde(rename = "RE")]
    Re,
    #[serde(rename = "CE")]
    Ce,
    #[serde(rename = "SE")]
    Se,
}

impl Status {
    /// Aggregation priority: SE > CE > RE > TLE > MLE > WA > AC.
    pub fn priority(self) -> u8 {
        match self {
            Status::Se => 7,
            Status::Ce => 6,
            Status::Re => 5,
            Status::Tle => 4,
            Status::Mle => 3,
            Status::Wa => 2,
            Status::Ac => 1,
            Status::Pending | Status::Running => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Running => "RUNNING",
            Status::Ac => "AC",
            Status::Wa => "WA",
            Status::Tle => "TLE",
            Status::Mle => "MLE",
            Status::Re => "RE",
            Status::Ce => "CE",
            Status::Se => "SE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keep whichever of the two statuses ranks higher.
pub fn fold(current: Status, new: Status) -> Status {
    if new.priority() > current.priority() {
        new
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let order = [
            Status::Se,
            Status::Ce,
            Status::Re,
            Status::Tle,
            Status::Mle,
            Status::Wa,
            Status::Ac,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].priority() > pair[1].priority());
        }
    }

    #[test]
    fn test_fold_keeps_higher_priority() {
        assert_eq!(fold(Status::Ac, Status::Wa), Status::Wa);
        assert_eq!(fold(Status::Wa, Status::Ac), Status::Wa);
        assert_eq!(fold(Status::Tle, Status::Se), Status::Se);
        assert_eq!(fold(Status::Se, Status::Tle), Status::Se);
        assert_eq!(fold(Status::Re, Status::Re), Status::Re);
    }

    #[test]
    fn test_fold_is_new_iff_strictly_higher() {
        let all = [
            Status::Ac,
            Status::Wa,
            Status::Mle,
            Status::Tle,
            Status::Re,
            Status::Ce,
            Status::Se,
        ];
        for &current in &all {
            for &new in &all {
                let folded = fold(current, new);
                if new.priority() > current.priority() {
                    assert_eq!(folded, new);
                } else {
                    assert_eq!(folded, current);
                }
            }
        }
    }

    #[test]
    fn test_serde_stable_strings() {
        assert_eq!(serde_json::to_string(&Status::Tle).unwrap(), "\"TLE\"");
        let back: Status = serde_json::from_str("\"SE\"").unwrap();
        assert_eq!(back, Status::Se);
    }
}
