use crate::error::FeeError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a fee record. Stored as its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeStatus {
    Pending,
    Overdue,
    Paid,
    Cancelled,
}

impl FeeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FeeStatus::Pending => "pending",
            FeeStatus::Overdue => "overdue",
            FeeStatus::Paid => "paid",
            FeeStatus::Cancelled => "cancelled",
        }
    }

    /// Paid and cancelled records are never mutated again.
    pub fn is_terminal(self) -> bool {
        matches!(self, FeeStatus::Paid | FeeStatus::Cancelled)
    }

    pub fn can_transition(self, to: FeeStatus) -> bool {
        use FeeStatus::*;
        matches!(
            (self, to),
            (Pending, Overdue)
                | (Pending, Paid)
                | (Overdue, Paid)
                | (Pending, Cancelled)
                | (Overdue, Cancelled)
        )
    }

    pub fn transition(self, to: FeeStatus) -> Result<FeeStatus, FeeError> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(FeeError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeeStatus {
    type Err = FeeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(FeeStatus::Pending),
            "overdue" => Ok(FeeStatus::Overdue),
            "paid" => Ok(FeeStatus::Paid),
            "cancelled" | "canceled" => Ok(FeeStatus::Cancelled),
            other => Err(FeeError::UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [FeeStatus; 4] = [
        FeeStatus::Pending,
        FeeStatus::Overdue,
        FeeStatus::Paid,
        FeeStatus::Cancelled,
    ];

    #[test]
    fn allowed_transitions_match_table() {
        let allowed: Vec<(FeeStatus, FeeStatus)> = ALL
            .iter()
            .flat_map(|a| ALL.iter().map(move |b| (*a, *b)))
            .filter(|(a, b)| a.can_transition(*b))
            .collect();
        assert_eq!(
            allowed,
            vec![
                (FeeStatus::Pending, FeeStatus::Overdue),
                (FeeStatus::Pending, FeeStatus::Paid),
                (FeeStatus::Pending, FeeStatus::Cancelled),
                (FeeStatus::Overdue, FeeStatus::Paid),
                (FeeStatus::Overdue, FeeStatus::Cancelled),
            ]
        );
    }

    #[test]
    fn overdue_never_returns_to_pending() {
        let e = FeeStatus::Overdue
            .transition(FeeStatus::Pending)
            .expect_err("overdue -> pending must be rejected");
        assert_eq!(e.code(), "invalid_transition");
    }

    #[test]
    fn terminal_states_are_frozen() {
        for to in ALL {
            assert!(!FeeStatus::Paid.can_transition(to));
            assert!(!FeeStatus::Cancelled.can_transition(to));
        }
    }

    #[test]
    fn parse_accepts_stored_names() {
        for s in ALL {
            assert_eq!(s.as_str().parse::<FeeStatus>().expect("parse"), s);
        }
        assert_eq!("Canceled".parse::<FeeStatus>().expect("parse"), FeeStatus::Cancelled);
        assert!("refunded".parse::<FeeStatus>().is_err());
    }
}
