/// Page state definitions for tracking crawl progress
///
/// This module defines all possible states a story id can be in during a crawl.
use crate::WhateleyError;
use std::fmt;

/// Represents the current state of one story id in the crawl pipeline
///
/// ```text
/// Pending -> Fetching -> Resolved -> FilteredIn -> Done
///                    |            \-> FilteredOut
///                    |-> FetchFailed
///                    \-> ParseFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    // ===== Active States =====
    /// Id has been emitted by the producer
    Pending,

    /// Cache check, fetch, and resolve are in progress
    Fetching,

    /// Page was resolved to a canonical identity
    Resolved,

    /// Page passed the category filter and is being processed
    FilteredIn,

    // ===== Terminal States =====
    /// Page could not be retrieved
    FetchFailed,

    /// Page was retrieved but could not be canonically identified
    ParseFailed,

    /// Page resolved but its category is not wanted
    FilteredOut,

    /// Page was processed and its record collected
    Done,
}

impl PageState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed | Self::ParseFailed | Self::FilteredOut | Self::Done
        )
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(self, Self::FetchFailed | Self::ParseFailed)
    }

    /// Returns true if the state machine allows moving to `next`
    pub fn can_transition_to(&self, next: PageState) -> bool {
        use PageState::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, Resolved)
                | (Fetching, FetchFailed)
                | (Fetching, ParseFailed)
                | (Resolved, FilteredIn)
                | (Resolved, FilteredOut)
                | (FilteredIn, Done)
        )
    }

    /// Moves to `next`, rejecting edges the state machine does not have
    pub fn transition(self, next: PageState) -> Result<PageState, WhateleyError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(WhateleyError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Short lowercase name used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Resolved => "resolved",
            Self::FilteredIn => "filtered_in",
            Self::FetchFailed => "fetch_failed",
            Self::ParseFailed => "parse_failed",
            Self::FilteredOut => "filtered_out",
            Self::Done => "done",
        }
    }

    /// Returns all possible page states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Fetching,
            Self::Resolved,
            Self::FilteredIn,
            Self::FetchFailed,
            Self::ParseFailed,
            Self::FilteredOut,
            Self::Done,
        ]
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(!PageState::Pending.is_terminal());
        assert!(!PageState::Fetching.is_terminal());
        assert!(!PageState::Resolved.is_terminal());
        assert!(!PageState::FilteredIn.is_terminal());

        assert!(PageState::FetchFailed.is_terminal());
        assert!(PageState::ParseFailed.is_terminal());
        assert!(PageState::FilteredOut.is_terminal());
        assert!(PageState::Done.is_terminal());
    }

    #[test]
    fn test_is_success_and_error() {
        assert!(PageState::Done.is_success());
        assert!(!PageState::FilteredOut.is_success());

        assert!(PageState::FetchFailed.is_error());
        assert!(PageState::ParseFailed.is_error());
        assert!(!PageState::FilteredOut.is_error());
    }

    #[test]
    fn test_happy_path_transitions() {
        let state = PageState::Pending
            .transition(PageState::Fetching)
            .and_then(|s| s.transition(PageState::Resolved))
            .and_then(|s| s.transition(PageState::FilteredIn))
            .and_then(|s| s.transition(PageState::Done))
            .unwrap();
        assert_eq!(state, PageState::Done);
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(PageState::Pending.transition(PageState::Done).is_err());
        assert!(PageState::FetchFailed
            .transition(PageState::Resolved)
            .is_err());
        assert!(PageState::FilteredOut.transition(PageState::Done).is_err());
        assert!(PageState::Resolved.transition(PageState::Fetching).is_err());

        let err = PageState::Done.transition(PageState::Pending).unwrap_err();
        assert!(matches!(
            err,
            WhateleyError::InvalidTransition {
                from: PageState::Done,
                to: PageState::Pending
            }
        ));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in PageState::all_states().into_iter().filter(|s| s.is_terminal()) {
            for to in PageState::all_states() {
                assert!(!from.can_transition_to(to), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", PageState::Pending), "pending");
        assert_eq!(format!("{}", PageState::FilteredOut), "filtered_out");
    }
}
