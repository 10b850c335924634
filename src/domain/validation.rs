//! Board name rules applied before anything reaches storage.
//!
//! Checks run in a fixed order: length, character set, then blankness. A name of
//! three spaces therefore passes the first two checks and fails the last.

use thiserror::Error;

pub const MIN_BOARD_NAME_LEN: usize = 3;
pub const MAX_BOARD_NAME_LEN: usize = 30;
pub const VALID_BOARD_NAME_MESSAGE: &str = "Board name is valid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BoardNameError {
    #[error("Board name must be between 3 and 30 characters")]
    Length,

    #[error("Board name can only contain letters, numbers, and spaces")]
    SpecialCharacters,

    #[error("Board name cannot be empty")]
    Empty,
}

/// Feedback shown while a name is being typed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameFeedback {
    /// Nothing typed yet
    None,
    Valid,
    Invalid(BoardNameError),
}

impl NameFeedback {
    pub fn message(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Valid => Some(VALID_BOARD_NAME_MESSAGE.to_string()),
            Self::Invalid(err) => Some(err.to_string()),
        }
    }

    pub fn allows_submit(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

pub fn validate_board_name(name: &str) -> Result<(), BoardNameError> {
    let len = name.chars().count();
    if !(MIN_BOARD_NAME_LEN..=MAX_BOARD_NAME_LEN).contains(&len) {
        return Err(BoardNameError::Length);
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ') {
        return Err(BoardNameError::SpecialCharacters);
    }

    if name.trim().is_empty() {
        return Err(BoardNameError::Empty);
    }

    Ok(())
}

pub fn name_feedback(input: &str) -> NameFeedback {
    if input.is_empty() {
        return NameFeedback::None;
    }
    match validate_board_name(input) {
        Ok(()) => NameFeedback::Valid,
        Err(err) => NameFeedback::Invalid(err),
    }
}
