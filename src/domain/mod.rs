pub mod board;
pub mod fixtures;
pub mod validation;

pub use board::{Board, BoardId, Column, NewBoard, Task};
pub use validation::{name_feedback, validate_board_name, BoardNameError, NameFeedback};
