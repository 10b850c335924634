//! # Kanban Core
//!
//! Local data layer for a kanban board: a store of boards with embedded columns
//! and tasks, live queries that re-run after every write, and the persisted
//! active-board selection.

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod live;
pub mod selection;
pub mod storage;
pub mod workspace;

// Re-export commonly used types
pub use config::{Backend, Config, Mode};
pub use db::{DbOptions, KanbanDb};
pub use domain::{
    board::{Board, BoardId, Column, NewBoard, Task},
    validation::{validate_board_name, BoardNameError},
};
pub use error::{KanbanError, Result};
pub use live::{ChangeNotifier, LiveQuery, QueryState};
pub use selection::ActiveSelection;
pub use storage::Storage;
pub use workspace::Workspace;
