use crate::{
    domain::{Board, BoardId, NewBoard},
    error::Result,
};
use async_trait::async_trait;

#[cfg(feature = "file-storage")]
pub mod file_storage;
pub mod memory_storage;

#[cfg(feature = "sqlite-storage")]
pub mod sqlite_storage;

#[cfg(feature = "file-storage")]
pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
#[cfg(feature = "sqlite-storage")]
pub use sqlite_storage::SqliteStorage;

/// One table of board documents keyed by an auto-incrementing id.
///
/// Implementations keep records in ascending id order, which is also insertion
/// order because ids are never reused, not even after [`Storage::clear`].
#[async_trait]
pub trait Storage: Send + Sync {
    /// Initializes the storage backend
    async fn initialize(&self) -> Result<()>;

    /// Loads a board by ID, `None` if absent
    async fn get(&self, id: BoardId) -> Result<Option<Board>>;

    /// Lists every board in storage order
    async fn list(&self) -> Result<Vec<Board>>;

    /// Loads only the first board in storage order
    async fn first(&self) -> Result<Option<Board>>;

    /// Stores a new board and returns its assigned ID
    async fn insert(&self, board: NewBoard) -> Result<BoardId>;

    /// Stores several boards, returning their IDs in input order
    async fn bulk_insert(&self, boards: Vec<NewBoard>) -> Result<Vec<BoardId>>;

    /// Replaces an existing board document. Returns false, without writing,
    /// when the ID is absent.
    async fn update(&self, board: &Board) -> Result<bool>;

    /// Deletes a board, reporting whether a record was removed. Deleting an
    /// absent ID is not an error.
    async fn delete(&self, id: BoardId) -> Result<bool>;

    /// Removes all boards, keeping the ID counter
    async fn clear(&self) -> Result<()>;
}

/// In-memory image of the board table shared by the file and memory backends
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub(crate) struct BoardTable {
    pub next_id: u64,
    pub boards: Vec<Board>,
}

impl Default for BoardTable {
    fn default() -> Self {
        Self {
            next_id: 1,
            boards: Vec::new(),
        }
    }
}

impl BoardTable {
    pub fn get(&self, id: BoardId) -> Option<&Board> {
        self.boards.iter().find(|b| b.id == id)
    }

    pub fn insert(&mut self, board: NewBoard) -> BoardId {
        let id = BoardId::new(self.next_id);
        self.next_id += 1;
        self.boards.push(board.with_id(id));
        id
    }

    pub fn update(&mut self, board: &Board) -> bool {
        match self.boards.iter_mut().find(|b| b.id == board.id) {
            Some(slot) => {
                *slot = board.clone();
                true
            }
            None => false,
        }
    }

    /// Returns whether a record was removed
    pub fn delete(&mut self, id: BoardId) -> bool {
        let before = self.boards.len();
        self.boards.retain(|b| b.id != id);
        self.boards.len() != before
    }
}
