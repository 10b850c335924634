use crate::{
    domain::{Board, BoardId, NewBoard},
    error::Result,
    storage::{BoardTable, Storage},
};
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Non-durable storage, useful for tests and throwaway sessions
#[derive(Default)]
pub struct MemoryStorage {
    table: Mutex<BoardTable>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, id: BoardId) -> Result<Option<Board>> {
        Ok(self.table.lock().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Board>> {
        Ok(self.table.lock().await.boards.clone())
    }

    async fn first(&self) -> Result<Option<Board>> {
        Ok(self.table.lock().await.boards.first().cloned())
    }

    async fn insert(&self, board: NewBoard) -> Result<BoardId> {
        Ok(self.table.lock().await.insert(board))
    }

    async fn bulk_insert(&self, boards: Vec<NewBoard>) -> Result<Vec<BoardId>> {
        let mut table = self.table.lock().await;
        Ok(boards.into_iter().map(|b| table.insert(b)).collect())
    }

    async fn update(&self, board: &Board) -> Result<bool> {
        Ok(self.table.lock().await.update(board))
    }

    async fn delete(&self, id: BoardId) -> Result<bool> {
        Ok(self.table.lock().await.delete(id))
    }

    async fn clear(&self) -> Result<()> {
        self.table.lock().await.boards.clear();
        Ok(())
    }
}
