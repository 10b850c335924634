use crate::{
    config::{Backend, Config},
    db::{DbOptions, KanbanDb},
    domain::{Board, BoardId},
    error::{KanbanError, Result},
    live::LiveQuery,
    selection::ActiveSelection,
    storage::{MemoryStorage, Storage},
};
use std::sync::Arc;
use tracing::info;

/// The board store together with the active selection, as the sidebar and
/// board view use them
#[derive(Clone)]
pub struct Workspace {
    db: KanbanDb,
    selection: ActiveSelection,
}

impl Workspace {
    /// Opens storage, reseeds it in development mode, loads the selection and
    /// repairs it if it points at a missing board
    pub async fn open(config: &Config) -> Result<Self> {
        let storage = open_storage(config).await?;
        storage.initialize().await?;

        let db = KanbanDb::with_options(
            storage,
            DbOptions {
                unique_column_names: config.unique_column_names,
            },
        );
        if config.is_development() {
            db.reset().await?;
        }

        let selection = match config.backend {
            Backend::Memory => ActiveSelection::in_memory(),
            _ => ActiveSelection::load(config.selection_path()).await,
        };

        let workspace = Self::from_parts(db, selection);
        workspace.settle_selection().await?;

        info!(
            mode = %config.mode,
            data_dir = %config.data_dir.display(),
            active = ?workspace.selection.get(),
            "workspace opened"
        );
        Ok(workspace)
    }

    pub fn from_parts(db: KanbanDb, selection: ActiveSelection) -> Self {
        Self { db, selection }
    }

    pub fn db(&self) -> &KanbanDb {
        &self.db
    }

    pub fn selection(&self) -> &ActiveSelection {
        &self.selection
    }

    /// Drops a stale selection and picks the first board when none is selected
    pub async fn settle_selection(&self) -> Result<Option<BoardId>> {
        self.selection.resolve_stale(&self.db).await?;
        let boards = self.db.get_all_boards().await?;
        self.selection.select_first_if_unset(&boards).await
    }

    /// Creates a board and makes it the active one
    pub async fn create_board(&self, title: &str) -> Result<Board> {
        let board = self.db.new_board(title).await?;
        self.selection.set(Some(board.id)).await?;
        Ok(board)
    }

    pub async fn select_board(&self, id: BoardId) -> Result<()> {
        self.selection.set(Some(id)).await
    }

    /// Deletes a board and repairs the selection once. Returns the new active id.
    pub async fn delete_board(&self, id: BoardId) -> Result<Option<BoardId>> {
        self.db.delete_board(id).await?;
        self.selection.fallback_after_delete(&self.db, id).await
    }

    pub async fn active_board(&self) -> Result<Option<Board>> {
        match self.selection.get() {
            Some(id) => self.db.get_board(id).await,
            None => Ok(None),
        }
    }

    /// Live view of the active board, following selection changes and writes
    pub fn watch_active_board(&self) -> LiveQuery<Option<BoardId>, Option<Board>> {
        LiveQuery::follow(self.db.clone(), self.selection.watch(), |db, id| async move {
            match id {
                Some(id) => db.get_board(id).await,
                None => Ok(None),
            }
        })
    }

    /// Live view of every board, for the sidebar
    pub fn watch_boards(&self) -> LiveQuery<(), Vec<Board>> {
        self.db
            .live_query((), |db, ()| async move { db.get_all_boards().await })
    }
}

async fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    match config.backend {
        #[cfg(feature = "file-storage")]
        Backend::File => Ok(Arc::new(crate::storage::FileStorage::new(&config.data_dir))),
        #[cfg(feature = "sqlite-storage")]
        Backend::Sqlite => {
            tokio::fs::create_dir_all(&config.data_dir).await?;
            Ok(Arc::new(crate::storage::SqliteStorage::open(
                config.sqlite_path(),
            )?))
        }
        Backend::Memory => Ok(Arc::new(MemoryStorage::new())),
        #[allow(unreachable_patterns)]
        other => Err(KanbanError::ConfigError(format!(
            "Storage backend {:?} is not enabled in this build",
            other
        ))),
    }
}
