//! Active board selection, persisted next to the board store.
//!
//! The selection is independent of the store and may point at a board that has
//! since been deleted. Consumers repair it with [`ActiveSelection::resolve_stale`]
//! at startup and [`ActiveSelection::fallback_after_delete`] once per deletion.

use crate::{
    db::KanbanDb,
    domain::{Board, BoardId},
    error::Result,
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs,
    sync::{watch, Mutex},
};
use tracing::{debug, warn};

pub const SELECTION_FILE: &str = "kanban-active-board-id.json";
const SELECTION_VERSION: u32 = 0;
const TEMP_SUFFIX: &str = "tmp";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub active_board_id: Option<BoardId>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSelection {
    state: SelectionState,
    #[serde(default)]
    version: u32,
}

struct SelectionInner {
    path: Option<PathBuf>,
    tx: watch::Sender<Option<BoardId>>,
    save_lock: Mutex<()>,
}

/// Handle to the active board selection. Clones share the same state.
#[derive(Clone)]
pub struct ActiveSelection {
    inner: Arc<SelectionInner>,
}

impl ActiveSelection {
    fn with_state(path: Option<PathBuf>, active: Option<BoardId>) -> Self {
        let (tx, _rx) = watch::channel(active);
        Self {
            inner: Arc::new(SelectionInner {
                path,
                tx,
                save_lock: Mutex::new(()),
            }),
        }
    }

    /// Selection that is never written to disk
    pub fn in_memory() -> Self {
        Self::with_state(None, None)
    }

    /// Rehydrates the selection from `path`. A missing or unreadable file starts
    /// with no selection.
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let active = match Self::read_state(&path).await {
            Ok(state) => state.active_board_id,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable selection file");
                None
            }
        };
        debug!(?active, "selection loaded");
        Self::with_state(Some(path), active)
    }

    async fn read_state(path: &Path) -> Result<SelectionState> {
        if !path.exists() {
            return Ok(SelectionState::default());
        }
        let contents = fs::read_to_string(path).await?;
        let persisted: PersistedSelection = serde_json::from_str(&contents)?;
        Ok(persisted.state)
    }

    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn get(&self) -> Option<BoardId> {
        *self.inner.tx.borrow()
    }

    /// Receiver for selection changes, usable as a live query key
    pub fn watch(&self) -> watch::Receiver<Option<BoardId>> {
        self.inner.tx.subscribe()
    }

    /// Updates the selection and persists it. Setting the current value again
    /// neither notifies watchers nor rewrites the file.
    pub async fn set(&self, id: Option<BoardId>) -> Result<()> {
        let changed = self.inner.tx.send_if_modified(|current| {
            if *current == id {
                false
            } else {
                *current = id;
                true
            }
        });

        if changed {
            debug!(?id, "active board changed");
            self.save().await?;
        }
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        let Some(path) = &self.inner.path else {
            return Ok(());
        };

        let _guard = self.inner.save_lock.lock().await;
        // Written under the lock so the last writer persists the latest value
        let persisted = PersistedSelection {
            state: SelectionState {
                active_board_id: self.get(),
            },
            version: SELECTION_VERSION,
        };

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string(&persisted)?;
        let temp = path.with_extension(TEMP_SUFFIX);
        fs::write(&temp, json).await?;
        fs::rename(&temp, path).await?;
        Ok(())
    }

    /// Selects the first board when nothing is selected yet
    pub async fn select_first_if_unset(&self, boards: &[Board]) -> Result<Option<BoardId>> {
        if self.get().is_none() {
            if let Some(first) = boards.first() {
                self.set(Some(first.id)).await?;
            }
        }
        Ok(self.get())
    }

    /// Replaces a selection that points at a board the store no longer has
    pub async fn resolve_stale(&self, db: &KanbanDb) -> Result<Option<BoardId>> {
        let Some(active) = self.get() else {
            return Ok(None);
        };
        if db.get_board(active).await?.is_some() {
            return Ok(Some(active));
        }

        warn!(%active, "active board no longer exists, falling back");
        self.select_first_board(db).await
    }

    /// Repairs the selection after `deleted` was removed. Call exactly once per
    /// deletion. A selection pointing elsewhere is left alone.
    pub async fn fallback_after_delete(
        &self,
        db: &KanbanDb,
        deleted: BoardId,
    ) -> Result<Option<BoardId>> {
        match self.get() {
            Some(active) if active != deleted => self.resolve_stale(db).await,
            _ => self.select_first_board(db).await,
        }
    }

    async fn select_first_board(&self, db: &KanbanDb) -> Result<Option<BoardId>> {
        let next = db.get_first_board().await?.map(|board| board.id);
        self.set(next).await?;
        Ok(next)
    }
}
