use crate::{
    domain::{Board, BoardId, NewBoard},
    error::Result,
    storage::{BoardTable, Storage},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};
use tracing::debug;

/// JSON file storage holding the whole board table in one document.
///
/// The table is cached after the first access. Writes go to a temp file that is
/// renamed over the previous one, and the cache only advances once that succeeds.
pub struct FileStorage {
    root_path: PathBuf,
    table: Mutex<Option<BoardTable>>,
}

impl FileStorage {
    const BOARDS_FILE: &'static str = "boards.json";
    const TEMP_SUFFIX: &'static str = "tmp";

    /// Creates a new FileStorage rooted at the given data directory
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root_path: data_dir.as_ref().to_path_buf(),
            table: Mutex::new(None),
        }
    }

    pub fn boards_file(&self) -> PathBuf {
        self.root_path.join(Self::BOARDS_FILE)
    }

    async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).await?;
        }
        Ok(())
    }

    async fn read_table(&self) -> Result<BoardTable> {
        let path = self.boards_file();
        if !path.exists() {
            return Ok(BoardTable::default());
        }

        let contents = fs::read_to_string(&path).await?;
        let table: BoardTable = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), boards = table.boards.len(), "loaded board table");
        Ok(table)
    }

    async fn write_table(&self, table: &BoardTable) -> Result<()> {
        self.ensure_directory_exists(&self.root_path).await?;

        let json = serde_json::to_string_pretty(table)?;
        let path = self.boards_file();
        let temp = path.with_extension(Self::TEMP_SUFFIX);

        fs::write(&temp, json).await?;
        fs::rename(&temp, &path).await?;
        Ok(())
    }

    async fn read<T>(&self, f: impl FnOnce(&BoardTable) -> T + Send) -> Result<T> {
        let mut cache = self.table.lock().await;
        if let Some(table) = cache.as_ref() {
            return Ok(f(table));
        }

        let table = self.read_table().await?;
        let out = f(&table);
        *cache = Some(table);
        Ok(out)
    }

    /// Applies `f` to a working copy of the table. `f` reports whether it changed
    /// anything; only changed tables are flushed.
    async fn mutate<T: Send>(
        &self,
        f: impl FnOnce(&mut BoardTable) -> (T, bool) + Send,
    ) -> Result<T> {
        let mut cache = self.table.lock().await;
        let mut working = match cache.as_ref() {
            Some(table) => table.clone(),
            None => self.read_table().await?,
        };

        let (out, changed) = f(&mut working);
        if changed {
            self.write_table(&working).await?;
        }
        *cache = Some(working);
        Ok(out)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn initialize(&self) -> Result<()> {
        self.ensure_directory_exists(&self.root_path).await?;

        if !self.boards_file().exists() {
            self.write_table(&BoardTable::default()).await?;
        }

        Ok(())
    }

    async fn get(&self, id: BoardId) -> Result<Option<Board>> {
        self.read(|table| table.get(id).cloned()).await
    }

    async fn list(&self) -> Result<Vec<Board>> {
        self.read(|table| table.boards.clone()).await
    }

    async fn first(&self) -> Result<Option<Board>> {
        self.read(|table| table.boards.first().cloned()).await
    }

    async fn insert(&self, board: NewBoard) -> Result<BoardId> {
        self.mutate(|table| (table.insert(board), true)).await
    }

    async fn bulk_insert(&self, boards: Vec<NewBoard>) -> Result<Vec<BoardId>> {
        self.mutate(|table| {
            let ids: Vec<BoardId> = boards.into_iter().map(|b| table.insert(b)).collect();
            let changed = !ids.is_empty();
            (ids, changed)
        })
        .await
    }

    async fn update(&self, board: &Board) -> Result<bool> {
        self.mutate(|table| {
            let found = table.update(board);
            (found, found)
        })
        .await
    }

    async fn delete(&self, id: BoardId) -> Result<bool> {
        self.mutate(|table| {
            let removed = table.delete(id);
            (removed, removed)
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        self.mutate(|table| {
            table.boards.clear();
            ((), true)
        })
        .await
    }
}
