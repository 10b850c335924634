use crate::{
    domain::{Board, BoardId, Column, NewBoard},
    error::{KanbanError, Result},
    storage::Storage,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::{path::Path, sync::Mutex};
use tracing::debug;

/// SQLite-backed storage for board documents.
///
/// Title is kept in its own column; columns and tasks are stored as JSON in
/// `data_json`. `AUTOINCREMENT` keeps ids from being reused after deletes.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) a database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| KanbanError::StorageError("connection lock poisoned".to_string()))?;
        f(&mut conn)
    }

    fn row_to_board(id: i64, title: String, data_json: String) -> Result<Board> {
        let columns: Vec<Column> = serde_json::from_str(&data_json)?;
        Ok(Board {
            id: BoardId::new(id as u64),
            title,
            columns,
        })
    }

    fn insert_one(conn: &Connection, board: &NewBoard) -> Result<BoardId> {
        let data_json = serde_json::to_string(&board.columns)?;
        conn.execute(
            "INSERT INTO boards (title, data_json) VALUES (?1, ?2)",
            params![board.title, data_json],
        )?;
        Ok(BoardId::new(conn.last_insert_rowid() as u64))
    }

    fn query_boards(conn: &Connection, sql: &str) -> Result<Vec<Board>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut boards = Vec::new();
        for row in rows {
            let (id, title, data_json) = row?;
            boards.push(Self::row_to_board(id, title, data_json)?);
        }
        Ok(boards)
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn initialize(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS boards (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    data_json TEXT NOT NULL
                );
                "#,
            )?;
            debug!("sqlite board schema ready");
            Ok(())
        })
    }

    async fn get(&self, id: BoardId) -> Result<Option<Board>> {
        self.with_conn(|conn| {
            let row: Option<(i64, String, String)> = conn
                .query_row(
                    "SELECT id, title, data_json FROM boards WHERE id = ?1",
                    [id.get() as i64],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            match row {
                Some((id, title, data_json)) => Ok(Some(Self::row_to_board(id, title, data_json)?)),
                None => Ok(None),
            }
        })
    }

    async fn list(&self) -> Result<Vec<Board>> {
        self.with_conn(|conn| {
            Self::query_boards(conn, "SELECT id, title, data_json FROM boards ORDER BY id")
        })
    }

    async fn first(&self) -> Result<Option<Board>> {
        self.with_conn(|conn| {
            let mut boards = Self::query_boards(
                conn,
                "SELECT id, title, data_json FROM boards ORDER BY id LIMIT 1",
            )?;
            Ok(boards.pop())
        })
    }

    async fn insert(&self, board: NewBoard) -> Result<BoardId> {
        self.with_conn(|conn| Self::insert_one(conn, &board))
    }

    async fn bulk_insert(&self, boards: Vec<NewBoard>) -> Result<Vec<BoardId>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut ids = Vec::with_capacity(boards.len());
            for board in &boards {
                ids.push(Self::insert_one(&tx, board)?);
            }
            tx.commit()?;
            Ok(ids)
        })
    }

    async fn update(&self, board: &Board) -> Result<bool> {
        self.with_conn(|conn| {
            let data_json = serde_json::to_string(&board.columns)?;
            let changed = conn.execute(
                "UPDATE boards SET title = ?1, data_json = ?2 WHERE id = ?3",
                params![board.title, data_json, board.id.get() as i64],
            )?;
            Ok(changed > 0)
        })
    }

    async fn delete(&self, id: BoardId) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM boards WHERE id = ?1", [id.get() as i64])?;
            Ok(removed > 0)
        })
    }

    async fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM boards", [])?;
            Ok(())
        })
    }
}
