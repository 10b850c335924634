use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Auto-assigned identifier of a board record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(u64);

impl BoardId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl FromStr for BoardId {
    type Err = crate::error::KanbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Storage assigns ids starting at 1
        match s.trim().parse::<u64>() {
            Ok(value) if value > 0 => Ok(Self(value)),
            _ => Err(crate::error::KanbanError::InvalidBoardId(s.to_string())),
        }
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Leaf work item inside a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub description: String,
}

impl Task {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Named lane of a board, addressed by name or by position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }
}

/// A board that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBoard {
    pub title: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl NewBoard {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            columns: Vec::new(),
        }
    }

    /// Attaches the id assigned by storage
    pub fn with_id(self, id: BoardId) -> Board {
        Board {
            id,
            title: self.title,
            columns: self.columns,
        }
    }
}

/// Board document: title plus its embedded columns and tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub title: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Board {
    pub fn rename(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Appends an empty column. Names are not checked for uniqueness here.
    pub fn add_column(&mut self, name: impl Into<String>) {
        self.columns.push(Column::new(name));
    }

    /// Removes the column at `index`, shifting later columns left
    pub fn remove_column(&mut self, index: usize) -> Option<Column> {
        if index < self.columns.len() {
            Some(self.columns.remove(index))
        } else {
            None
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_by_name(name).is_some()
    }

    /// First column with the given name. Duplicate names shadow later columns.
    pub fn column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|col| col.name == name)
    }

    fn column_by_name_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|col| col.name == name)
    }

    /// Appends a task to the first column named `column_name`.
    /// Returns false when no such column exists.
    pub fn add_task(&mut self, column_name: &str, task: Task) -> bool {
        match self.column_by_name_mut(column_name) {
            Some(column) => {
                column.tasks.push(task);
                true
            }
            None => false,
        }
    }

    /// Removes the task at `index` from the first column named `column_name`
    pub fn remove_task(&mut self, column_name: &str, index: usize) -> Option<Task> {
        let column = self.column_by_name_mut(column_name)?;
        if index < column.tasks.len() {
            Some(column.tasks.remove(index))
        } else {
            None
        }
    }
}
