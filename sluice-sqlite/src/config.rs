//! SQLite configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sluice_core::{SluiceError, SluiceResult};

/// SQLite database configuration.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database path (or in-memory).
    pub path: DatabasePath,
    /// Enable foreign keys.
    pub foreign_keys: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u32>,
    /// Cache size (in pages, negative for KB).
    pub cache_size: Option<i32>,
    /// Synchronous mode.
    pub synchronous: SynchronousMode,
    /// Journal mode.
    pub journal_mode: JournalMode,
}

/// Where the database lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabasePath {
    /// In-memory database. Every connection gets its own, empty database.
    #[default]
    Memory,
    /// File-based database.
    File(PathBuf),
}

impl DatabasePath {
    /// Get the path string for SQLite.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Memory => ":memory:",
            Self::File(path) => path.to_str().unwrap_or(":memory:"),
        }
    }

    /// Check if this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

/// SQLite synchronous mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SynchronousMode {
    /// Synchronous OFF.
    Off,
    /// Synchronous NORMAL.
    #[default]
    Normal,
    /// Synchronous FULL.
    Full,
    /// Synchronous EXTRA.
    Extra,
}

impl SynchronousMode {
    /// Get the SQLite pragma value.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
            Self::Extra => "EXTRA",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "off" => Some(Self::Off),
            "normal" => Some(Self::Normal),
            "full" => Some(Self::Full),
            "extra" => Some(Self::Extra),
            _ => None,
        }
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JournalMode {
    /// DELETE - delete the journal after each transaction.
    Delete,
    /// TRUNCATE - truncate the journal instead of deleting it.
    Truncate,
    /// PERSIST - keep the journal file, zero its header on commit.
    Persist,
    /// MEMORY - keep the journal in memory.
    Memory,
    /// WAL - write-ahead logging.
    #[default]
    Wal,
    /// OFF - no journal.
    Off,
}

impl JournalMode {
    /// Get the SQLite pragma value.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
            Self::Off => "OFF",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "delete" => Some(Self::Delete),
            "truncate" => Some(Self::Truncate),
            "persist" => Some(Self::Persist),
            "memory" => Some(Self::Memory),
            "wal" => Some(Self::Wal),
            "off" => Some(Self::Off),
            _ => None,
        }
    }
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: DatabasePath::Memory,
            foreign_keys: true,
            busy_timeout_ms: Some(5000),
            cache_size: None,
            synchronous: SynchronousMode::Normal,
            journal_mode: JournalMode::Wal,
        }
    }
}

impl SqliteConfig {
    /// Configuration for an in-memory database.
    pub fn memory() -> Self {
        Self {
            path: DatabasePath::Memory,
            ..Default::default()
        }
    }

    /// Configuration for a file-based database.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: DatabasePath::File(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Parse a SQLite URL into configuration.
    ///
    /// Supported formats:
    /// - `sqlite::memory:` or `:memory:` - in-memory database
    /// - `sqlite://path/to/db.sqlite` - relative path
    /// - `sqlite:///absolute/path/db.sqlite` - absolute path
    /// - `file:path/to/db.sqlite`
    /// - `path/to/db.sqlite` - plain path
    ///
    /// Query parameters: `foreign_keys`, `busy_timeout`, `cache_size`,
    /// `synchronous`, `journal_mode`, `mode=memory`.
    pub fn from_url(url: impl AsRef<str>) -> SluiceResult<Self> {
        let url_str = url.as_ref().trim();

        if url_str.is_empty() {
            return Err(SluiceError::invalid_url(url_str, "database path is required"));
        }
        if url_str == "sqlite::memory:" || url_str == ":memory:" {
            return Ok(Self::memory());
        }

        let (location, query) = match url_str.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (url_str, None),
        };

        let path = if let Some(rest) = location.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = location.strip_prefix("sqlite:") {
            rest
        } else if let Some(rest) = location.strip_prefix("file:") {
            rest
        } else if location.contains("://") {
            return Err(SluiceError::invalid_url(url_str, "unsupported scheme"));
        } else {
            location
        };

        let mut config = match path {
            ":memory:" => Self::memory(),
            "" => return Err(SluiceError::invalid_url(url_str, "database path is required")),
            path => Self::file(path),
        };

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "mode" if value == "memory" => config.path = DatabasePath::Memory,
                "foreign_keys" => config.foreign_keys = matches!(value, "true" | "1" | "on"),
                "busy_timeout" => {
                    config.busy_timeout_ms = Some(value.parse().map_err(|_| {
                        SluiceError::invalid_url(url_str, format!("bad busy_timeout '{value}'"))
                    })?);
                }
                "cache_size" => {
                    config.cache_size = Some(value.parse().map_err(|_| {
                        SluiceError::invalid_url(url_str, format!("bad cache_size '{value}'"))
                    })?);
                }
                "synchronous" => {
                    config.synchronous = SynchronousMode::parse(value).ok_or_else(|| {
                        SluiceError::invalid_url(url_str, format!("bad synchronous '{value}'"))
                    })?;
                }
                "journal_mode" => {
                    config.journal_mode = JournalMode::parse(value).ok_or_else(|| {
                        SluiceError::invalid_url(url_str, format!("bad journal_mode '{value}'"))
                    })?;
                }
                _ => {}
            }
        }

        Ok(config)
    }

    /// Get the path string for SQLite.
    pub fn path_str(&self) -> &str {
        self.path.as_str()
    }

    /// Apply the connection pragmas.
    pub(crate) fn apply(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
        conn.pragma_update(None, "foreign_keys", self.foreign_keys)?;
        if let Some(timeout) = self.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(u64::from(timeout)))?;
        }
        if let Some(cache) = self.cache_size {
            conn.pragma_update(None, "cache_size", cache)?;
        }
        conn.pragma_update(None, "synchronous", self.synchronous.as_pragma())?;
        // journal_mode answers with the mode actually in effect
        conn.pragma_update_and_check(None, "journal_mode", self.journal_mode.as_pragma(), |row| {
            row.get::<_, String>(0)
        })?;
        Ok(())
    }

    /// Set the database path.
    pub fn path(mut self, path: DatabasePath) -> Self {
        self.path = path;
        self
    }

    /// Enable or disable foreign keys.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the busy timeout in milliseconds.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    /// Set the cache size.
    pub fn cache_size(mut self, size: i32) -> Self {
        self.cache_size = Some(size);
        self
    }

    /// Set the synchronous mode.
    pub fn synchronous(mut self, mode: SynchronousMode) -> Self {
        self.synchronous = mode;
        self
    }

    /// Set the journal mode.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }
}
