use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use super::loader::{SUPPORTED_EXTENSIONS, load_file};
use super::model::{CellValue, Dataset};
use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Read-only access to a collection of named tables.
pub trait Store {
    /// Names of the user tables, sorted. Internal tables are excluded.
    fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    /// Load one table completely into memory.
    fn read_table(&self, name: &str) -> Result<Dataset, StoreError>;
}

// ---------------------------------------------------------------------------
// StoreLocation – opens fresh handles, one per worker
// ---------------------------------------------------------------------------

/// Where the tables live. Directories hold data files, anything else is
/// treated as an SQLite database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Sqlite(PathBuf),
    Directory(PathBuf),
}

impl StoreLocation {
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        if path.is_dir() {
            Ok(StoreLocation::Directory(path.to_path_buf()))
        } else {
            Ok(StoreLocation::Sqlite(path.to_path_buf()))
        }
    }

    /// Open a new read-only handle. `timeout` bounds how long a read waits
    /// on a locked database.
    pub fn open(&self, timeout: Duration) -> Result<Box<dyn Store + Send>, StoreError> {
        match self {
            StoreLocation::Sqlite(path) => Ok(Box::new(SqliteStore::open(path, timeout)?)),
            StoreLocation::Directory(path) => Ok(Box::new(DirectoryStore::open(path)?)),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            StoreLocation::Sqlite(p) | StoreLocation::Directory(p) => p,
        }
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(timeout)?;
        debug!("opened sqlite store {}", path.display());
        Ok(SqliteStore { conn })
    }

    fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl Store for SqliteStore {
    fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn read_table(&self, name: &str) -> Result<Dataset, StoreError> {
        if !self.table_exists(name)? {
            return Err(StoreError::UnknownTable(name.to_string()));
        }

        let sql = format!("SELECT * FROM \"{}\"", name.replace('"', "\"\""));
        let mut stmt = self.conn.prepare(&sql)?;
        let headers: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = headers.len();

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, SqlValue>(i).map(sql_to_cell))
                    .collect::<Result<Vec<_>, _>>()
            })?
            .collect::<Result<Vec<_>, _>>()?;

        debug!("read {} row(s) from '{name}'", rows.len());
        Ok(Dataset::from_rows(name, headers, rows))
    }
}

fn sql_to_cell(value: SqlValue) -> CellValue {
    match value {
        SqlValue::Null => CellValue::Null,
        SqlValue::Integer(i) => CellValue::Integer(i),
        SqlValue::Real(f) => CellValue::Float(f),
        SqlValue::Text(s) => CellValue::Text(s),
        SqlValue::Blob(b) => CellValue::Text(format!("<blob {} bytes>", b.len())),
    }
}

// ---------------------------------------------------------------------------
// Directory of data files
// ---------------------------------------------------------------------------

/// Each `.csv` / `.json` / `.parquet` file in the directory is one table
/// named after its stem. When several files share a stem, each of them
/// becomes its own table named by the full file name (`gdp.csv`,
/// `gdp.json`). Hidden (`.`) and internal (`_`) files are skipped.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        if !root.is_dir() {
            return Err(StoreError::NotFound(root.to_path_buf()));
        }
        Ok(DirectoryStore {
            root: root.to_path_buf(),
        })
    }

    /// Data files grouped by stem, file names sorted within each group.
    fn data_files(&self) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
        let mut by_stem: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() || !has_supported_extension(&path) {
                continue;
            }
            let (Some(stem), Some(file_name)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.file_name().and_then(|s| s.to_str()),
            ) else {
                continue;
            };
            if !is_internal(stem) {
                by_stem
                    .entry(stem.to_string())
                    .or_default()
                    .push(file_name.to_string());
            }
        }
        for files in by_stem.values_mut() {
            files.sort();
        }
        Ok(by_stem)
    }

    /// The single file behind table `name`.
    fn file_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let files = self.data_files()?;
        if let Some(found) = files.get(name) {
            return match found.as_slice() {
                [only] => Ok(self.root.join(only)),
                _ => Err(StoreError::Load {
                    table: name.to_string(),
                    message: format!("ambiguous table name, candidates: {}", found.join(", ")),
                }),
            };
        }
        files
            .values()
            .flatten()
            .find(|file| file.as_str() == name)
            .map(|file| self.root.join(file))
            .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
    }
}

fn is_internal(stem: &str) -> bool {
    stem.starts_with('.') || stem.starts_with('_')
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

impl Store for DirectoryStore {
    fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let mut names = BTreeSet::new();
        for (stem, files) in self.data_files()? {
            if files.len() == 1 {
                names.insert(stem);
            } else {
                names.extend(files);
            }
        }
        Ok(names.into_iter().collect())
    }

    fn read_table(&self, name: &str) -> Result<Dataset, StoreError> {
        let path = self.file_for(name)?;
        let mut dataset = load_file(&path).map_err(|e| StoreError::Load {
            table: name.to_string(),
            message: format!("{e:#}"),
        })?;
        dataset.name = name.to_string();
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn sample_db(dir: &Path) -> PathBuf {
        let path = dir.join("store.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE gdp (year INTEGER, value REAL, note TEXT);
             INSERT INTO gdp VALUES (2000, 1.5, 'a'), (2001, NULL, 'b');
             CREATE TABLE log (id INTEGER PRIMARY KEY AUTOINCREMENT, msg TEXT);
             INSERT INTO log (msg) VALUES ('x');",
        )
        .unwrap();
        path
    }

    #[test]
    fn sqlite_lists_user_tables_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&sample_db(dir.path()), TIMEOUT).unwrap();
        // AUTOINCREMENT creates sqlite_sequence behind the scenes.
        assert_eq!(store.list_tables().unwrap(), vec!["gdp", "log"]);
    }

    #[test]
    fn sqlite_reads_typed_cells() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&sample_db(dir.path()), TIMEOUT).unwrap();
        let ds = store.read_table("gdp").unwrap();

        assert_eq!(ds.name, "gdp");
        assert_eq!(ds.column_names(), vec!["year", "value", "note"]);
        assert_eq!(ds.column("year").unwrap().values, vec![CellValue::Integer(2000), CellValue::Integer(2001)]);
        assert_eq!(ds.column("value").unwrap().values[1], CellValue::Null);
        assert_eq!(ds.column("note").unwrap().values[0], CellValue::Text("a".into()));
    }

    #[test]
    fn sqlite_unknown_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&sample_db(dir.path()), TIMEOUT).unwrap();
        assert!(matches!(store.read_table("nope"), Err(StoreError::UnknownTable(_))));
    }

    #[test]
    fn sqlite_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteStore::open(&dir.path().join("absent.db"), TIMEOUT).err().unwrap();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn directory_store_skips_internal_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gdp.csv"), "year,value\n2000,1\n").unwrap();
        std::fs::write(dir.path().join("co2.json"), r#"[{"year": 2000, "value": 1}]"#).unwrap();
        std::fs::write(dir.path().join("_meta.csv"), "a\n1\n").unwrap();
        std::fs::write(dir.path().join(".hidden.csv"), "a\n1\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let store = DirectoryStore::open(dir.path()).unwrap();
        assert_eq!(store.list_tables().unwrap(), vec!["co2", "gdp"]);
        assert_eq!(store.read_table("gdp").unwrap().len(), 1);
    }

    #[test]
    fn directory_shared_stem_yields_one_table_per_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gdp.csv"), "year,value\n2000,1\n").unwrap();
        std::fs::write(dir.path().join("gdp.json"), "[{\"year\": 2000,").unwrap();
        std::fs::write(dir.path().join("co2.csv"), "year,value\n2000,1\n").unwrap();

        let store = DirectoryStore::open(dir.path()).unwrap();
        assert_eq!(store.list_tables().unwrap(), vec!["co2", "gdp.csv", "gdp.json"]);

        let csv = store.read_table("gdp.csv").unwrap();
        assert_eq!(csv.name, "gdp.csv");
        assert_eq!(csv.len(), 1);
        match store.read_table("gdp.json") {
            Err(StoreError::Load { table, .. }) => assert_eq!(table, "gdp.json"),
            other => panic!("unexpected: {other:?}"),
        }
        match store.read_table("gdp") {
            Err(StoreError::Load { message, .. }) => assert!(message.contains("gdp.csv, gdp.json")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn directory_load_failure_names_table() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let store = DirectoryStore::open(dir.path()).unwrap();
        match store.read_table("bad") {
            Err(StoreError::Load { table, .. }) => assert_eq!(table, "bad"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn location_detects_kind() {
        let dir = tempfile::tempdir().unwrap();
        let db = sample_db(dir.path());
        assert_eq!(StoreLocation::from_path(&db).unwrap(), StoreLocation::Sqlite(db.clone()));
        assert_eq!(
            StoreLocation::from_path(dir.path()).unwrap(),
            StoreLocation::Directory(dir.path().to_path_buf())
        );
        assert!(StoreLocation::from_path(&dir.path().join("missing")).is_err());
        assert_eq!(StoreLocation::Sqlite(db.clone()).open(TIMEOUT).unwrap().list_tables().unwrap().len(), 2);
    }
}
