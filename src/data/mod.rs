/// Data layer: core types, file loading and store access.
///
/// Architecture:
/// ```text
///  SQLite db          directory of .csv / .json / .parquet
///      │                          │
///      ▼                          ▼
///   ┌─────────────┐        ┌──────────────┐
///   │ SqliteStore  │        │ DirectoryStore│──► loader
///   └─────────────┘        └──────────────┘
///        └──────────┬──────────────┘
///                   ▼
///             ┌──────────┐
///             │  Dataset  │  named columns of CellValue, optional index
///             └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod store;
