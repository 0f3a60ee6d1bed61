use camino::Utf8PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open change log at {path}")]
    Open {
        path: Utf8PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to create directory {path}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("change log schema version {found} is newer than this build supports ({supported})")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt {table} row {key}: {message}")]
    Corrupt {
        table: &'static str,
        key: String,
        message: String,
    },

    #[error("unknown snapshot {0}")]
    UnknownSnapshot(String),

    #[error("change log unavailable: {0}")]
    Unavailable(String),
}
