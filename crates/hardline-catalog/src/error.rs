use camino::Utf8PathBuf;
use hardline_domain::GraphError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("policy directory {0} does not exist")]
    MissingRoot(Utf8PathBuf),

    #[error("walk policy directory")]
    Walk(#[from] walkdir::Error),

    #[error("invalid exclude glob: {0}")]
    Glob(#[from] globset::Error),

    #[error("read {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write {path}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse override file {path}")]
    OverrideParse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("serialize overrides")]
    OverrideSerialize(#[source] serde_json::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
