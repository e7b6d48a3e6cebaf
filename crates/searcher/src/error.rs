use thiserror::Error;

/// Errors raised while configuring or assembling a searcher chain.
///
/// Scheduling itself never fails with these; broken bookkeeping at run time
/// goes through [`klee_core::invariant_violation`] instead.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("conflicting searcher options: {0}")]
    Conflict(String),

    #[error("cannot read filter file {path}: {source}")]
    FilterFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
