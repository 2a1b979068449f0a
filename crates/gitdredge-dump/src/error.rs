use std::path::PathBuf;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum DumpError {
    /// The input could not be turned into an http(s) URL.
    #[error("invalid url or domain `{0}`")]
    InvalidUrl(String),

    /// The target directory is already populated and update mode is off.
    #[error("{0} already exists; pass --update to refresh it")]
    TargetExists(PathBuf),

    /// The remote `index` file is missing or lacks the DIRC magic.
    #[error("{0} is not a valid git repository: the index file is missing or invalid")]
    NotARepository(Url),

    #[error(transparent)]
    Client(#[from] gitdredge_client::Error),

    #[error(transparent)]
    Index(#[from] gitdredge_index::Error),

    #[error(transparent)]
    UrlParse(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
