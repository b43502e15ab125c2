//! Block-list sources: remote URLs or local files.

use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

/// Errors raised while reading or parsing block lists.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("`{0}` must be an http(s) URL or an absolute path")]
    InvalidSource(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{source_name} line {line}: invalid entry `{value}`")]
    InvalidEntry {
        source_name: String,
        line: usize,
        value: String,
    },
}

/// Where a list is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListSource {
    Remote(Url),
    File(PathBuf),
}

impl ListSource {
    /// Accepts `http://` and `https://` URLs and absolute paths.
    pub fn parse(s: &str) -> Result<Self, ListError> {
        let s = s.trim();
        if s.starts_with("http://") || s.starts_with("https://") {
            return Url::parse(s)
                .map(ListSource::Remote)
                .map_err(|_| ListError::InvalidSource(s.to_string()));
        }
        if Path::new(s).is_absolute() {
            return Ok(ListSource::File(PathBuf::from(s)));
        }
        Err(ListError::InvalidSource(s.to_string()))
    }

    /// Fetch the raw list text.
    pub async fn fetch(&self, client: &reqwest::Client) -> Result<String, ListError> {
        match self {
            ListSource::Remote(url) => {
                let response = client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|source| ListError::Fetch {
                        url: url.to_string(),
                        source,
                    })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ListError::Status {
                        url: url.to_string(),
                        status,
                    });
                }
                response.text().await.map_err(|source| ListError::Fetch {
                    url: url.to_string(),
                    source,
                })
            }
            ListSource::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| ListError::Read {
                        path: path.display().to_string(),
                        source,
                    })
            }
        }
    }
}

impl std::fmt::Display for ListSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListSource::Remote(url) => write!(f, "{url}"),
            ListSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Non-empty, non-comment lines with their 1-based line numbers.
pub fn entries(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}
