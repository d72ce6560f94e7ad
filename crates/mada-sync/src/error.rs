use mada_core::ValidationError;
use mada_storage::StoreError;
use thiserror::Error;

/// Why one merge unit was rejected. Every variant names the snapshot it came from.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("invalid snapshot {url}: {source}")]
    Invalid {
        url: String,
        #[source]
        source: ValidationError,
    },
    #[error("store rejected {context} of {url}: {source}")]
    Store {
        url: String,
        context: String,
        #[source]
        source: StoreError,
    },
    #[error("match date {url} carries no season")]
    MissingSeason { url: String },
    #[error("result {url} refers to unknown match date {match_key} in season {season_key}")]
    MissingMatchDate {
        url: String,
        season_key: String,
        match_key: String,
    },
    #[error("result {url} has {events} category results, only 0, 4 or 7 can be scored")]
    UnsupportedTeamFormat { url: String, events: usize },
}

impl MergeError {
    pub fn url(&self) -> &str {
        match self {
            MergeError::Invalid { url, .. }
            | MergeError::Store { url, .. }
            | MergeError::MissingSeason { url }
            | MergeError::MissingMatchDate { url, .. }
            | MergeError::UnsupportedTeamFormat { url, .. } => url,
        }
    }
}

pub(crate) fn invalid(url: &str) -> impl FnOnce(ValidationError) -> MergeError + '_ {
    move |source| MergeError::Invalid {
        url: url.to_string(),
        source,
    }
}

pub(crate) fn rejected<'a>(
    url: &'a str,
    context: impl std::fmt::Display + 'a,
) -> impl FnOnce(StoreError) -> MergeError + 'a {
    move |source| MergeError::Store {
        url: url.to_string(),
        context: context.to_string(),
        source,
    }
}
