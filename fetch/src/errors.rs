use crate::extractor::ExtractError;
use crate::mail::MailError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that abort a fetch or reparse run
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("unable to fetch mail: {0}")]
    Mail(#[from] MailError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("unable to reparse alert {id}: {source}")]
    Reparse {
        id: uuid::Uuid,
        #[source]
        source: ExtractError,
    },

    #[error("parser worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("alert pipeline stopped before the run completed")]
    PipelineClosed,
}
