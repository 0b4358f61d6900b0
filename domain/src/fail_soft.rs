//! Fail-soft facade over `RecordStore`.
//!
//! Callers that must never see a storage error get `Option` back: `None` means
//! "not found" or "failed", and failures are reported only through the log as
//! one ERROR event carrying an `operation` field (`getUser`,
//! `saveUser - Update`, ...).

use tracing::error;

use crate::service::RecordStore;
use crate::{DocumentStore, StoreError, Stream, User};

pub struct FailSoftStore<S: DocumentStore> {
    inner: RecordStore<S>,
}

impl<S: DocumentStore> FailSoftStore<S> {
    pub fn new(inner: RecordStore<S>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &RecordStore<S> {
        &self.inner
    }

    pub async fn get_user(&self, login: &str) -> Option<User> {
        collapse("getUser", self.inner.get_user(login).await)
    }

    pub async fn save_user(&self, user: &User) -> Option<User> {
        absorb("saveUser", self.inner.save_user(user).await)
    }

    pub async fn get_stream(&self, stream_date: &str) -> Option<Stream> {
        collapse("getStream", self.inner.get_stream(stream_date).await)
    }

    pub async fn save_stream(&self, stream: &Stream) -> Option<Stream> {
        absorb("saveStream", self.inner.save_stream(stream).await)
    }
}

/// Fold a lookup result into `Option`, logging the failure under `operation`.
pub fn collapse<T>(operation: &str, result: Result<Option<T>, StoreError>) -> Option<T> {
    result.unwrap_or_else(|err| {
        report(operation, &err);
        None
    })
}

/// Fold a save result into `Option`. The log tag names the branch that failed.
pub fn absorb<T>(operation: &str, result: Result<T, StoreError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            report(&operation_tag(operation, &err), &err);
            None
        }
    }
}

fn operation_tag(operation: &str, err: &StoreError) -> String {
    match err {
        StoreError::Write { op, .. } => format!("{operation} - {op}"),
        StoreError::Lookup(_) => format!("{operation} - Lookup"),
        _ => operation.to_string(),
    }
}

fn report(operation: &str, err: &StoreError) {
    error!(operation, error = %err, "record store operation failed");
}
