//! The external file storage that documents are materialized into.

use std::future::Future;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Where an uploaded file ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLocation {
  /// Public locator recorded on the finalized document.
  pub url:  String,
  /// Backend-specific path, for diagnostics.
  pub path: String,
}

pub trait StorageUploader: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Store `content` under a name derived from `filename`.
  fn upload(
    &self,
    filename: String,
    content: Bytes,
  ) -> impl Future<Output = Result<StoredLocation, Self::Error>> + Send + '_;

  /// Remove a previously stored file, named by the `url` that
  /// [`upload`](Self::upload) returned (the location kept on the finalized
  /// document). Not used by intake.
  fn delete<'a>(
    &'a self,
    location: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
