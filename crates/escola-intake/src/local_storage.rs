//! [`StorageUploader`] writing into a directory on the local filesystem.
//!
//! Every upload gets a fresh name, `<uuid><ext>`, where `<ext>` is the
//! extension of the submitted filename (if any). The public locator is
//! `<public_prefix>/<name>`, and that locator is what `delete` takes back.

use std::{
  io,
  path::{Component, Path, PathBuf},
};

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use escola_core::storage::{StorageUploader, StoredLocation};

#[derive(Debug, Error)]
pub enum StorageError {
  #[error("failed to create upload directory {path:?}: {source}")]
  CreateDir {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path:?}: {source}")]
  Write {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("location {0:?} was not issued by this storage")]
  ForeignLocation(String),

  #[error("failed to delete {path:?}: {source}")]
  Delete {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Clone)]
pub struct LocalFileStorage {
  upload_dir:    PathBuf,
  public_prefix: String,
}

impl LocalFileStorage {
  pub fn new(upload_dir: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
    Self { upload_dir: upload_dir.into(), public_prefix: public_prefix.into() }
  }

  fn stored_name(filename: &str) -> String {
    match Path::new(filename).extension() {
      Some(ext) => format!("{}.{}", Uuid::new_v4(), ext.to_string_lossy()),
      None => Uuid::new_v4().to_string(),
    }
  }

  /// Map a public locator back to the file it names. Only a bare file name
  /// directly under `public_prefix` is accepted.
  fn resolve(&self, location: &str) -> Result<PathBuf, StorageError> {
    let foreign = || StorageError::ForeignLocation(location.to_owned());
    let name = location
      .strip_prefix(self.public_prefix.trim_end_matches('/'))
      .and_then(|rest| rest.strip_prefix('/'))
      .ok_or_else(foreign)?;

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
      (Some(Component::Normal(file)), None) => Ok(self.upload_dir.join(file)),
      _ => Err(foreign()),
    }
  }
}

impl StorageUploader for LocalFileStorage {
  type Error = StorageError;

  async fn upload(&self, filename: String, content: Bytes) -> Result<StoredLocation, StorageError> {
    tokio::fs::create_dir_all(&self.upload_dir)
      .await
      .map_err(|source| StorageError::CreateDir { path: self.upload_dir.clone(), source })?;

    let name = Self::stored_name(&filename);
    let path = self.upload_dir.join(&name);
    tokio::fs::write(&path, &content)
      .await
      .map_err(|source| StorageError::Write { path: path.clone(), source })?;

    tracing::debug!(original = %filename, path = ?path, bytes = content.len(), "file stored");

    Ok(StoredLocation {
      url:  format!("{}/{name}", self.public_prefix.trim_end_matches('/')),
      path: path.to_string_lossy().into_owned(),
    })
  }

  async fn delete(&self, location: &str) -> Result<(), StorageError> {
    let path = self.resolve(location)?;
    match tokio::fs::remove_file(&path).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(source) => Err(StorageError::Delete { path, source }),
    }
  }
}
