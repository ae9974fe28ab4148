//! Supporting documents attached to an enrollment.
//!
//! A document is created [`DocumentState::Pending`], holding the bytes the
//! caller uploaded. Once the file has been written to external storage it is
//! moved to [`DocumentState::Finalized`] and the raw bytes are dropped. A
//! failed upload leaves it Pending.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentState {
  /// Content captured, storage location not yet known.
  Pending { content: Bytes },
  /// Content lives in external storage at `location`.
  Finalized { location: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
  pub document_id:    Uuid,
  /// Hex SHA-256 of the original content; survives finalization.
  pub content_sha256: String,
  pub created_at:     DateTime<Utc>,
  pub state:          DocumentState,
}

impl Document {
  pub fn is_pending(&self) -> bool { matches!(self.state, DocumentState::Pending { .. }) }

  /// The raw content, if the document is still pending.
  pub fn content(&self) -> Option<&Bytes> {
    match &self.state {
      DocumentState::Pending { content } => Some(content),
      DocumentState::Finalized { .. } => None,
    }
  }

  /// The storage location, if the document has been finalized.
  pub fn location(&self) -> Option<&str> {
    match &self.state {
      DocumentState::Pending { .. } => None,
      DocumentState::Finalized { location } => Some(location),
    }
  }
}

/// Hex-encoded SHA-256 digest of `content`.
pub fn content_digest(content: &[u8]) -> String { hex::encode(Sha256::digest(content)) }

/// A file as submitted by the caller: its original name and bytes.
#[derive(Debug, Clone)]
pub struct Upload {
  pub filename: String,
  pub content:  Bytes,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn digest_is_stable_hex() {
    let digest = content_digest(b"abc");
    assert_eq!(
      digest,
      "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
  }

  #[test]
  fn accessors_follow_state() {
    let pending = Document {
      document_id:    Uuid::nil(),
      content_sha256: content_digest(b"x"),
      created_at:     Utc::now(),
      state:          DocumentState::Pending { content: Bytes::from_static(b"x") },
    };
    assert!(pending.is_pending());
    assert_eq!(pending.content().map(|b| b.as_ref()), Some(&b"x"[..]));
    assert!(pending.location().is_none());

    let finalized = Document {
      state: DocumentState::Finalized { location: "/uploads/a.pdf".into() },
      ..pending
    };
    assert!(!finalized.is_pending());
    assert!(finalized.content().is_none());
    assert_eq!(finalized.location(), Some("/uploads/a.pdf"));
  }
}
