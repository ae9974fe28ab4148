//! The enrollment intake workflow and its background document dispatcher.
//!
//! [`EnrollmentIntake`] validates a request, writes the student, both
//! documents and the enrollment in one transaction, and queues the documents
//! for upload once that transaction has committed.
//! [`MaterializationDispatcher`] drains the queue, uploading through a
//! [`StorageUploader`](escola_core::storage::StorageUploader) and finalizing
//! each document independently.

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod local_storage;
pub mod transaction;
pub mod workflow;

pub use clock::SystemClock;
pub use dispatcher::{DispatchSignal, MaterializationDispatcher};
pub use error::{FieldError, IntakeError};
pub use local_storage::LocalFileStorage;
pub use transaction::run_in_transaction;
pub use workflow::{EnrollmentIntake, IntakeRequest};
