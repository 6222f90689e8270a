//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the operations for a specific entity.

pub mod certificate;
pub mod document_sequence;
pub mod session;
pub mod user;

pub use certificate::{CertificateRepository, SqlxCertificateRepository};
pub use document_sequence::{DocumentSequenceRepository, SqlxDocumentSequenceRepository};
pub use session::{SessionRepository, SessionWithUser, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
