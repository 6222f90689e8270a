//! Data models
//!
//! This module contains the data structures used throughout the Dermolo backend:
//! - Database entities (User, Session, DocumentSequence, Certificate)
//! - Input types for creating/updating them
//! - `UnixSeconds`, the unit used for session expiry

mod certificate;
mod document_sequence;
mod session;
mod timestamp;
mod user;

pub use certificate::{Certificate, CertificateType, CreateCertificateInput};
pub use document_sequence::{format_document_number, AllocatedNumber, DocumentSequence};
pub use session::{token_prefix, Session};
pub use timestamp::UnixSeconds;
pub use user::{UpdateProfileInput, User, UserRole};
