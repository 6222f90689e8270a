//! Services layer - Business logic
//!
//! This module contains the business logic of the Dermolo backend:
//! - Session management and the authorization gate
//! - Accounts (signup, login, profile, password)
//! - Document numbering and certificate issuance

pub mod certificate;
pub mod clock;
pub mod document_sequence;
pub mod gate;
pub mod password;
pub mod session;
pub mod user;

pub use certificate::{CertificateService, CertificateServiceError};
pub use clock::{Clock, DynClock, ManualClock, SystemClock};
pub use document_sequence::{AllocationError, DocumentSequenceAllocator};
pub use gate::{authorize, GateDecision, DASHBOARD_PATH, LOGIN_PATH};
pub use password::{hash_password, verify_password};
pub use session::{generate_token, SessionError, SessionManager};
pub use user::{LoginInput, SignupInput, UserService, UserServiceError};
