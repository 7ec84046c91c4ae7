//! # pollhub-core
//!
//! The vote-integrity and poll-mutation core of pollhub.
//!
//! [`Poll`] is the aggregate that owns every invariant of a poll. The
//! [`PollService`] and [`IdentityService`] orchestrate use cases on top of the
//! repository and credential capabilities defined here, so the whole core can
//! be exercised without a database or real cryptography.

pub mod error;
pub mod identity;
pub mod memory;
pub mod poll;
pub mod repository;
pub mod service;
pub mod voter;

pub use error::{PollError, Result};
pub use identity::{CredentialHasher, IdentityService, TokenIssuer, UserRecord, UserRef};
pub use poll::{Poll, PollOption};
pub use repository::{PollRepository, UserRepository};
pub use service::PollService;
pub use voter::{Fingerprint, Voter};
