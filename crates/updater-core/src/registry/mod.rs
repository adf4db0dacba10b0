//! Registration table: who listens to which package, and with what rights.
//!
//! # Modules
//!
//! - [`callbacks`] — `Callbacks` record of optional async callbacks per change kind
//! - [`policy`]    — `Policy` / `PolicyPatch` permission flags
//! - [`token`]     — `VerifyToken` ownership capability, `AccessKey` policy key
//! - [`table`]     — `RegistrationTable` with ownership-checked mutations

pub mod callbacks;
pub mod policy;
pub mod table;
pub mod token;

pub use callbacks::{CallbackFuture, CallbackResult, Callbacks, OnDelete, OnNew, OnUpdate};
pub use policy::{Policy, PolicyPatch};
pub use table::{DispatchTarget, Registration, RegistrationInfo, RegistrationTable, Status};
pub use token::{AccessKey, TokenOutOfRange, VerifyToken};
