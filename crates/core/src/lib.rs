//! `dbadmin-core`: domain primitives shared by every dbadmin crate.
//!
//! Nothing in here performs I/O; storage and transport live in `dbadmin-infra`
//! and `dbadmin-api`.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::UserId;
