//! User records: column codec, storage backends and the administration service.

pub mod codec;
pub mod postgres;
pub mod service;
pub mod store;

pub use codec::UserRow;
pub use postgres::PostgresUserStore;
pub use service::{Authentication, NewUser, ServiceError, ServiceResult, UserService};
pub use store::{InMemoryUserStore, PatchColumns, StoreError, UserPatch, UserStore};
