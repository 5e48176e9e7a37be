//! Infrastructure layer: user persistence, services and configuration.

pub mod config;
pub mod users;

pub use config::{AppConfig, BootstrapAdmin, ConfigLoadError};
pub use users::{
    Authentication, InMemoryUserStore, NewUser, PatchColumns, PostgresUserStore, ServiceError,
    ServiceResult, StoreError, UserPatch, UserRow, UserService, UserStore,
};
