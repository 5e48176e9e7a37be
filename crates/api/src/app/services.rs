//! Service wiring: store selection, hashing cost, lockout policy, bootstrap.

use std::sync::Arc;

use dbadmin_auth::{ConfigError, Pbkdf2Sha256, resource_keys};
use dbadmin_infra::{
    AppConfig, InMemoryUserStore, PostgresUserStore, ServiceError, StoreError, UserService, UserStore,
};

/// Shared application services (handed to handlers via `Extension`).
#[derive(Clone)]
pub struct AppServices {
    pub users: UserService,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid resource list: {0}")]
    Resources(#[from] ConfigError),
    #[error("user store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("bootstrap failed: {0}")]
    Bootstrap(#[from] ServiceError),
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, StartupError> {
    let resources = resource_keys(config.resources.iter().cloned())?;

    let store: Arc<dyn UserStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("using postgres user store");
            Arc::new(PostgresUserStore::connect(url, Arc::clone(&resources)).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory user store");
            InMemoryUserStore::arc(Arc::clone(&resources))
        }
    };

    let hasher = Arc::new(Pbkdf2Sha256::new(config.pbkdf2_iterations));
    let users = UserService::new(store, resources, hasher, config.lockout);

    if let Some(bootstrap) = &config.bootstrap {
        match users.bootstrap_admin(&bootstrap.username, &bootstrap.password).await? {
            Some(_) => tracing::info!(username = %bootstrap.username, "created bootstrap administrator"),
            None => tracing::debug!("users already exist; skipping bootstrap"),
        }
    }

    Ok(AppServices { users })
}
