use std::sync::Arc;

use folio_auth::{PasswordHasher, TokenSigner};
use folio_infra::{
    AppConfig, AuthService, AuthSettings, CredentialStore, InMemoryCredentialStore,
    PostgresCredentialStore,
};

/// Store handle shared by the auth service and its session manager.
pub type SharedStore = Arc<dyn CredentialStore>;

pub struct AppServices {
    auth: AuthService<SharedStore>,
}

impl AppServices {
    pub fn new(
        store: SharedStore,
        signer: Arc<TokenSigner>,
        hasher: PasswordHasher,
        settings: AuthSettings,
    ) -> Self {
        Self {
            auth: AuthService::new(store, signer, hasher, settings),
        }
    }

    pub fn auth(&self) -> &AuthService<SharedStore> {
        &self.auth
    }

    pub fn signer(&self) -> Arc<TokenSigner> {
        Arc::clone(self.auth.signer())
    }
}

/// Wire services from configuration: Postgres when `DATABASE_URL` is set,
/// otherwise the in-memory store.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let signer = Arc::new(TokenSigner::new(&config.jwt_secret, config.access_token_ttl));

    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let pg = PostgresCredentialStore::connect(
                url,
                config.db_max_connections,
                config.store_timeout,
            )
            .await?;
            pg.migrate().await?;
            tracing::info!("using postgres credential store");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory credential store (data is lost on restart)");
            Arc::new(InMemoryCredentialStore::new())
        }
    };

    let services = AppServices::new(store, signer, PasswordHasher::default(), config.auth_settings());

    if let Some(admin) = &config.bootstrap_admin {
        let created = services
            .auth()
            .ensure_bootstrap_admin(&admin.email, &admin.password)
            .await?;
        if created {
            tracing::info!(email = %admin.email, "bootstrap admin created");
        }
    }

    Ok(services)
}
