use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{info, warn};

use crate::assets::{AssetManager, Bucket};
use crate::auth::jwt::SessionKeys;
use crate::auth::repo::{AdminRepo, PgAdminRepo};
use crate::config::{AppConfig, StorageBackend};
use crate::content::repo::{ContentRepo, PgContentRepo};
use crate::memory::MemoryStore;
use crate::notify::{Notifier, SmtpNotifier, UnconfiguredNotifier};
use crate::storage::{LocalStorage, MemoryStorage, S3Storage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub admins: Arc<dyn AdminRepo>,
    pub content: Arc<dyn ContentRepo>,
    pub config: Arc<AppConfig>,
    pub sessions: SessionKeys,
    pub assets: AssetManager,
    pub notifier: Arc<dyn Notifier>,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (admins, content): (Arc<dyn AdminRepo>, Arc<dyn ContentRepo>) = match &config.database_url {
            Some(url) => {
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await?;
                sqlx::migrate!("./migrations").run(&db).await?;
                info!("database connected, migrations applied");
                (
                    Arc::new(PgAdminRepo::new(db.clone())) as Arc<dyn AdminRepo>,
                    Arc::new(PgContentRepo::new(db)) as Arc<dyn ContentRepo>,
                )
            }
            None => {
                warn!("DATABASE_URL not set; using the in-memory store, data will not survive a restart");
                let store = Arc::new(MemoryStore::new());
                (store.clone() as Arc<dyn AdminRepo>, store as Arc<dyn ContentRepo>)
            }
        };

        let storage: Arc<dyn StorageClient> = match &config.storage.backend {
            StorageBackend::Local => {
                let dirs: Vec<&str> = Bucket::ALL.iter().map(|b| b.dir()).collect();
                Arc::new(LocalStorage::new(&config.storage.root, &dirs).await?)
            }
            StorageBackend::S3(s3) => Arc::new(S3Storage::new(s3).await?),
            StorageBackend::Memory => {
                warn!("STORAGE_BACKEND=memory; uploads are kept in memory only");
                Arc::new(MemoryStorage::new())
            }
        };

        let notifier: Arc<dyn Notifier> = match &config.mail {
            Some(mail) => Arc::new(SmtpNotifier::new(mail)?),
            None => {
                warn!("SMTP_HOST not set; login codes and contact mail cannot be delivered");
                Arc::new(UnconfiguredNotifier)
            }
        };

        Ok(Self::from_parts(config, admins, content, storage, notifier))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        admins: Arc<dyn AdminRepo>,
        content: Arc<dyn ContentRepo>,
        storage: Arc<dyn StorageClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            sessions: SessionKeys::new(&config.jwt),
            assets: AssetManager::new(storage, config.storage.url_prefix.clone()),
            admins,
            content,
            config,
            notifier,
        }
    }

    /// Fully in-memory state plus handles on the fakes, for tests.
    #[cfg(test)]
    pub fn fake_with_handles() -> (
        Self,
        Arc<crate::notify::RecordingNotifier>,
        Arc<MemoryStorage>,
    ) {
        use crate::config::{JwtConfig, StorageConfig};
        use crate::notify::RecordingNotifier;

        let config = Arc::new(AppConfig {
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
            },
            otp_ttl_seconds: 300,
            mail: None,
            contact_recipient: "owner@example.com".into(),
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                root: "uploads".into(),
                url_prefix: "/uploads".into(),
                max_upload_bytes: 1024 * 1024,
            },
            allowed_origin: None,
            single_admin_mode: false,
            registration_enabled: true,
        });

        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let storage = Arc::new(MemoryStorage::new());
        let state = Self::from_parts(
            config,
            store.clone(),
            store,
            storage.clone(),
            notifier.clone(),
        );
        (state, notifier, storage)
    }
}
