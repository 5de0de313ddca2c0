//! Wiring of storage and push collaborators from [`AppConfig`].

use std::sync::Arc;

use donorcast_db_postgres::{PostgresConfig, PostgresStore, mask_password};
use donorcast_notifications::{
    AccessTokenSource, DryRunGateway, FcmConfig, FcmGateway, NotificationContext,
    NotificationError, PushGateway, ServiceAccountKey, ServiceAccountTokenSource,
    StaticTokenSource,
};
use thiserror::Error;
use tracing::info;

use crate::config::{AppConfig, FcmSettings, PushProvider, StorageBackend};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("storage configuration error: {0}")]
    StorageConfig(String),
    #[error("failed to connect to PostgreSQL: {0}")]
    Postgres(#[from] donorcast_db_postgres::PostgresError),
    #[error("push gateway configuration error: {0}")]
    Push(#[from] NotificationError),
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Build the collaborators named by the configuration.
pub async fn build_context(cfg: &AppConfig) -> Result<NotificationContext, BootstrapError> {
    let gateway = build_gateway(cfg)?;
    match cfg.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            Ok(NotificationContext::from_store(
                donorcast_db_memory::create_store(),
                gateway,
            ))
        }
        StorageBackend::Postgres => {
            let store = connect_postgres(cfg).await?;
            Ok(NotificationContext::from_store(Arc::new(store), gateway))
        }
    }
}

async fn connect_postgres(cfg: &AppConfig) -> Result<PostgresStore, BootstrapError> {
    let pg = cfg.storage.postgres.as_ref().ok_or_else(|| {
        BootstrapError::StorageConfig("storage.postgres section is missing".into())
    })?;
    let url = pg
        .url
        .as_deref()
        .filter(|u| !u.is_empty())
        .ok_or_else(|| BootstrapError::StorageConfig("storage.postgres.url is missing".into()))?;

    info!(url = %mask_password(url), pool_size = pg.pool_size, "Connecting to PostgreSQL");
    let config = PostgresConfig::new(url)
        .with_pool_size(pg.pool_size)
        .with_connect_timeout_ms(pg.connect_timeout_ms);
    Ok(PostgresStore::connect(&config).await?)
}

fn build_gateway(cfg: &AppConfig) -> Result<Arc<dyn PushGateway>, BootstrapError> {
    match cfg.push.provider {
        PushProvider::DryRun => {
            info!("Push provider: dry run, messages are logged and not delivered");
            Ok(Arc::new(DryRunGateway::new()))
        }
        PushProvider::Fcm => build_fcm(&cfg.push.fcm),
    }
}

fn build_fcm(settings: &FcmSettings) -> Result<Arc<dyn PushGateway>, BootstrapError> {
    let configured_project = settings
        .project_id
        .clone()
        .filter(|p| !p.trim().is_empty());

    let (project_id, auth): (Option<String>, Arc<dyn AccessTokenSource>) =
        match settings.service_account_path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => {
                let key = ServiceAccountKey::from_file(path)?;
                let project_id = configured_project.or_else(|| key.project_id.clone());
                let http_client = reqwest::Client::builder()
                    .timeout(settings.timeout())
                    .build()?;
                let source = ServiceAccountTokenSource::new(key, http_client)?;
                info!(client_email = %source.client_email(), "Using service account credentials");
                (project_id, Arc::new(source))
            }
            None => {
                let token = settings.access_token.clone().unwrap_or_default();
                (configured_project, Arc::new(StaticTokenSource::new(token)))
            }
        };

    let project_id = project_id.ok_or_else(|| {
        NotificationError::InvalidConfig("push.fcm.project_id could not be determined".into())
    })?;

    let mut config = FcmConfig::new(project_id.clone())
        .with_timeout(settings.timeout())
        .with_multicast_concurrency(settings.multicast_concurrency);
    if let Some(base) = settings.api_base.as_deref() {
        config = config.with_api_base(base);
    }
    if let Some(base) = settings.iid_base.as_deref() {
        config = config.with_iid_base(base);
    }

    info!(project_id = %project_id, "Push provider: FCM");
    Ok(Arc::new(FcmGateway::new(config, auth)?))
}
