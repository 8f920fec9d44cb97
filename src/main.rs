//! `kavachd` — the HTTP server process.

use std::sync::Arc;

use kavach::authz::model::AuthorizationModel;
use kavach::authz::AuthorizationEngine;
use kavach::config::Config;
use kavach::crypto::Cipher;
use kavach::http::{build_router, AppState};
use kavach::observability::init_tracing;
use kavach::policy::{PgPolicyStore, PolicyStore};
use kavach::resource::PgGroupMembership;
use kavach::service::KavachService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::load()?;
    AuthorizationModel::load_from_path(&config.model_file_path)?;
    let pool = kavach::db::connect(&config).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store: Arc<dyn PolicyStore> = Arc::new(PgPolicyStore::new(pool.clone()));
    let memberships = Arc::new(PgGroupMembership::new(pool.clone()));
    let authz = Arc::new(AuthorizationEngine::load(store, memberships).await?);
    authz.seed_default_policy().await?;

    let secret_cipher = Cipher::new(config.encryption_key);
    let provider_cipher = Cipher::new(config.provider_encryption_key);
    let service = Arc::new(KavachService::new(pool, authz, secret_cipher, provider_cipher));

    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        service,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(port = config.port, "kavachd listening");
    axum::serve(listener, app).await?;
    Ok(())
}
