//! Exercises C8 through the real router, not just `KavachService` directly —
//! the authorization middleware has to resolve a flat route's id into the
//! fully-qualified nested resource path C3's policy is seeded against.

use std::sync::Arc;

use kavach::auth::issue_access_token;
use kavach::authz::{AuthorizationEngine, NoMemberships};
use kavach::config::Config;
use kavach::crypto::Cipher;
use kavach::http::{build_router, AppState};
use kavach::policy::{InMemoryPolicyStore, PolicyStore};
use kavach::resource::EnvironmentName;
use kavach::service::KavachService;
use sqlx::PgPool;
use uuid::Uuid;

const JWT_SECRET: &str = "test-secret";

fn test_config() -> Config {
    Config {
        port: 0,
        env: "test".into(),
        database_url: String::new(),
        db_max_connections: 5,
        jwt_secret: JWT_SECRET.into(),
        access_token_duration: std::time::Duration::from_secs(3600),
        refresh_token_duration: std::time::Duration::from_secs(3600),
        encryption_key: [7u8; 32],
        provider_encryption_key: [8u8; 32],
        github_client_id: None,
        github_client_secret: None,
        github_redirect_url: None,
        model_file_path: "model.conf".into(),
    }
}

async fn seed_user(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, email, created_at) VALUES ($1, $2, now())")
        .bind(id)
        .bind(format!("{id}@kavach.test"))
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn spawn_server(pool: PgPool) -> (String, Arc<KavachService>) {
    let store: Arc<dyn PolicyStore> = Arc::new(InMemoryPolicyStore::new());
    let authz = Arc::new(
        AuthorizationEngine::load(store, Arc::new(NoMemberships))
            .await
            .unwrap(),
    );
    authz.seed_default_policy().await.unwrap();
    let cipher = Cipher::new([9u8; 32]);
    let service = Arc::new(KavachService::new(pool, authz, cipher.clone(), cipher));
    let state = AppState {
        config: Arc::new(test_config()),
        service: service.clone(),
    };
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), service)
}

fn bearer(user_id: Uuid) -> String {
    issue_access_token(user_id, JWT_SECRET, std::time::Duration::from_secs(60)).unwrap()
}

#[sqlx::test(migrations = "./migrations")]
async fn owner_can_reach_a_nested_environment_through_the_flat_route(pool: PgPool) {
    let owner = seed_user(&pool).await;
    let (base_url, service) = spawn_server(pool).await;

    let org = service.create_organization("acme", owner).await.unwrap();
    let sg = service.create_secret_group(org.id, "db", owner).await.unwrap();
    let env = service
        .create_environment(sg.id, EnvironmentName::Prod, owner)
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{base_url}/api/v1/environments/{}/secrets/versions", env.id))
        .bearer_auth(bearer(owner))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
async fn outsider_is_forbidden_from_a_nested_environment(pool: PgPool) {
    let owner = seed_user(&pool).await;
    let outsider = seed_user(&pool).await;
    let (base_url, service) = spawn_server(pool).await;

    let org = service.create_organization("acme", owner).await.unwrap();
    let sg = service.create_secret_group(org.id, "db", owner).await.unwrap();
    let env = service
        .create_environment(sg.id, EnvironmentName::Prod, owner)
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{base_url}/api/v1/environments/{}/secrets/versions", env.id))
        .bearer_auth(bearer(outsider))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "./migrations")]
async fn deleting_a_secret_group_through_the_flat_route_requires_permission(pool: PgPool) {
    let owner = seed_user(&pool).await;
    let outsider = seed_user(&pool).await;
    let (base_url, service) = spawn_server(pool).await;

    let org = service.create_organization("acme", owner).await.unwrap();
    let sg = service.create_secret_group(org.id, "db", owner).await.unwrap();

    let client = reqwest::Client::new();
    let forbidden = client
        .delete(format!("{base_url}/api/v1/secret-groups/{}", sg.id))
        .bearer_auth(bearer(outsider))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), reqwest::StatusCode::FORBIDDEN);

    let allowed = client
        .delete(format!("{base_url}/api/v1/secret-groups/{}", sg.id))
        .bearer_auth(bearer(owner))
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), reqwest::StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
async fn organization_creation_and_listing_bypass_the_resource_check(pool: PgPool) {
    let owner = seed_user(&pool).await;
    let (base_url, _service) = spawn_server(pool).await;

    let client = reqwest::Client::new();
    let created = client
        .post(format!("{base_url}/api/v1/organizations"))
        .bearer_auth(bearer(owner))
        .json(&serde_json::json!({ "name": "globex" }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), reqwest::StatusCode::OK);

    let listed = client
        .get(format!("{base_url}/api/v1/organizations"))
        .bearer_auth(bearer(owner))
        .send()
        .await
        .unwrap();
    assert_eq!(listed.status(), reqwest::StatusCode::OK);
}
