use std::sync::Arc;

use quire::config::{EngineConfig, StoreConfig};
use quire::models::PostOrder;
use quire::repo::Repo;
use quire::ContentService;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping quire content engine");

    let engine = EngineConfig::from_env();
    info!(
        max_tree_depth = engine.max_tree_depth,
        max_delete_depth = engine.max_delete_depth,
        "engine limits"
    );
    let page_size = engine.default_page_size;

    let repo = build_repo(StoreConfig::from_env()).await?;
    let service = ContentService::new(repo, engine);

    service.ensure_default_settings().await?;
    if let Some(post) = service.seed_welcome_content().await? {
        info!(slug = %post.slug, "seeded welcome content");
    }

    let (pager, posts) = service.list_posts(1, page_size, false, true, PostOrder::default()).await?;
    info!(total = pager.total, pages = pager.page_count(), first_page = posts.len(), "content store ready");
    let title = service.setting_value("title").await?;
    info!(%title, tags = service.all_tags().await?.len(), menu = service.navigators().await?.len(), "site settings loaded");
    info!(users = service.user_count().await?, unread = service.unread_messages().await?.len(), "accounts and inbox");
    Ok(())
}

async fn build_repo(store: StoreConfig) -> anyhow::Result<Arc<dyn Repo>> {
    match store {
        StoreConfig::Postgres { url } => connect_postgres(&url).await,
        StoreConfig::Memory { data_dir } => open_memory(data_dir),
    }
}

#[cfg(feature = "postgres-store")]
async fn connect_postgres(url: &str) -> anyhow::Result<Arc<dyn Repo>> {
    use sqlx::postgres::PgPoolOptions;

    let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
    let repo = quire::repo::pg::PgRepo::new(pool);
    repo.migrate().await?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "postgres-store"))]
async fn connect_postgres(_url: &str) -> anyhow::Result<Arc<dyn Repo>> {
    anyhow::bail!("DATABASE_URL is set but this build lacks the postgres-store feature")
}

#[cfg(feature = "inmem-store")]
fn open_memory(data_dir: Option<std::path::PathBuf>) -> anyhow::Result<Arc<dyn Repo>> {
    use quire::repo::inmem::InMemRepo;

    let repo = match data_dir {
        Some(dir) => {
            info!("Using in-memory repository backend (snapshot in {})", dir.display());
            InMemRepo::with_snapshot_dir(dir)
        }
        None => {
            info!("Using in-memory repository backend (ephemeral)");
            InMemRepo::new()
        }
    };
    Ok(Arc::new(repo))
}

#[cfg(not(feature = "inmem-store"))]
fn open_memory(_data_dir: Option<std::path::PathBuf>) -> anyhow::Result<Arc<dyn Repo>> {
    anyhow::bail!("no DATABASE_URL given and this build lacks the inmem-store feature")
}
