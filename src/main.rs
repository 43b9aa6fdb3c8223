use domix_drafts::{
    api::{AppState, router},
    domix::{HttpAdService, HttpBlobStore, HttpUserDirectory, config::API_ROOT},
    draft::DraftPolicy,
    staging::PreviewRegistry,
    store::{DraftStore, idle_ttl_from_env, sweep_period_from_env},
};
use eyre::WrapErr;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();
    if let Err(err) = run().await {
        error!(target = "domix.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    let prometheus = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            warn!(target = "domix.api", error = %err, "prometheus recorder unavailable");
            None
        }
    };

    let policy = DraftPolicy::from_env();
    let store = DraftStore::new();
    let idle_ttl = idle_ttl_from_env();
    let sweeper = store.spawn_sweeper(idle_ttl, sweep_period_from_env());
    let state = AppState {
        store,
        previews: PreviewRegistry::new(),
        blob: Arc::new(HttpBlobStore::from_env()),
        ads: Arc::new(HttpAdService::from_env()),
        users: Arc::new(HttpUserDirectory::from_env()),
        policy,
        prometheus,
    };
    let app = router(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(
        target = "domix.api",
        api_root = API_ROOT.as_str(),
        require_image = policy.require_image,
        idle_ttl_secs = idle_ttl.as_secs(),
        "listening on {addr}"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    let served = axum::serve(listener, app.into_make_service())
        .await
        .wrap_err("server stopped");
    sweeper.abort();
    served
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
