use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use relay_core::database;
use relay_core::dispatch::HttpDispatcher;
use relay_core::logging;
use relay_core::web::routes::router;
use relay_core::web::state::AppState;
use relay_core::workers::{
    self, CleanupWorker, RequeueWorker, RetryReplyWorker, SendWorker, Shutdown, WorkerContext,
};
use relay_core::RelayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let config = Arc::new(RelayConfig::from_env().context("loading configuration")?);
    let pool = database::open_pool(&config.database_url)
        .await
        .context("opening database")?;
    let dispatcher = Arc::new(HttpDispatcher::new(config.request_timeout())?);

    let ctx = WorkerContext {
        pool: pool.clone(),
        config: config.clone(),
        dispatcher,
    };
    let shutdown = Arc::new(Shutdown::new());
    let worker_handles = vec![
        workers::spawn(Arc::new(SendWorker::new(ctx.clone())), shutdown.clone()),
        workers::spawn(Arc::new(RequeueWorker::new(ctx.clone())), shutdown.clone()),
        workers::spawn(Arc::new(RetryReplyWorker::new(ctx.clone())), shutdown.clone()),
        workers::spawn(Arc::new(CleanupWorker::new(ctx.clone())), shutdown.clone()),
    ];

    let app = router(AppState::new(pool, config.clone()));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.listen_port))
        .await
        .context("binding listener")?;

    info!(
        node_id = %config.node_id,
        port = config.listen_port,
        "relay listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("serving")?;

    info!("shutting down");
    shutdown.trigger();
    for handle in worker_handles {
        let _ = handle.await;
    }

    Ok(())
}
