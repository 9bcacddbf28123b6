//! Analyst HTTP 服务
//!
//! 启动: cargo run --bin analyst-web --features web
//! 监听地址取 [server] bind（默认 0.0.0.0:8000），可用 ANALYST__SERVER__BIND 覆盖。

#[cfg(feature = "web")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;

    use analyst::analyzer::create_analyzer;
    use analyst::config::load_config;
    use analyst::core::install_signal_handlers;
    use analyst::integrations::http_api::{create_router, ApiState};
    use anyhow::Context;

    analyst::observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let analyzer = create_analyzer(&cfg).context("Failed to build analyzer")?;
    let upload_root = cfg.executor.work_root().join("uploads");

    let state = Arc::new(ApiState::new(analyzer, upload_root));
    let app = create_router(state);

    let token = install_signal_handlers();

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.bind))?;
    tracing::info!(
        "Analyst API listening on http://{} (analyzer: {})",
        cfg.server.bind,
        cfg.pipeline.analyzer
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    tracing::info!("Analyst API stopped");
    Ok(())
}

#[cfg(not(feature = "web"))]
fn main() {
    eprintln!("请使用 --features web 编译: cargo run --bin analyst-web --features web");
    std::process::exit(1);
}
