//! Neu 翻译 HTTP 服务
//!
//! 启动: cargo run --bin neu-web --features web
//! 监听地址取自 [web].bind，可用 NEU__WEB__BIND 覆盖

use std::sync::Arc;

use neu_translator::config::load_config;
use neu_translator::session::SessionRegistry;
use neu_translator::{create_agent_components, observability, web};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None)?;
    tokio::fs::create_dir_all(&cfg.app.documents_root).await?;

    let components = Arc::new(create_agent_components(&cfg).await?);
    let registry = Arc::new(SessionRegistry::new(components, cfg.session.idle_timeout_secs));
    web::serve(registry, &cfg.web.bind).await
}
