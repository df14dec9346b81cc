//! 可观测性：tracing 订阅器
//!
//! 默认级别 info，可用 RUST_LOG 覆盖（如 `RUST_LOG=neu_translator=debug`）。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 安装全局订阅器；已安装时 panic（仅供 main 调用）
pub fn init() {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer())
        .init();
}

/// 安装全局订阅器；已安装时返回 false
pub fn try_init() -> bool {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_refused() {
        try_init();
        assert!(!try_init());
    }
}
