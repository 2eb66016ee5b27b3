use std::sync::Arc;

use duibi_core::{api, config::Config, ingest::Ingestor, store::SledStore};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    // ----------------------------------------------------------------
    // 0. 加载配置
    // ----------------------------------------------------------------
    let config = Config::from_env()?;
    info!(
        "⚙️  配置加载完成: Host={}:{}, DB={}, max={}, quality={}",
        config.host, config.port, config.db_path, config.max_dimension, config.jpeg_quality
    );

    // ----------------------------------------------------------------
    // 1. 打开存储
    // ----------------------------------------------------------------
    let store = SledStore::open(&config.db_path)?;
    info!("📚 对比库初始化完成: {}", config.db_path);

    // ----------------------------------------------------------------
    // 2. 共享状态
    // ----------------------------------------------------------------
    let state = Arc::new(api::AppState {
        ingestor: Ingestor::with_options(Arc::new(store), config.normalize_options()),
        max_upload_bytes: config.max_upload_bytes,
    });

    // ----------------------------------------------------------------
    // 3. 启动 HTTP 服务
    // ----------------------------------------------------------------
    let app = api::app(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("🚀 API 服务已运行在: http://{}", addr);
    info!("   - POST /upload            : 上传一对图片 (multipart)");
    info!("   - GET  /show/{{key}}        : 查看记录");
    info!("   - GET  /img/{{key}}/{{side}}  : 取左图/右图");
    info!("   - GET  /list              : 按时间倒序列出全部记录");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
