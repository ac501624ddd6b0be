//! MediScan服务器主程序

mod app_config;

use anyhow::{Context, Result};
use app_config::{AppConfig, CliOverrides};
use clap::Parser;
use mediscan_core::utils::mask_secret;
use mediscan_database::{DatabasePool, MemoryStore, PgRecordStore, RecordStore};
use mediscan_integration::{PredictionClient, TrainingClient};
use mediscan_storage::{ImageStore, ReportStore};
use mediscan_web::{AppState, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// MediScan服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "mediscan-server")]
#[command(about = "MediScan 胸部X光AI筛查记录服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "mediscan.toml")]
    config: String,

    /// 监听地址
    #[arg(long)]
    host: Option<String>,

    /// 监听端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn RecordStore>> {
    match &config.database.url {
        Some(url) => {
            let pool = DatabasePool::connect(url, config.database.max_connections).await?;
            let store = PgRecordStore::new(pool);
            store.create_tables().await?;
            info!("数据库表结构已就绪");
            Ok(Arc::new(store))
        }
        None => {
            warn!("未配置数据库连接，使用内存存储（重启后数据丢失，仅用于开发）");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    info!("启动MediScan服务器...");

    let overrides = CliOverrides {
        host: args.host.clone(),
        port: args.port,
    };
    let config = AppConfig::load(&args.config, &overrides, None)?;

    info!("MediScan服务器配置:");
    info!("  监听地址: {}", config.listen_addr());
    info!(
        "  数据库: {}",
        config
            .database
            .url
            .as_deref()
            .map(mask_secret)
            .unwrap_or_else(|| "内存存储".to_string())
    );
    info!("  上传目录: {}", config.storage.upload_dir);
    info!("  报告目录: {}", config.storage.report_dir);
    info!("  上传上限: {} MB", config.storage.max_upload_mb);
    info!("  分类服务: {}", config.prediction.base_url);

    let store = open_store(&config).await?;

    let images = ImageStore::new(&config.storage.upload_dir, config.max_upload_bytes());
    let reports = ReportStore::new(&config.storage.report_dir);
    images.ensure_dir().await?;
    reports.ensure_dir().await?;

    let timeout = Duration::from_secs(config.prediction.timeout_secs);
    let classifier = Arc::new(PredictionClient::new(&config.prediction.base_url, timeout)?);
    let training = TrainingClient::new(&config.prediction.base_url, timeout)?;

    let state = AppState::new(
        store,
        images,
        reports,
        classifier,
        training,
        config.server.expose_error_details,
    );

    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .with_context(|| format!("无效的监听地址: {}", config.listen_addr()))?;

    // 启动服务器
    if let Err(e) = WebServer::new(addr, state).run().await {
        error!("服务器启动失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}
