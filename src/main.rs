use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use jobhost::{AppConfig, Application, ShutdownManager};
use jobhost_config::{LogFormat, LogLevel};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 排空超时之外留给调度循环退出的余量
const SHUTDOWN_GRACE_SECONDS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("jobhost")
        .version(env!("CARGO_PKG_VERSION"))
        .about("进程内后台任务宿主")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，缺省时依次查找 config/jobhost.toml 和 jobhost.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("<默认路径>")))?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.parse::<LogLevel>().map_err(anyhow::Error::msg)?;
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.parse::<LogFormat>().map_err(anyhow::Error::msg)?;
    }

    init_logging(config.logging.level, config.logging.format)?;

    info!(
        config = config_path.unwrap_or("<默认路径>"),
        "启动后台任务宿主"
    );

    let shutdown_timeout =
        Duration::from_secs(config.queue.drain_timeout_seconds + SHUTDOWN_GRACE_SECONDS);
    let app = Arc::new(Application::new(config));
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let app = Arc::clone(&app);
        let shutdown = shutdown_manager.subscribe();
        tokio::spawn(async move { app.run(shutdown).await })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");

    match shutdown_manager
        .shutdown_with_timeout(app_handle, shutdown_timeout)
        .await
    {
        Some(Ok(Ok(stats))) => {
            info!(
                processed = stats.processed,
                failed = stats.failed,
                "应用已优雅关闭"
            );
        }
        Some(Ok(Err(e))) => {
            error!("应用运行失败: {e:#}");
        }
        Some(Err(e)) => {
            error!("应用关闭时发生错误: {e}");
        }
        None => {
            warn!("应用关闭超时，强制退出");
        }
    }

    info!("后台任务宿主已退出");
    Ok(())
}

/// 初始化日志系统，`RUST_LOG` 优先于配置的级别
fn init_logging(level: LogLevel, format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        LogFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
    }

    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
