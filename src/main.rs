use std::sync::Arc;
use std::time::Duration;

use agentbus_core::logging::init_logging_from_config;
use agentbus_core::AppConfig;
use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use tracing::{error, info, warn};

mod app;
mod shutdown;

use app::{AppMode, Application};
use shutdown::{wait_for_signal, ShutdownManager};

fn cli() -> Command {
    Command::new("agentbus")
        .version(env!("CARGO_PKG_VERSION"))
        .about("智能体消息总线与进程监管控制平面")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，缺省时查找默认位置")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"])
                .global(true),
        )
        .subcommand(
            Command::new("cluster")
                .about("在本地集群上运行一批演示任务")
                .arg(
                    Arg::new("tasks")
                        .long("tasks")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .default_value("6"),
                )
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .value_name("N")
                        .value_parser(value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("supervise")
                .about("以子进程方式启动并监督演示代理")
                .arg(
                    Arg::new("agents")
                        .long("agents")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .default_value("2"),
                ),
        )
        .subcommand(
            Command::new("agent")
                .about("作为被监督的代理进程运行")
                .arg(
                    Arg::new("agent-id")
                        .long("agent-id")
                        .value_name("ID")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("pubsub")
                .about("通过本地IPC传输层收发心跳消息")
                .arg(
                    Arg::new("messages")
                        .long("messages")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .default_value("10"),
                ),
        )
}

fn parse_app_mode(matches: &ArgMatches, config: &mut AppConfig) -> Result<AppMode> {
    match matches.subcommand() {
        Some(("cluster", sub)) => {
            if let Some(workers) = sub.get_one::<usize>("workers") {
                config.cluster.max_workers = Some(*workers);
            }
            Ok(AppMode::Cluster {
                tasks: sub.get_one::<usize>("tasks").copied().unwrap_or(6),
            })
        }
        Some(("supervise", sub)) => Ok(AppMode::Supervise {
            agents: sub.get_one::<usize>("agents").copied().unwrap_or(2),
        }),
        Some(("agent", sub)) => {
            let agent_id = sub
                .get_one::<String>("agent-id")
                .cloned()
                .context("agent模式需要 --agent-id")?;
            Ok(AppMode::Agent { agent_id })
        }
        Some(("pubsub", sub)) => Ok(AppMode::PubSub {
            messages: sub.get_one::<usize>("messages").copied().unwrap_or(10),
        }),
        Some((other, _)) => Err(anyhow::anyhow!("不支持的运行模式: {other}")),
        None => Err(anyhow::anyhow!("缺少运行模式")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config_path = matches.get_one::<String>("config");

    let mut config = AppConfig::load(config_path.map(String::as_str))
        .with_context(|| format!("加载配置失败: {}", config_path.map_or("<默认>", String::as_str)))?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.logging.level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.logging.format = format.clone();
    }
    init_logging_from_config(&config.logging).context("初始化日志失败")?;

    let mode = parse_app_mode(&matches, &mut config)?;
    info!("Starting agentbus");

    let app = Arc::new(Application::new(config, mode));
    let shutdown_manager = ShutdownManager::new();
    let mut app_handle = {
        let app = Arc::clone(&app);
        let shutdown_rx = shutdown_manager.subscribe();
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    tokio::select! {
        result = &mut app_handle => {
            return match result {
                Ok(Ok(())) => {
                    info!("agentbus finished");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!("Application failed: {e:#}");
                    Err(e)
                }
                Err(e) => Err(anyhow::anyhow!("应用任务异常退出: {e}")),
            };
        }
        _ = wait_for_signal() => {
            info!("Shutdown signal received, stopping");
        }
    }

    shutdown_manager.shutdown();
    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(Ok(()))) => info!("agentbus stopped gracefully"),
        Ok(Ok(Err(e))) => error!("Application failed during shutdown: {e:#}"),
        Ok(Err(e)) => error!("Application task panicked: {e}"),
        Err(_) => warn!("Graceful shutdown timed out, exiting"),
    }
    Ok(())
}
