//! GeoTask CLI
//!
//! 管理带位置的任务，并在靠近任务地点时发送通知

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use geotask_monitor::notification::{LocalFileChannel, NotificationLog, WebhookChannel};
use geotask_monitor::task::store::TaskPatch;
use geotask_monitor::task::normalize_radius;
use geotask_monitor::{
    CycleReport, Engine, EngineConfig, NotificationDispatcher, PositionMode, PositionPlatform,
    SimulatedPlatform, Task, TaskStore, TickOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "geotask")]
#[command(about = "GeoTask - 带位置的任务提醒，靠近任务地点时通知")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/geotask/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 新建任务
    Add {
        /// 任务标题
        title: String,
        /// 任务描述（作为通知正文）
        #[arg(long, short)]
        description: Option<String>,
        /// 纬度
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// 经度
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// 触发半径（米，50-1000，步长 50）
        #[arg(long, short)]
        radius: Option<f64>,
        /// 地址备注
        #[arg(long)]
        address: Option<String>,
    },
    /// 列出所有任务
    List {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 标记任务完成
    Complete {
        /// 任务 ID
        id: String,
    },
    /// 重新打开已完成的任务
    Reopen {
        /// 任务 ID
        id: String,
    },
    /// 删除任务
    Delete {
        /// 任务 ID
        id: String,
    },
    /// 查找指定坐标附近的任务
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// 最大距离（米，默认取配置）
        #[arg(long)]
        max_distance: Option<f64>,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 以给定坐标执行一次评估周期
    Check {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Dry-run 模式（只打印不发送）
        #[arg(long)]
        dry_run: bool,
    },
    /// 持续监控，直到 Ctrl+C
    Watch {
        /// 轮询间隔（秒，默认取配置）
        #[arg(long, short)]
        interval: Option<u64>,
        /// 固定纬度
        #[arg(long, allow_hyphen_values = true, requires = "lon")]
        lat: Option<f64>,
        /// 固定经度
        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lon: Option<f64>,
        /// JSONL 轨迹文件
        #[arg(long, conflicts_with_all = ["lat", "lon"])]
        track: Option<PathBuf>,
        /// 使用持续监听的最近定位，而不是每个周期单次定位
        #[arg(long)]
        stream: bool,
        /// Dry-run 模式（只打印不发送）
        #[arg(long)]
        dry_run: bool,
    },
    /// 查看最近的通知
    Notifications {
        /// 显示最近 N 条
        #[arg(long, short, default_value = "10")]
        limit: usize,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    }
}

fn build_dispatcher(config: &EngineConfig, dry_run: bool) -> NotificationDispatcher {
    let mut dispatcher = NotificationDispatcher::new().with_dry_run(dry_run);
    dispatcher.register_channel(Arc::new(LocalFileChannel::default()));
    if let Some(webhook) = &config.webhook {
        match WebhookChannel::new(webhook.clone()) {
            Ok(channel) => dispatcher.register_channel(Arc::new(channel)),
            Err(e) => warn!(error = %e, "Webhook channel disabled"),
        }
    }
    dispatcher
}

fn build_platform(
    lat: Option<f64>,
    lon: Option<f64>,
    track: Option<&PathBuf>,
) -> Result<Arc<dyn PositionPlatform>> {
    match (lat, lon, track) {
        (_, _, Some(track)) => Ok(Arc::new(SimulatedPlatform::from_track_file(track)?)),
        (Some(lat), Some(lon), None) => Ok(Arc::new(SimulatedPlatform::fixed(lat, lon))),
        _ => Err(anyhow!("需要指定 --lat/--lon 或 --track")),
    }
}

fn print_task(task: &Task) {
    let status = if task.completed { "✅" } else { "⏳" };
    println!(
        "  {} {} | {} | ({:.6}, {:.6}) 半径 {}m",
        status, task.id, task.title, task.location.latitude, task.location.longitude, task.radius
    );
    if let Some(address) = &task.location.address {
        println!("      地址: {}", address);
    }
}

fn print_report(report: &CycleReport) {
    if let Some(reason) = &report.skipped {
        println!("本周期已跳过: {}", reason);
        return;
    }
    println!(
        "评估 {} 个任务，{} 个在范围内，通知 {} 个，失败 {} 个",
        report.evaluated,
        report.inside,
        report.notified.len(),
        report.failed.len()
    );
    for id in &report.notified {
        println!("  📍 已通知: {}", id);
    }
    for id in &report.failed {
        println!("  ❌ 通知失败: {}", id);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug geotask watch --lat 31.23 --lon 121.47
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("geotask_monitor=info,geotask=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    let store = TaskStore::new();

    match cli.command {
        Commands::Add { title, description, lat, lon, radius, address } => {
            let radius = radius.map(normalize_radius).unwrap_or_else(|| config.default_radius());
            let mut task = Task::new(title, lat, lon, radius);
            if let Some(description) = description {
                task = task.with_description(description);
            }
            if let Some(address) = address {
                task = task.with_address(address);
            }
            let id = store.add(task)?;
            println!("已创建任务: {} (半径 {}m)", id, radius);
        }
        Commands::List { json } => {
            let tasks = store.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                let pending: Vec<&Task> = tasks.iter().filter(|t| !t.completed).collect();
                let completed: Vec<&Task> = tasks.iter().filter(|t| t.completed).collect();
                if tasks.is_empty() {
                    println!("还没有任务，使用 `geotask add` 创建第一个任务");
                }
                if !pending.is_empty() {
                    println!("待办任务 ({}):", pending.len());
                    pending.iter().for_each(|t| print_task(t));
                }
                if !completed.is_empty() {
                    println!("已完成 ({}):", completed.len());
                    completed.iter().for_each(|t| print_task(t));
                }
            }
        }
        Commands::Complete { id } => {
            let task = store.set_completed(&id, true)?;
            println!("已完成: {}", task.title);
        }
        Commands::Reopen { id } => {
            let task = store.update(
                &id,
                TaskPatch {
                    completed: Some(false),
                    ..Default::default()
                },
            )?;
            println!("已重新打开: {}", task.title);
        }
        Commands::Delete { id } => {
            if store.delete(&id)? {
                println!("已删除: {}", id);
            } else {
                eprintln!("未找到任务: {}", id);
            }
        }
        Commands::Nearby { lat, lon, max_distance, json } => {
            let max_distance = max_distance.unwrap_or(config.nearby_max_distance_meters);
            let nearby = store.find_nearby(lat, lon, max_distance)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&nearby)?);
            } else {
                println!("{}m 内发现 {} 个任务:\n", max_distance, nearby.len());
                for item in &nearby {
                    println!("  {:>7.1}m | {} | {}", item.distance_meters, item.task.id, item.task.title);
                }
            }
        }
        Commands::Check { lat, lon, dry_run } => {
            let mut config = config;
            config.position_mode = PositionMode::OneShot;
            let dispatcher = build_dispatcher(&config, dry_run);
            let engine = Engine::new(
                config,
                Arc::new(SimulatedPlatform::fixed(lat, lon)),
                Arc::new(store),
                dispatcher,
            );
            match engine.check_now().await {
                TickOutcome::Completed(report) => print_report(&report),
                TickOutcome::Skipped => println!("已有周期在执行"),
            }
        }
        Commands::Watch { interval, lat, lon, track, stream, dry_run } => {
            let mut config = config;
            if let Some(interval) = interval {
                config.poll_interval_secs = interval;
            }
            if stream {
                config.position_mode = PositionMode::LatestFromStream;
            }
            config.validate()?;

            let platform = build_platform(lat, lon, track.as_ref())?;
            let dispatcher = build_dispatcher(&config, dry_run);
            let interval_secs = config.poll_interval_secs;
            let engine = Engine::new(config, platform, Arc::new(store), dispatcher);

            engine.start().await?;
            eprintln!("GeoTask 监控启动，轮询间隔: {}秒，按 Ctrl+C 停止", interval_secs);

            tokio::signal::ctrl_c().await?;
            info!("Ctrl+C received, shutting down");
            engine.stop().await;
        }
        Commands::Notifications { limit, json } => {
            let log = NotificationLog::default();
            let records = log.read_recent(limit);
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("暂无通知记录");
            } else {
                for record in records {
                    println!(
                        "  {} | {} | {}",
                        record.ts.format("%Y-%m-%d %H:%M:%S"),
                        record.title,
                        record.body
                    );
                }
            }
        }
    }

    Ok(())
}
