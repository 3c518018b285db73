use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use portfolio_lab::backtest::BacktestEngine;
use portfolio_lab::config::{self, ApplicationConfig, LogConfig};
use portfolio_lab::data_provider::{AssetSelector, BarStore, MarketDataProvider, PoloniexClient};
use portfolio_lab::market_data::{build, MatrixParams, SampleWindower, WindowerParams};
use portfolio_lab::storage::{
    self, BarRepository, InMemoryBarRepository, InMemoryResultRepository, PgBarRepository,
    PgResultRepository, ResultRepository,
};
use portfolio_lab::training::{self, EventSink, RunContext, RunEvent, RunPool, SummaryWriter};
use portfolio_lab::utils::format_timestamp;

#[derive(Parser)]
#[command(name = "portfolio_lab", about = "加密貨幣組合研究：歷史數據、訓練與回測")]
struct Cli {
    /// 使用記憶體存儲，不連接資料庫
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 下載並補齊配置區間內所選資產的歷史數據
    DownloadData,

    /// 在測試集上回測基準策略
    Backtest {
        /// ucrp、ubah 或 best，預設使用配置中的策略
        #[arg(short, long)]
        policy: Option<String>,
    },

    /// 生成訓練包
    Generate {
        #[arg(short, long, default_value_t = 1)]
        repeat: usize,

        /// 訓練包目錄
        #[arg(short, long, default_value = "train_package")]
        dir: PathBuf,

        /// 保留已有的訓練包
        #[arg(long)]
        keep: bool,
    },

    /// 並行執行目錄中的全部訓練包
    Train {
        #[arg(short, long, default_value = "train_package")]
        dir: PathBuf,

        /// 同時執行的運行數，預設使用配置
        #[arg(short, long)]
        processes: Option<usize>,
    },

    /// 執行資料庫遷移
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化配置
    let app_config = config::init_config()?;

    // 初始化日誌系統，guard 需存活到程式結束
    let _guard = init_logging(&app_config.log)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::DownloadData => download_data(app_config, cli.in_memory).await,
        Commands::Backtest { policy } => {
            let policy = policy.unwrap_or_else(|| app_config.backtest.policy.clone());
            run_backtest(app_config, cli.in_memory, &policy).await
        }
        Commands::Generate { repeat, dir, keep } => {
            let created = training::add_packages(&dir, app_config, repeat, !keep)?;
            info!(dir = %dir.display(), indices = ?created, "訓練包生成完成");
            Ok(())
        }
        Commands::Train { dir, processes } => train_all(app_config, cli.in_memory, &dir, processes).await,
        Commands::Migrate => {
            let pool = storage::get_pool().await.context("無法初始化資料庫連接池")?;
            storage::run_migrations(pool).await.context("資料庫遷移執行失敗")?;
            info!("資料庫遷移完成！");
            Ok(())
        }
    }
}

/// 存儲後端
async fn open_repositories(in_memory: bool) -> Result<(Arc<dyn BarRepository>, Arc<dyn ResultRepository>)> {
    if in_memory {
        warn!("使用記憶體存儲，結束後數據不會保留");
        return Ok((
            Arc::new(InMemoryBarRepository::new()),
            Arc::new(InMemoryResultRepository::new()),
        ));
    }

    let pool = storage::get_pool().await.context("無法初始化資料庫連接池")?;
    if !storage::health_check(pool).await {
        return Err(anyhow!("資料庫健康檢查失敗"));
    }
    storage::run_migrations(pool).await?;
    let pool = Arc::new(pool.clone());
    Ok((
        Arc::new(PgBarRepository::new(pool.clone())),
        Arc::new(PgResultRepository::new(pool)),
    ))
}

fn data_sources(
    app_config: &ApplicationConfig,
    bars: Arc<dyn BarRepository>,
) -> Result<(Arc<BarStore>, Arc<AssetSelector>)> {
    let provider: Arc<dyn MarketDataProvider> = Arc::new(PoloniexClient::new(&app_config.provider)?);
    let base = &app_config.provider.base_currency;
    let online = app_config.input.online;

    Ok((
        Arc::new(BarStore::new(bars.clone(), provider.clone(), base.as_str(), online)),
        Arc::new(AssetSelector::new(provider, bars, base.as_str(), online)),
    ))
}

async fn download_data(app_config: &ApplicationConfig, in_memory: bool) -> Result<()> {
    let (bars, _) = open_repositories(in_memory).await?;
    let (store, selector) = data_sources(app_config, bars)?;
    let params = MatrixParams::from_config(&app_config.input)?;

    info!(
        start = %format_timestamp(params.start),
        end = %format_timestamp(params.end),
        assets = params.asset_count,
        "開始下載歷史數據"
    );
    let matrix = build(&store, &selector, &params).await?;
    let assets: Vec<&str> = matrix.assets.iter().map(|a| a.asset_id.as_str()).collect();
    info!(?assets, shape = ?matrix.tensor.data().dim(), "歷史數據已就緒");
    Ok(())
}

async fn run_backtest(app_config: &ApplicationConfig, in_memory: bool, policy: &str) -> Result<()> {
    let (bars, _) = open_repositories(in_memory).await?;
    let (store, selector) = data_sources(app_config, bars)?;
    let params = MatrixParams::from_config(&app_config.input)?;
    let matrix = build(&store, &selector, &params).await?;

    let mut windower = SampleWindower::new(matrix.tensor, matrix.pvm, &WindowerParams::from_config(app_config))?;
    let engine = BacktestEngine::from_config(&app_config.backtest);
    let path = engine.run_benchmark(&mut windower, policy)?;
    let summary = path.summary();

    info!(
        policy,
        portfolio_value = summary.portfolio_value,
        sharpe_ratio = ?summary.sharpe_ratio,
        max_drawdown = summary.max_drawdown,
        log_mean = path.log_mean,
        log_mean_free = path.log_mean_free,
        "回測結果"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn train_all(
    app_config: &ApplicationConfig,
    in_memory: bool,
    dir: &Path,
    processes: Option<usize>,
) -> Result<()> {
    let packages = training::load_packages(dir)?;
    if packages.is_empty() {
        return Err(anyhow!("{} 中沒有訓練包，請先執行 generate", dir.display()));
    }

    let (bars, results) = open_repositories(in_memory).await?;
    let (store, selector) = data_sources(app_config, bars)?;
    let (events, mut receiver) = EventSink::channel();

    let context = RunContext {
        store,
        selector,
        results,
        summary: Some(Arc::new(SummaryWriter::new(&app_config.pool.summary_path))),
        events,
    };

    // 事件收集者
    let collector = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match &event {
                RunEvent::Failed { package_index, kind, message } => {
                    error!(package_index, kind = kind.as_str(), %message, "運行失敗")
                }
                other => info!(package_index = other.package_index(), status = ?other.status(), "運行事件"),
            }
        }
    });

    let pool = RunPool::new(processes.unwrap_or_else(|| app_config.pool.effective_concurrency()));
    let outcomes = pool
        .run_all(packages, |package| training::execute(package, context.clone()))
        .await;
    drop(context);
    collector.await.ok();

    let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
    info!(total = outcomes.len(), failed, "全部訓練包執行完成");
    Ok(())
}

// 初始化日誌系統
fn init_logging(log_config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("portfolio_lab={}", log_config.level.to_lowercase())));
    let json = log_config.format.eq_ignore_ascii_case("json");

    let (file_writer, guard) = match &log_config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "portfolio_lab.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let builder = FmtSubscriber::builder().with_env_filter(filter);
    let result = match (file_writer, json) {
        (Some(writer), true) => tracing::subscriber::set_global_default(
            builder.json().with_writer(std::io::stdout.and(writer)).finish(),
        ),
        (Some(writer), false) => tracing::subscriber::set_global_default(
            builder.with_ansi(false).with_writer(std::io::stdout.and(writer)).finish(),
        ),
        (None, true) => tracing::subscriber::set_global_default(builder.json().finish()),
        (None, false) => tracing::subscriber::set_global_default(builder.finish()),
    };
    result.map_err(|e| anyhow!("設置日誌系統失敗: {}", e))?;

    info!("日誌系統初始化完成");
    Ok(guard)
}
