//! Snowdraft - 分步大纲到章节草稿的写作工作流服务
//!
//! - Domain: story/, schema
//! - Application: engine, commands, queries, ports
//! - Infrastructure: http, memory, worker, persistence, adapters, events

use std::sync::Arc;
use std::time::Duration;

use snowdraft::application::GenerationClientPort;
use snowdraft::config::{load_config, print_config, LogConfig};
use snowdraft::infrastructure::adapters::{
    FakeGenerationClient, HttpGenerationClient, HttpGenerationClientConfig,
};
use snowdraft::infrastructure::events::EventPublisher;
use snowdraft::infrastructure::http::{AppState, HttpServer, ServerConfig};
use snowdraft::infrastructure::memory::InMemoryFlightRegistry;
use snowdraft::infrastructure::persistence::sqlite::{
    create_pool, run_migrations, DatabaseConfig, SqliteStoryRepository,
};
use snowdraft::infrastructure::worker::GenerationRunnerConfig;

fn init_tracing(log: &LogConfig) {
    let log_filter = format!("{},snowdraft={},tower_http=debug", log.level, log.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config.log);
    tracing::info!("Snowdraft - outline-to-draft workflow service");
    print_config(&config);

    // 确保数据目录存在
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // 初始化数据库
    let db_config = DatabaseConfig {
        database_url: config.database.database_url(),
        max_connections: config.database.max_connections,
    };
    let pool = create_pool(&db_config).await?;
    run_migrations(&pool).await?;

    let story_repo = Arc::new(SqliteStoryRepository::new(pool));

    // 创建生成客户端
    let generation_client: Arc<dyn GenerationClientPort> = if config.generator.fake {
        tracing::warn!("Using built-in placeholder generator");
        Arc::new(FakeGenerationClient::new().with_fragment_delay(Duration::from_millis(
            config.generator.fake_fragment_delay_ms,
        )))
    } else {
        let client_config = HttpGenerationClientConfig {
            base_url: config.generator.url.clone(),
            timeout_secs: config.generator.timeout_secs,
            max_retries: config.generator.max_retries,
        };
        let client = HttpGenerationClient::new(client_config)?;
        if !client.health_check().await {
            tracing::warn!(url = %config.generator.url, "Generation service is not reachable yet");
        }
        Arc::new(client)
    };

    let flights = InMemoryFlightRegistry::new().arc();
    let event_publisher = EventPublisher::with_capacity(config.playback.event_capacity).arc();

    let runner_config = GenerationRunnerConfig {
        max_concurrent: config.generator.max_concurrent,
        progress_batch: config.playback.progress_batch,
    };
    let state = AppState::new(
        story_repo,
        generation_client,
        flights,
        event_publisher,
        runner_config,
    );

    let server_config = ServerConfig::new(&config.server.host, config.server.port);
    let server = HttpServer::new(server_config, state);

    // 启动服务器（带优雅关闭）
    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
