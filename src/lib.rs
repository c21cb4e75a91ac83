//! Snowdraft - 分步大纲到章节草稿的写作工作流服务
//!
//! 架构设计: DDD + CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Story: 步骤账本 + 章节表聚合
//! - Schema: 固定的十步结构与前置依赖
//!
//! 应用层 (application/):
//! - Ports: GenerationClient, StoryRepository, FlightRegistry
//! - Engine: WorkflowEngine, StreamPlayback, ChapterSequencer, StoryAnalyst
//! - Commands / Queries: CQRS 处理器
//!
//! 基础设施层 (infrastructure/):
//! - HTTP: RESTful API + WebSocket
//! - Memory: FlightRegistry 内存实现
//! - Worker: GenerationRunner 后台生成
//! - Persistence: SQLite 存储
//! - Adapters: HTTP / 占位生成客户端
//! - Events: 故事事件发布

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
