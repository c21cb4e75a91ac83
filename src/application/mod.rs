//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（GenerationClient、StoryRepository、FlightRegistry）
//! - engine: 工作流引擎（单飞生成、流式回放、逐章起草、大纲审阅）
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod engine;
pub mod error;
pub mod ports;
pub mod queries;

// Re-exports
pub use commands::{
    // Story commands
    AnalyzeStory,
    CreateStory,
    DeleteStory,
    SetWritingStyle,
    // Step commands
    AdvanceStep,
    CancelGeneration,
    DeliveryMode,
    GenerateStep,
    RefineStep,
    RollbackStep,
    // Chapter commands
    GenerateChapter,
    RefineChapter,
    RegenerateChapter,
    // Handlers
    handlers::{
        AdvanceStepHandler, AnalyzeStoryHandler, CancelGenerationHandler,
        CancelGenerationResponse, ChapterGenerationHandler, CreateStoryHandler,
        CreateStoryResponse, DeleteStoryHandler, PreparedAnalysis, PreparedChapter, PreparedStep,
        RollbackStepHandler, SetWritingStyleHandler, StepGenerationHandler,
        StepTransitionResponse,
    },
};

pub use engine::{
    AnalysisOutcome, ChapterOutcome, ChapterSequencer, Delivery, GenerationTask, NoopObserver,
    PlaybackObserver, PlaybackOutcome, StepOutcome, StoryAnalyst, StreamPlayback, WorkflowEngine,
};

pub use error::ApplicationError;

pub use ports::{
    // Flight registry
    FlightError,
    FlightRegistryPort,
    FlightSnapshot,
    FlightTicket,
    PlaybackProgress,
    // Generation client
    FragmentStream,
    GenerationClientPort,
    GenerationError,
    GenerationEvent,
    GenerationPayload,
    GenerationRequest,
    // Repositories
    RepositoryError,
    StoryRepositoryPort,
};

pub use queries::{
    GetGenerationStatus,
    GetStory,
    GetStoryBySlug,
    ListStories,
    // Handlers
    handlers::{
        ChapterResponse, GenerationStatusResponse, GetGenerationStatusHandler,
        GetStoryBySlugHandler, GetStoryHandler, ListStoriesHandler, StepResponse, StoryResponse,
        StorySummaryResponse,
    },
};
