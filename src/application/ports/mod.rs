//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod flight_registry;
mod generation_client;
mod repositories;

pub use flight_registry::{
    FlightError, FlightRegistryPort, FlightSnapshot, FlightTicket, PlaybackProgress,
};
pub use generation_client::{
    FragmentStream, GenerationClientPort, GenerationError, GenerationEvent, GenerationPayload,
    GenerationRequest,
};
pub use repositories::{RepositoryError, StoryRepositoryPort};
