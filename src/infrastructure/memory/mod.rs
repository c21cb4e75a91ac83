//! Memory Layer - In-Memory State Management
//!
//! 实现 FlightRegistry，管理每个故事活跃生成的内存状态

mod flight_registry;

pub use flight_registry::InMemoryFlightRegistry;
