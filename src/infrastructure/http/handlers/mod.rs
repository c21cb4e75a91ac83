//! HTTP Handlers

mod chapter;
mod ping;
mod step;
mod story;
mod websocket;

pub use chapter::*;
pub use ping::*;
pub use step::*;
pub use story::*;
pub use websocket::*;
