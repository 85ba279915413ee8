pub mod health;
pub mod stream;

pub use health::{health_handler, health_live_handler, metrics_handler};
pub use stream::stream_handler;
