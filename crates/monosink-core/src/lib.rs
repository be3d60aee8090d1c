pub mod config;
pub mod error;
pub mod feed;
pub mod latency;
pub mod negotiator;
pub mod sink;
pub mod state;
pub mod stats;

pub use config::*;
pub use error::*;
pub use feed::*;
pub use latency::*;
pub use negotiator::*;
pub use sink::*;
pub use state::*;
pub use stats::*;
