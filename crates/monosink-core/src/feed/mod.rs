pub mod pull;
pub mod push;
pub mod queue;

pub use pull::*;
pub use push::*;
pub use queue::*;
