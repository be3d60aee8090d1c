pub mod audio;
pub mod source;
pub mod storage;
pub mod types;

pub use audio::*;
pub use source::*;
pub use storage::*;
pub use types::*;
