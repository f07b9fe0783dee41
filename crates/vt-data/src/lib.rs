pub mod dataset;
pub mod loader;
pub mod manifest;
pub mod storage;
pub mod subsample;

pub use dataset::*;
pub use loader::*;
pub use manifest::*;
pub use storage::*;
pub use subsample::*;
