pub mod config;
pub mod factory;
pub mod hub;
pub mod preprocessor;
pub mod tokens;

pub use config::*;
pub use factory::*;
pub use hub::*;
pub use preprocessor::*;
pub use tokens::*;
