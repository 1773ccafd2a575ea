pub mod config;
pub mod error;
pub mod types;

pub use config::{
    Config, PipelineConfig, PollConfig, QueryTemplate, RelevanceConfig, SpacingConfig,
};
pub use error::LeavenError;
pub use types::*;
