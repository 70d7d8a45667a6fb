pub mod alerts;
pub mod config;
pub mod error;
pub mod file_config;
pub mod playbooks;
pub mod sync;
pub mod tasks;
pub mod types;

pub use alerts::*;
pub use config::Config;
pub use error::{PipelineError, PipelineResult, RepoResultExt};
pub use file_config::{load_rules, RulesConfig};
pub use playbooks::*;
pub use sync::*;
pub use tasks::*;
pub use types::*;
