//! KDL configuration parsing for the wheelhouse build matrix.
//!
//! This crate handles parsing of:
//! - Matrix definitions (wheelhouse.kdl)
//! - Variable interpolation in step commands

pub mod error;
pub mod matrix;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use matrix::{
    GitSettings, InstallConfig, StepConfig, TestConfig, WheelhouseConfig, load_config,
    parse_config,
};
pub use variables::{
    CellVars, IdentityVars, RunVars, TriggerVars, VariableContext, VariableContextBuilder,
};
