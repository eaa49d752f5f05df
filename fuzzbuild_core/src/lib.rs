pub mod config;
pub mod environment;
pub mod executor;
pub mod plan;
pub mod variant;

pub use config::{BaseConfiguration, ConfigError};
pub use environment::{Environment, compose_environment};
pub use executor::{
    BuildError, BuildExecutor, CommandRunner, ExecutionStatus, RunSummary, SystemRunner, run_all,
};
pub use plan::{BuildPlan, BuildStep, Invocation, plan_variant};
pub use variant::{BuildVariant, CatalogError, OptimizationLevel, list_variants, select_variants};
