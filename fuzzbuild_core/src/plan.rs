use crate::config::BaseConfiguration;
use crate::environment::{Environment, compose_environment};
use crate::variant::BuildVariant;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStep {
    Configure,
    Build,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStep::Configure => f.write_str("configure"),
            BuildStep::Build => f.write_str("build"),
        }
    }
}

/// A single external command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Splits a configured command prefix into program and leading args.
    /// An empty prefix (rejected by `BaseConfiguration::validate`) yields an
    /// empty program, which fails to spawn.
    fn from_prefix(prefix: &[String]) -> Self {
        match prefix.split_first() {
            Some((program, args)) => Self {
                program: program.clone(),
                args: args.to_vec(),
            },
            None => Self {
                program: String::new(),
                args: Vec::new(),
            },
        }
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Everything needed to build one variant, with nothing executed yet.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    pub variant: String,
    pub output_directory: PathBuf,
    pub working_dir: Option<PathBuf>,
    /// Variables the plan sets or changes relative to the ambient environment.
    pub env_overrides: BTreeMap<String, String>,
    pub configure: Invocation,
    pub build: Invocation,
    #[serde(skip)]
    pub environment: Environment,
}

impl BuildPlan {
    pub fn invocation(&self, step: BuildStep) -> &Invocation {
        match step {
            BuildStep::Configure => &self.configure,
            BuildStep::Build => &self.build,
        }
    }
}

/// `<configure> <base flags> <variant flags> -Doptimization=<level> <output dir>`
pub fn configure_invocation(config: &BaseConfiguration, variant: &BuildVariant) -> Invocation {
    let mut invocation = Invocation::from_prefix(&config.tools.configure);
    invocation
        .args
        .extend(config.base.configure_flags.iter().cloned());
    invocation
        .args
        .extend(variant.extra_configure_flags.iter().cloned());
    invocation
        .args
        .push(format!("-Doptimization={}", variant.optimization_level));
    invocation
        .args
        .push(variant.output_directory.to_string_lossy().into_owned());
    invocation
}

/// `<build runner> -C <output dir> <targets...>`
pub fn build_invocation(config: &BaseConfiguration, variant: &BuildVariant) -> Invocation {
    let mut invocation = Invocation::from_prefix(&config.tools.build);
    invocation.args.push("-C".to_string());
    invocation
        .args
        .push(variant.output_directory.to_string_lossy().into_owned());
    invocation.args.extend(config.base.targets.iter().cloned());
    invocation
}

pub fn plan_variant(
    config: &BaseConfiguration,
    ambient: &Environment,
    variant: &BuildVariant,
) -> BuildPlan {
    let environment = compose_environment(ambient, variant);
    BuildPlan {
        variant: variant.name.clone(),
        output_directory: variant.output_directory.clone(),
        working_dir: config.base.working_dir.clone(),
        env_overrides: environment.overrides_against(ambient),
        configure: configure_invocation(config, variant),
        build: build_invocation(config, variant),
        environment,
    }
}
