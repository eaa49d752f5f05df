use crate::config::{BaseConfiguration, ConfigError};
use crate::environment::Environment;
use crate::plan::{BuildPlan, BuildStep, Invocation, plan_variant};
use crate::variant::BuildVariant;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Ok,
    Failed {
        code: Option<i32>,
        description: String,
    },
}

impl ExecutionStatus {
    pub fn from_exit_status(status: ExitStatus) -> Self {
        if status.success() {
            return ExecutionStatus::Ok;
        }
        let description = if let Some(code) = status.code() {
            format!("Exited with code {code}")
        } else {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                match status.signal() {
                    Some(signal) => format!("Terminated by signal {signal}"),
                    None => "Exited abnormally".to_string(),
                }
            }
            #[cfg(not(unix))]
            {
                "Exited abnormally".to_string()
            }
        };
        ExecutionStatus::Failed {
            code: status.code(),
            description,
        }
    }
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Variant '{variant}': failed to spawn {step} command '{program}': {source}")]
    Spawn {
        variant: String,
        step: BuildStep,
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Variant '{variant}': {step} command failed: {description}")]
    CommandFailed {
        variant: String,
        step: BuildStep,
        code: Option<i32>,
        description: String,
    },
}

impl BuildError {
    pub fn step(&self) -> BuildStep {
        match self {
            BuildError::Spawn { step, .. } | BuildError::CommandFailed { step, .. } => *step,
        }
    }

    pub fn variant(&self) -> &str {
        match self {
            BuildError::Spawn { variant, .. } | BuildError::CommandFailed { variant, .. } => {
                variant
            }
        }
    }

    /// Exit code to hand back to the caller: the child's own code when it
    /// exited with one, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::CommandFailed {
                code: Some(code), ..
            } if *code != 0 => *code,
            _ => 1,
        }
    }
}

/// Runs one external command to completion.
pub trait CommandRunner {
    fn run(
        &mut self,
        invocation: &Invocation,
        environment: &Environment,
        working_dir: Option<&Path>,
    ) -> Result<ExecutionStatus, std::io::Error>;
}

/// Spawns real child processes and blocks until they exit.
///
/// The child sees exactly the composed environment and inherits stdio, so
/// the tools' own diagnostics reach the terminal untouched.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &mut self,
        invocation: &Invocation,
        environment: &Environment,
        working_dir: Option<&Path>,
    ) -> Result<ExecutionStatus, std::io::Error> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        cmd.env_clear();
        cmd.envs(environment.iter());
        if let Some(cwd) = working_dir {
            cmd.current_dir(cwd);
        }
        let status = cmd.status()?;
        Ok(ExecutionStatus::from_exit_status(status))
    }
}

/// Turns variants into configure + build child processes.
pub struct BuildExecutor<R: CommandRunner> {
    config: BaseConfiguration,
    ambient: Environment,
    runner: R,
}

impl BuildExecutor<SystemRunner> {
    pub fn system(config: BaseConfiguration) -> Result<Self, ConfigError> {
        Self::new(config, Environment::ambient(), SystemRunner)
    }
}

impl<R: CommandRunner> BuildExecutor<R> {
    pub fn new(
        config: BaseConfiguration,
        ambient: Environment,
        runner: R,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ambient,
            runner,
        })
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn plan(&self, variant: &BuildVariant) -> BuildPlan {
        plan_variant(&self.config, &self.ambient, variant)
    }

    /// Configures then builds `variant`. The build step only runs if
    /// configure exited zero.
    pub fn execute(&mut self, variant: &BuildVariant) -> Result<(), BuildError> {
        let plan = self.plan(variant);
        info!(
            variant = %plan.variant,
            output_directory = %plan.output_directory.display(),
            "Building variant"
        );
        self.run_step(&plan, BuildStep::Configure)?;
        self.run_step(&plan, BuildStep::Build)?;
        info!(variant = %plan.variant, "Variant built");
        Ok(())
    }

    fn run_step(&mut self, plan: &BuildPlan, step: BuildStep) -> Result<(), BuildError> {
        let invocation = plan.invocation(step);
        debug!(variant = %plan.variant, %step, command = %invocation, "Running");

        let status = self
            .runner
            .run(invocation, &plan.environment, plan.working_dir.as_deref())
            .map_err(|source| BuildError::Spawn {
                variant: plan.variant.clone(),
                step,
                program: invocation.program.clone(),
                source,
            })?;

        match status {
            ExecutionStatus::Ok => Ok(()),
            ExecutionStatus::Failed { code, description } => Err(BuildError::CommandFailed {
                variant: plan.variant.clone(),
                step,
                code,
                description,
            }),
        }
    }
}

/// Output directories produced by a completed run, in build order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub built: Vec<PathBuf>,
}

/// Builds every variant in order and stops at the first failure.
pub fn run_all<R: CommandRunner>(
    variants: &[BuildVariant],
    executor: &mut BuildExecutor<R>,
) -> Result<RunSummary, BuildError> {
    variants
        .iter()
        .try_fold(RunSummary::default(), |mut summary, variant| {
            executor.execute(variant).inspect_err(|e| error!("{e}"))?;
            summary.built.push(variant.output_directory.clone());
            Ok(summary)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::list_variants;
    use std::ffi::OsStr;

    #[derive(Debug, Clone)]
    struct RecordedCall {
        program: String,
        args: Vec<String>,
        environment: Environment,
    }

    /// Records every call; fails the call with index `fail_at` (if any).
    #[derive(Default)]
    struct RecordingRunner {
        calls: Vec<RecordedCall>,
        fail_at: Option<(usize, i32)>,
    }

    impl RecordingRunner {
        fn failing_at(call: usize, code: i32) -> Self {
            Self {
                calls: Vec::new(),
                fail_at: Some((call, code)),
            }
        }

        fn configure_targets(&self) -> Vec<&str> {
            self.calls
                .iter()
                .filter(|c| c.program == "meson")
                .filter_map(|c| c.args.last().map(String::as_str))
                .collect()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(
            &mut self,
            invocation: &Invocation,
            environment: &Environment,
            _working_dir: Option<&Path>,
        ) -> Result<ExecutionStatus, std::io::Error> {
            let index = self.calls.len();
            self.calls.push(RecordedCall {
                program: invocation.program.clone(),
                args: invocation.args.clone(),
                environment: environment.clone(),
            });
            match self.fail_at {
                Some((at, code)) if at == index => Ok(ExecutionStatus::Failed {
                    code: Some(code),
                    description: format!("Exited with code {code}"),
                }),
                _ => Ok(ExecutionStatus::Ok),
            }
        }
    }

    struct SpawnFailRunner;

    impl CommandRunner for SpawnFailRunner {
        fn run(
            &mut self,
            _invocation: &Invocation,
            _environment: &Environment,
            _working_dir: Option<&Path>,
        ) -> Result<ExecutionStatus, std::io::Error> {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory",
            ))
        }
    }

    fn executor_with(runner: RecordingRunner) -> BuildExecutor<RecordingRunner> {
        BuildExecutor::new(BaseConfiguration::default(), Environment::new(), runner).unwrap()
    }

    #[test]
    fn all_variants_run_configure_then_build_in_order() {
        let mut executor = executor_with(RecordingRunner::default());
        let summary = run_all(&list_variants(), &mut executor).unwrap();

        let calls = &executor.runner().calls;
        assert_eq!(calls.len(), 10);
        for pair in calls.chunks(2) {
            assert_eq!(pair[0].program, "meson");
            assert_eq!(pair[1].program, "ninja");
            assert_eq!(pair[1].args[1], *pair[0].args.last().unwrap());
        }
        assert_eq!(
            executor.runner().configure_targets(),
            vec!["bnoopt", "bfuzz", "bfuzzasan", "bcmplog", "bhf"]
        );
        assert_eq!(summary.built.len(), 5);
        assert_eq!(summary.built[0], PathBuf::from("bnoopt"));
    }

    #[test]
    fn first_configure_failure_stops_everything() {
        let mut executor = executor_with(RecordingRunner::failing_at(0, 2));
        let err = run_all(&list_variants(), &mut executor).unwrap_err();

        assert_eq!(executor.runner().calls.len(), 1);
        assert_eq!(err.step(), BuildStep::Configure);
        assert_eq!(err.variant(), "coverage");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn build_failure_stops_later_variants() {
        // call 3 is the build step of the second variant
        let mut executor = executor_with(RecordingRunner::failing_at(3, 1));
        let err = run_all(&list_variants(), &mut executor).unwrap_err();

        assert_eq!(executor.runner().calls.len(), 4);
        assert_eq!(executor.runner().configure_targets(), vec!["bnoopt", "bfuzz"]);
        assert_eq!(err.step(), BuildStep::Build);
        assert_eq!(err.variant(), "afl");
        match err {
            BuildError::CommandFailed { description, .. } => {
                assert!(description.contains("code 1"))
            }
            other => panic!("Expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn both_steps_share_the_composed_environment() {
        let mut executor = executor_with(RecordingRunner::default());
        let cmplog = list_variants().remove(3);
        executor.execute(&cmplog).unwrap();

        let calls = &executor.runner().calls;
        assert_eq!(calls[0].environment, calls[1].environment);
        assert_eq!(
            calls[0].environment.get("AFL_LLVM_CMPLOG"),
            Some(OsStr::new("1"))
        );
        assert_eq!(
            calls[0].environment.get("CCACHE_DISABLE"),
            Some(OsStr::new("1"))
        );
    }

    #[test]
    fn spawn_failure_is_reported_with_program() {
        let mut executor =
            BuildExecutor::new(BaseConfiguration::default(), Environment::new(), SpawnFailRunner)
                .unwrap();
        let err = run_all(&list_variants(), &mut executor).unwrap_err();
        match &err {
            BuildError::Spawn { program, step, .. } => {
                assert_eq!(program, "meson");
                assert_eq!(*step, BuildStep::Configure);
            }
            other => panic!("Expected Spawn, got {other:?}"),
        }
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = BaseConfiguration::default();
        config.base.configure_flags.retain(|f| f != "--wipe");
        let result = BuildExecutor::new(config, Environment::new(), RecordingRunner::default());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn signal_without_code_maps_to_exit_one() {
        let err = BuildError::CommandFailed {
            variant: "afl".to_string(),
            step: BuildStep::Build,
            code: None,
            description: "Terminated by signal 9".to_string(),
        };
        assert_eq!(err.exit_code(), 1);
    }
}
