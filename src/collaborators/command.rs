use super::{PhaseContext, PhaseOperation};
use crate::error::{CollaboratorError, PipelineError, PipelineResult};
use crate::models::config::CommandSettings;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Lines of stderr kept for the error summary
const STDERR_TAIL_LINES: usize = 20;

/// Runs an external program for a phase and collects what it wrote
#[derive(Debug, Clone)]
pub struct CommandOperation {
    program: String,
    args: Vec<String>,
    artifact_patterns: Vec<String>,
}

impl CommandOperation {
    pub fn new(program: impl Into<String>, args: Vec<String>, artifact_patterns: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            artifact_patterns,
        }
    }

    pub fn from_settings(settings: &CommandSettings) -> PipelineResult<Self> {
        let program = settings
            .program
            .clone()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| PipelineError::ConfigInvalid("command program is empty".to_string()))?;
        for pattern in &settings.artifacts {
            glob::Pattern::new(pattern).map_err(|e| {
                PipelineError::ConfigInvalid(format!("artifact pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(Self::new(program, settings.args.clone(), settings.artifacts.clone()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with per-attempt placeholders filled in
    pub fn render_args(&self, ctx: &PhaseContext) -> Vec<String> {
        let mut rendered = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            if arg == "{inputs}" {
                rendered.extend(ctx.inputs.iter().map(|p| p.display().to_string()));
                continue;
            }
            let value = arg
                .replace("{month}", &ctx.month.to_string())
                .replace("{year}", &ctx.month.year().to_string())
                .replace("{mm}", &format!("{:02}", ctx.month.month()))
                .replace("{code}", &ctx.month.report_code())
                .replace("{input_dir}", &ctx.input_dir().display().to_string())
                .replace("{output_dir}", &ctx.output_dir.display().to_string());
            rendered.push(value);
        }
        rendered
    }

    /// Run the program to completion
    pub async fn run(&self, ctx: &PhaseContext) -> Result<(), CollaboratorError> {
        let args = self.render_args(ctx);
        tracing::debug!(program = %self.program, ?args, "spawning collaborator");

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .env("JPX_MONTH", ctx.month.to_string())
            .env("JPX_PHASE", ctx.phase.name())
            .env("JPX_ATTEMPT", ctx.attempt.to_string())
            .env("JPX_OUTPUT_DIR", &ctx.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropped on timeout; the child must not keep writing afterwards
            .kill_on_drop(true);

        // Own process group so a terminal Ctrl-C reaches only the orchestrator
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| CollaboratorError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CollaboratorError::Io(std::io::Error::other("failed to capture stdout"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            CollaboratorError::Io(std::io::Error::other("failed to capture stderr"))
        })?;

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut stdout_done = false;
        let mut stderr_done = false;

        // Drain both pipes concurrently to avoid backpressure deadlock
        while !stdout_done || !stderr_done {
            tokio::select! {
                line = stdout_reader.next_line(), if !stdout_done => {
                    match line? {
                        Some(line) => {
                            tracing::debug!(target: "jpx_monthly::collaborator", "{}", line);
                        }
                        None => stdout_done = true,
                    }
                }
                line = stderr_reader.next_line(), if !stderr_done => {
                    match line? {
                        Some(line) => {
                            tracing::debug!(target: "jpx_monthly::collaborator", stream = "stderr", "{}", line);
                            if stderr_tail.len() == STDERR_TAIL_LINES {
                                stderr_tail.pop_front();
                            }
                            stderr_tail.push_back(line);
                        }
                        None => stderr_done = true,
                    }
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(CollaboratorError::ExitStatus {
                program: self.program.clone(),
                code: status.code(),
                stderr: Vec::from(stderr_tail).join("\n"),
            });
        }

        Ok(())
    }

    /// Files the program left in the output directory
    pub fn collect_artifacts(&self, output_dir: &Path) -> Result<Vec<PathBuf>, CollaboratorError> {
        collect_files(output_dir, &self.artifact_patterns)
    }
}

/// Regular files in `dir` matching any of `patterns` (all files when empty), sorted
pub(crate) fn collect_files(dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, CollaboratorError> {
    let mut files = Vec::new();

    if patterns.is_empty() {
        if dir.is_dir() {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.is_file() {
                    files.push(path);
                }
            }
        }
    } else {
        let escaped_dir = glob::Pattern::escape(&dir.to_string_lossy());
        for pattern in patterns {
            let full = format!("{}/{}", escaped_dir.trim_end_matches('/'), pattern);
            let matches = glob::glob(&full).map_err(|e| CollaboratorError::Pattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            for path in matches.filter_map(|m| m.ok()) {
                if path.is_file() && !files.contains(&path) {
                    files.push(path);
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

#[async_trait]
impl PhaseOperation for CommandOperation {
    fn describe(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }

    async fn execute(&self, ctx: &PhaseContext) -> Result<Vec<PathBuf>, CollaboratorError> {
        self.run(ctx).await?;
        self.collect_artifacts(&ctx.output_dir)
    }
}
