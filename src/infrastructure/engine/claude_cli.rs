//! Claude Code CLI generation engine
//!
//! Shells out to the `claude` CLI once per task. The command is built as an
//! argument vector (no shell), runs in the project root, and is killed when
//! the future is dropped so the orchestrator's timeout reliably reaps it.

use std::fmt::Write as _;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::errors::EngineError;
use crate::domain::ports::{EngineUsage, GenerationEngine, GenerationOutput, GenerationRequest};

const MAX_STDERR_CHARS: usize = 2_000;

/// Configuration for the Claude CLI engine
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    /// Path to claude CLI executable (defaults to "claude" in PATH)
    pub command: String,

    /// Extra arguments appended to every invocation
    pub extra_args: Vec<String>,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// JSON document printed by `claude -p --output-format json`
#[derive(Debug, Deserialize)]
struct CliResult {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    total_cost_usd: Option<f64>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    usage: Option<CliUsage>,
}

#[derive(Debug, Deserialize)]
struct CliUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Generation engine backed by the Claude Code CLI
pub struct ClaudeCliEngine {
    config: ClaudeCliConfig,
}

impl ClaudeCliEngine {
    pub fn new() -> Self {
        Self::with_config(ClaudeCliConfig::default())
    }

    pub const fn with_config(config: ClaudeCliConfig) -> Self {
        Self { config }
    }

    /// Build the generation prompt for one source file
    fn build_prompt(request: &GenerationRequest, source_code: &str) -> String {
        let framework = request.framework.as_deref().unwrap_or("the project's existing");
        let file_name = request
            .source_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let requirements = [
            format!("Use {framework} testing framework"),
            "Cover the behavior of every public function and class".to_string(),
            "Add tests for edge cases and error conditions".to_string(),
            "Mock external dependencies such as network, filesystem and clock".to_string(),
            "Use descriptive test names that state the scenario".to_string(),
            "Test both positive and negative cases".to_string(),
        ];

        let mut prompt = format!(
            "Generate logical tests for the source file \"{file_name}\" ({}).\n\nRequirements:\n",
            request.source_file.display()
        );
        for req in &requirements {
            let _ = writeln!(prompt, "- {req}");
        }
        let _ = write!(
            prompt,
            "\nThe tests will be saved as {}.\n\nCode to test:\n```\n{source_code}\n```\n\n\
             Respond with only the test code, no explanations. The test code must be complete and ready to run.",
            request.test_file.display()
        );
        prompt
    }

    fn build_command(&self, request: &GenerationRequest, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.config.command);
        cmd.current_dir(&request.project_root)
            .arg("-p")
            .arg(prompt)
            .arg("--model")
            .arg(&request.model)
            .arg("--output-format")
            .arg("json")
            .args(&self.config.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for ClaudeCliEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse CLI stdout; non-JSON output is taken as the test code itself.
fn parse_output(stdout: &str) -> Result<GenerationOutput, EngineError> {
    match serde_json::from_str::<CliResult>(stdout.trim()) {
        Ok(parsed) => {
            if parsed.is_error {
                return Err(EngineError::MalformedOutput(format!(
                    "engine reported an error: {}",
                    parsed.result.unwrap_or_default()
                )));
            }
            let content = parsed
                .result
                .map(|r| strip_code_fence(&r))
                .filter(|r| !r.trim().is_empty())
                .ok_or_else(|| EngineError::MalformedOutput("empty result".to_string()))?;
            Ok(GenerationOutput {
                content: Some(content),
                cost_usd: parsed.total_cost_usd,
                usage: parsed.usage.map(|u| EngineUsage {
                    input_tokens: u.input_tokens,
                    output_tokens: u.output_tokens,
                }),
                session_id: parsed.session_id,
                duration_ms: parsed.duration_ms,
            })
        }
        Err(_) if !stdout.trim().is_empty() => {
            debug!("engine output is not JSON, using it as plain text");
            Ok(GenerationOutput {
                content: Some(strip_code_fence(stdout)),
                ..GenerationOutput::default()
            })
        }
        Err(_) => Err(EngineError::MalformedOutput("empty output".to_string())),
    }
}

/// Unwrap a single fenced code block if the model wrapped its answer in one.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(body_start) = rest.find('\n') {
            let body = &rest[body_start + 1..];
            if let Some(end) = body.rfind("```") {
                return format!("{}\n", body[..end].trim_end());
            }
        }
    }
    format!("{trimmed}\n")
}

fn truncate_stderr(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.chars().count() > MAX_STDERR_CHARS {
        let cut: String = text.chars().take(MAX_STDERR_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

#[async_trait]
impl GenerationEngine for ClaudeCliEngine {
    fn name(&self) -> &str {
        "claude-cli"
    }

    async fn check_available(&self) -> Result<(), EngineError> {
        let status = Command::new(&self.config.command)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(EngineError::Unavailable(format!(
                "`{} --version` exited with {status}",
                self.config.command
            ))),
            Err(e) => Err(EngineError::Unavailable(format!(
                "`{}` could not be executed: {e}",
                self.config.command
            ))),
        }
    }

    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, EngineError> {
        let source_path = request.project_root.join(&request.source_file);
        let source_code = tokio::fs::read_to_string(&source_path)
            .await
            .map_err(|e| EngineError::Io(format!("failed to read {}: {e}", source_path.display())))?;

        let prompt = Self::build_prompt(&request, &source_code);
        let mut cmd = self.build_command(&request, &prompt);

        debug!(
            task_id = %request.task_id,
            model = %request.model,
            source = %request.source_file.display(),
            "spawning claude CLI"
        );

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::Unavailable(format!("{} not found", self.config.command))
            } else {
                EngineError::Spawn(e.to_string())
            }
        })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| EngineError::Io(format!("failed to collect engine output: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let cost_usd = serde_json::from_str::<CliResult>(stdout.trim())
                .ok()
                .and_then(|r| r.total_cost_usd);
            warn!(
                task_id = %request.task_id,
                code = ?output.status.code(),
                "claude CLI exited unsuccessfully"
            );
            return Err(EngineError::NonZeroExit {
                code: output.status.code(),
                stderr: truncate_stderr(&output.stderr),
                cost_usd,
            });
        }

        parse_output(&stdout)
    }
}
