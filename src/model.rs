//! The model-invocation capability.
//!
//! Everything that talks to a language model goes through [`LanguageModel`]:
//! rendered instructions plus structured inputs in, structured outputs (and an
//! optional reasoning trace) out. Retries and timeouts belong to the
//! implementation, never to the callers in this crate.
//!
//! Two implementations ship with the crate:
//! - [`FnModel`] wraps a closure (tests, embedders with their own client)
//! - [`AgentModel`] shells out to an LLM CLI (`claude`, `gemini`, `codex`)

use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{value_to_string, FieldSpec, Fields};

/// Opaque failure from the model capability.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// The backing process could not be started or talked to
    #[error("Failed to execute {agent}: {message}")]
    Process { agent: String, message: String },

    /// The backend ran but reported failure
    #[error("{agent} returned error: {stderr}")]
    Backend { agent: String, stderr: String },

    /// The backend answered with something that is not the requested shape
    #[error("Failed to parse model response: {0}")]
    Response(String),

    #[error("{0}")]
    Other(String),
}

impl InvocationError {
    pub fn other(message: impl Into<String>) -> Self {
        InvocationError::Other(message.into())
    }
}

/// One model call. Built fresh per invocation and never shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub instructions: String,
    pub inputs: Fields,
    pub output_fields: Vec<FieldSpec>,
    pub temperature: f64,
}

impl ModelRequest {
    /// Plain-text rendering for text-only backends.
    ///
    /// Asks for a free-form `REASONING:` section followed by a `JSON:` object
    /// holding `reasoning` and every output field.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(self.instructions.trim());
        out.push_str("\n\n=== INPUTS ===\n");
        for (name, value) in &self.inputs {
            out.push_str(&format!("{}: {}\n", name, value_to_string(value)));
        }

        out.push_str("\n=== OUTPUTS ===\n");
        for field in &self.output_fields {
            if field.description.is_empty() {
                out.push_str(&format!("{}\n", field.name));
            } else {
                out.push_str(&format!("{}: {}\n", field.name, field.description));
            }
        }

        let keys: Vec<String> = std::iter::once("reasoning")
            .chain(self.output_fields.iter().map(|f| f.name.as_str()))
            .map(|k| format!("\"{}\": ...", k))
            .collect();
        out.push_str(&format!(
            "\nThink step by step, then respond with:\nREASONING: <your reasoning>\nJSON: {{{}}}\n",
            keys.join(", ")
        ));
        out
    }
}

/// What the model returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub outputs: Fields,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl ModelResponse {
    pub fn new(outputs: Fields) -> Self {
        ModelResponse {
            outputs,
            reasoning: None,
        }
    }

    /// Build from `(field, value)` pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }
}

/// Black-box capability: instructions + inputs → outputs.
///
/// Implementations must be callable concurrently; the evaluator fans calls
/// out over a worker pool.
pub trait LanguageModel: Send + Sync {
    fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, InvocationError>;

    /// Short label for logs.
    fn name(&self) -> &str {
        "model"
    }
}

type InvokeFn = dyn Fn(&ModelRequest) -> Result<ModelResponse, InvocationError> + Send + Sync;

/// A [`LanguageModel`] backed by a closure.
pub struct FnModel {
    name: String,
    f: Box<InvokeFn>,
}

impl FnModel {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<ModelResponse, InvocationError> + Send + Sync + 'static,
    {
        FnModel {
            name: "fn".to_string(),
            f: Box::new(f),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl fmt::Debug for FnModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModel").field("name", &self.name).finish()
    }
}

impl LanguageModel for FnModel {
    fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, InvocationError> {
        (self.f)(request)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Which LLM CLI to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    #[default]
    Claude,
    Gemini,
    /// OpenAI Codex CLI
    Codex,
}

impl FromStr for Agent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" => Ok(Agent::Claude),
            "gemini" => Ok(Agent::Gemini),
            "codex" | "openai" | "o3" => Ok(Agent::Codex),
            _ => Err(format!(
                "Unknown agent: {}. Use 'claude', 'gemini', or 'codex'",
                s
            )),
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Agent::Claude => write!(f, "claude"),
            Agent::Gemini => write!(f, "gemini"),
            Agent::Codex => write!(f, "codex"),
        }
    }
}

fn finish(agent: Agent, output: std::process::Output) -> Result<String, InvocationError> {
    if !output.status.success() {
        return Err(InvocationError::Backend {
            agent: agent.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn process_error(agent: Agent, e: impl fmt::Display) -> InvocationError {
    InvocationError::Process {
        agent: agent.to_string(),
        message: e.to_string(),
    }
}

/// `claude --print -p <prompt>`
pub fn call_claude(prompt: &str, model: Option<&str>) -> Result<String, InvocationError> {
    let mut cmd = Command::new("claude");
    if let Some(m) = model {
        cmd.args(["--model", m]);
    }
    cmd.args(["--print", "-p", prompt]);

    let output = cmd.output().map_err(|e| process_error(Agent::Claude, e))?;
    finish(Agent::Claude, output)
}

/// `gemini -o text -y [-m model] <prompt>`
pub fn call_gemini(prompt: &str, model: Option<&str>) -> Result<String, InvocationError> {
    let mut cmd = Command::new("gemini");
    cmd.args(["-o", "text", "-y"]);
    if let Some(m) = model {
        cmd.args(["-m", m]);
    }
    cmd.arg(prompt);

    let output = cmd.output().map_err(|e| process_error(Agent::Gemini, e))?;
    finish(Agent::Gemini, output)
}

static CODEX_CALLS: AtomicUsize = AtomicUsize::new(0);

/// `codex exec`, prompt on stdin, answer written to a temp file.
pub fn call_codex(prompt: &str, model: Option<&str>) -> Result<String, InvocationError> {
    // unique per call: the evaluator may run several at once
    let output_file = std::env::temp_dir().join(format!(
        "promptpatch_codex_{}_{}.txt",
        std::process::id(),
        CODEX_CALLS.fetch_add(1, Ordering::Relaxed)
    ));

    let mut cmd = Command::new("codex");
    cmd.args([
        "exec",
        "--skip-git-repo-check",
        "--dangerously-bypass-approvals-and-sandbox",
    ]);
    if let Some(m) = model {
        cmd.args(["-m", m]);
    }
    cmd.arg("-o").arg(&output_file).arg("-");

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| process_error(Agent::Codex, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(prompt.as_bytes())
            .map_err(|e| process_error(Agent::Codex, e))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| process_error(Agent::Codex, e))?;

    if !output.status.success() {
        let _ = std::fs::remove_file(&output_file);
        return Err(InvocationError::Backend {
            agent: Agent::Codex.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let response =
        std::fs::read_to_string(&output_file).map_err(|e| process_error(Agent::Codex, e));
    let _ = std::fs::remove_file(&output_file);
    Ok(response?.trim().to_string())
}

pub fn call_agent(
    agent: Agent,
    prompt: &str,
    model: Option<&str>,
) -> Result<String, InvocationError> {
    match agent {
        Agent::Claude => call_claude(prompt, model),
        Agent::Gemini => call_gemini(prompt, model),
        Agent::Codex => call_codex(prompt, model),
    }
}

/// Pull the JSON object out of a free-text response.
///
/// Looks after a `JSON:` marker when present, else takes the span from the
/// first `{` to the last `}`.
pub fn extract_json(response: &str) -> Result<Value, InvocationError> {
    let json_str = match response.find("JSON:") {
        Some(marker) => &response[marker + 5..],
        None => response,
    };

    serde_json::from_str(json_str.trim())
        .or_else(|_| match (json_str.find('{'), json_str.rfind('}')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str(&json_str[start..=end])
            }
            _ => Err(serde_json::Error::io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "No JSON found in response",
            ))),
        })
        .map_err(|e| {
            let preview: String = response.chars().take(500).collect();
            InvocationError::Response(format!("{}\nResponse: {}", e, preview))
        })
}

/// Text before the JSON payload, minus the `REASONING:` label.
fn leading_reasoning(response: &str) -> String {
    let head = match response.find("JSON:") {
        Some(marker) => &response[..marker],
        None => response.split('{').next().unwrap_or(""),
    };
    head.replace("REASONING:", "").trim().to_string()
}

/// [`LanguageModel`] that drives an LLM command-line agent.
///
/// The CLIs expose no sampling controls, so `ModelRequest::temperature` is
/// not forwarded.
#[derive(Debug, Clone, Default)]
pub struct AgentModel {
    pub agent: Agent,
    /// Backend-specific model name (`opus`, `o3`, `gemini-2.0-flash`, ...)
    pub model: Option<String>,
}

impl AgentModel {
    pub fn new(agent: Agent) -> Self {
        AgentModel { agent, model: None }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Map a raw CLI answer onto the requested output fields.
    pub fn parse_response(
        request: &ModelRequest,
        response: &str,
    ) -> Result<ModelResponse, InvocationError> {
        let parsed = extract_json(response)?;

        let outputs: Fields = request
            .output_fields
            .iter()
            .filter_map(|f| parsed.get(&f.name).map(|v| (f.name.clone(), v.clone())))
            .collect();

        let reasoning = match parsed.get("reasoning").and_then(|v| v.as_str()) {
            Some(r) if !r.trim().is_empty() => Some(r.to_string()),
            _ => Some(leading_reasoning(response)).filter(|r| !r.is_empty()),
        };

        Ok(ModelResponse { outputs, reasoning })
    }
}

impl LanguageModel for AgentModel {
    fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, InvocationError> {
        let prompt = request.render();
        tracing::debug!(agent = %self.agent, chars = prompt.len(), "invoking agent");
        let response = call_agent(self.agent, &prompt, self.model.as_deref())?;
        Self::parse_response(request, &response)
    }

    fn name(&self) -> &str {
        match self.agent {
            Agent::Claude => "claude",
            Agent::Gemini => "gemini",
            Agent::Codex => "codex",
        }
    }
}
