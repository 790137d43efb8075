//! Model adapter seam.
//!
//! The pipeline only needs "prompt in, one reply out". `CommandModel`
//! satisfies that by running a user-configured program (an API wrapper,
//! `llm`, a local model runner) with the request as JSON on stdin and
//! taking its stdout as the reply.

use std::io::Write;
use std::process::{Command, Stdio};

use serde::Serialize;
use tracing::{debug, instrument};

/// One blocking request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub system: Option<String>,
    pub prompt: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("no model command configured; set model.command in relay.toml or RELAY_MODEL__COMMAND")]
    NotConfigured,

    #[error("model call failed: {0}")]
    Transport(String),

    #[error("model rejected the credentials: {0}")]
    Auth(String),

    #[error("model call interrupted")]
    Interrupted,
}

/// Anything that can answer a prompt.
pub trait ModelService {
    fn complete(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

/// Exit status a model command uses to report bad credentials.
pub const AUTH_EXIT_CODE: i32 = 2;

/// Runs an external program per request.
#[derive(Debug, Clone)]
pub struct CommandModel {
    program: String,
    args: Vec<String>,
}

impl CommandModel {
    pub fn new(command: &[String]) -> Result<Self, ModelError> {
        let (program, args) = command.split_first().ok_or(ModelError::NotConfigured)?;
        if program.trim().is_empty() {
            return Err(ModelError::NotConfigured);
        }
        Ok(Self { program: program.clone(), args: args.to_vec() })
    }
}

impl ModelService for CommandModel {
    #[instrument(skip_all, fields(program = %self.program, prompt_bytes = request.prompt.len()))]
    fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| ModelError::Transport(format!("encode request: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ModelError::Transport(format!("failed to start `{}`: {e}", self.program)))?;

        // Feed stdin from another thread so a chatty child cannot deadlock us
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(&payload))
        });

        let output = child
            .wait_with_output()
            .map_err(|e| ModelError::Transport(format!("waiting for `{}`: {e}", self.program)))?;

        if let Some(handle) = writer {
            // A child that exits without reading all input is fine as long as it succeeded
            if let Ok(Err(e)) = handle.join() {
                debug!(error = %e, "model command closed stdin early");
            }
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(0) => {}
            Some(AUTH_EXIT_CODE) => return Err(ModelError::Auth(stderr)),
            Some(code) => {
                return Err(ModelError::Transport(format!("`{}` exited with {code}: {stderr}", self.program)));
            }
            // Killed by a signal; whatever arrived on stdout is partial
            None => return Err(ModelError::Interrupted),
        }

        let reply = String::from_utf8(output.stdout)
            .map_err(|_| ModelError::Transport("reply is not valid UTF-8".to_string()))?;
        debug!(bytes = reply.len(), "model replied");
        Ok(reply)
    }
}
