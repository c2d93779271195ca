//! Python execution tool
//!
//! Runs a code snippet with the configured interpreter. The snippet is
//! written to a temporary script, executed with stdin closed, and the
//! process is killed if it outlives its deadline. A non-zero exit status or
//! anything on stderr fails the call with the interpreter's output.

use async_trait::async_trait;
use schemars::JsonSchema;
use sdk::errors::EngineError;
use sdk::types::ToolError;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{parse_params, ParamSchema, Tool, ToolHandler, ToolName};

#[derive(Debug)]
pub struct PythonTool {
    interpreter: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ExecuteParams {
    /// Python code to execute
    code: String,
    /// What the code does
    description: Option<String>,
}

impl PythonTool {
    pub fn new(interpreter: impl Into<String>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout,
        }
    }

    pub async fn execute(&self, code: &str) -> Result<String, ToolError> {
        let script = std::env::temp_dir().join(format!("waypoint_{}.py", uuid::Uuid::new_v4()));
        tokio::fs::write(&script, code).await?;
        info!("Executing Python script {}", script.display());

        let result = self.run_script(&script).await;

        if let Err(e) = tokio::fs::remove_file(&script).await {
            debug!("Failed to remove {}: {}", script.display(), e);
        }
        result
    }

    async fn run_script(&self, script: &Path) -> Result<String, ToolError> {
        let child = Command::new(&self.interpreter)
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ToolError::Execution(format!("Failed to start {}: {}", self.interpreter, e))
            })?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();

                if output.status.success() && stderr.trim().is_empty() {
                    debug!("Python script succeeded");
                    Ok(stdout)
                } else {
                    warn!("Python script failed with status {}", output.status);
                    Err(ToolError::Execution(format!(
                        "Python exited with {}\nStdout: {}\nStderr: {}",
                        output.status, stdout, stderr
                    )))
                }
            }
            Ok(Err(e)) => {
                warn!("Python process error: {}", e);
                Err(ToolError::Io(e))
            }
            Err(_) => {
                let err_msg = format!(
                    "Python execution timed out after {} seconds",
                    self.timeout.as_secs()
                );
                warn!("{}", err_msg);
                Err(ToolError::Execution(err_msg))
            }
        }
    }
}

struct PythonHandler {
    python: Arc<PythonTool>,
}

#[async_trait]
impl ToolHandler for PythonHandler {
    async fn call(&self, params: Map<String, Value>) -> Result<Value, ToolError> {
        let ExecuteParams { code, description } = parse_params(params)?;
        let output = self.python.execute(&code).await?;
        Ok(json!({
            "output": output,
            "description": description.unwrap_or_else(|| "Python code execution".to_string()),
        }))
    }
}

pub fn tools(interpreter: String, timeout: Duration) -> Result<Vec<Tool>, EngineError> {
    Ok(vec![Tool::new(
        ToolName::ExecutePython,
        "Execute a Python snippet and return its standard output",
        ParamSchema::of::<ExecuteParams>()?,
        Arc::new(PythonHandler {
            python: Arc::new(PythonTool::new(interpreter, timeout)),
        }),
    )])
}
