//! Tool catalogue, registry and dispatch
//!
//! Tools form a closed set ([`ToolName`]); each is registered once at startup
//! with a description, category, parameter schema and handler. Model output
//! reaches a tool only through [`ToolDispatcher`], which validates parameters,
//! applies the loop gate and turns every outcome into an `ExecutionResult`.

pub mod browser_session;
pub mod calculator;
pub mod codegen;
pub mod dispatcher;
pub mod filesystem;
pub mod loop_detector;
pub mod python;
pub mod schema;
pub mod todo;
pub mod utility;

pub use dispatcher::ToolDispatcher;
pub use loop_detector::{normalize_params, LoopDetector, LoopVerdict, ToolCallRecord};
pub use schema::ParamSchema;

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::ToolError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::config::Config;
use crate::session::SessionTracker;

/// Every tool the engine knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolName {
    StartBrowserSession,
    GetBrowserSessionStatus,
    CloseBrowserSession,
    CreateFile,
    CreateFolder,
    ReadFile,
    ListFiles,
    ExecutePython,
    GenerateCode,
    CreateTodo,
    ListTodos,
    UpdateTodo,
    GetCurrentTime,
    Calculate,
    FormatFinalAnswer,
}

impl ToolName {
    pub const ALL: [ToolName; 15] = [
        ToolName::StartBrowserSession,
        ToolName::GetBrowserSessionStatus,
        ToolName::CloseBrowserSession,
        ToolName::CreateFile,
        ToolName::CreateFolder,
        ToolName::ReadFile,
        ToolName::ListFiles,
        ToolName::ExecutePython,
        ToolName::GenerateCode,
        ToolName::CreateTodo,
        ToolName::ListTodos,
        ToolName::UpdateTodo,
        ToolName::GetCurrentTime,
        ToolName::Calculate,
        ToolName::FormatFinalAnswer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::StartBrowserSession => "start_browser_session",
            ToolName::GetBrowserSessionStatus => "get_browser_session_status",
            ToolName::CloseBrowserSession => "close_browser_session",
            ToolName::CreateFile => "create_file",
            ToolName::CreateFolder => "create_folder",
            ToolName::ReadFile => "read_file",
            ToolName::ListFiles => "list_files",
            ToolName::ExecutePython => "execute_python",
            ToolName::GenerateCode => "generate_code",
            ToolName::CreateTodo => "create_todo",
            ToolName::ListTodos => "list_todos",
            ToolName::UpdateTodo => "update_todo",
            ToolName::GetCurrentTime => "get_current_time",
            ToolName::Calculate => "calculate",
            ToolName::FormatFinalAnswer => "format_final_answer",
        }
    }

    pub fn category(&self) -> ToolCategory {
        match self {
            ToolName::StartBrowserSession
            | ToolName::GetBrowserSessionStatus
            | ToolName::CloseBrowserSession => ToolCategory::Browser,
            ToolName::CreateFile
            | ToolName::CreateFolder
            | ToolName::ReadFile
            | ToolName::ListFiles => ToolCategory::Filesystem,
            ToolName::ExecutePython | ToolName::GenerateCode => ToolCategory::Programming,
            ToolName::CreateTodo | ToolName::ListTodos | ToolName::UpdateTodo => {
                ToolCategory::Productivity
            }
            ToolName::GetCurrentTime | ToolName::Calculate | ToolName::FormatFinalAnswer => {
                ToolCategory::Utility
            }
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| EngineError::UnknownTool(s.to_string()))
    }
}

impl Serialize for ToolName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Browser,
    Filesystem,
    Programming,
    Productivity,
    Utility,
}

impl ToolCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCategory::Browser => "browser",
            ToolCategory::Filesystem => "filesystem",
            ToolCategory::Programming => "programming",
            ToolCategory::Productivity => "productivity",
            ToolCategory::Utility => "utility",
        }
    }
}

/// Request/response handler behind a tool
///
/// Receives parameters already validated against the tool's schema.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, params: Map<String, Value>) -> Result<Value, ToolError>;
}

/// A registered tool
#[derive(Clone)]
pub struct Tool {
    pub name: ToolName,
    pub description: &'static str,
    pub schema: ParamSchema,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(
        name: ToolName,
        description: &'static str,
        schema: ParamSchema,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name,
            description,
            schema,
            handler,
        }
    }

    pub fn category(&self) -> ToolCategory {
        self.name.category()
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("category", &self.category())
            .finish()
    }
}

/// Deserialize validated parameters into a typed struct
pub(crate) fn parse_params<T: DeserializeOwned>(params: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(params))
        .map_err(|e| ToolError::InvalidParameter(e.to_string()))
}

/// Shared resources handed to the built-in tools
#[derive(Clone)]
pub struct ToolContext {
    pub workspace: PathBuf,
    pub sessions: Arc<SessionTracker>,
    pub clock: Arc<dyn Clock>,
    pub python_bin: String,
    pub python_timeout: Duration,
}

impl ToolContext {
    pub fn from_config(config: &Config, sessions: Arc<SessionTracker>, clock: Arc<dyn Clock>) -> Self {
        Self {
            workspace: config.core.workspace.clone(),
            sessions,
            clock,
            python_bin: config.tools.python_bin.clone(),
            python_timeout: config.tools.python_timeout(),
        }
    }
}

/// Registry of tools, fixed after startup
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, Tool>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the full built-in catalogue
    pub fn with_defaults(ctx: &ToolContext) -> Result<Self, EngineError> {
        let mut registry = Self::empty();

        let fs = Arc::new(filesystem::FilesystemTool::new(ctx.workspace.clone()));
        let groups = [
            browser_session::tools(Arc::clone(&ctx.sessions))?,
            filesystem::tools(Arc::clone(&fs))?,
            python::tools(ctx.python_bin.clone(), ctx.python_timeout)?,
            codegen::tools(fs, Arc::clone(&ctx.clock))?,
            todo::tools(Arc::clone(&ctx.clock))?,
            utility::tools(Arc::clone(&ctx.clock))?,
        ];

        for tool in groups.into_iter().flatten() {
            registry.register(tool)?;
        }

        debug!("Registered {} tools", registry.len());
        Ok(registry)
    }

    /// Add a tool; a second registration under the same name is an error
    pub fn register(&mut self, tool: Tool) -> Result<(), EngineError> {
        if self.tools.contains_key(&tool.name) {
            return Err(EngineError::DuplicateTool(tool.name.to_string()));
        }
        self.tools.insert(tool.name, tool);
        Ok(())
    }

    pub fn get(&self, name: ToolName) -> Option<&Tool> {
        self.tools.get(&name)
    }

    /// Look up by wire name
    pub fn lookup(&self, name: &str) -> Option<&Tool> {
        ToolName::from_str(name).ok().and_then(|n| self.get(n))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().map(|n| n.as_str()).collect()
    }

    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Per-run set of enabled tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSelection {
    enabled: BTreeSet<ToolName>,
}

impl ToolSelection {
    /// Every tool enabled
    pub fn all() -> Self {
        Self {
            enabled: ToolName::ALL.iter().copied().collect(),
        }
    }

    /// Build from wire names; an empty list enables everything.
    ///
    /// `format_final_answer` is always enabled.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, EngineError> {
        if names.is_empty() {
            return Ok(Self::all());
        }

        let mut enabled = BTreeSet::new();
        for name in names {
            let name = name.as_ref().trim();
            let tool = ToolName::from_str(name).map_err(|_| {
                let known: Vec<&str> = ToolName::ALL.iter().map(|t| t.as_str()).collect();
                EngineError::UnknownTool(format!(
                    "{} (available tools: {})",
                    name,
                    known.join(", ")
                ))
            })?;
            enabled.insert(tool);
        }
        enabled.insert(ToolName::FormatFinalAnswer);

        Ok(Self { enabled })
    }

    pub fn is_enabled(&self, name: ToolName) -> bool {
        self.enabled.contains(&name)
    }

    pub fn enabled(&self) -> impl Iterator<Item = ToolName> + '_ {
        self.enabled.iter().copied()
    }
}

impl Default for ToolSelection {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct NoParams {}

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, params: Map<String, Value>) -> Result<Value, ToolError> {
            Ok(Value::Object(params))
        }
    }

    fn context(temp: &TempDir) -> ToolContext {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        ToolContext {
            workspace: temp.path().to_path_buf(),
            sessions: Arc::new(SessionTracker::new(Arc::clone(&clock))),
            clock,
            python_bin: "python3".to_string(),
            python_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_tool_name_round_trip() {
        for name in ToolName::ALL {
            assert_eq!(ToolName::from_str(name.as_str()).unwrap(), name);
        }
        assert!(ToolName::from_str("teleport").is_err());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = ToolRegistry::empty();
        let schema = ParamSchema::of::<NoParams>().unwrap();
        let tool = Tool::new(ToolName::Calculate, "echo", schema, Arc::new(Echo));

        registry.register(tool.clone()).unwrap();
        let err = registry.register(tool).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateTool(ref n) if n == "calculate"));
    }

    #[test]
    fn test_default_catalogue_is_complete() {
        let temp = TempDir::new().unwrap();
        let registry = ToolRegistry::with_defaults(&context(&temp)).unwrap();

        assert_eq!(registry.len(), ToolName::ALL.len());
        for name in ToolName::ALL {
            let tool = registry.get(name).unwrap();
            assert!(!tool.description.is_empty());
        }
        assert!(registry.lookup("calculate").is_some());
        assert!(registry.lookup("search_web").is_none());
    }

    #[test]
    fn test_selection_empty_enables_all() {
        let selection = ToolSelection::from_names::<&str>(&[]).unwrap();
        assert!(ToolName::ALL.iter().all(|&t| selection.is_enabled(t)));
    }

    #[test]
    fn test_selection_always_includes_final_answer() {
        let selection = ToolSelection::from_names(&["calculate", "read_file"]).unwrap();
        assert!(selection.is_enabled(ToolName::Calculate));
        assert!(selection.is_enabled(ToolName::FormatFinalAnswer));
        assert!(!selection.is_enabled(ToolName::ExecutePython));

        assert_eq!(selection.enabled().count(), 3);
    }

    #[test]
    fn test_selection_rejects_unknown_names() {
        let err = ToolSelection::from_names(&["calculate", "teleport"]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("teleport"));
        assert!(message.contains("format_final_answer"));
    }
}
