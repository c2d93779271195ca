//! Filesystem tools
//!
//! File and folder operations confined to the configured workspace. Paths
//! are always relative; absolute paths and `..` components are rejected
//! before any I/O. An optional `sessionId` scopes a call to
//! `workspace/<sessionId>/`.

use async_trait::async_trait;
use schemars::JsonSchema;
use sdk::errors::EngineError;
use sdk::types::ToolError;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{parse_params, ParamSchema, Tool, ToolHandler, ToolName};

#[derive(Debug)]
pub struct FilesystemTool {
    workspace: PathBuf,
}

impl FilesystemTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    /// Write a file, creating parent directories as needed
    pub async fn create_file(
        &self,
        path: &str,
        content: &str,
        session_id: Option<&str>,
    ) -> Result<Value, ToolError> {
        let (base, relative) = self.resolve(path, session_id)?;
        let full = base.join(&relative);
        info!("Writing {} bytes to: {}", content.len(), full.display());

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, content).await?;
        let size = fs::metadata(&full).await?.len();

        Ok(json!({
            "message": format!("File created at {}", display_path(&relative, session_id)),
            "path": display_path(&relative, session_id),
            "size": size,
        }))
    }

    pub async fn create_folder(&self, path: &str, session_id: Option<&str>) -> Result<Value, ToolError> {
        let (base, relative) = self.resolve(path, session_id)?;
        let full = base.join(&relative);
        info!("Creating folder: {}", full.display());

        fs::create_dir_all(&full).await?;

        Ok(json!({
            "message": format!("Folder created at {}", display_path(&relative, session_id)),
            "path": display_path(&relative, session_id),
        }))
    }

    pub async fn read_file(&self, path: &str, session_id: Option<&str>) -> Result<Value, ToolError> {
        let (base, relative) = self.resolve(path, session_id)?;
        let full = base.join(&relative);
        info!("Reading file: {}", full.display());

        let content = match fs::read_to_string(&full).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::FileNotFound(display_path(&relative, session_id)));
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Read {} bytes from {}", content.len(), full.display());

        Ok(json!({
            "content": content,
            "path": display_path(&relative, session_id),
            "size": content.len(),
            "encoding": "utf8",
        }))
    }

    /// List files and folders directly under a directory
    pub async fn list_files(&self, path: &str, session_id: Option<&str>) -> Result<Value, ToolError> {
        let (base, relative) = self.resolve(path, session_id)?;
        let full = base.join(&relative);
        info!("Listing directory: {}", full.display());

        let mut entries = match fs::read_dir(&full).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::FileNotFound(display_path(&relative, session_id)));
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        let mut folders = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata().await?;
            let item = json!({
                "name": name,
                "size": metadata.len(),
                "relativePath": to_slash(&relative.join(&name)),
            });
            if metadata.is_dir() {
                folders.push((name, item));
            } else {
                files.push((name, item));
            }
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        folders.sort_by(|a, b| a.0.cmp(&b.0));
        let files: Vec<Value> = files.into_iter().map(|(_, v)| v).collect();
        let folders: Vec<Value> = folders.into_iter().map(|(_, v)| v).collect();

        Ok(json!({
            "path": display_path(&relative, session_id),
            "totalFiles": files.len(),
            "totalFolders": folders.len(),
            "files": files,
            "folders": folders,
        }))
    }

    /// Split a request into (base directory, sanitized relative path)
    fn resolve(&self, path: &str, session_id: Option<&str>) -> Result<(PathBuf, PathBuf), ToolError> {
        let relative = sanitize_relative(path)?;
        let base = match session_id {
            Some(id) => {
                let scope = sanitize_relative(id)?;
                if scope.components().count() != 1 {
                    return Err(ToolError::Rejected(format!(
                        "Invalid sessionId for workspace scoping: {}",
                        id
                    )));
                }
                self.workspace.join(scope)
            }
            None => self.workspace.clone(),
        };
        Ok((base, relative))
    }
}

/// Reject absolute paths and parent traversal; drop `.` components
fn sanitize_relative(path: &str) -> Result<PathBuf, ToolError> {
    let mut clean = PathBuf::new();
    for component in Path::new(path.trim()).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                warn!("Path rejected: {}", path);
                return Err(ToolError::Rejected(format!(
                    "Path outside workspace: {}",
                    path
                )));
            }
        }
    }
    Ok(clean)
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn display_path(relative: &Path, session_id: Option<&str>) -> String {
    let rel = to_slash(relative);
    let rel = if rel.is_empty() { ".".to_string() } else { rel };
    match session_id {
        Some(id) => format!("{}/{}", id.trim(), rel),
        None => rel,
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct PathParams {
    /// Relative path inside the workspace
    path: String,
    /// Scopes paths under workspace/<sessionId>; omitted means the workspace root
    session_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListParams {
    /// Relative directory path
    #[serde(default = "current_dir")]
    path: String,
    /// Scopes paths under workspace/<sessionId>; omitted means the workspace root
    session_id: Option<String>,
}

fn current_dir() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CreateFileParams {
    /// Relative file path
    path: String,
    /// File content
    content: String,
    /// Scopes paths under workspace/<sessionId>; omitted means the workspace root
    session_id: Option<String>,
}

struct FilesystemHandler {
    fs: Arc<FilesystemTool>,
    op: ToolName,
}

#[async_trait]
impl ToolHandler for FilesystemHandler {
    async fn call(&self, params: Map<String, Value>) -> Result<Value, ToolError> {
        match self.op {
            ToolName::CreateFile => {
                let p: CreateFileParams = parse_params(params)?;
                self.fs
                    .create_file(&p.path, &p.content, p.session_id.as_deref())
                    .await
            }
            ToolName::CreateFolder => {
                let p: PathParams = parse_params(params)?;
                self.fs.create_folder(&p.path, p.session_id.as_deref()).await
            }
            ToolName::ReadFile => {
                let p: PathParams = parse_params(params)?;
                self.fs.read_file(&p.path, p.session_id.as_deref()).await
            }
            ToolName::ListFiles => {
                let p: ListParams = parse_params(params)?;
                self.fs.list_files(&p.path, p.session_id.as_deref()).await
            }
            other => Err(ToolError::Execution(format!(
                "{} is not a filesystem tool",
                other
            ))),
        }
    }
}

pub fn tools(fs: Arc<FilesystemTool>) -> Result<Vec<Tool>, EngineError> {
    let handler = |op: ToolName| -> Arc<dyn ToolHandler> {
        Arc::new(FilesystemHandler {
            fs: Arc::clone(&fs),
            op,
        })
    };

    let path_schema = ParamSchema::of::<PathParams>()?;

    Ok(vec![
        Tool::new(
            ToolName::CreateFile,
            "Create a file with the given content in the workspace",
            ParamSchema::of::<CreateFileParams>()?,
            handler(ToolName::CreateFile),
        ),
        Tool::new(
            ToolName::CreateFolder,
            "Create a folder in the workspace",
            path_schema.clone(),
            handler(ToolName::CreateFolder),
        ),
        Tool::new(
            ToolName::ReadFile,
            "Read the contents of a file from the workspace",
            path_schema,
            handler(ToolName::ReadFile),
        ),
        Tool::new(
            ToolName::ListFiles,
            "List files and folders in a workspace directory",
            ParamSchema::of::<ListParams>()?,
            handler(ToolName::ListFiles),
        ),
    ])
}
