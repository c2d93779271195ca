//! Todo tools
//!
//! In-memory todo list owned by the registry instance. Items keep insertion
//! order; ids are sequential (`todo_1`, `todo_2`, ...).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use sdk::errors::EngineError;
use sdk::types::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use super::{parse_params, ParamSchema, Tool, ToolHandler, ToolName};
use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TodoStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Completed,
}

impl StatusFilter {
    fn matches(&self, status: TodoStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => status == TodoStatus::Pending,
            StatusFilter::Completed => status == TodoStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: TodoStatus,
    pub due_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TodoState {
    items: Vec<TodoItem>,
    next_id: u64,
}

pub struct TodoStore {
    state: Mutex<TodoState>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTodo {
    /// Todo title
    pub title: String,
    /// Todo description
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    /// Due date (YYYY-MM-DD)
    pub due_date: Option<String>,
}

#[derive(Debug, Default)]
pub struct TodoUpdate {
    pub status: Option<TodoStatus>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct UpdateParams {
    /// Todo ID
    id: String,
    status: Option<TodoStatus>,
    title: Option<String>,
    description: Option<String>,
    priority: Option<Priority>,
}

impl UpdateParams {
    fn into_update(self) -> (String, TodoUpdate) {
        (
            self.id,
            TodoUpdate {
                status: self.status,
                title: self.title,
                description: self.description,
                priority: self.priority,
            },
        )
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ListParams {
    /// all, pending or completed
    #[serde(default)]
    status: StatusFilter,
}

impl TodoStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(TodoState::default()),
            clock,
        }
    }

    pub fn create(&self, new: NewTodo) -> Result<TodoItem, ToolError> {
        if new.title.trim().is_empty() {
            return Err(ToolError::InvalidParameter("title must not be empty".into()));
        }
        if let Some(due) = &new.due_date {
            chrono::NaiveDate::parse_from_str(due, "%Y-%m-%d").map_err(|_| {
                ToolError::InvalidParameter(format!("dueDate must be YYYY-MM-DD, got '{}'", due))
            })?;
        }

        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.next_id += 1;
        let item = TodoItem {
            id: format!("todo_{}", state.next_id),
            title: new.title,
            description: new.description.unwrap_or_default(),
            priority: new.priority,
            status: TodoStatus::Pending,
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
        };
        state.items.push(item.clone());
        info!("Created todo {}", item.id);
        Ok(item)
    }

    /// Matching items plus the total count
    pub fn list(&self, filter: StatusFilter) -> (Vec<TodoItem>, usize) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let matching = state
            .items
            .iter()
            .filter(|t| filter.matches(t.status))
            .cloned()
            .collect();
        (matching, state.items.len())
    }

    pub fn update(&self, id: &str, update: TodoUpdate) -> Result<TodoItem, ToolError> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let item = state
            .items
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ToolError::Rejected(format!("Todo with ID {} not found", id)))?;

        if let Some(status) = update.status {
            item.status = status;
        }
        if let Some(title) = update.title {
            item.title = title;
        }
        if let Some(description) = update.description {
            item.description = description;
        }
        if let Some(priority) = update.priority {
            item.priority = priority;
        }
        item.updated_at = now;

        info!("Updated todo {}", id);
        Ok(item.clone())
    }
}

struct TodoHandler {
    store: Arc<TodoStore>,
    op: ToolName,
}

#[async_trait]
impl ToolHandler for TodoHandler {
    async fn call(&self, params: Map<String, Value>) -> Result<Value, ToolError> {
        match self.op {
            ToolName::CreateTodo => {
                let todo = self.store.create(parse_params(params)?)?;
                Ok(json!({
                    "message": format!("Todo created: \"{}\"", todo.title),
                    "todo": todo,
                }))
            }
            ToolName::ListTodos => {
                let ListParams { status } = parse_params(params)?;
                let (todos, total) = self.store.list(status);
                Ok(json!({
                    "count": todos.len(),
                    "totalCount": total,
                    "todos": todos,
                }))
            }
            ToolName::UpdateTodo => {
                let (id, update) = parse_params::<UpdateParams>(params)?.into_update();
                let todo = self.store.update(&id, update)?;
                Ok(json!({ "message": "Todo updated", "todo": todo }))
            }
            other => Err(ToolError::Execution(format!("{} is not a todo tool", other))),
        }
    }
}

pub fn tools(clock: Arc<dyn Clock>) -> Result<Vec<Tool>, EngineError> {
    let store = Arc::new(TodoStore::new(clock));
    let handler = |op: ToolName| -> Arc<dyn ToolHandler> {
        Arc::new(TodoHandler {
            store: Arc::clone(&store),
            op,
        })
    };

    Ok(vec![
        Tool::new(
            ToolName::CreateTodo,
            "Create a todo item with title, description, priority and optional due date",
            ParamSchema::of::<NewTodo>()?,
            handler(ToolName::CreateTodo),
        ),
        Tool::new(
            ToolName::ListTodos,
            "List todos, optionally filtered by status",
            ParamSchema::of::<ListParams>()?,
            handler(ToolName::ListTodos),
        ),
        Tool::new(
            ToolName::UpdateTodo,
            "Update an existing todo item",
            ParamSchema::of::<UpdateParams>()?,
            handler(ToolName::UpdateTodo),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    async fn run(tools: &[Tool], op: ToolName, params: Value) -> Result<Value, ToolError> {
        let tool = tools.iter().find(|t| t.name == op).unwrap();
        let params = tool.schema.validate(&params).unwrap();
        tool.handler().call(params).await
    }

    #[tokio::test]
    async fn test_create_list_update() {
        let tools = tools(Arc::new(ManualClock::starting_now())).unwrap();

        let created = run(&tools, ToolName::CreateTodo, json!({ "title": "Write report" }))
            .await
            .unwrap();
        assert_eq!(created["todo"]["id"], json!("todo_1"));
        assert_eq!(created["todo"]["priority"], json!("medium"));
        assert_eq!(created["todo"]["status"], json!("pending"));

        run(
            &tools,
            ToolName::CreateTodo,
            json!({ "title": "Ship", "priority": "high", "dueDate": "2025-01-31" }),
        )
        .await
        .unwrap();

        let updated = run(
            &tools,
            ToolName::UpdateTodo,
            json!({ "id": "todo_1", "status": "completed" }),
        )
        .await
        .unwrap();
        assert_eq!(updated["todo"]["status"], json!("completed"));

        let pending = run(&tools, ToolName::ListTodos, json!({ "status": "pending" }))
            .await
            .unwrap();
        assert_eq!(pending["count"], json!(1));
        assert_eq!(pending["totalCount"], json!(2));
        assert_eq!(pending["todos"][0]["title"], json!("Ship"));

        let all = run(&tools, ToolName::ListTodos, json!({})).await.unwrap();
        assert_eq!(all["count"], json!(2));
    }

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let tools = tools(Arc::new(ManualClock::starting_now())).unwrap();
        let err = run(&tools, ToolName::UpdateTodo, json!({ "id": "todo_9" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_bad_due_date_rejected() {
        let tools = tools(Arc::new(ManualClock::starting_now())).unwrap();
        let err = run(
            &tools,
            ToolName::CreateTodo,
            json!({ "title": "x", "dueDate": "tomorrow" }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameter(_)));
    }
}
