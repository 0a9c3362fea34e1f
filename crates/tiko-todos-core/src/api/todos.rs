//! Todo CRUD, authorized through the session manager.

use reqwest::Method;
use tracing::{debug, warn};

use crate::auth::{AuthError, SessionManager, ValidationError};
use crate::models::{NewTodo, Todo, TodoUpdate};

use super::ApiError;

/// Todos endpoint collection path
const TODOS_PATH: &str = "todos/";

/// Client for the `todos/` resource.
/// Clone is cheap - it shares the session manager.
#[derive(Clone)]
pub struct TodoClient {
    session: SessionManager,
}

impl TodoClient {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    fn item_path(id: i64) -> String {
        format!("{}{}", TODOS_PATH, id)
    }

    /// Fetch all todos of the logged-in user
    pub async fn list(&self) -> Result<Vec<Todo>, AuthError> {
        let response = self
            .session
            .with_auth(|api| api.request(Method::GET, TODOS_PATH))
            .await?;

        let todos: Vec<Todo> = response.json().await.map_err(ApiError::from)?;
        debug!(count = todos.len(), "Fetched todos");
        Ok(todos)
    }

    /// Create a todo. A blank description is rejected before any request.
    pub async fn create(&self, description: &str) -> Result<Todo, AuthError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(ValidationError::EmptyDescription.into());
        }

        let response = self
            .session
            .with_auth(|api| {
                api.request(Method::POST, TODOS_PATH)
                    .json(&NewTodo { description })
            })
            .await?;

        let todo: Todo = response.json().await.map_err(ApiError::from)?;
        debug!(id = todo.id, "Created todo");
        Ok(todo)
    }

    /// Replace description and done flag of a todo.
    ///
    /// Returns the server's copy when it echoes one, otherwise the values sent.
    pub async fn update(&self, id: i64, description: &str, done: bool) -> Result<Todo, AuthError> {
        let path = Self::item_path(id);
        let response = self
            .session
            .with_auth(|api| {
                api.request(Method::PUT, &path)
                    .json(&TodoUpdate { description, done })
            })
            .await?;

        match response.json::<Todo>().await {
            Ok(todo) => Ok(todo),
            Err(e) => {
                warn!(id, error = %e, "Update response carried no todo, using sent values");
                Ok(Todo {
                    id,
                    description: description.to_string(),
                    done,
                })
            }
        }
    }

    /// Flip the done flag of a todo
    pub async fn toggle(&self, todo: &Todo) -> Result<Todo, AuthError> {
        self.update(todo.id, &todo.description, !todo.done).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), AuthError> {
        let path = Self::item_path(id);
        self.session
            .with_auth(|api| api.request(Method::DELETE, &path))
            .await?;
        debug!(id, "Deleted todo");
        Ok(())
    }

    /// Look up a single todo by id from the full list
    pub async fn find(&self, id: i64) -> Result<Option<Todo>, AuthError> {
        Ok(self.list().await?.into_iter().find(|t| t.id == id))
    }
}
