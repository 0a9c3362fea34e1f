use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub struct Todo {
    pub id: i64,
    pub description: String,
    #[serde(default)]
    pub done: bool,
}

impl Todo {
    pub fn status_marker(&self) -> &'static str {
        if self.done {
            "[x]"
        } else {
            "[ ]"
        }
    }
}

/// Body for `POST todos/`
#[derive(Debug, Clone, Serialize)]
pub struct NewTodo<'a> {
    pub description: &'a str,
}

/// Body for `PUT todos/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct TodoUpdate<'a> {
    pub description: &'a str,
    pub done: bool,
}
