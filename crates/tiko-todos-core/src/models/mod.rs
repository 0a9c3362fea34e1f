//! Data models for the todo service.
//!
//! - `Todo`: a todo item as returned by the API
//! - `NewTodo`, `TodoUpdate`: request bodies for create and update

pub mod todo;

pub use todo::{NewTodo, Todo, TodoUpdate};
