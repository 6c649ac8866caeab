//! Processes: creation, fork, and exit.

mod task;
mod tid;

pub use task::{Task, TaskState};
