//! Core domain types: action records, history messages, loop signals and
//! the task queue.

pub mod action;
pub mod message;
pub mod signal;
pub mod task;

pub use action::{ActionLog, ActionRecord};
pub use message::{ChatMessage, Message, MessageBody, Role};
pub use signal::{LoopSignal, Severity, SignalKind};
pub use task::{Task, TaskQueue, TaskStatus};
