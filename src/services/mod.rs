//! Services module - staging and committing filesystem work.
//!
//! Nothing here touches the disk at registration time. Callers describe the
//! work on an [`FsQueue`], and a single [`FsQueue::commit`] runs it in order
//! through a [`FileSystem`] collaborator.
//!
//! # Components
//!
//! - [`FsQueue`]: Deferred task queue with mandatory requirements. Handles:
//!   - Requirement tokens that must be satisfied before commit
//!   - The one-shot `writeConfiguration` step, serialised at registration
//!   - Per-task path scoping, restored after every task
//!
//! - [`FileSystem`] / [`TokioFileSystem`]: The mutations tasks may perform.
//!
//! - [`WarningChannel`]: Diagnostics for failed tasks, with scoped suspension.
//!
//! - [`AnswerSource`]: Contract with the component that collects user
//!   answers, plus [`ScriptedAnswers`] for non-interactive runs.
//!
//! # Usage Example
//!
//! ```ignore
//! use cleanroom::services::{FsQueue, TokioFileSystem};
//!
//! let mut queue = FsQueue::new(&resolver, Arc::new(TokioFileSystem));
//! queue.create_directory(".cleanroom")?;
//! queue.write_configuration(&document, ".cleanroom/cleanroom-config.json")?;
//! queue.commit().await?;
//! ```

pub mod answers;
pub mod filesystem;
pub mod fs_queue;
pub mod warnings;

pub use answers::{
    AnswerKind, AnswerSource, Answers, PromptError, Question, ScriptedAnswers, Validator,
    is_valid_key, key_question, project_from_answers, project_questions,
};
pub use filesystem::{FileSystem, FsFuture, TokioFileSystem};
pub use fs_queue::{
    FsQueue, QueueError, QueuedTask, RequirementToken, TaskFuture, TaskScope, WRITE_CONFIGURATION,
};
pub use warnings::{WarningChannel, WarningSuspension};
