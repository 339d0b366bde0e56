use super::filesystem::FileSystem;
use super::warnings::WarningChannel;
use crate::models::{ConfigFileFormat, PathResolver};
use crate::state::{QueueEvent, QueueLifecycle, QueueState};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use serde_json::{Value, json};
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;

/// Boxed future produced by a queued task
pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

type TaskAction = Box<dyn FnOnce(TaskScope) -> TaskFuture + Send>;

/// Label of the built-in requirement satisfied by [`FsQueue::write_configuration`]
pub const WRITE_CONFIGURATION: &str = "writeConfiguration";

static NEXT_REQUIREMENT_ID: AtomicU64 = AtomicU64::new(0);

/// Errors raised by [`FsQueue`]
///
/// Everything except [`QueueError::TaskFailed`] is a misuse of the queue's
/// protocol and names the contract that was broken.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("You've already requested to write the configuration!")]
    ConfigurationAlreadyRequested,

    #[error("I have already started running tasks!")]
    AlreadyStarted,

    #[error("Outstanding requirements must be staged before commit: {}", .0.join(", "))]
    OutstandingRequirements(Vec<String>),

    #[error("Requirement \"{0}\" is not outstanding on this queue")]
    UnknownRequirement(String),

    #[error("Failed to serialize the configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Task {index} (\"{description}\") failed: {message}")]
    TaskFailed {
        index: usize,
        description: String,
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

/// Opaque handle for a caller-defined mandatory step.
///
/// Tokens compare by identity: two calls to
/// [`FsQueue::add_requirement`] with the same label yield distinct tokens.
#[derive(Debug, Clone)]
pub struct RequirementToken {
    id: u64,
    label: Arc<str>,
}

impl RequirementToken {
    fn new(label: &str) -> Self {
        Self {
            id: NEXT_REQUIREMENT_ID.fetch_add(1, Ordering::Relaxed),
            label: Arc::from(label),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for RequirementToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RequirementToken {}

impl Hash for RequirementToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// What a running task can see: the queue's resolver pointed at the task's
/// directory, and the filesystem collaborator.
#[derive(Clone)]
pub struct TaskScope {
    resolver: PathResolver,
    fs: Arc<dyn FileSystem>,
}

impl TaskScope {
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    /// Absolute path of the task's directory
    pub fn path(&self) -> Utf8PathBuf {
        self.resolver.get_path(true)
    }

    /// Absolute path of `relative`, beneath the task's directory
    pub fn resolve(&self, relative: impl Into<Utf8PathBuf>) -> Utf8PathBuf {
        self.resolver.nested(relative).get_path(true)
    }
}

impl fmt::Debug for TaskScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScope")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

/// One deferred unit of work.
///
/// A task has a description for [`FsQueue::pending_operations`], an optional
/// directory the queue's resolver is pointed at while it runs, and an optional
/// diagnostic context reported if it fails.
pub struct QueuedTask {
    description: String,
    directory: Option<Utf8PathBuf>,
    context: Value,
    action: Option<TaskAction>,
}

impl QueuedTask {
    pub fn new<F, Fut>(description: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(TaskScope) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            description: description.into(),
            directory: None,
            context: Value::Null,
            action: Some(Box::new(move |scope| Box::pin(action(scope)))),
        }
    }

    /// Run with the queue's relative path set to `directory`.
    pub fn in_directory(mut self, directory: impl Into<Utf8PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Attach a payload reported on the warning channel if the task fails.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Create `relative` and its parents.
    pub fn create_directory(relative: impl Into<Utf8PathBuf>) -> Self {
        let relative = relative.into();
        Self::new(format!("Create directory {relative}"), |scope: TaskScope| async move {
            let target = scope.path();
            scope
                .fs()
                .create_dir_all(&target)
                .await
                .with_context(|| format!("Failed to create directory: {target}"))
        })
        .with_context(json!({ "operation": "createDirectory", "path": relative.as_str() }))
        .in_directory(relative)
    }

    /// Write `contents` to `relative`. The parent directory must exist by the
    /// time the task runs.
    pub fn write_file(relative: impl Into<Utf8PathBuf>, contents: impl Into<String>) -> Self {
        let relative = relative.into();
        let contents = contents.into();
        Self::new(format!("Write file {relative}"), move |scope: TaskScope| async move {
            let target = scope.path();
            scope
                .fs()
                .write_file(&target, &contents)
                .await
                .with_context(|| format!("Failed to write file: {target}"))
        })
        .with_context(json!({ "operation": "writeFile", "path": relative.as_str() }))
        .in_directory(relative)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTask")
            .field("description", &self.description)
            .field("directory", &self.directory)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Points a resolver's relative segment at a task directory and puts the
/// previous segment back when dropped, including on error or panic.
struct ScopedRelativePath<'a> {
    resolver: &'a mut PathResolver,
    previous: Utf8PathBuf,
}

impl<'a> ScopedRelativePath<'a> {
    fn enter(resolver: &'a mut PathResolver, directory: Option<&Utf8Path>) -> Self {
        let previous = resolver.relative().to_path_buf();
        if let Some(directory) = directory {
            resolver.set_relative(directory);
        }
        Self { resolver, previous }
    }

    fn resolver(&self) -> &PathResolver {
        &*self.resolver
    }
}

impl Drop for ScopedRelativePath<'_> {
    fn drop(&mut self) {
        self.resolver.set_relative(std::mem::take(&mut self.previous));
    }
}

/// Deferred filesystem commit queue.
///
/// Callers stage tasks and requirements, then call [`commit`](Self::commit)
/// once. Nothing touches the filesystem before that. Writing the
/// configuration document is always mandatory; further mandatory steps are
/// declared with [`add_requirement`](Self::add_requirement) and satisfied by
/// [`push_required`](Self::push_required).
///
/// Tasks run strictly in registration order, one at a time. A failing task
/// stops the commit; tasks that already ran stay committed and the queue can
/// not be committed again.
///
/// # Example
///
/// ```no_run
/// use cleanroom::models::{ConfigFileFormat, PathResolver};
/// use cleanroom::services::{FsQueue, QueuedTask, TokioFileSystem};
/// use std::sync::Arc;
///
/// # async fn stage() -> anyhow::Result<()> {
/// let root = PathResolver::new("/work/project", "")?;
/// let mut queue = FsQueue::new(&root, Arc::new(TokioFileSystem));
///
/// queue.create_directory(".cleanroom")?;
/// queue.write_configuration(&ConfigFileFormat::new(), ".cleanroom/cleanroom-config.json")?;
///
/// let readme = queue.add_requirement("readme")?;
/// queue.push_required(&readme, QueuedTask::write_file("README.md", "# Project\n"))?;
///
/// queue.commit().await?;
/// assert!(queue.has_committed());
/// # Ok(())
/// # }
/// ```
pub struct FsQueue {
    resolver: PathResolver,
    fs: Arc<dyn FileSystem>,
    tasks: Vec<QueuedTask>,
    /// Requirements not yet satisfied, keyed by token id
    outstanding: IndexMap<u64, Arc<str>>,
    configuration: RequirementToken,
    lifecycle: QueueLifecycle,
    diagnostics: bool,
    warnings: WarningChannel,
}

impl FsQueue {
    /// Create a queue resolving paths from a private copy of `resolver`.
    pub fn new(resolver: &PathResolver, fs: Arc<dyn FileSystem>) -> Self {
        let configuration = RequirementToken::new(WRITE_CONFIGURATION);
        let mut outstanding = IndexMap::new();
        outstanding.insert(configuration.id, Arc::clone(&configuration.label));

        Self {
            resolver: resolver.clone(),
            fs,
            tasks: Vec::new(),
            outstanding,
            configuration,
            lifecycle: QueueLifecycle::new(),
            diagnostics: true,
            warnings: WarningChannel::new(),
        }
    }

    /// Enable or disable failure diagnostics on the warning channel.
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Report failures through `warnings` instead of a private channel.
    pub fn with_warnings(mut self, warnings: WarningChannel) -> Self {
        self.warnings = warnings;
        self
    }

    /// Declare a mandatory step that must be staged before commit.
    ///
    /// # Errors
    /// [`QueueError::AlreadyStarted`] once commit has begun.
    pub fn add_requirement(&mut self, label: &str) -> Result<RequirementToken, QueueError> {
        self.ensure_pending()?;

        let token = RequirementToken::new(label);
        self.outstanding.insert(token.id, Arc::clone(&token.label));
        Ok(token)
    }

    /// Register a task.
    pub fn push(&mut self, task: QueuedTask) -> Result<(), QueueError> {
        self.ensure_pending()?;
        tracing::debug!("Queued: {}", task.description);
        self.tasks.push(task);
        Ok(())
    }

    /// Register a task that satisfies `requirement`.
    ///
    /// # Errors
    /// [`QueueError::UnknownRequirement`] if the token was issued by another
    /// queue or was already satisfied.
    pub fn push_required(
        &mut self,
        requirement: &RequirementToken,
        task: QueuedTask,
    ) -> Result<(), QueueError> {
        self.ensure_pending()?;
        if self.outstanding.shift_remove(&requirement.id).is_none() {
            return Err(QueueError::UnknownRequirement(requirement.label().to_string()));
        }
        self.push(task)
    }

    /// Stage the configuration document for writing to `relative_path`.
    ///
    /// The document is serialised now; editing it afterwards does not change
    /// what gets written. The path is resolved against the queue's resolver
    /// when the task runs.
    ///
    /// # Errors
    /// [`QueueError::ConfigurationAlreadyRequested`] on a second call.
    pub fn write_configuration(
        &mut self,
        document: &ConfigFileFormat,
        relative_path: impl Into<Utf8PathBuf>,
    ) -> Result<(), QueueError> {
        self.ensure_pending()?;
        if !self.outstanding.contains_key(&self.configuration.id) {
            return Err(QueueError::ConfigurationAlreadyRequested);
        }

        let contents = document.to_pretty_string()?;
        let relative_path = relative_path.into();
        let task = QueuedTask::new(
            format!("Write configuration to {relative_path}"),
            move |scope: TaskScope| async move {
                let target = scope.path();
                scope
                    .fs()
                    .write_file(&target, &contents)
                    .await
                    .with_context(|| format!("Failed to write configuration: {target}"))
            },
        )
        .with_context(json!({
            "operation": WRITE_CONFIGURATION,
            "path": relative_path.as_str(),
        }))
        .in_directory(relative_path);

        let configuration = self.configuration.clone();
        self.push_required(&configuration, task)
    }

    /// Stage creation of a directory (and its parents).
    pub fn create_directory(&mut self, relative: impl Into<Utf8PathBuf>) -> Result<(), QueueError> {
        self.push(QueuedTask::create_directory(relative))
    }

    /// Stage writing a UTF-8 file.
    pub fn write_file(
        &mut self,
        relative: impl Into<Utf8PathBuf>,
        contents: impl Into<String>,
    ) -> Result<(), QueueError> {
        self.push(QueuedTask::write_file(relative, contents))
    }

    /// Descriptions of registered tasks, in registration order.
    pub fn pending_operations(&self) -> Vec<&str> {
        self.tasks.iter().map(QueuedTask::description).collect()
    }

    /// Labels of requirements still to be staged.
    pub fn outstanding_requirements(&self) -> Vec<&str> {
        self.outstanding.values().map(|label| label.as_ref()).collect()
    }

    /// Run every registered task, in order.
    ///
    /// # Errors
    /// - [`QueueError::AlreadyStarted`] if commit was called before
    /// - [`QueueError::OutstandingRequirements`] listing every unstaged label
    /// - [`QueueError::TaskFailed`] for the first task that fails; the queue
    ///   stays in [`QueueState::Running`]
    pub async fn commit(&mut self) -> Result<(), QueueError> {
        // A started queue accepts no registrations, so it has nothing outstanding.
        if !self.outstanding.is_empty() {
            let labels = self.outstanding.values().map(|label| label.to_string()).collect();
            return Err(QueueError::OutstandingRequirements(labels));
        }

        let total = self.tasks.len();
        if !self.lifecycle.begin(total) {
            return Err(QueueError::AlreadyStarted);
        }
        tracing::info!("Committing {} queued task(s) under {}", total, self.resolver.base());

        for (index, task) in self.tasks.iter_mut().enumerate() {
            let Some(action) = task.action.take() else {
                continue;
            };

            self.lifecycle.emit(QueueEvent::TaskStarted {
                index,
                description: task.description.clone(),
            });
            tracing::debug!("Running task {}: {}", index, task.description);

            let outcome = {
                let scoped = ScopedRelativePath::enter(&mut self.resolver, task.directory.as_deref());
                let scope = TaskScope {
                    resolver: scoped.resolver().clone(),
                    fs: Arc::clone(&self.fs),
                };
                action(scope).await
            };

            if let Err(error) = outcome {
                let message = format!("{error:#}");
                if self.diagnostics {
                    self.warnings.emit(&task.description, &task.context, &message);
                }
                self.lifecycle.emit(QueueEvent::TaskFailed {
                    index,
                    description: task.description.clone(),
                    message: message.clone(),
                });

                return Err(QueueError::TaskFailed {
                    index,
                    description: task.description.clone(),
                    message,
                    source: error.into(),
                });
            }

            self.lifecycle.emit(QueueEvent::TaskFinished { index });
        }

        self.lifecycle.finish(total);
        tracing::info!("Commit complete: {} task(s) run", total);
        Ok(())
    }

    /// True only after a fully successful commit.
    pub fn has_committed(&self) -> bool {
        self.lifecycle.state() == QueueState::Committed
    }

    pub fn state(&self) -> QueueState {
        self.lifecycle.state()
    }

    /// The queue's private resolver.
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// A handle to the warning channel, e.g. to suspend it around a commit.
    pub fn warnings(&self) -> WarningChannel {
        self.warnings.clone()
    }

    /// Subscribe to lifecycle events of this queue.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.lifecycle.subscribe()
    }

    fn ensure_pending(&self) -> Result<(), QueueError> {
        if self.lifecycle.state().accepts_registrations() {
            Ok(())
        } else {
            Err(QueueError::AlreadyStarted)
        }
    }
}

impl fmt::Debug for FsQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsQueue")
            .field("resolver", &self.resolver)
            .field("tasks", &self.tasks)
            .field("outstanding", &self.outstanding)
            .field("state", &self.lifecycle.state())
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::services::filesystem::MockFileSystem;
    use std::sync::Mutex;

    fn root() -> PathResolver {
        PathResolver::new("/work/project", "").unwrap()
    }

    fn quiet_fs() -> Arc<dyn FileSystem> {
        let mut fs = MockFileSystem::new();
        fs.expect_write_file()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        fs.expect_create_dir_all()
            .returning(|_| Box::pin(async { Ok(()) }));
        Arc::new(fs)
    }

    #[tokio::test]
    async fn test_commit_requires_configuration() {
        let mut queue = FsQueue::new(&root(), quiet_fs());

        let err = queue.commit().await.unwrap_err();
        assert!(matches!(
            &err,
            QueueError::OutstandingRequirements(labels) if labels == &[WRITE_CONFIGURATION]
        ));
        // a refused commit does not start the queue
        assert_eq!(queue.state(), QueueState::Pending);
    }

    #[tokio::test]
    async fn test_write_configuration_writes_snapshot_bytes() {
        let mut document = ConfigFileFormat::new();
        let expected = document.to_pretty_string().unwrap();

        let mut fs = MockFileSystem::new();
        fs.expect_write_file()
            .withf(move |path, contents| {
                path.as_str() == "/work/project/.cleanroom/config.json"
                    && contents.to_string() == expected
            })
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let mut queue = FsQueue::new(&root(), Arc::new(fs));
        queue
            .write_configuration(&document, ".cleanroom/config.json")
            .unwrap();

        // edits after staging are not written
        document
            .sources
            .insert("late".to_string(), Default::default());

        queue.commit().await.unwrap();
        assert!(queue.has_committed());
    }

    #[tokio::test]
    async fn test_scope_is_restored_after_each_task() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut queue = FsQueue::new(&root().nested("base"), quiet_fs());
        queue
            .write_configuration(&ConfigFileFormat::new(), "config.json")
            .unwrap();

        for directory in [Some("first"), None, Some("second/deeper")] {
            let seen = Arc::clone(&seen);
            let mut task = QueuedTask::new("record", move |scope: TaskScope| async move {
                seen.lock().unwrap().push(scope.resolver().relative().to_string());
                Ok(())
            });
            if let Some(directory) = directory {
                task = task.in_directory(directory);
            }
            queue.push(task).unwrap();
        }

        queue.commit().await.unwrap();

        // an undirected task sees the queue's own relative segment
        assert_eq!(*seen.lock().unwrap(), vec!["first", "base", "second/deeper"]);
        assert_eq!(queue.resolver().relative().as_str(), "base");
    }

    #[tokio::test]
    async fn test_scope_is_restored_when_task_fails() {
        let mut queue = FsQueue::new(&root(), quiet_fs()).with_diagnostics(false);
        queue
            .write_configuration(&ConfigFileFormat::new(), "config.json")
            .unwrap();
        queue
            .push(
                QueuedTask::new("explode", |_scope: TaskScope| async {
                    anyhow::bail!("disk on fire")
                })
                .in_directory("somewhere"),
            )
            .unwrap();

        let err = queue.commit().await.unwrap_err();
        assert!(matches!(err, QueueError::TaskFailed { index: 1, .. }));
        assert!(err.to_string().contains("disk on fire"));
        assert_eq!(queue.resolver().relative().as_str(), "");
        assert_eq!(queue.state(), QueueState::Running);
        assert!(!queue.has_committed());
        assert_eq!(queue.warnings().emitted(), 0);
    }

    #[tokio::test]
    async fn test_commit_after_failure_is_refused() {
        let mut queue = FsQueue::new(&root(), quiet_fs()).with_diagnostics(false);
        queue
            .write_configuration(&ConfigFileFormat::new(), "config.json")
            .unwrap();
        queue
            .push(QueuedTask::new("explode", |_scope: TaskScope| async {
                anyhow::bail!("disk on fire")
            }))
            .unwrap();
        let mut rx = queue.subscribe();

        assert!(matches!(
            queue.commit().await,
            Err(QueueError::TaskFailed { .. })
        ));
        while rx.try_recv().is_ok() {}

        assert!(matches!(queue.commit().await, Err(QueueError::AlreadyStarted)));
        assert_eq!(queue.state(), QueueState::Running);
        // the refused commit emits nothing
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_registration_after_commit_fails() {
        let mut queue = FsQueue::new(&root(), quiet_fs());
        queue
            .write_configuration(&ConfigFileFormat::new(), "config.json")
            .unwrap();
        queue.commit().await.unwrap();

        assert!(matches!(
            queue.create_directory("late"),
            Err(QueueError::AlreadyStarted)
        ));
        assert!(matches!(
            queue.add_requirement("late"),
            Err(QueueError::AlreadyStarted)
        ));
        assert_eq!(queue.pending_operations().len(), 1);
    }

    #[test]
    fn test_requirement_tokens_are_unique() {
        let mut queue = FsQueue::new(&root(), quiet_fs());
        let first = queue.add_requirement("same").unwrap();
        let second = queue.add_requirement("same").unwrap();

        assert_ne!(first, second);
        assert_eq!(first.label(), second.label());
        assert_eq!(
            queue.outstanding_requirements(),
            vec![WRITE_CONFIGURATION, "same", "same"]
        );
    }

    #[test]
    fn test_foreign_token_is_rejected() {
        let mut queue = FsQueue::new(&root(), quiet_fs());
        let mut other = FsQueue::new(&root(), quiet_fs());
        let token = other.add_requirement("elsewhere").unwrap();

        let err = queue
            .push_required(&token, QueuedTask::create_directory("x"))
            .unwrap_err();
        assert!(matches!(err, QueueError::UnknownRequirement(label) if label == "elsewhere"));
        assert!(queue.pending_operations().is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_events_in_order() {
        let mut queue = FsQueue::new(&root(), quiet_fs());
        let mut events = queue.subscribe();
        queue
            .write_configuration(&ConfigFileFormat::new(), "config.json")
            .unwrap();
        queue.create_directory("out").unwrap();

        queue.commit().await.unwrap();

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(received.first(), Some(&QueueEvent::CommitStarted { total_tasks: 2 }));
        assert_eq!(received.get(3), Some(&QueueEvent::TaskStarted {
            index: 1,
            description: "Create directory out".to_string(),
        }));
        assert_eq!(received.last(), Some(&QueueEvent::Committed { tasks_run: 2 }));
    }
}
