use crate::models::{ConfigFileFormat, PathResolver};
use crate::services::{FileSystem, FsQueue, WarningChannel};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::sync::Arc;

/// Name of the optional settings file looked up in the project root
pub const SETTINGS_FILE: &str = "cleanroom.toml";

/// Prefix of the environment variables overriding settings
pub const ENV_PREFIX: &str = "CLEANROOM";

/// Runtime settings for the stager.
///
/// Sources, later ones winning:
/// - built-in defaults
/// - `cleanroom.toml` in the project root (optional)
/// - `CLEANROOM_*` environment variables, e.g. `CLEANROOM_DEBUG=true`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StagerSettings {
    /// Absolute directory every staged path is relative to
    pub project_root: Utf8PathBuf,
    /// Location of the configuration document, relative to `project_root`
    pub config_file: Utf8PathBuf,
    /// Report failed tasks on the warning channel
    pub diagnostics: bool,
    pub log_dir: Utf8PathBuf,
    pub debug: bool,
}

impl StagerSettings {
    /// Load settings for the project rooted at `project_root`.
    pub fn load(project_root: &Utf8Path) -> Result<Self> {
        let settings_path = project_root.join(SETTINGS_FILE);

        let settings = ::config::Config::builder()
            .set_default("project_root", project_root.as_str())?
            .set_default("config_file", ".cleanroom/cleanroom-config.json")?
            .set_default("diagnostics", true)?
            .set_default("log_dir", "logs")?
            .set_default("debug", false)?
            .add_source(::config::File::from(settings_path.as_std_path()).required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("Failed to read settings from {}", settings_path))?;

        let settings: Self = settings
            .try_deserialize()
            .with_context(|| format!("Invalid settings in {}", settings_path))?;

        tracing::debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    /// Absolute path of the configuration document.
    pub fn config_path(&self) -> Utf8PathBuf {
        self.project_root.join(&self.config_file)
    }
}

/// Reads the configuration document and stages writes of it.
#[derive(Debug, Clone)]
pub struct ConfigurationStore {
    /// Project root plus the config file path
    location: PathResolver,
    diagnostics: bool,
}

impl ConfigurationStore {
    pub fn new(settings: &StagerSettings) -> Result<Self> {
        let location = PathResolver::new(&settings.project_root, &settings.config_file)
            .context("Project root must be absolute")?;

        Ok(Self {
            location,
            diagnostics: settings.diagnostics,
        })
    }

    /// Absolute path of the document.
    pub fn path(&self) -> Utf8PathBuf {
        self.location.get_path(true)
    }

    /// Resolver for entities inside the document: the document's directory.
    pub fn document_resolver(&self) -> PathResolver {
        let directory = self
            .location
            .relative()
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_default();
        let mut resolver = self.location.clone();
        resolver.set_relative(directory);
        resolver
    }

    /// Load the document, or an empty one if the file does not exist yet.
    ///
    /// # Errors
    /// Fails when the path cannot be checked or read, is not JSON, is not a
    /// well-formed document, or has dangling references.
    pub async fn load(&self) -> Result<ConfigFileFormat> {
        let path = self.path();
        let exists = tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check configuration: {}", path))?;
        if !exists {
            tracing::warn!("Configuration not found at {}, starting empty", path);
            return Ok(ConfigFileFormat::default());
        }

        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read configuration: {}", path))?;
        let value: serde_json::Value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse configuration: {}", path))?;
        let document = ConfigFileFormat::from_json(&self.document_resolver(), &value)
            .with_context(|| format!("Invalid configuration: {}", path))?;

        tracing::info!(
            "Loaded configuration from {} ({} project(s))",
            path,
            document.projects.len()
        );
        Ok(document)
    }

    /// A queue rooted at the project root with the configured diagnostics.
    pub fn queue(&self, fs: Arc<dyn FileSystem>, warnings: WarningChannel) -> Result<FsQueue> {
        let root = PathResolver::new(self.location.base(), "")
            .context("Project root must be absolute")?;

        Ok(FsQueue::new(&root, fs)
            .with_diagnostics(self.diagnostics)
            .with_warnings(warnings))
    }

    /// Stage the document's directory and then the document itself.
    pub fn stage(&self, queue: &mut FsQueue, document: &ConfigFileFormat) -> Result<()> {
        let directory = self.document_resolver();
        if !directory.relative().as_str().is_empty() {
            queue
                .create_directory(directory.relative())
                .context("Failed to stage configuration directory")?;
        }

        queue
            .write_configuration(document, self.location.relative())
            .context("Failed to stage configuration")?;
        Ok(())
    }
}
