//! Directory layout and rendering settings

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// A configuration value could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid value for {var}: {value:?} ({reason})")]
pub struct ConfigError {
    pub var: String,
    pub value: String,
    pub reason: String,
}

/// Where uploaded and generated files live.
///
/// Every directory sits under `uploads_dir` and is published at
/// `<public_prefix>/<path relative to uploads_dir>`.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Template PDFs and covers.
    pub uploads_dir: PathBuf,
    /// Transient per-request uploaded images.
    pub temp_images_dir: PathBuf,
    /// Images kept with generated stories.
    pub histoire_images_dir: PathBuf,
    /// Rasterized pages of generated stories.
    pub previews_dir: PathBuf,
    /// Preview PDFs and pages that are not persisted.
    pub temp_previews_dir: PathBuf,
    /// Final generated PDFs.
    pub pdfs_dir: PathBuf,
    /// URL path the uploads root is served under (default: `/uploads`).
    pub public_prefix: String,
}

impl StorageConfig {
    /// Standard layout under `root`.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            temp_images_dir: root.join("temp-images"),
            histoire_images_dir: root.join("histoire-images"),
            previews_dir: root.join("previews"),
            temp_previews_dir: root.join("temp-previews"),
            pdfs_dir: root.join("pdfs"),
            uploads_dir: root,
            public_prefix: "/uploads".into(),
        }
    }

    /// Directories searched when resolving an image variable by name.
    pub fn image_dirs(&self) -> [&Path; 2] {
        [&self.temp_images_dir, &self.histoire_images_dir]
    }

    /// Create every directory of the layout.
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            &self.uploads_dir,
            &self.temp_images_dir,
            &self.histoire_images_dir,
            &self.previews_dir,
            &self.temp_previews_dir,
            &self.pdfs_dir,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    /// Public URL of a file stored under the uploads root.
    ///
    /// Returns `None` for paths outside it.
    pub fn public_url(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.uploads_dir).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Option<_>>()?;
        if parts.is_empty() {
            return None;
        }
        Some(format!(
            "{}/{}",
            self.public_prefix.trim_end_matches('/'),
            parts.join("/")
        ))
    }

    /// Disk path behind a public URL.
    ///
    /// Returns `None` for foreign URLs and for anything that would escape
    /// the uploads root.
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let prefix = self.public_prefix.trim_end_matches('/');
        let rest = url.strip_prefix(prefix)?.strip_prefix('/')?;

        let mut path = self.uploads_dir.clone();
        for segment in rest.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
                return None;
            }
            path.push(segment);
        }
        Some(path)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::under("uploads")
    }
}

/// Preview and rasterizer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Preview bounding box width in pixels (default: `1200`).
    pub max_preview_width: u32,
    /// Preview bounding box height in pixels (default: `900`).
    pub max_preview_height: u32,
    /// Rasterization resolution (default: `200`).
    pub dpi: u32,
    /// Rasterizer executable (default: `pdftoppm`).
    pub rasterizer: String,
    /// Upper bound for one rasterizer run (default: 60 s).
    pub raster_timeout: Duration,
    /// Age after which preview files are swept (default: 24 h).
    pub preview_retention: Duration,
    /// How often the sweeper runs (default: 1 h).
    pub sweep_interval: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_preview_width: 1200,
            max_preview_height: 900,
            dpi: 200,
            rasterizer: "pdftoppm".into(),
            raster_timeout: Duration::from_secs(60),
            preview_retention: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub render: RenderConfig,
}

impl AppConfig {
    /// Default settings with every directory under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::under(root),
            render: RenderConfig::default(),
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                               | Default     |
    /// |---------------------------------------|-------------|
    /// | `STORYFORGE_UPLOADS_DIR`              | `uploads`   |
    /// | `STORYFORGE_PUBLIC_PREFIX`            | `/uploads`  |
    /// | `STORYFORGE_PREVIEW_MAX_WIDTH`        | `1200`      |
    /// | `STORYFORGE_PREVIEW_MAX_HEIGHT`       | `900`       |
    /// | `STORYFORGE_RASTER_DPI`               | `200`       |
    /// | `STORYFORGE_RASTERIZER`               | `pdftoppm`  |
    /// | `STORYFORGE_RASTER_TIMEOUT_SECS`      | `60`        |
    /// | `STORYFORGE_PREVIEW_RETENTION_HOURS`  | `24`        |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RenderConfig::default();

        let mut storage = StorageConfig::under(
            lookup("STORYFORGE_UPLOADS_DIR").unwrap_or_else(|| "uploads".into()),
        );
        if let Some(prefix) = lookup("STORYFORGE_PUBLIC_PREFIX") {
            storage.public_prefix = prefix;
        }

        let render = RenderConfig {
            max_preview_width: parse_var(&lookup, "STORYFORGE_PREVIEW_MAX_WIDTH", defaults.max_preview_width)?,
            max_preview_height: parse_var(&lookup, "STORYFORGE_PREVIEW_MAX_HEIGHT", defaults.max_preview_height)?,
            dpi: parse_var(&lookup, "STORYFORGE_RASTER_DPI", defaults.dpi)?,
            rasterizer: lookup("STORYFORGE_RASTERIZER").unwrap_or(defaults.rasterizer),
            raster_timeout: Duration::from_secs(parse_var(
                &lookup,
                "STORYFORGE_RASTER_TIMEOUT_SECS",
                defaults.raster_timeout.as_secs(),
            )?),
            preview_retention: Duration::from_secs(
                parse_var(&lookup, "STORYFORGE_PREVIEW_RETENTION_HOURS", 24u64)? * 60 * 60,
            ),
            sweep_interval: defaults.sweep_interval,
        };

        Ok(Self { storage, render })
    }
}

fn parse_var<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            var: var.to_string(),
            value,
            reason: e.to_string(),
        }),
    }
}
