//! Image variable lookup
//!
//! An image variable's value is usually the name or path of an uploaded
//! file, but uploads are stored as `<base>-<timestamp>-<random>.<ext>` and
//! may live in several directories. Lookup runs a ranked list of
//! [`ImageLookupStrategy`]s and stops at the first hit.

use crate::config::StorageConfig;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::{debug, trace};

/// `<base>-<digits>-<digits>.<ext>`
static UNIQUE_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+)-\d+-\d+(\.[^.]+)$").unwrap_or_else(|e| panic!("invalid suffix regex: {e}"))
});

/// Extensions accepted as images.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Upload field prefix for image variables (`images_<variable>`).
pub const UPLOAD_FIELD_PREFIX: &str = "images_";

/// Whether `name` has an image extension (case-insensitive).
pub fn is_image_file(name: impl AsRef<Path>) -> bool {
    name.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Strip the unique upload suffix from a file name.
///
/// ```
/// use storyforge::resolver::extract_base_filename;
///
/// assert_eq!(extract_base_filename("photo-1234567890-123456789.png"), "photo.png");
/// assert_eq!(extract_base_filename("simple.png"), "simple.png");
/// ```
pub fn extract_base_filename(name: &str) -> String {
    match UNIQUE_SUFFIX_RE.captures(name) {
        Some(caps) => format!("{}{}", &caps[1], &caps[2]),
        None => name.to_string(),
    }
}

/// Why a file is not a usable image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageCheckError {
    #[error("image file not found: {0}")]
    NotFound(String),

    #[error("image file is empty: {0}")]
    Empty(String),

    #[error("file is not a recognized image: {0}")]
    NotAnImage(String),
}

/// Check that `path` exists, is non-empty and starts with a known image signature.
pub async fn validate_image_exists(path: &Path) -> Result<(), ImageCheckError> {
    let display = path.display().to_string();

    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => m,
        _ => return Err(ImageCheckError::NotFound(display)),
    };
    if metadata.len() == 0 {
        return Err(ImageCheckError::Empty(display));
    }

    let head = read_head(path, 16)
        .await
        .map_err(|_| ImageCheckError::NotFound(display.clone()))?;
    pdf_core::detect_format(&head).map_err(|_| ImageCheckError::NotAnImage(display))?;

    Ok(())
}

async fn read_head(path: &Path, len: u64) -> std::io::Result<Vec<u8>> {
    use tokio::io::AsyncReadExt;

    let file = tokio::fs::File::open(path).await?;
    let mut head = Vec::with_capacity(len as usize);
    file.take(len).read_to_end(&mut head).await?;
    Ok(head)
}

/// What is being looked up.
#[derive(Debug, Clone, Copy)]
pub struct LookupRequest<'a> {
    /// Image variable name.
    pub variable: &'a str,
    /// Value supplied for it (file name or path).
    pub value: &'a str,
    /// Paths delivered by the upload middleware for this request.
    pub uploaded: &'a [PathBuf],
}

impl LookupRequest<'_> {
    /// File name part of the value.
    fn value_file_name(&self) -> &str {
        self.value.rsplit(['/', '\\']).next().unwrap_or(self.value)
    }

    /// Value file name with its unique suffix removed.
    fn value_base_filename(&self) -> String {
        extract_base_filename(self.value_file_name())
    }
}

/// One way of finding the file behind an image variable.
#[async_trait]
pub trait ImageLookupStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Path of a matching file, if this strategy finds one.
    async fn lookup(&self, request: &LookupRequest<'_>) -> Option<PathBuf>;
}

/// The value is itself one of this request's uploaded paths.
#[derive(Debug, Default)]
pub struct DirectMatch;

#[async_trait]
impl ImageLookupStrategy for DirectMatch {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn lookup(&self, request: &LookupRequest<'_>) -> Option<PathBuf> {
        request
            .uploaded
            .iter()
            .find(|p| p.to_str() == Some(request.value))
            .cloned()
    }
}

/// The value is the public URL of an image stored under the uploads root,
/// such as a story's own image copy.
#[derive(Debug)]
pub struct PublicUrlMatch {
    storage: StorageConfig,
}

impl PublicUrlMatch {
    pub fn new(storage: StorageConfig) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ImageLookupStrategy for PublicUrlMatch {
    fn name(&self) -> &'static str {
        "public-url"
    }

    async fn lookup(&self, request: &LookupRequest<'_>) -> Option<PathBuf> {
        let path = self.storage.path_for_url(request.value)?;
        if !is_image_file(&path) {
            return None;
        }
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Some(path),
            _ => None,
        }
    }
}

/// A file whose name, minus its unique suffix, matches the value or the
/// variable name.
#[derive(Debug)]
pub struct PrefixMatch {
    dirs: Vec<PathBuf>,
}

impl PrefixMatch {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

#[async_trait]
impl ImageLookupStrategy for PrefixMatch {
    fn name(&self) -> &'static str {
        "prefix"
    }

    async fn lookup(&self, request: &LookupRequest<'_>) -> Option<PathBuf> {
        let exact_name = request.value_file_name();
        let value_base = request.value_base_filename();

        for dir in &self.dirs {
            let files = list_image_files(dir).await;

            if let Some(file) = files.iter().find(|f| f.name == exact_name) {
                return Some(file.path.clone());
            }

            let hit = files.iter().find(|f| {
                let base = extract_base_filename(&f.name);
                base == value_base || stem_matches_variable(&base, request.variable)
            });
            if let Some(file) = hit {
                return Some(file.path.clone());
            }
        }
        None
    }
}

fn stem_matches_variable(base: &str, variable: &str) -> bool {
    let stem = Path::new(base)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(base);
    stem == variable || stem.strip_prefix(UPLOAD_FIELD_PREFIX) == Some(variable)
}

/// Any image in the temp-upload directory whose name contains the variable name.
#[derive(Debug)]
pub struct TempImageScan {
    dir: PathBuf,
}

impl TempImageScan {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl ImageLookupStrategy for TempImageScan {
    fn name(&self) -> &'static str {
        "temp-scan"
    }

    async fn lookup(&self, request: &LookupRequest<'_>) -> Option<PathBuf> {
        if request.variable.is_empty() {
            return None;
        }
        list_image_files(&self.dir)
            .await
            .into_iter()
            .find(|f| f.name.contains(request.variable))
            .map(|f| f.path)
    }
}

/// Last resort: every known image directory, matching the value's base name
/// or the variable name anywhere in the file name.
#[derive(Debug)]
pub struct FullScan {
    dirs: Vec<PathBuf>,
}

impl FullScan {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

#[async_trait]
impl ImageLookupStrategy for FullScan {
    fn name(&self) -> &'static str {
        "full-scan"
    }

    async fn lookup(&self, request: &LookupRequest<'_>) -> Option<PathBuf> {
        let value_base = request.value_base_filename();
        let value_stem = Path::new(&value_base)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        for dir in &self.dirs {
            let hit = list_image_files(dir).await.into_iter().find(|f| {
                (!value_stem.is_empty() && f.name.contains(&value_stem))
                    || (!request.variable.is_empty() && f.name.contains(request.variable))
            });
            if let Some(file) = hit {
                return Some(file.path);
            }
        }
        None
    }
}

struct ImageFile {
    name: String,
    path: PathBuf,
    modified: SystemTime,
}

/// Image files directly inside `dir`, newest first (name breaks ties)
///
/// A missing or unreadable directory yields an empty list.
async fn list_image_files(dir: &Path) -> Vec<ImageFile> {
    let mut files = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        trace!(dir = %dir.display(), "image directory not readable");
        return files;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if !metadata.is_file() || !is_image_file(&name) {
            continue;
        }
        files.push(ImageFile {
            name,
            path: entry.path(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
    files
}

/// Result of [`ImageResolver::find_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLookup {
    Found {
        path: PathBuf,
        strategy: &'static str,
    },
    NotFound {
        error: String,
    },
}

impl ImageLookup {
    pub fn found(&self) -> bool {
        matches!(self, ImageLookup::Found { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            ImageLookup::Found { path, .. } => Some(path),
            ImageLookup::NotFound { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ImageLookup::Found { .. } => None,
            ImageLookup::NotFound { error } => Some(error),
        }
    }
}

/// Runs lookup strategies in order.
pub struct ImageResolver {
    strategies: Vec<Box<dyn ImageLookupStrategy>>,
}

impl ImageResolver {
    /// Direct match, public URL, prefix match, temp-image scan, then full scan.
    pub fn standard(storage: &StorageConfig) -> Self {
        let image_dirs: Vec<PathBuf> = storage.image_dirs().iter().map(|d| d.to_path_buf()).collect();
        let mut all_dirs = image_dirs.clone();
        all_dirs.push(storage.uploads_dir.clone());

        Self::with_strategies(vec![
            Box::new(DirectMatch),
            Box::new(PublicUrlMatch::new(storage.clone())),
            Box::new(PrefixMatch::new(image_dirs)),
            Box::new(TempImageScan::new(storage.temp_images_dir.clone())),
            Box::new(FullScan::new(all_dirs)),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ImageLookupStrategy>>) -> Self {
        Self { strategies }
    }

    /// Locate the file for an image variable.
    pub async fn find_image(&self, variable: &str, value: &str, uploaded: &[PathBuf]) -> ImageLookup {
        let request = LookupRequest {
            variable,
            value,
            uploaded,
        };

        for strategy in &self.strategies {
            if let Some(path) = strategy.lookup(&request).await {
                debug!(variable, strategy = strategy.name(), path = %path.display(), "image resolved");
                return ImageLookup::Found {
                    path,
                    strategy: strategy.name(),
                };
            }
        }

        ImageLookup::NotFound {
            error: format!("image not found for variable '{variable}' (value: '{value}')"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_base_filename() {
        assert_eq!(extract_base_filename("photo-1234567890-123456789.png"), "photo.png");
        assert_eq!(extract_base_filename("simple.png"), "simple.png");
        assert_eq!(extract_base_filename("my-photo-1-2.jpeg"), "my-photo.jpeg");
        assert_eq!(extract_base_filename("photo-123.png"), "photo-123.png");
        assert_eq!(extract_base_filename("-1-2.png"), "-1-2.png");
    }

    #[test]
    fn test_is_image_file() {
        for name in ["a.jpg", "a.jpeg", "a.png", "a.gif", "a.webp", "A.PNG", "b.JpEg"] {
            assert!(is_image_file(name), "{name}");
        }
        for name in ["a.txt", "a.pdf", "a.doc", "a.exe", "png", "a."] {
            assert!(!is_image_file(name), "{name}");
        }
    }

    #[test]
    fn test_stem_matches_variable() {
        assert!(stem_matches_variable("avatar.png", "avatar"));
        assert!(stem_matches_variable("images_avatar.png", "avatar"));
        assert!(!stem_matches_variable("avatar2.png", "avatar"));
    }

    #[test]
    fn test_lookup_request_names() {
        let request = LookupRequest {
            variable: "photo",
            value: "/uploads/temp-images/photo-1700000000000-42.png",
            uploaded: &[],
        };
        assert_eq!(request.value_file_name(), "photo-1700000000000-42.png");
        assert_eq!(request.value_base_filename(), "photo.png");
    }

    #[test]
    fn test_lookup_result_accessors() {
        let found = ImageLookup::Found {
            path: PathBuf::from("a.png"),
            strategy: "direct",
        };
        assert!(found.found());
        assert_eq!(found.path(), Some(Path::new("a.png")));
        assert_eq!(found.error(), None);

        let missing = ImageLookup::NotFound {
            error: "nope".into(),
        };
        assert!(!missing.found());
        assert_eq!(missing.error(), Some("nope"));
    }
}
