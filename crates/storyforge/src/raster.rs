//! PDF page rasterization for browser previews
//!
//! Pages are rendered by an external `pdftoppm` into a scratch directory;
//! only complete pages are moved into the destination, so a failed or
//! timed-out run leaves nothing behind.

use crate::config::RenderConfig;
use crate::files::{move_file, remove_if_exists, unique_file_name};
use pdf_core::PageSize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Error type for rasterization.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("rasterizer binary not available: {0}")]
    ToolUnavailable(std::io::Error),

    #[error("rasterizer failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("cannot rasterize malformed PDF: {0}")]
    MalformedPdf(String),

    #[error("rasterizer timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RasterError {
    /// Toolchain problems: the PDF itself is fine, previews are just unavailable.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            RasterError::ToolUnavailable(_)
                | RasterError::ExecutionFailed { .. }
                | RasterError::Timeout(_)
        )
    }
}

/// Preview image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSize {
    pub width: u32,
    pub height: u32,
}

/// Scale a page to fit `max_width` x `max_height`, keeping its aspect ratio.
pub fn preview_size(page: PageSize, max_width: u32, max_height: u32) -> PreviewSize {
    if page.width <= 0.0 || page.height <= 0.0 {
        return PreviewSize {
            width: max_width,
            height: max_height,
        };
    }
    let scale = (max_width as f64 / page.width).min(max_height as f64 / page.height);
    PreviewSize {
        width: ((page.width * scale).round() as u32).max(1),
        height: ((page.height * scale).round() as u32).max(1),
    }
}

/// Converts composed PDFs into one PNG per page.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    config: RenderConfig,
}

impl Rasterizer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Rasterize every page of `pdf` into `out_dir`.
    ///
    /// Returns the created files in page order, named
    /// `<purpose>-<epoch-ms>-<random>.png`.
    pub async fn to_preview_images(
        &self,
        pdf: &[u8],
        out_dir: &Path,
        purpose: &str,
    ) -> Result<Vec<PathBuf>, RasterError> {
        let (page_count, first_page) =
            pdf_core::inspect_pdf(pdf).map_err(|e| RasterError::MalformedPdf(e.to_string()))?;
        let size = preview_size(
            first_page,
            self.config.max_preview_width,
            self.config.max_preview_height,
        );

        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("input.pdf");
        tokio::fs::write(&input, pdf).await?;

        self.run_rasterizer(&input, &scratch.path().join("page"), size)
            .await?;

        let pages = collect_pages(scratch.path()).await?;
        if pages.len() != page_count {
            debug!(expected = page_count, got = pages.len(), "page count mismatch");
        }

        let outputs = publish_pages(pages, out_dir, purpose).await?;

        info!(pages = outputs.len(), width = size.width, height = size.height, "previews rendered");
        Ok(outputs)
    }

    async fn run_rasterizer(
        &self,
        input: &Path,
        prefix: &Path,
        size: PreviewSize,
    ) -> Result<(), RasterError> {
        let mut command = tokio::process::Command::new(&self.config.rasterizer);
        command
            .arg("-png")
            .args(["-r", &self.config.dpi.to_string()])
            .args(["-scale-to-x", &size.width.to_string()])
            .args(["-scale-to-y", &size.height.to_string()])
            .arg(input)
            .arg(prefix)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.raster_timeout, command.output())
            .await
            .map_err(|_| RasterError::Timeout(self.config.raster_timeout))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    RasterError::ToolUnavailable(e)
                }
                _ => RasterError::Io(e),
            })?;

        if !output.status.success() {
            return Err(RasterError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}

/// Move rendered pages into `out_dir`; all or nothing.
async fn publish_pages(
    pages: Vec<PathBuf>,
    out_dir: &Path,
    purpose: &str,
) -> std::io::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out_dir).await?;
    let mut outputs: Vec<PathBuf> = Vec::with_capacity(pages.len());
    for page in pages {
        let target = out_dir.join(unique_file_name(purpose, "png"));
        if let Err(e) = move_file(&page, &target).await {
            for moved in &outputs {
                if let Err(cleanup) = remove_if_exists(moved).await {
                    warn!(path = %moved.display(), error = %cleanup, "failed to remove preview");
                }
            }
            return Err(e);
        }
        outputs.push(target);
    }
    Ok(outputs)
}

/// `page-<n>.png` files in `dir`, ordered by page number
///
/// pdftoppm zero-pads the number depending on the page count.
async fn collect_pages(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(number) = page_number(&name) {
            pages.push((number, entry.path()));
        }
    }
    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_number(name: &str) -> Option<u32> {
    name.strip_prefix("page-")?.strip_suffix(".png")?.parse().ok()
}
