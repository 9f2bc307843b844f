//! Image lookup against a real directory layout

use std::path::{Path, PathBuf};
use storyforge::{validate_image_exists, ImageCheckError, ImageResolver, StorageConfig};
use tempfile::TempDir;

fn create_test_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 40, 40]));
    let mut buffer = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .unwrap();
    buffer
}

async fn setup() -> (TempDir, StorageConfig) {
    let dir = TempDir::new().unwrap();
    let storage = StorageConfig::under(dir.path());
    storage.ensure_dirs().await.unwrap();
    (dir, storage)
}

fn write_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, create_test_png()).unwrap();
    path
}

#[tokio::test]
async fn test_direct_match_on_uploaded_path() {
    let (_dir, storage) = setup().await;
    let upload = write_png(&storage.temp_images_dir, "images_kid-1700000000000-1.png");
    let resolver = ImageResolver::standard(&storage);

    let value = upload.to_string_lossy().into_owned();
    let lookup = resolver.find_image("kid", &value, &[upload.clone()]).await;

    assert_eq!(lookup.path(), Some(upload.as_path()));
    assert!(matches!(lookup, storyforge::ImageLookup::Found { strategy: "direct", .. }));
}

#[tokio::test]
async fn test_public_url_of_stored_image() {
    let (_dir, storage) = setup().await;
    let story_dir = storage.histoire_images_dir.join("histoire-1-2");
    std::fs::create_dir_all(&story_dir).unwrap();
    let stored = write_png(&story_dir, "avatar-1700000000000-3.png");
    let resolver = ImageResolver::standard(&storage);

    let lookup = resolver
        .find_image("avatar", "/uploads/histoire-images/histoire-1-2/avatar-1700000000000-3.png", &[])
        .await;
    assert_eq!(lookup.path(), Some(stored.as_path()));
    assert!(matches!(lookup, storyforge::ImageLookup::Found { strategy: "public-url", .. }));

    // Story copies live one level down and are invisible to name matching
    let lookup = resolver.find_image("avatar", "avatar.png", &[]).await;
    assert!(!lookup.found());

    let lookup = resolver
        .find_image("avatar", "/uploads/../secret.png", &[])
        .await;
    assert!(!lookup.found());
}

#[tokio::test]
async fn test_prefix_match_ignores_unique_suffix() {
    let (_dir, storage) = setup().await;
    let stored = write_png(&storage.histoire_images_dir, "photo-1700000000000-42.png");
    let resolver = ImageResolver::standard(&storage);

    let lookup = resolver.find_image("kid", "photo.png", &[]).await;

    assert_eq!(lookup.path(), Some(stored.as_path()));
    assert!(matches!(lookup, storyforge::ImageLookup::Found { strategy: "prefix", .. }));
}

#[tokio::test]
async fn test_temp_scan_matches_variable_in_name() {
    let (_dir, storage) = setup().await;
    let upload = write_png(&storage.temp_images_dir, "upload-kid-123.png");
    let resolver = ImageResolver::standard(&storage);

    let lookup = resolver.find_image("kid", "something-else.png", &[]).await;

    assert_eq!(lookup.path(), Some(upload.as_path()));
    assert!(matches!(lookup, storyforge::ImageLookup::Found { strategy: "temp-scan", .. }));
}

#[tokio::test]
async fn test_full_scan_searches_uploads_root() {
    let (_dir, storage) = setup().await;
    let art = write_png(&storage.uploads_dir, "hero-art-final.png");
    let resolver = ImageResolver::standard(&storage);

    let lookup = resolver.find_image("hero", "hero-art.jpg", &[]).await;

    assert_eq!(lookup.path(), Some(art.as_path()));
    assert!(matches!(lookup, storyforge::ImageLookup::Found { strategy: "full-scan", .. }));
}

#[tokio::test]
async fn test_non_image_files_are_ignored() {
    let (_dir, storage) = setup().await;
    std::fs::write(storage.temp_images_dir.join("kid-notes.txt"), b"hello").unwrap();
    let resolver = ImageResolver::standard(&storage);

    let lookup = resolver.find_image("kid", "kid.png", &[]).await;

    assert!(!lookup.found());
    let error = lookup.error().unwrap();
    assert!(error.contains("'kid'"), "{error}");
}

#[tokio::test]
async fn test_validate_image_exists() {
    let (_dir, storage) = setup().await;
    let dir = &storage.temp_images_dir;
    let good = write_png(dir, "good.png");
    let empty = dir.join("empty.png");
    std::fs::write(&empty, b"").unwrap();
    let fake = dir.join("fake.png");
    std::fs::write(&fake, b"this is not an image").unwrap();

    assert_eq!(validate_image_exists(&good).await, Ok(()));
    assert!(matches!(
        validate_image_exists(&empty).await,
        Err(ImageCheckError::Empty(_))
    ));
    assert!(matches!(
        validate_image_exists(&fake).await,
        Err(ImageCheckError::NotAnImage(_))
    ));
    assert!(matches!(
        validate_image_exists(&dir.join("missing.png")).await,
        Err(ImageCheckError::NotFound(_))
    ));
    assert!(matches!(
        validate_image_exists(dir).await,
        Err(ImageCheckError::NotFound(_))
    ));
}
