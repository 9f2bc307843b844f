//! End-to-end generation against a temporary uploads directory
//!
//! The rasterizer is pointed at a binary that does not exist, so previews are
//! skipped and everything else runs for real.

use base64::Engine;
use lopdf::{dictionary, Object};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storyforge::{
    AppConfig, GenerationRequest, HistoireStore, MemoryStore, Stage, StoryError, StoryService,
    UploadedFiles,
};
use template::{EditorElement, ElementKind, Template};
use tempfile::TempDir;

fn create_test_pdf() -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let contents_id = doc.add_object(lopdf::Stream::new(
        dictionary! {},
        b"0.9 g 0 0 400 300 re f".to_vec(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 400.into(), 300.into()],
        "Resources" => dictionary! {},
        "Contents" => contents_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => 1,
            "Kids" => vec![Object::Reference(page_id)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

fn create_test_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 40, 40]));
    let mut buffer = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .unwrap();
    buffer
}

fn page_content(pdf: &[u8]) -> String {
    let doc = lopdf::Document::load_mem(pdf).unwrap();
    let page_id = doc.get_pages()[&1];
    String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).to_string()
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    files
}

struct Fixture {
    _dir: TempDir,
    config: AppConfig,
    service: StoryService<MemoryStore>,
    template_id: String,
}

impl Fixture {
    async fn new(text: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::with_root(dir.path());
        config.render.rasterizer = "storyforge-no-such-rasterizer".into();
        config.storage.ensure_dirs().await.unwrap();
        std::fs::write(config.storage.uploads_dir.join("template.pdf"), create_test_pdf()).unwrap();

        let elements = vec![
            EditorElement {
                kind: ElementKind::Text,
                x: 10.0,
                y: 10.0,
                width: 80.0,
                height: 10.0,
                content: Some(text.to_string()),
                font_size: Some(14.0),
                ..Default::default()
            },
            EditorElement {
                kind: ElementKind::Image,
                x: 50.0,
                y: 50.0,
                width: 25.0,
                height: 50.0,
                variable_name: Some("avatar".into()),
                ..Default::default()
            },
        ];
        let store = Arc::new(MemoryStore::new());
        let template = store
            .insert_template(
                Template {
                    title: "Le voyage".into(),
                    pdf_path: "/uploads/template.pdf".into(),
                    ..Default::default()
                },
                elements,
            )
            .await;

        Self {
            service: StoryService::new(config.clone(), store),
            config,
            template_id: template.id,
            _dir: dir,
        }
    }

    /// Save an avatar upload the way the upload middleware would.
    fn upload_avatar(&self) -> UploadedFiles {
        let path = self
            .config
            .storage
            .temp_images_dir
            .join("images_avatar-1700000000000-7.png");
        std::fs::write(&path, create_test_png()).unwrap();
        UploadedFiles::from([("images_avatar".to_string(), path)])
    }

    fn request(&self, variables: serde_json::Value, uploads: UploadedFiles) -> GenerationRequest {
        GenerationRequest {
            template_id: self.template_id.clone(),
            variables,
            uploads,
            user_id: Some("user-1".into()),
        }
    }

    fn path(&self, url: &str) -> PathBuf {
        self.config.storage.path_for_url(url).unwrap()
    }
}

#[tokio::test]
async fn test_preview_writes_temp_pdf_only() {
    let fx = Fixture::new("Bonjour (nom)").await;
    let uploads = fx.upload_avatar();
    let upload_path = uploads["images_avatar"].clone();

    let outcome = fx
        .service
        .preview(fx.request(json!({"nom": "Ali"}), uploads))
        .await
        .unwrap();

    assert!(outcome.histoire.is_none());
    assert!(outcome.pdf_url.starts_with("/uploads/temp-previews/preview-"), "{}", outcome.pdf_url);
    assert!(outcome.preview_urls.is_empty());
    assert!(outcome.preview_warning.is_some());
    assert_eq!((outcome.rendered, outcome.failed), (2, 0));

    let pdf = std::fs::read(fx.path(&outcome.pdf_url)).unwrap();
    let content = page_content(&pdf);
    assert!(content.contains("(Bonjour Ali) Tj"), "{content}");
    assert!(content.contains("100 0 0 150 200 0 cm"), "{content}");

    assert!(!upload_path.exists(), "temp upload must be removed");
    assert!(files_in(&fx.config.storage.pdfs_dir).is_empty());
    assert!(files_in(&fx.config.storage.histoire_images_dir).is_empty());
}

#[tokio::test]
async fn test_generate_persists_histoire() {
    let fx = Fixture::new("Bonjour (nom)").await;
    let uploads = fx.upload_avatar();

    let outcome = fx
        .service
        .generate(fx.request(json!({"nom": "Ali"}), uploads))
        .await
        .unwrap();

    let histoire = outcome.histoire.expect("histoire stored");
    assert_eq!(histoire.template_id, fx.template_id);
    assert_eq!(histoire.user_id.as_deref(), Some("user-1"));
    assert_eq!(histoire.pdf_url.as_deref(), Some(outcome.pdf_url.as_str()));
    assert!(outcome.pdf_url.starts_with("/uploads/pdfs/histoire-"));
    assert!(fx.path(&outcome.pdf_url).exists());

    // The avatar is kept with the story since the upload itself is gone
    let avatar = histoire.variables["avatar"].as_str().unwrap();
    let story_images = format!("/uploads/histoire-images/{}/avatar-", histoire.id);
    assert!(avatar.starts_with(&story_images), "{avatar}");
    assert_eq!(histoire.image_urls, vec![avatar.to_string()]);
    assert_eq!(std::fs::read(fx.path(avatar)).unwrap(), create_test_png());
    assert!(files_in(&fx.config.storage.histoire_images_dir)
        .iter()
        .all(|p| p.is_dir()));
    assert_eq!(histoire.variables["nom"], json!("Ali"));

    let stored = fx.service.store().get_histoire(&histoire.id).await.unwrap();
    assert_eq!(stored.pdf_url, histoire.pdf_url);
}

#[tokio::test]
async fn test_delete_histoire_removes_only_its_files() {
    let fx = Fixture::new("Bonjour (nom)").await;

    let first = fx
        .service
        .generate(fx.request(json!({"nom": "Ali"}), fx.upload_avatar()))
        .await
        .unwrap();
    let second = fx
        .service
        .generate(fx.request(json!({"nom": "Lina"}), fx.upload_avatar()))
        .await
        .unwrap();
    let first_story = first.histoire.unwrap();
    let second_story = second.histoire.unwrap();

    let removed = fx.service.delete_histoire(&first_story.id).await.unwrap();

    assert_eq!(removed, 2, "pdf and avatar copy");
    assert!(!fx.path(&first.pdf_url).exists());
    assert!(!fx
        .config
        .storage
        .histoire_images_dir
        .join(&first_story.id)
        .exists());
    assert!(fx.path(&second.pdf_url).exists());
    let second_avatar = second_story.variables["avatar"].as_str().unwrap();
    assert!(fx.path(second_avatar).exists());

    let err = fx.service.store().get_histoire(&first_story.id).await.unwrap_err();
    assert!(err.is_not_found());
    let err = fx.service.delete_histoire(&first_story.id).await.unwrap_err();
    assert!(matches!(err, StoryError::HistoireNotFound(_)));
}

#[tokio::test]
async fn test_delete_keeps_files_only_referenced_by_variables() {
    let fx = Fixture::new("Bonjour (nom)").await;

    let first = fx
        .service
        .generate(fx.request(json!({"nom": "Ali"}), fx.upload_avatar()))
        .await
        .unwrap()
        .histoire
        .unwrap();
    let first_avatar = first.variables["avatar"].as_str().unwrap().to_string();

    let second = fx
        .service
        .generate(fx.request(
            json!({"nom": "Lina", "souvenir": first_avatar}),
            fx.upload_avatar(),
        ))
        .await
        .unwrap()
        .histoire
        .unwrap();
    assert_eq!(second.variables["souvenir"], json!(first_avatar));

    let removed = fx.service.delete_histoire(&second.id).await.unwrap();

    assert_eq!(removed, 2, "pdf and avatar copy");
    assert!(fx.path(&first_avatar).exists());
    assert!(!fx.path(second.variables["avatar"].as_str().unwrap()).exists());
}

#[tokio::test]
async fn test_story_images_are_not_matched_by_name() {
    let fx = Fixture::new("Bonjour (nom)").await;
    fx.service
        .generate(fx.request(json!({"nom": "Ali"}), fx.upload_avatar()))
        .await
        .unwrap();

    let failure = fx
        .service
        .generate(fx.request(
            json!({"nom": "Lina", "avatar": "ma-photo.png"}),
            UploadedFiles::new(),
        ))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Validated);
    let report = failure.validation_report().unwrap();
    assert_eq!(report.image_errors.len(), 1);
    assert_eq!(report.image_errors[0].variable, "avatar");
}

#[tokio::test]
async fn test_story_image_url_can_be_reused() {
    let fx = Fixture::new("Bonjour (nom)").await;
    let first = fx
        .service
        .generate(fx.request(json!({"nom": "Ali"}), fx.upload_avatar()))
        .await
        .unwrap()
        .histoire
        .unwrap();
    let first_avatar = first.variables["avatar"].as_str().unwrap().to_string();

    let second = fx
        .service
        .generate(fx.request(
            json!({"nom": "Ali", "avatar": first_avatar}),
            UploadedFiles::new(),
        ))
        .await
        .unwrap()
        .histoire
        .unwrap();
    let second_avatar = second.variables["avatar"].as_str().unwrap();
    assert_ne!(second_avatar, first_avatar);

    fx.service.delete_histoire(&first.id).await.unwrap();
    assert!(fx.path(second_avatar).exists());
}

#[tokio::test]
async fn test_validation_failure_writes_nothing() {
    let fx = Fixture::new("(nom) a (age) ans").await;
    let stray = fx.config.storage.temp_images_dir.join("images_other-1-2.png");
    std::fs::write(&stray, b"not an image").unwrap();
    let uploads = UploadedFiles::from([("images_other".to_string(), stray.clone())]);

    let failure = fx
        .service
        .generate(fx.request(json!({"nom": "Ali", "avatar": ""}), uploads))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Validated);
    let report = failure.validation_report().unwrap();
    assert!(!report.valid);
    assert_eq!(report.missing_variables, vec!["age"]);
    assert_eq!(report.missing_images, vec!["avatar"]);

    assert!(files_in(&fx.config.storage.pdfs_dir).is_empty());
    assert!(files_in(&fx.config.storage.temp_previews_dir).is_empty());
    assert!(!stray.exists(), "uploads are removed on failure too");
}

#[tokio::test]
async fn test_data_uri_avatar() {
    let fx = Fixture::new("Bonjour (nom)").await;
    let uri = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(create_test_png())
    );

    let outcome = fx
        .service
        .generate(fx.request(json!({"nom": "Ali", "avatar": uri}), UploadedFiles::new()))
        .await
        .unwrap();

    assert_eq!(outcome.failed, 0);
    let histoire = outcome.histoire.unwrap();
    let avatar = histoire.variables["avatar"].as_str().unwrap();
    let story_images = format!("/uploads/histoire-images/{}/avatar-", histoire.id);
    assert!(avatar.starts_with(&story_images), "{avatar}");
    assert!(avatar.ends_with(".png"));
}

#[tokio::test]
async fn test_corrupted_data_uri_is_an_image_error() {
    let fx = Fixture::new("Bonjour (nom)").await;
    let uri = format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(b"GIF89a not really a png")
    );

    let failure = fx
        .service
        .preview(fx.request(json!({"nom": "Ali", "avatar": uri}), UploadedFiles::new()))
        .await
        .unwrap_err();

    let report = failure.validation_report().unwrap();
    assert_eq!(report.image_errors.len(), 1);
    assert_eq!(report.image_errors[0].variable, "avatar");
    assert!(report.missing_images.is_empty());
}

#[tokio::test]
async fn test_variables_must_be_an_object() {
    let fx = Fixture::new("Bonjour (nom)").await;

    let failure = fx
        .service
        .preview(fx.request(json!(["Ali"]), UploadedFiles::new()))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Received);
    assert!(matches!(failure.error, StoryError::InvalidPayload(_)));
}

#[tokio::test]
async fn test_unknown_template() {
    let fx = Fixture::new("Bonjour (nom)").await;
    let mut request = fx.request(json!({"nom": "Ali"}), UploadedFiles::new());
    request.template_id = "missing".into();

    let failure = fx.service.generate(request).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Received);
    assert!(failure.is_not_found());
}

#[tokio::test]
async fn test_missing_template_pdf_fails_at_composition() {
    let fx = Fixture::new("Bonjour (nom)").await;
    std::fs::remove_file(fx.config.storage.uploads_dir.join("template.pdf")).unwrap();

    let failure = fx
        .service
        .generate(fx.request(json!({"nom": "Ali"}), fx.upload_avatar()))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Composed);
    assert!(matches!(failure.error, StoryError::Io(_)));
    assert!(files_in(&fx.config.storage.pdfs_dir).is_empty());
}
