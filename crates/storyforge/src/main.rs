//! Storyforge CLI
//!
//! Generates personalized storybooks from a template document (template
//! metadata plus editor elements, as JSON) and a variables file.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storyforge::files::{spawn_preview_sweeper, sweep_expired, unique_file_name, TempUploads};
use storyforge::{
    AppConfig, GenerationOutcome, GenerationRequest, MemoryStore, StoryService, UploadedFiles,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Storyforge - personalized storybook generation
#[derive(Parser, Debug)]
#[command(name = "storyforge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the final PDF and previews
    Generate(GenerateArgs),
    /// Generate throwaway previews only
    Preview(GenerateArgs),
    /// List the variables a template requires
    Variables {
        /// Template document (JSON)
        template: PathBuf,
    },
    /// Remove expired temporary previews and images
    Sweep {
        /// Keep running at the configured interval
        #[arg(long)]
        watch: bool,
    },
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Template document (JSON)
    template: PathBuf,

    /// Variables (JSON object)
    variables: PathBuf,

    /// Image uploads as `<variable>=<file>`
    #[arg(short, long = "image", value_parser = parse_image_arg)]
    images: Vec<(String, PathBuf)>,

    /// User the story belongs to
    #[arg(long)]
    user: Option<String>,
}

fn parse_image_arg(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected <variable>=<file>, got {arg:?}")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = AppConfig::from_env()?;
    config
        .storage
        .ensure_dirs()
        .await
        .context("cannot create upload directories")?;

    match cli.command {
        Command::Generate(args) => generate(config, args, false).await,
        Command::Preview(args) => generate(config, args, true).await,
        Command::Variables { template } => {
            let document = load_template(&template).await?;
            for name in template::parse_variables_from_elements(&document.elements) {
                println!("{name}");
            }
            Ok(())
        }
        Command::Sweep { watch: false } => {
            let storage = &config.storage;
            for dir in [&storage.temp_previews_dir, &storage.temp_images_dir] {
                let removed = sweep_expired(dir, config.render.preview_retention).await?;
                println!("{}: {removed} file(s) removed", dir.display());
            }
            Ok(())
        }
        Command::Sweep { watch: true } => {
            spawn_preview_sweeper(config.storage, config.render).await?;
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storyforge=info,template=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn generate(config: AppConfig, args: GenerateArgs, preview: bool) -> anyhow::Result<()> {
    let mut document = load_template(&args.template).await?;
    let variables: serde_json::Value = serde_json::from_slice(
        &tokio::fs::read(&args.variables)
            .await
            .with_context(|| format!("cannot read {}", args.variables.display()))?,
    )
    .context("variables file is not valid JSON")?;

    // Relative template PDF paths are relative to the template document
    let pdf_path = Path::new(&document.template.pdf_path);
    if config.storage.path_for_url(&document.template.pdf_path).is_none() && pdf_path.is_relative() {
        let base = args.template.parent().unwrap_or(Path::new("."));
        document.template.pdf_path = base.join(pdf_path).to_string_lossy().into_owned();
    }

    let uploads = stage_uploads(&config, &args.images).await?;

    let store = Arc::new(MemoryStore::new());
    let template = store
        .insert_template(document.template, document.elements)
        .await;
    let service = StoryService::new(config, store);

    let request = GenerationRequest {
        template_id: template.id,
        variables,
        uploads,
        user_id: args.user,
    };
    let outcome = if preview {
        service.preview(request).await
    } else {
        service.generate(request).await
    };

    match outcome {
        Ok(outcome) => {
            print_outcome(&outcome);
            Ok(())
        }
        Err(failure) => {
            if let Some(report) = failure.validation_report() {
                eprintln!("{}", serde_json::to_string_pretty(report)?);
            }
            Err(failure.into())
        }
    }
}

async fn load_template(path: &Path) -> anyhow::Result<template::TemplateDocument> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let mut document = template::parse_template(&json)?;
    for element in &mut document.elements {
        element.refresh_variables();
    }
    document.template.refresh_variables(&document.elements);
    Ok(document)
}

/// Copy image arguments into the temp-images directory, the way the upload
/// middleware would; the pipeline deletes them once the request ends.
///
/// Nothing stays staged if any copy fails.
async fn stage_uploads(
    config: &AppConfig,
    images: &[(String, PathBuf)],
) -> anyhow::Result<UploadedFiles> {
    let mut staged = TempUploads::default();
    let mut fields = Vec::with_capacity(images.len());
    for (name, source) in images {
        if !source.is_file() {
            bail!("image for {name} not found: {}", source.display());
        }
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("img");
        let target = config
            .storage
            .temp_images_dir
            .join(unique_file_name(&format!("images_{name}"), ext));
        staged.push(target.clone());
        tokio::fs::copy(source, &target)
            .await
            .with_context(|| format!("cannot stage {}", source.display()))?;
        fields.push(format!("images_{name}"));
    }
    Ok(fields.into_iter().zip(staged.keep()).collect())
}

fn print_outcome(outcome: &GenerationOutcome) {
    if let Some(histoire) = &outcome.histoire {
        println!("histoire: {}", histoire.id);
    }
    println!("pdf: {}", outcome.pdf_url);
    for url in &outcome.preview_urls {
        println!("preview: {url}");
    }
    if let Some(warning) = &outcome.preview_warning {
        println!("previews skipped: {warning}");
    }
    println!("elements rendered: {}, failed: {}", outcome.rendered, outcome.failed);
    for error in &outcome.errors {
        println!("  {error}");
    }
}
