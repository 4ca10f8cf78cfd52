// imagecraft - command line front end for the image studio

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use imagecraft::config::StudioConfig;
use imagecraft::orchestration::{
    EditMode, ItemStatus, Orchestrator, ProgressEvent, SourceFile, artifact_name,
};
use imagecraft::raster::{AdjustmentTriple, SourceRect, crop_source};
use imagecraft::{EncodedImage, InferenceCapability, TaskKind};
use imagent::{GeminiClient, PlaceholderBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate, edit and describe images with a generative AI backend", long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use the offline placeholder backend instead of the remote service
    #[arg(long, global = true)]
    offline: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for result images (overrides the config file)
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an image from a text prompt
    Generate {
        prompt: String,
        /// Rewrite the prompt before generating
        #[arg(long)]
        enhance: bool,
    },
    /// Render a sketch (PNG or JPEG) into an image
    Sketch { sketch: PathBuf },
    /// Describe one or more images
    Describe {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Edit an image with a prompt, a removal mask, or an enhancement
    Edit {
        image: PathBuf,
        /// Edit instructions
        #[arg(short, long)]
        prompt: Option<String>,
        /// Remove the areas painted white in this mask
        #[arg(long, conflicts_with = "enhance")]
        mask: Option<PathBuf>,
        /// Run an enhancement instead of a prompt edit
        #[arg(long, value_enum)]
        enhance: Option<Enhancement>,
        /// Rewrite the prompt before editing
        #[arg(long)]
        improve_prompt: bool,
    },
    /// Upscale one or more images
    Upscale {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Repair one or more old or damaged photographs
    Repair {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Remove watermarks, optionally guided by a mask
    Watermark {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[arg(long)]
        mask: Option<PathBuf>,
    },
    /// Apply brightness, contrast and saturation locally
    Adjust {
        image: PathBuf,
        /// Brightness percent (0-200)
        #[arg(long, default_value = "100")]
        brightness: u16,
        /// Contrast percent (0-200)
        #[arg(long, default_value = "100")]
        contrast: u16,
        /// Saturation percent (0-200)
        #[arg(long, default_value = "100")]
        saturation: u16,
    },
    /// Crop an image to a rectangle in source pixels (must lie inside the image)
    Crop {
        image: PathBuf,
        #[arg(long)]
        x: u32,
        #[arg(long)]
        y: u32,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
    },
    /// Rewrite a prompt without running a task
    EnhancePrompt {
        prompt: String,
        /// Use the edit-preserving instructions
        #[arg(long)]
        edit: bool,
    },
    /// Sign in (demo account)
    SignIn,
    /// Sign out
    SignOut,
    /// Show the signed-in account and its request count
    Whoami,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Enhancement {
    Upscale,
    Repair,
}

impl Enhancement {
    fn task(self) -> TaskKind {
        match self {
            Enhancement::Upscale => TaskKind::Upscale,
            Enhancement::Repair => TaskKind::Repair,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("✓ Loaded .env file from: {}", path.display());
    }

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("imagecraft={},imagent={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = StudioConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.output_dir.clone() {
        config.output.dir = dir;
    }

    let backend: Arc<dyn InferenceCapability> = if cli.offline {
        println!("🔌 Offline mode: using placeholder backend");
        Arc::new(PlaceholderBackend::new(config.output.placeholder_size))
    } else {
        Arc::new(GeminiClient::new(config.inference.clone()))
    };
    let mut studio = Orchestrator::new(backend, Box::new(config.session.store()));

    match cli.command {
        Command::Generate { prompt, enhance } => {
            studio.select_task(TaskKind::Generate);
            studio.set_prompt(prompt);
            if enhance {
                improve_prompt(&mut studio).await?;
            }
            run(&mut studio, None, &config.output.dir).await
        }
        Command::Sketch { sketch } => {
            studio.select_task(TaskKind::SketchToImage);
            studio.set_sketch(Some(read_source(&sketch)?.image));
            run(&mut studio, None, &config.output.dir).await
        }
        Command::Describe { images } => {
            batch(&mut studio, TaskKind::Describe, &images)?;
            run(&mut studio, None, &config.output.dir).await
        }
        Command::Upscale { images } => {
            batch(&mut studio, TaskKind::Upscale, &images)?;
            run(&mut studio, None, &config.output.dir).await
        }
        Command::Repair { images } => {
            batch(&mut studio, TaskKind::Repair, &images)?;
            run(&mut studio, None, &config.output.dir).await
        }
        Command::Watermark { images, mask } => {
            batch(&mut studio, TaskKind::Watermark, &images)?;
            if let Some(mask) = mask {
                studio.set_mask(Some(read_source(&mask)?.image));
            }
            run(&mut studio, None, &config.output.dir).await
        }
        Command::Edit {
            image,
            prompt,
            mask,
            enhance,
            improve_prompt: improve,
        } => {
            studio.select_task(TaskKind::Edit);
            let mode = match (&mask, enhance) {
                (_, Some(_)) => EditMode::Enhance,
                (Some(_), None) => EditMode::Watermark,
                (None, None) => EditMode::Prompt,
            };
            studio.set_edit_mode(mode);
            studio.upload(vec![read_source(&image)?]);
            if let Some(mask) = mask {
                studio.set_mask(Some(read_source(&mask)?.image));
            }
            if let Some(prompt) = prompt {
                studio.set_prompt(prompt);
            }
            if improve {
                improve_prompt(&mut studio).await?;
            }
            run(&mut studio, enhance.map(Enhancement::task), &config.output.dir).await
        }
        Command::Adjust {
            image,
            brightness,
            contrast,
            saturation,
        } => {
            studio.select_task(TaskKind::Edit);
            studio.set_edit_mode(EditMode::Adjust);
            studio.set_adjustments(AdjustmentTriple::new(brightness, contrast, saturation));
            studio.upload(vec![read_source(&image)?]);
            run(&mut studio, None, &config.output.dir).await
        }
        Command::Crop {
            image,
            x,
            y,
            width,
            height,
        } => crop(&image, SourceRect { x, y, width, height }, &config.output.dir),
        Command::EnhancePrompt { prompt, edit } => {
            studio.select_task(if edit { TaskKind::Edit } else { TaskKind::Generate });
            studio.set_prompt(prompt);
            improve_prompt(&mut studio).await?;
            println!("{}", studio.state().prompt);
            Ok(())
        }
        Command::SignIn => {
            let session = studio.sign_in()?;
            println!("👤 Signed in as {} <{}>", session.name, session.email);
            Ok(())
        }
        Command::SignOut => {
            studio.sign_out()?;
            println!("👋 Signed out");
            Ok(())
        }
        Command::Whoami => {
            match studio.session() {
                Some(session) => {
                    println!("👤 {} <{}>", session.name, session.email);
                    println!("📈 API requests: {}", session.api_count);
                }
                None => println!("Not signed in"),
            }
            Ok(())
        }
    }
}

/// Select a batch task and upload every path
fn batch(studio: &mut Orchestrator, task: TaskKind, paths: &[PathBuf]) -> anyhow::Result<()> {
    studio.select_task(task);
    let files = paths
        .iter()
        .map(|path| read_source(path))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let added = studio.upload(files);
    if added < paths.len() {
        tracing::warn!("{} of {} files were skipped", paths.len() - added, paths.len());
    }
    Ok(())
}

async fn improve_prompt(studio: &mut Orchestrator) -> anyhow::Result<()> {
    println!("✨ Enhancing prompt...");
    studio.enhance_prompt().await?;
    println!("📝 Prompt: {}", studio.state().prompt);
    Ok(())
}

/// Submit, print progress as it arrives, then write every result
async fn run(studio: &mut Orchestrator, sub_task: Option<TaskKind>, output_dir: &Path) -> anyhow::Result<()> {
    let task = sub_task.unwrap_or(studio.state().task);
    let mut events = studio.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ProgressEvent::BatchStarted { task, total } => {
                    println!("🎯 {} - {} item(s)\n", task, total);
                }
                ProgressEvent::ItemStarted { label, .. } => println!("🔄 {}", label),
                ProgressEvent::ItemFinished { id, status } => {
                    let mark = if status == ItemStatus::Success { "✓" } else { "✗" };
                    println!("  {} {}", mark, id);
                }
                ProgressEvent::BatchFinished { .. } => break,
            }
        }
    });

    let report = match studio.submit(sub_task).await {
        Ok(report) if report.processed.is_empty() => {
            printer.abort();
            report
        }
        Ok(report) => {
            let _ = printer.await;
            report
        }
        Err(e) => {
            printer.abort();
            bail!("{}", e);
        }
    };

    if let Some(warning) = &studio.state().safety_warning {
        println!("\n⚠️  {}", warning);
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    println!("\n📊 {}\n", studio.state().results_label());
    for item in studio.items() {
        if let Some(image) = item.result_image() {
            let path = output_dir.join(artifact_name(&item.source_name, task));
            std::fs::write(&path, image.bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("💾 {} -> {}", item.source_name, path.display());
        } else if let Some(text) = item.result_text() {
            println!("📝 {}\n\n{}\n", item.source_name, text);
        } else if let Some(message) = item.error_message() {
            println!("❌ {}: {}", item.source_name, message);
        }
    }

    if let Some(session) = studio.session() {
        println!("\n📈 API requests: {}", session.api_count);
    }
    if report.failed > 0 {
        bail!("{} of {} item(s) failed", report.failed, report.processed.len());
    }
    Ok(())
}

fn crop(path: &Path, rect: SourceRect, output_dir: &Path) -> anyhow::Result<()> {
    let source = read_source(path)?;
    let decoded = source.image.decode()?;
    let cropped = crop_source(&decoded, rect)?;

    std::fs::create_dir_all(output_dir)?;
    let base = source.name.rsplit_once('.').map_or(source.name.as_str(), |(base, _)| base);
    let out = output_dir.join(format!("{}-crop.png", base));
    std::fs::write(&out, cropped.bytes())?;
    println!("✂️  {} -> {}", source.name, out.display());
    Ok(())
}

fn read_source(path: &Path) -> anyhow::Result<SourceFile> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mime_type = image::ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    let modified_ms = std::fs::metadata(path)?
        .modified()
        .map(|time| chrono::DateTime::<chrono::Utc>::from(time).timestamp_millis())
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    Ok(SourceFile::new(name, modified_ms, EncodedImage::new(bytes, mime_type)))
}
