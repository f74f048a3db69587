use clap::{Args, Parser, Subcommand, ValueEnum};
use stem_splitter_web::{
    config::{Device, InferenceParams, ModelConfig, ServerConfig, DEFAULT_MAX_UPLOAD_BYTES},
    core::{
        audio::WavDepth,
        package::{ClipMode, OutputFormat, PackageOptions},
    },
    ensure_model,
    logging::init_tracing,
    model::registry::registry,
    run_server, set_download_progress_callback,
};
use std::{net::SocketAddr, process, time::Duration};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "stem-splitter-web")]
#[command(about = "Upload a song, download its stems", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server (default)
    Serve(ServeArgs),

    /// Download and verify a model without starting the server
    Prepare {
        #[arg(short, long, env = "STEM_SPLITTER_MODEL", default_value = "htdemucs")]
        model: String,

        #[arg(long, env = "STEM_SPLITTER_MANIFEST_URL")]
        manifest_url: Option<String>,

        #[arg(short, long)]
        quiet: bool,
    },

    /// List available models
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Mp3,
    Wav,
}

#[derive(Args, Clone)]
struct ServeArgs {
    #[arg(long, env = "STEM_SPLITTER_LISTEN", default_value = "127.0.0.1:5000")]
    listen: SocketAddr,

    #[arg(short, long, env = "STEM_SPLITTER_MODEL", default_value = "htdemucs")]
    model: String,

    #[arg(long, env = "STEM_SPLITTER_MANIFEST_URL")]
    manifest_url: Option<String>,

    /// auto, cpu or cuda
    #[arg(long, env = "STEM_SPLITTER_DEVICE", default_value = "auto")]
    device: Device,

    /// Randomly shifted passes averaged together
    #[arg(long, env = "STEM_SPLITTER_SHIFTS", default_value_t = 1)]
    shifts: usize,

    #[arg(long, env = "STEM_SPLITTER_OVERLAP", default_value_t = 0.25)]
    overlap: f32,

    #[arg(long, env = "STEM_SPLITTER_FORMAT", value_enum, default_value_t = Format::Mp3)]
    format: Format,

    #[arg(long, env = "STEM_SPLITTER_MP3_BITRATE", default_value_t = 320)]
    mp3_bitrate: u32,

    /// Write 24-bit integer wav stems
    #[arg(long, conflicts_with = "float32")]
    int24: bool,

    /// Write 32-bit float wav stems
    #[arg(long)]
    float32: bool,

    /// rescale or clamp
    #[arg(long, env = "STEM_SPLITTER_CLIP_MODE", default_value = "rescale")]
    clip_mode: ClipMode,

    /// Keep one stem and mix the rest into `no_<stem>`
    #[arg(long, env = "STEM_SPLITTER_TWO_STEMS")]
    two_stems: Option<String>,

    /// Seconds of audio separated per upload
    #[arg(long, env = "STEM_SPLITTER_MAX_DURATION", default_value_t = 170.0)]
    max_duration: f64,

    #[arg(long, env = "STEM_SPLITTER_MAX_UPLOAD_MB", default_value_t = DEFAULT_MAX_UPLOAD_BYTES / (1024 * 1024))]
    max_upload_mb: usize,

    /// Seconds a finished job stays downloadable
    #[arg(long, env = "STEM_SPLITTER_STEM_TTL", default_value_t = 900)]
    stem_ttl: u64,

    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,
}

impl ServeArgs {
    fn into_config(self) -> ServerConfig {
        let format = match self.format {
            Format::Mp3 => OutputFormat::Mp3 {
                bitrate: self.mp3_bitrate,
            },
            Format::Wav => OutputFormat::Wav {
                depth: if self.int24 {
                    WavDepth::Int24
                } else if self.float32 {
                    WavDepth::Float32
                } else {
                    WavDepth::Int16
                },
            },
        };

        ServerConfig {
            listen_addr: self.listen,
            model: ModelConfig {
                name: self.model,
                manifest_url_override: self.manifest_url,
                device: self.device,
            },
            inference: InferenceParams {
                shifts: self.shifts,
                overlap: self.overlap,
            },
            package: PackageOptions {
                format,
                clip: self.clip_mode,
                two_stems: self.two_stems,
            },
            max_duration_secs: self.max_duration,
            max_upload_bytes: self.max_upload_mb.saturating_mul(1024 * 1024),
            stem_ttl: Duration::from_secs(self.stem_ttl),
            secret_key: self.secret_key,
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Serve(args)) => handle_serve(args),
        None => handle_serve(cli.serve),
        Some(Commands::Prepare {
            model,
            manifest_url,
            quiet,
        }) => handle_prepare(model, manifest_url, quiet),
        Some(Commands::List) => handle_list(),
    };

    if let Err(e) = result {
        error!(error = %e, "exiting");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn handle_serve(args: ServeArgs) -> anyhow::Result<()> {
    let cfg = args.into_config();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_server(cfg))?;
    Ok(())
}

fn handle_prepare(model: String, manifest_url: Option<String>, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        eprintln!("Preparing model: {model}");

        set_download_progress_callback(|downloaded, total| {
            if total > 0 {
                let percent = (downloaded as f64 / total as f64 * 100.0).round() as u64;
                let downloaded_mb = downloaded as f64 / 1_000_000.0;
                let total_mb = total as f64 / 1_000_000.0;
                eprint!("\rDownloading model: {percent:>3}% ({downloaded_mb:.2} MB / {total_mb:.2} MB)");
                if downloaded >= total {
                    eprintln!();
                }
            } else {
                eprint!("\rDownloading model: {:.2} MB", downloaded as f64 / 1_000_000.0);
            }
        });
    }

    let handle = ensure_model(&model, manifest_url.as_deref())?;
    info!(
        model = %handle.manifest.name,
        version = %handle.manifest.version,
        path = %handle.local_path.display(),
        "model ready"
    );

    if !quiet {
        eprintln!("Model ready at {}", handle.local_path.display());
    }
    Ok(())
}

fn handle_list() -> anyhow::Result<()> {
    let reg = registry()?;

    eprintln!("Available models:");
    for entry in &reg.models {
        let marker = if reg.is_default(entry) { " (default)" } else { "" };
        eprintln!("  {}{}", entry.name, marker);
    }
    eprintln!();
    eprintln!("Use --model <name> to pick one");
    Ok(())
}
