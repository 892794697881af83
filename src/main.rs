use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clip_assembler::{
    composition::AssemblyEngine,
    config::Config,
    error::AssemblerError,
    remote::{
        self, runway, GenerationRequest, GenerationService, ReplicateClient, ReplicateModel, RunwayClient,
    },
    video::{loader::display_name, ListingStatus},
};

#[derive(Parser)]
#[command(
    name = "clip-assembler",
    version,
    about = "Assemble short source clips into a single hero video",
    long_about = "Clip-Assembler normalizes a list of clips and stills to one frame size, joins them with hard cuts or crossfades, appends an optional captioned end card, trims to a length budget and encodes an H.264 MP4."
)]
struct Cli {
    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the assembly pipeline and write the output video
    Assemble(AssembleArgs),

    /// Show size and duration of each configured clip without assembling
    List {
        /// Clips to inspect instead of the configured list
        clips: Vec<PathBuf>,
    },

    /// Generate source footage with a hosted service
    #[command(subcommand)]
    Generate(GenerateCommand),
}

#[derive(Args)]
struct AssembleArgs {
    /// Clips to assemble in order; without any, the configured list is used
    /// (by default the five hero clips clip1_desk.mp4 ... clip5_home.mp4 in ./src)
    clips: Vec<PathBuf>,

    /// Join clips with hard cuts
    #[arg(long)]
    no_crossfades: bool,

    /// Caption for a trailing end card
    #[arg(long)]
    end_card: Option<String>,

    /// Trim the result to this many seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Output video file path
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum GenerateCommand {
    /// Text- or image-to-video with Runway
    Runway {
        /// Text prompt
        prompt: String,

        /// Clip length in seconds (4, 6 or 8)
        #[arg(long, default_value_t = runway::DEFAULT_DURATION)]
        duration: u32,

        /// Image to animate instead of generating from text alone (URL or local file)
        #[arg(long)]
        image: Option<String>,

        /// Output filename
        #[arg(short, long, default_value = "runway_output.mp4")]
        output: PathBuf,
    },

    /// Image generation, or image-to-video with --animate, on Replicate
    Replicate {
        /// Text prompt
        prompt: Option<String>,

        /// Image model (flux-schnell, flux-pro, sdxl)
        #[arg(long, default_value = "flux-schnell")]
        model: ReplicateModel,

        /// Image to animate (URL or local file); switches to video mode
        #[arg(long)]
        animate: Option<String>,

        /// Output filename
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<AssemblerError>() {
            Some(err) => {
                error!("{}", err);
                eprintln!("Error: {}", err.user_message());
            }
            None => eprintln!("Error: {:#}", e),
        }
        std::process::exit(1);
    }

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    info!("Starting Clip-Assembler v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => Config::default(),
    };

    match cli.command {
        Command::Assemble(args) => assemble(config, args),
        Command::List { clips } => {
            use_cli_clips(&mut config, clips);
            list(config)
        }
        Command::Generate(command) => generate(&config, command),
    }
}

/// Clips given on the command line are relative to the working directory
fn use_cli_clips(config: &mut Config, clips: Vec<PathBuf>) {
    if !clips.is_empty() {
        config.source_dir = PathBuf::new();
        config.clips = clips;
    }
}

fn assemble(mut config: Config, args: AssembleArgs) -> Result<()> {
    use_cli_clips(&mut config, args.clips);
    if args.no_crossfades {
        config.composition.crossfade = false;
    }
    if let Some(text) = args.end_card {
        config.composition.end_card_text = Some(text);
    }
    if let Some(duration) = args.duration {
        config.composition.max_duration = Some(duration);
    }
    if let Some(output) = args.output {
        config.output = output;
    }

    info!("Output: {:?}", config.output);
    let engine = AssemblyEngine::new(config)?;
    let report = engine.assemble()?;

    for skipped in &report.skipped {
        println!("Skipped {}: {}", display_name(&skipped.path), skipped.reason);
    }
    if let Some(encoded) = &report.encoded {
        println!("Output: {}", encoded.path.display());
        println!("Duration: {:.1}s", report.duration);
        println!("Size: {:.1} MB", encoded.file_size as f64 / 1024.0 / 1024.0);
    }

    Ok(())
}

fn list(config: Config) -> Result<()> {
    let engine = AssemblyEngine::new(config)?;

    for listing in engine.list_clips() {
        let name = display_name(&listing.path);
        match listing.status {
            ListingStatus::Ready(info) => println!(
                "{:<28} {:>5}x{:<5} {:>6.1}s",
                name, info.width, info.height, info.duration
            ),
            ListingStatus::Missing => println!("{:<28} MISSING", name),
            ListingStatus::Unreadable(reason) => println!("{:<28} UNREADABLE ({})", name, reason),
        }
    }

    Ok(())
}

fn generate(config: &Config, command: GenerateCommand) -> Result<()> {
    let (service, request, output): (Box<dyn GenerationService>, GenerationRequest, PathBuf) = match command {
        GenerateCommand::Runway {
            prompt,
            duration,
            image,
            output,
        } => {
            info!("Prompt: {}", prompt);
            info!("Duration: {}s", duration);
            let request = GenerationRequest {
                prompt: Some(prompt),
                image: image.as_deref().map(remote::image_reference).transpose()?,
                duration: Some(duration),
            };
            (Box::new(RunwayClient::from_env()?), request, output)
        }
        GenerateCommand::Replicate {
            prompt,
            model,
            animate,
            output,
        } => {
            let model = if animate.is_some() {
                ReplicateModel::StableVideoDiffusion
            } else {
                model
            };
            info!("Model: {}", model);
            let output = output.unwrap_or_else(|| PathBuf::from(model.default_output()));
            let request = GenerationRequest {
                prompt,
                image: animate.as_deref().map(remote::image_reference).transpose()?,
                duration: None,
            };
            (Box::new(ReplicateClient::from_env(model)?), request, output)
        }
    };

    info!("Output: {}", output.display());
    let asset = remote::run_job(service.as_ref(), &request, &config.remote, &output)?;

    println!("Output: {}", asset.path.display());
    println!("Size: {:.1} MB", asset.bytes as f64 / 1024.0 / 1024.0);
    Ok(())
}
