use clap::{Parser, Subcommand};
use satb::services::{identify_recording, Credentials, SongMatcher};
use satb::{validate_input, Config, GenerateOptions, OutputFormat, SatbGenerator, SolfegeSystem, Voice};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// SATB Generator
#[derive(Parser)]
#[command(name = "satb")]
#[command(about = "Turn recordings into Soprano/Alto/Tenor/Bass parts with optional solfège")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Custom configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate SATB parts from one or more audio files
    Generate {
        /// Input audio files (MP3, WAV, OGG, FLAC)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (defaults to each input's directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Notation format: musicxml, midi or pdf
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Solfège labels: none, fixed or movable
        #[arg(short, long)]
        solfege: Option<SolfegeSystem>,

        /// Skip audio rendering
        #[arg(long)]
        no_audio: bool,

        /// Directory for rendered audio (defaults to the output directory)
        #[arg(long)]
        audio_dir: Option<PathBuf>,

        /// Write QA plots under <output>/qa
        #[arg(long)]
        qa: bool,
    },
    /// Serve the upload form and JSON API
    Serve {
        /// Address to bind, e.g. 127.0.0.1:5000
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Identify a song from a recording
    Identify {
        /// Recording to identify
        recording: PathBuf,

        /// Fingerprint with AudD and the filename table instead of transcribing lyrics
        #[arg(long)]
        fingerprint: bool,
    },
    /// Render selected parts of a previous generation into one audio file
    Mix {
        /// Directory holding the generated part MIDI files
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Base name used at generation time
        basename: String,

        /// Parts to include, e.g. soprano,bass
        #[arg(short, long, value_delimiter = ',', required = true)]
        parts: Vec<Voice>,

        /// Output file (.wav or .mp3)
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Record from the microphone to a WAV file
    #[cfg(feature = "record")]
    Record {
        /// Output WAV file
        #[arg(default_value = "recording.wav")]
        output: PathBuf,

        /// Duration in seconds
        #[arg(short, long, default_value_t = 5.0)]
        duration: f32,

        /// Preferred sample rate
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
    },
    /// Download the General MIDI SoundFont used for audio rendering
    FetchSoundfont,
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        path: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    Ok(match path {
        Some(path) => satb::config::load_config(path)?,
        None => Config::default(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose && cli.quiet {
        anyhow::bail!("Cannot specify both --verbose and --quiet");
    }
    init_tracing(cli.verbose, cli.quiet);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate {
            inputs,
            output,
            format,
            solfege,
            no_audio,
            audio_dir,
            qa,
        } => {
            if qa {
                config.qa.generate_images = true;
            }

            let mut options = GenerateOptions::from_config(&config)?;
            options.output_dir = output;
            options.audio_dir = audio_dir;
            options.format = format.unwrap_or(options.format);
            options.solfege = solfege.unwrap_or(options.solfege);
            options.export_audio = options.export_audio && !no_audio;

            let generator = SatbGenerator::new(config.clone());
            for input in &inputs {
                validate_input(input, &config)?;
                let result = generator.generate(input, &options)?;
                if !cli.quiet {
                    println!("{}:", result.basename);
                    for (key, path) in &result.files {
                        println!("  {:<14} {}", key, path.display());
                    }
                }
            }
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            satb::server::serve(config, Credentials::from_env()).await?;
        }
        Commands::Identify { recording, fingerprint } => {
            let credentials = Credentials::from_env();
            if fingerprint {
                let matcher = SongMatcher::new(&config, &credentials)?;
                match matcher.recognize(&recording).await? {
                    Some(hit) => println!("{} by {}", hit.title, hit.artist),
                    None => println!("No match found"),
                }
            } else {
                let result = identify_recording(&recording, &config, &credentials).await?;
                println!("Transcription: {}", result.music_text);
                for (i, track) in result.tracks.iter().enumerate() {
                    println!("{}. {} by {} - {}", i + 1, track.name, track.artists, track.url);
                }
            }
        }
        Commands::Mix {
            dir,
            basename,
            parts,
            output,
        } => {
            let generator = SatbGenerator::new(config);
            let path = generator.mix(&dir, &basename, &parts, &output)?;
            println!("Mixed audio saved to {}", path.display());
        }
        #[cfg(feature = "record")]
        Commands::Record {
            output,
            duration,
            sample_rate,
        } => {
            let path = satb::recorder::record_to_wav(&output, duration, sample_rate)?;
            println!("Audio saved as {}", path.display());
        }
        Commands::FetchSoundfont => {
            let path = satb::render::fetch_soundfont(&config.render).await?;
            println!("SoundFont available at {}", path.display());
        }
        Commands::ValidateConfig { path } => {
            let config = satb::config::load_config(path)?;
            println!("Configuration is valid");
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::ShowConfig => {
            let json = serde_json::to_string_pretty(&Config::default())?;
            println!("{}", json);
        }
    }

    Ok(())
}
