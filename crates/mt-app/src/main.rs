//! mtrack: headless front end for the motion tracking data model

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::LoadOptions;
use mt_data::ImportConfig;

#[derive(Parser, Debug)]
#[command(name = "mtrack", version, about = "Load external motion data into tracks")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Extra cell value meaning "no measurement", e.g. -999; repeatable
    #[arg(long = "missing", global = true, allow_hyphen_values = true)]
    missing: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the columns of a data file and the points found in it
    Inspect {
        /// Delimited text file
        file: PathBuf,
    },

    /// Load a data file into a data track and print its time series
    Load {
        /// Delimited text file
        file: PathBuf,

        /// Frames in the video the data is shown against
        #[arg(long)]
        frames: Option<usize>,

        /// Video frame duration in milliseconds
        #[arg(long)]
        frame_ms: Option<f64>,

        /// Frame the first data row is shown at
        #[arg(long, default_value_t = 0)]
        start_frame: usize,

        /// Data rows advanced per video step
        #[arg(long)]
        stride: Option<usize>,

        /// First data row shown
        #[arg(long)]
        start_index: Option<usize>,

        /// Drive the video clock from the data's time column
        #[arg(long)]
        use_data_time: bool,

        /// Tracker settings JSON file
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Write the session document here
        #[arg(long)]
        save: Option<PathBuf>,

        /// Rows of track data to print; 0 prints none
        #[arg(long, default_value_t = 20)]
        rows: usize,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut import = ImportConfig::default();
    for marker in cli.missing {
        import.null_config.add_marker(marker);
    }

    match cli.command {
        Command::Inspect { file } => {
            let report = commands::inspect(&file, &import).await?;
            print!("{}", report);
        }
        Command::Load {
            file,
            frames,
            frame_ms,
            start_frame,
            stride,
            start_index,
            use_data_time,
            settings,
            save,
            rows,
        } => {
            let options = LoadOptions {
                frames,
                frame_ms,
                start_frame,
                stride,
                start_index,
                use_data_time,
                settings,
                save,
                rows,
                import,
            };
            let report = commands::load(&file, &options).await?;
            print!("{}", report);
        }
    }

    Ok(())
}
