mod dump;
mod logging;

use std::io;
#[cfg(unix)]
use std::path::PathBuf;

use clap::Parser;
#[cfg(unix)]
use tessera::Store;
use tessera::error::TesseraResult;

#[derive(clap::Parser)]
struct Cli {
    /// Log verbosity, repeat for more detail.
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Source {
    /// A store file, or a shared memory segment name with `--shm`.
    locator: String,
    #[clap(long)]
    shm: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print the layers of a store with their columns, and optionally their rows.
    Dump {
        #[clap(flatten)]
        source: Source,
        /// Only print this layer.
        #[clap(long)]
        layer: Option<String>,
        /// Print up to this many rows per layer.
        #[clap(long, default_value_t = 0)]
        rows: u32,
    },
    /// Publish a store file as a shared memory segment.
    #[cfg(unix)]
    Share { file: PathBuf, name: String },
    /// Remove a shared memory segment.
    #[cfg(unix)]
    Unlink { name: String },
}

fn main() -> TesseraResult<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Dump {
            source,
            layer,
            rows,
        } => {
            let fixed = dump::open(&source.locator, source.shm)?;
            dump::dump(&fixed, layer.as_deref(), rows, &mut io::stdout().lock())?;
        }
        #[cfg(unix)]
        Commands::Share { file, name } => {
            dump::warn_on_extension(&file);
            Store::open(file)?.share(&name, true)?;
            log::info!("published {name}");
        }
        #[cfg(unix)]
        Commands::Unlink { name } => tessera::unlink(&name)?,
    }
    Ok(())
}
