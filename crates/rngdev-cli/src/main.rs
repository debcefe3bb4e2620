//! CLI for rngdev — the randomness_generator pseudo-device.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rngdev")]
#[command(about = "rngdev — a pseudo-device that hands out cryptographically strong random bytes")]
#[command(version = rngdev_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the device under a root directory and serve its FIFO node
    /// until Ctrl+C
    Serve {
        /// Root directory for majors/, class/ and dev/
        #[arg(long, default_value = "/tmp/rngdev")]
        root: String,

        /// JSON device config (device_name, class_name, minor, read_contract, max_read_len)
        #[arg(long)]
        config: Option<String>,

        /// Bytes handed to the reader per pipeline read
        #[arg(long, default_value = "4096")]
        chunk: usize,

        /// Report 0 for successful reads, as the first driver version did;
        /// each reader then gets one chunk followed by end of stream
        #[arg(long)]
        legacy_zero: bool,
    },

    /// Open the device node read-only, read once and print the result
    Read {
        /// Path to the device node
        #[arg(default_value = "/tmp/rngdev/dev/randomness_generator")]
        path: String,

        /// Number of bytes to read
        #[arg(long, default_value = "4")]
        bytes: usize,
    },

    /// Load the driver on an in-memory host, exercise it, and report
    Probe {
        /// Bytes per read
        #[arg(long, default_value = "4")]
        bytes: usize,

        /// Number of reads in the session
        #[arg(long, default_value = "1")]
        reads: usize,

        /// Use a deterministic seeded source instead of the OS CSPRNG
        #[arg(long)]
        seed: Option<u64>,

        /// Report 0 for successful reads, as the first driver version did
        #[arg(long)]
        legacy_zero: bool,

        /// Fail a registration step to watch the rollback
        #[arg(long, value_parser = ["major", "class", "node"])]
        fail_at: Option<String>,

        /// Largest read the device will allocate for
        #[arg(long)]
        max_read_len: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            root,
            config,
            chunk,
            legacy_zero,
        } => commands::serve::run(&root, config.as_deref(), chunk, legacy_zero),
        Commands::Read { path, bytes } => commands::read::run(&path, bytes),
        Commands::Probe {
            bytes,
            reads,
            seed,
            legacy_zero,
            fail_at,
            max_read_len,
            json,
        } => commands::probe::run(commands::probe::ProbeOptions {
            bytes,
            reads,
            seed,
            legacy_zero,
            fail_at: fail_at.as_deref(),
            max_read_len,
            json,
        }),
    }
}
