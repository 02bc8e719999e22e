//! VaultX CLI - Zero-knowledge secret envelopes
//!
//! Command-line interface for sealing files into passphrase-encrypted
//! envelopes (PBKDF2 + AES-GCM) and opening them again.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use vaultx::envelope::EnvelopeOptions;
use vaultx::file_ops;
use vaultx::passphrase::{PassphraseReader, ReaderPassphraseReader, TerminalPassphraseReader};
use vaultx::secretcrypt;

#[derive(Parser)]
#[command(name = "vaultx")]
#[command(version)]
#[command(about = "Zero-knowledge secret envelopes.", long_about = None)]
struct Cli {
    /// Read passphrase from stdin instead of from terminal
    #[arg(long, global = true)]
    passphrase_stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seal a file into an envelope
    #[command(alias = "s")]
    Seal {
        /// Path to the file whose contents is to be sealed
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the file to write the envelope JSON to
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Override the PBKDF2 iteration count
        #[arg(long, value_name = "N")]
        iterations: Option<u32>,
    },

    /// Open a sealed file
    #[command(alias = "o")]
    Open {
        /// Path to the envelope file to open
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the file to write the plaintext to
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Update a sealed file with new content, while validating
    /// that the passphrase is not accidentally changed.
    #[command(alias = "u")]
    Update {
        /// Path to the file whose contents is to be sealed
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to the existing sealed file to replace
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Generate a random passphrase and print it to stdout
    #[command(alias = "p")]
    Passphrase,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Seal {
            input,
            output,
            iterations,
        } => {
            let mut options = EnvelopeOptions::default();
            if let Some(iterations) = iterations {
                options.iterations = iterations;
            }
            let mut reader = get_passphrase_reader(cli.passphrase_stdin);
            file_ops::seal_file(&input, &output, &mut *reader, &options)
        }
        Commands::Open { input, output } => {
            let mut reader = get_passphrase_reader(cli.passphrase_stdin);
            file_ops::open_file(&input, &output, &mut *reader)
        }
        Commands::Update { input, output } => {
            let mut reader = get_passphrase_reader(cli.passphrase_stdin);
            file_ops::update_file(&input, &output, &mut *reader)
        }
        Commands::Passphrase => secretcrypt::generate_passphrase().map(|p| println!("{}", p)),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn get_passphrase_reader(use_stdin: bool) -> Box<dyn PassphraseReader> {
    if use_stdin {
        Box::new(ReaderPassphraseReader::new(Box::new(std::io::stdin())))
    } else {
        Box::new(TerminalPassphraseReader)
    }
}
