//! # OAI-PMH responder CLI (`oai`)
//!
//! ## Usage
//!
//! ```bash
//! oai --config ./config/oai.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `oai init` | Create the SQLite database and run schema migrations |
//! | `oai import <file>` | Load collections and items from a JSON document |
//! | `oai serve` | Start the HTTP endpoint |
//! | `oai request "<query>"` | Answer one request offline and print the XML |
//! | `oai token <value>` | Decode a resumption token |
//!
//! ## Examples
//!
//! ```bash
//! oai init
//! oai import ./data/catalog.json
//! oai request "verb=ListRecords&metadataPrefix=oai_dc" --host demo.example.edu
//! RUST_LOG=oai_responder=debug oai serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use oai_responder::{config, import, migrate, resumption, server};

/// OAI-PMH 2.0 endpoint for an institutional repository catalog.
///
/// All commands except `token` read a TOML configuration file given by
/// `--config`.
#[derive(Parser)]
#[command(
    name = "oai",
    about = "OAI-PMH 2.0 metadata harvesting endpoint",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/oai.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Import collections and items from a JSON document.
    ///
    /// Existing records with the same handle are replaced.
    Import {
        /// Path to the JSON import document.
        file: PathBuf,
    },

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves the protocol on `[server].path`.
    Serve,

    /// Answer a single request without starting a server.
    Request {
        /// Form-encoded arguments, e.g. `verb=Identify`.
        query: String,

        /// Host name used to select the institution.
        #[arg(long)]
        host: Option<String>,
    },

    /// Decode a resumption token and print its contents.
    Token {
        /// The token, as issued in a `<resumptionToken>` element.
        value: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Commands that don't require config
    if let Commands::Token { value } = &cli.command {
        print_token(value);
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            import::run_import(&cfg, &file).await?;
        }
        Commands::Serve => {
            migrate::run_migrations(&cfg).await?;
            server::run_server(&cfg).await?;
        }
        Commands::Request { query, host } => {
            server::run_request(&cfg, &query, host.as_deref()).await?;
        }
        Commands::Token { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}

fn print_token(value: &str) {
    let (filter, offset) = match resumption::decode(value) {
        Ok(decoded) => decoded,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let show = |v: Option<String>| v.unwrap_or_else(|| "(none)".to_string());
    println!("metadataPrefix: {}", show(filter.metadata_prefix.clone()));
    println!("from:           {}", show(filter.from.map(|d| d.to_string())));
    println!("until:          {}", show(filter.until.map(|d| d.to_string())));
    println!("set:            {}", show(filter.set.clone()));
    println!("offset:         {}", offset);
    println!("signature:      {}", resumption::signature(&filter));
}
