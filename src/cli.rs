use clap::{Parser, Subcommand};

/// Tokenkeeper: token registration, activation and validity service
#[derive(Parser)]
#[command(name = "tokenkeeper", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (defaults to TOKENKEEPER_PORT, then 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Apply PostgreSQL migrations and exit
    Migrate,

    /// Operate on tokens in the configured store
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Register a token (inactive until activated)
    Register { token: String },
    /// Activate a token for N months, or permanently
    Activate {
        token: String,
        /// Validity in calendar months
        #[arg(long, conflicts_with = "permanent")]
        months: Option<i64>,
        /// Never expires
        #[arg(long)]
        permanent: bool,
    },
    /// Deactivate a token (its expiry is kept on record)
    Deactivate { token: String },
    /// Check whether a token is currently valid
    Check { token: String },
    /// List all tokens, newest first
    List,
    /// Print the expiry drift report
    Report,
}
