//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Velin static site generator CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Scaffold a new site with default templates and a sample post
    Init {
        /// Project directory (defaults to the current directory)
        dir: Option<PathBuf>,
    },

    /// Build the site once
    Build {
        /// Project directory (defaults to the current directory)
        dir: Option<PathBuf>,

        /// Ignore the build cache and regenerate everything
        #[arg(long)]
        full: bool,
    },

    /// Build, serve and rebuild on change with live reload
    Dev {
        /// Project directory (defaults to the current directory)
        dir: Option<PathBuf>,

        /// Port to listen on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,

        /// Ignore the build cache for the initial build
        #[arg(long)]
        full: bool,
    },
}

impl Cli {
    /// Project root for the invoked subcommand.
    pub fn root(&self) -> PathBuf {
        let dir = match &self.command {
            Commands::Init { dir } | Commands::Build { dir, .. } | Commands::Dev { dir, .. } => dir,
        };
        dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}
