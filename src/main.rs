//! Velin - a Markdown static site generator with live reload.

mod assets;
mod build;
mod cache;
mod cli;
mod config;
mod content;
mod enrich;
mod feeds;
mod init;
mod logger;
mod markdown;
mod pages;
mod serve;
mod template;
mod watch;

use anyhow::Result;
use build::build_site;
use clap::Parser;
use cli::{Cli, Commands};
use config::SitePaths;
use init::new_site;
use serve::serve_site;
use std::thread;

fn main() {
    if let Err(err) = run() {
        log!("error"; "{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.root();
    let paths = SitePaths::new(&root);

    match &cli.command {
        Commands::Init { dir } => {
            new_site(&root, dir.is_some())?;
            log!("init"; "created site at {}", root.display());
            Ok(())
        }
        Commands::Build { full, .. } => build_site(&paths, *full).map(|_| ()),
        Commands::Dev { port, full, .. } => {
            build_site(&paths, *full)?;

            let watch_paths = paths.clone();
            thread::spawn(move || {
                if let Err(err) = watch::watch_for_changes_blocking(&watch_paths) {
                    log!("watch"; "{err:#}");
                }
            });

            serve_site(&paths.output, *port)
        }
    }
}
