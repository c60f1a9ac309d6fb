use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
#[allow(unused_imports)]
use tracing::*;
use tracing_subscriber::prelude::*;

use crate::{
    config::{Configuration, Environment},
    session::Session,
    store::DirectoryStore,
};

mod backup;
mod config;
mod confirm;
mod coverage;
mod ics;
mod import;
mod ledger;
mod model;
mod payments;
mod register;
mod registry;
mod reminder;
mod session;
mod store;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory, defaults to ~/.cardpay
    #[arg(short, long, value_name = "DIR", global = true)]
    path: Option<PathBuf>,
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Treat this date as today
    #[arg(long, value_name = "YYYY-MM-DD", global = true)]
    today: Option<NaiveDate>,
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Card(registry::Command),
    Payment(payments::Command),
    Register(register::Command),
    Status(coverage::Command),
    Remind(reminder::Command),
    Export(backup::Command),
    Import(import::Command),
}

fn data_dir(path: &Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.clone()),
        None => std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".cardpay"))
            .context("HOME is not set, pass --path"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let get_rust_log = || -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| {
            match cli.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
            .into()
        })
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(get_rust_log()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let data_dir = data_dir(&cli.path)?;
    let config = match &cli.config {
        Some(path) => Configuration::load(path)?,
        None => Configuration::default(),
    };
    let env = Environment::new(config, data_dir, cli.today);
    debug!(data = %env.data_dir.display(), today = %env.today, "environment");

    let mut session = Session::open(DirectoryStore::new(&env.data_dir))?;

    match &cli.command {
        Commands::Card(cmd) => registry::execute_command(&mut session, cmd),
        Commands::Payment(cmd) => payments::execute_command(&mut session, &env, cmd),
        Commands::Register(cmd) => register::execute_command(&session, cmd),
        Commands::Status(cmd) => coverage::execute_command(&session, cmd),
        Commands::Remind(cmd) => reminder::execute_command(&mut session, &env, cmd),
        Commands::Export(cmd) => backup::execute_command(&session, &env, cmd),
        Commands::Import(cmd) => import::execute_command(&mut session, &env, cmd),
    }
}
