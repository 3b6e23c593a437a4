//! Filtering, aggregation and descriptive statistics over coffee shop
//! point-of-sale transactions.
//!
//! The pipeline is leaf-first: [`store::RecordStore`] loads and derives
//! columns once, [`filter`] narrows it to a [`filter::FilteredView`],
//! [`aggregate`] and [`stats`] reduce views, and [`views`] packages the
//! results of one analysis page for a front-end.

pub mod aggregate;
pub mod cli;
pub mod columns;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod filter;
pub mod io_utils;
pub mod render;
pub mod stats;
pub mod store;
pub mod table;
pub mod views;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::cli::{Cli, Commands};

pub use crate::{
    error::AnalyticsError,
    filter::{FilterCriteria, FilteredView},
    store::RecordStore,
    views::{Page, ResultSet, ViewOptions},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("coffee_analytics", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    match &cli.command {
        Commands::View(args) => commands::handle_view(config, args),
        Commands::Domain(args) => commands::handle_domain(config, args),
        Commands::Stats(args) => commands::handle_stats(config, args),
    }
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
