//! Optional YAML defaults for the command line.
//!
//! ```yaml
//! input: data/coffee_sales.csv
//! delimiter: ","
//! page: level2
//! top_products: 5
//! top_categories: 2
//! location: Astoria
//! ```
//!
//! Every key is optional. Flags given on the command line win.

use std::{fs::File, io::BufReader, path::Path, path::PathBuf};

use anyhow::{Context, Result, anyhow, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    cli::{SourceArgs, ViewArgs, parse_delimiter},
    views::{Page, ViewOptions},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardConfig {
    #[serde(default)]
    pub input: Option<PathBuf>,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub input_encoding: Option<String>,
    #[serde(default)]
    pub page: Option<Page>,
    #[serde(default)]
    pub top_products: Option<usize>,
    #[serde(default)]
    pub top_categories: Option<usize>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Source settings after merging flags over the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSource {
    pub input: PathBuf,
    pub delimiter: Option<u8>,
    pub input_encoding: Option<String>,
}

impl DashboardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: DashboardConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config YAML {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: DashboardConfig = serde_yaml::from_str(text).context("Parsing config YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(n) = self.top_categories {
            ensure!(
                (1..=5).contains(&n),
                "top_categories must be between 1 and 5, found {n}"
            );
        }
        if let Some(delimiter) = &self.delimiter {
            parse_delimiter(delimiter).map_err(|err| anyhow!("Invalid delimiter: {err}"))?;
        }
        Ok(())
    }

    pub fn resolve_source(&self, args: &SourceArgs) -> Result<ResolvedSource> {
        let input = args
            .input
            .clone()
            .or_else(|| self.input.clone())
            .ok_or_else(|| anyhow!("No input given; pass --input or set `input` in the config"))?;
        let delimiter = match (args.delimiter, &self.delimiter) {
            (Some(delimiter), _) => Some(delimiter),
            (None, Some(raw)) => Some(parse_delimiter(raw).map_err(|err| anyhow!(err))?),
            (None, None) => None,
        };
        Ok(ResolvedSource {
            input,
            delimiter,
            input_encoding: args
                .input_encoding
                .clone()
                .or_else(|| self.input_encoding.clone()),
        })
    }

    pub fn resolve_page(&self, args: &ViewArgs) -> Page {
        args.page.or(self.page).unwrap_or_default()
    }

    pub fn resolve_view_options(&self, args: &ViewArgs) -> ViewOptions {
        let defaults = ViewOptions::default();
        ViewOptions {
            top_products: args
                .top_products
                .or(self.top_products)
                .unwrap_or(defaults.top_products),
            top_categories: args
                .top_categories
                .map(usize::from)
                .or(self.top_categories)
                .unwrap_or(defaults.top_categories),
            location: args.location.clone().or_else(|| self.location.clone()),
            ..defaults
        }
    }
}
