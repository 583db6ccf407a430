// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

pub const DEFAULT_CONFIG: &str = "tests/config.yaml";
pub const DEFAULT_LOGGER_CONFIG: &str = "tests/config_logger.yaml";

pub const USAGE: &str =
    "usage: eses-engine [--config <file>] [--logger <file>] <page.hex>...";

/// Turns a config path given relative to the working directory into an
/// existing absolute path.
pub fn resolve_config_path(rel: impl AsRef<Path>) -> Result<PathBuf> {
    let rel = rel.as_ref();
    let abs = std::path::absolute(rel)
        .with_context(|| format!("cannot make {rel:?} absolute"))?;
    abs.canonicalize()
        .with_context(|| format!("config file {abs:?} not found"))
}

/// Arguments of the offline page decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderArgs {
    pub config: PathBuf,
    pub logger: String,
    pub pages: Vec<PathBuf>,
}

impl DecoderArgs {
    /// Parses `args` without the program name.
    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = PathBuf::from(DEFAULT_CONFIG);
        let mut logger = DEFAULT_LOGGER_CONFIG.to_string();
        let mut pages = Vec::new();

        let mut it = args.into_iter().map(Into::into);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = it.next().context("--config needs a file")?.into();
                },
                "--logger" | "-l" => {
                    logger = it.next().context("--logger needs a file")?;
                },
                flag if flag.starts_with('-') => bail!("unknown option {flag}\n{USAGE}"),
                _ => pages.push(PathBuf::from(arg)),
            }
        }
        if pages.is_empty() {
            bail!("{USAGE}");
        }
        Ok(Self {
            config,
            logger,
            pages,
        })
    }
}
