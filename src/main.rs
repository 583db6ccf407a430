// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Offline page decoder: each page argument is a file holding one diagnostic
//! page as hex. A Configuration page sets the element layout used for the pages
//! after it. Every decoded page is written next to its input as JSON.

use anyhow::{Context, Result};
use eses_engine::{
    cfg::{
        cli::{DecoderArgs, resolve_config_path},
        config::Config,
        logger::{dump_json, init_logger},
    },
    models::pages::{DecodeContext, DiagnosticPage, EsesPage},
};
use tokio::main;
use tracing::{info, warn};

#[main]
async fn main() -> Result<()> {
    let args = DecoderArgs::parse(std::env::args().skip(1))?;
    let _init_logger = init_logger(&args.logger)?;

    let config = resolve_config_path(&args.config)
        .and_then(Config::load_from_file)
        .context("failed to resolve or load config")?;

    let version = config.engine.eses_version;
    let mut groups = Vec::new();
    for path in args.pages {
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {path:?}"))?;
        let clean: String = text.split_whitespace().collect();
        let raw = hex::decode(&clean).with_context(|| format!("{path:?} is not hex"))?;

        let page = match DiagnosticPage::decode(&raw, DecodeContext::new(version, &groups)) {
            Ok(p) => p,
            Err(e) => {
                warn!(?path, "decode failed: {e:#}");
                continue;
            },
        };
        info!(
            ?path,
            page_code = page.header().page_code,
            generation = page.generation_code(),
            "page decoded"
        );
        println!("{}", serde_json::to_string_pretty(&page)?);
        if let DiagnosticPage::ConfigPage(c) = &page {
            groups = c.groups.clone();
        }
        dump_json(&path.with_extension("json"), &page).await?;
    }
    Ok(())
}
