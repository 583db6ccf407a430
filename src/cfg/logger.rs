// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{Event, Subscriber, field::Field};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter,
    fmt::{
        self, FmtContext, FormatEvent, FormatFields, FormattedFields,
        format::{FmtSpan, JsonFields, Writer},
    },
    layer::SubscriberExt,
    registry::LookupSpan,
};

/// Top-level document of the logger YAML file.
#[derive(Debug, Deserialize, Clone)]
struct LoggerFile {
    logger: LogSettings,
}

/// `logger:` section.
#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `debug` or `eses_engine::engine=trace`.
    pub level: String,
    /// `stdout`, `stderr` or `file`.
    pub output: String,
    pub is_show_line: bool,
    pub is_show_module_path: bool,
    pub is_show_target: bool,
    pub file: Option<LogFileSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogFileSettings {
    pub path: String,
    /// `minutely`, `hourly` or `daily`; anything else never rotates.
    pub rotation_frequency: Option<String>,
}

impl LogSettings {
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read logger config: {path}"))?;
        let doc: LoggerFile = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse logger config: {path}"))?;
        Ok(doc.logger)
    }
}

/// One JSON line per event.
struct JsonLineFormat {
    settings: Arc<LogSettings>,
}

#[derive(Serialize)]
struct LogLine {
    timestamp: String,
    level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    fields: Map<String, Value>,
}

impl LogLine {
    fn new(settings: &LogSettings, event: &Event<'_>, fields: Map<String, Value>) -> Self {
        let meta = event.metadata();
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: meta.level().to_string(),
            target: settings.is_show_target.then(|| meta.target().to_string()),
            module_path: settings
                .is_show_module_path
                .then(|| meta.module_path().unwrap_or_default().to_string()),
            line: if settings.is_show_line { meta.line() } else { None },
            fields,
        }
    }
}

/// Span fields (for example the request `correlation` and `op` attached by
/// the engine) are merged into the event fields, and the chain of span
/// names is recorded under `spans`.
impl<S, N> FormatEvent<S, N> for JsonLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);
        let mut fields = visitor.fields;

        if let Some(scope) = ctx.event_scope() {
            let mut spans = Vec::new();
            for span in scope.from_root() {
                spans.push(span.name().to_string());
                let ext = span.extensions();
                let Some(formatted) = ext.get::<FormattedFields<JsonFields>>() else {
                    continue;
                };
                let parsed: HashMap<String, Value> =
                    serde_json::from_str(&formatted.fields).unwrap_or_default();
                fields.extend(parsed);
            }
            fields.insert("spans".to_string(), json!(spans));
        }

        let line = LogLine::new(&self.settings, event, fields);
        let text = serde_json::to_string(&line).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{text}")
    }
}

#[derive(Default)]
struct FieldCollector {
    fields: Map<String, Value>,
}

impl tracing::field::Visit for FieldCollector {
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), json!(format!("{value:?}")));
    }
}

fn split_log_path(path: &str) -> (PathBuf, PathBuf) {
    let p = Path::new(path);
    let dir = p.parent().map(Path::to_path_buf).unwrap_or_default();
    let name = p.file_name().map(PathBuf::from).unwrap_or_default();
    (dir, name)
}

fn make_writer(settings: &LogSettings) -> Result<(NonBlocking, WorkerGuard)> {
    Ok(match settings.output.as_str() {
        "stdout" => tracing_appender::non_blocking(std::io::stdout()),
        "stderr" => tracing_appender::non_blocking(std::io::stderr()),
        "file" => {
            let file = settings
                .file
                .as_ref()
                .context("logger output is `file` but no `file:` section given")?;
            let rotation = match file.rotation_frequency.as_deref() {
                Some("minutely") => Rotation::MINUTELY,
                Some("hourly") => Rotation::HOURLY,
                Some("daily") => Rotation::DAILY,
                _ => Rotation::NEVER,
            };
            let (dir, name) = split_log_path(&file.path);
            tracing_appender::non_blocking(RollingFileAppender::new(rotation, dir, name))
        },
        other => bail!("invalid log output: {other}"),
    })
}

/// Install the global JSON subscriber described by the YAML file at
/// `config_path`. Keep the returned guard alive for the life of the process.
pub fn init_logger(config_path: &str) -> Result<WorkerGuard> {
    init_logger_with(LogSettings::from_file(config_path)?)
}

pub fn init_logger_with(settings: LogSettings) -> Result<WorkerGuard> {
    let (writer, guard) = make_writer(&settings)?;
    let env_filter =
        EnvFilter::try_new(&settings.level).context("failed to parse log level")?;

    let layer = fmt::layer()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .json()
        .event_format(JsonLineFormat {
            settings: Arc::new(settings),
        })
        .fmt_fields(JsonFields::default());

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global default subscriber")?;
    Ok(guard)
}

/// Write a decoded page (or anything serializable) as pretty JSON.
pub async fn dump_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .context("failed to create output directory")?;
    }
    let text = serde_json::to_string_pretty(value).context("failed to encode JSON")?;
    let mut file = File::create(path)
        .await
        .with_context(|| format!("failed to create {path:?}"))?;
    file.write_all(text.as_bytes())
        .await
        .context("failed to write JSON")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_dir_and_file() {
        let (dir, name) = split_log_path("logs/engine.log");
        assert_eq!(dir, PathBuf::from("logs"));
        assert_eq!(name, PathBuf::from("engine.log"));
    }

    #[test]
    fn unknown_output_is_rejected() {
        let s = LogSettings {
            level: "info".into(),
            output: "syslog".into(),
            is_show_line: false,
            is_show_module_path: false,
            is_show_target: false,
            file: None,
        };
        assert!(make_writer(&s).is_err());
    }
}
