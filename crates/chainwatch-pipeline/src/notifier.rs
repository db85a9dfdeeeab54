//! The three standard notifiers: HTTP webhook, Redis pub/sub, and a
//! structured-log sink. The webhook notifier posts with `reqwest` and is
//! the only one that retries; the log sink rides on its own `tracing`
//! dispatch so format, minimum level, and a size-capped rotating file all
//! come from `[logging]` rather than being hardcoded.

use async_trait::async_trait;
use chainwatch_config::{LogFormat, LogLevel, LoggingConfig};
use chainwatch_types::{with_retry_counted, Classification, ProcessedEvent, RetryConfig, ValueClassification};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::error::NotifierError;

#[async_trait]
pub trait Notifier: Send + Sync {
	fn channel_name(&self) -> &str;
	async fn notify(&self, event: &ProcessedEvent) -> Result<(), NotifierError>;
}

/// Posts the processed event as JSON to a configured URL.
pub struct WebhookNotifier {
	name: String,
	url: String,
	client: reqwest::Client,
	retry: RetryConfig,
}

impl WebhookNotifier {
	pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			url: url.into(),
			client: reqwest::Client::new(),
			retry: RetryConfig::default(),
		}
	}
}

#[async_trait]
impl Notifier for WebhookNotifier {
	fn channel_name(&self) -> &str {
		&self.name
	}

	async fn notify(&self, event: &ProcessedEvent) -> Result<(), NotifierError> {
		let url = self.url.clone();
		let client = self.client.clone();
		let body = event.clone();
		with_retry_counted(&self.retry, move || {
			let client = client.clone();
			let url = url.clone();
			let body = body.clone();
			async move {
				client
					.post(&url)
					.json(&body)
					.send()
					.await
					.and_then(|r| r.error_for_status())
					.map(|_| ())
			}
		})
		.await
		.map_err(|(err, retry_count)| NotifierError {
			channel: self.name.clone(),
			message: err.to_string(),
			retry_count,
		})
	}
}

/// Publishes the processed event as JSON to a Redis pub/sub channel. Never
/// retried — a dropped publish is reported once, not replayed.
pub struct PubSubNotifier {
	name: String,
	channel: String,
	client: redis::Client,
}

impl PubSubNotifier {
	pub fn new(
		name: impl Into<String>,
		redis_url: impl AsRef<str>,
		channel: impl Into<String>,
	) -> Result<Self, NotifierError> {
		let client = redis::Client::open(redis_url.as_ref()).map_err(|err| NotifierError {
			channel: "redis_pubsub".to_string(),
			message: err.to_string(),
			retry_count: 0,
		})?;
		Ok(Self {
			name: name.into(),
			channel: channel.into(),
			client,
		})
	}
}

#[async_trait]
impl Notifier for PubSubNotifier {
	fn channel_name(&self) -> &str {
		&self.name
	}

	async fn notify(&self, event: &ProcessedEvent) -> Result<(), NotifierError> {
		let payload = serde_json::to_string(event).map_err(|err| NotifierError {
			channel: self.name.clone(),
			message: err.to_string(),
			retry_count: 0,
		})?;
		let mut conn = self
			.client
			.get_connection_manager()
			.await
			.map_err(|err| NotifierError {
				channel: self.name.clone(),
				message: err.to_string(),
				retry_count: 0,
			})?;
		redis::AsyncCommands::publish::<_, _, ()>(&mut conn, &self.channel, payload)
			.await
			.map_err(|err| NotifierError {
				channel: self.name.clone(),
				message: err.to_string(),
				retry_count: 0,
			})
	}
}

/// A `Write` sink that rotates its backing file once it would exceed
/// `max_bytes`, keeping up to `max_files` numbered copies
/// (`<name>.log.1` is the newest rotated file, `<name>.log.<max_files>`
/// the oldest) rather than growing without bound.
struct SizeRotatingWriter {
	path: PathBuf,
	max_bytes: u64,
	max_files: u32,
	file: std::fs::File,
	written: u64,
}

impl SizeRotatingWriter {
	fn open(dir: impl AsRef<Path>, file_name: &str, max_bytes: u64, max_files: u32) -> io::Result<Self> {
		std::fs::create_dir_all(&dir)?;
		let path = dir.as_ref().join(file_name);
		let file = OpenOptions::new().create(true).append(true).open(&path)?;
		let written = file.metadata()?.len();
		Ok(Self {
			path,
			max_bytes,
			max_files,
			file,
			written,
		})
	}

	fn rotated_path(&self, idx: u32) -> PathBuf {
		self.path.with_extension(format!("log.{idx}"))
	}

	fn rotate(&mut self) -> io::Result<()> {
		if self.max_files > 0 {
			for idx in (1..self.max_files).rev() {
				let src = self.rotated_path(idx);
				if src.exists() {
					let _ = std::fs::rename(&src, self.rotated_path(idx + 1));
				}
			}
			let _ = std::fs::rename(&self.path, self.rotated_path(1));
		}
		self.file = OpenOptions::new()
			.create(true)
			.write(true)
			.truncate(true)
			.open(&self.path)?;
		self.written = 0;
		Ok(())
	}
}

impl Write for SizeRotatingWriter {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if self.written + buf.len() as u64 > self.max_bytes {
			self.rotate()?;
		}
		let n = self.file.write(buf)?;
		self.written += n as u64;
		Ok(n)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.file.flush()
	}
}

fn level_filter_str(level: LogLevel) -> &'static str {
	match level {
		LogLevel::Debug => "debug",
		LogLevel::Info => "info",
		LogLevel::Warn => "warn",
		LogLevel::Error => "error",
	}
}

/// Maps an event's value classification onto a log severity, so a
/// sink configured at `warn` only sees high-value events and spam never
/// reaches a sink configured at `info` or above.
fn severity_for(classification: Option<&Classification>) -> Level {
	match classification.map(|c| c.category) {
		Some(ValueClassification::HighValue) => Level::WARN,
		Some(ValueClassification::Spam) | Some(ValueClassification::LowValue) => Level::DEBUG,
		Some(ValueClassification::MediumValue) | None => Level::INFO,
	}
}

/// Writes one structured log line per processed event on a dedicated
/// `tracing` dispatch — its own `EnvFilter`, its own JSON-or-text `fmt`
/// layer per `[logging] format`, a size-capped rotating file, and a
/// console mirror — rather than writing a raw line straight to a file and
/// bypassing the global subscriber's level and format entirely.
pub struct StructuredLogNotifier {
	name: String,
	dispatch: tracing::Dispatch,
	_file_guard: tracing_appender::non_blocking::WorkerGuard,
}

impl StructuredLogNotifier {
	pub fn new(name: impl Into<String>, logging: &LoggingConfig) -> io::Result<Self> {
		let writer = SizeRotatingWriter::open(
			&logging.event_log_dir,
			"chainwatch-events.log",
			logging.event_log_max_bytes,
			logging.event_log_max_files,
		)?;
		let (non_blocking, file_guard) = tracing_appender::non_blocking(writer);
		let env_filter = EnvFilter::new(level_filter_str(logging.level));

		let registry = tracing_subscriber::registry().with(env_filter);
		let dispatch = match logging.format {
			LogFormat::Json => tracing::Dispatch::new(
				registry
					.with(tracing_subscriber::fmt::layer().json().with_writer(non_blocking))
					.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stdout)),
			),
			LogFormat::Text => tracing::Dispatch::new(
				registry
					.with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
					.with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout)),
			),
		};

		Ok(Self {
			name: name.into(),
			dispatch,
			_file_guard: file_guard,
		})
	}
}

#[async_trait]
impl Notifier for StructuredLogNotifier {
	fn channel_name(&self) -> &str {
		&self.name
	}

	async fn notify(&self, event: &ProcessedEvent) -> Result<(), NotifierError> {
		let payload = serde_json::to_string(event).map_err(|err| NotifierError {
			channel: self.name.clone(),
			message: err.to_string(),
			retry_count: 0,
		})?;
		let level = severity_for(event.metadata.classification.as_ref());
		tracing::dispatcher::with_default(&self.dispatch, || match level {
			Level::WARN => tracing::warn!(target: "chainwatch_events", event = %payload, "processed event"),
			Level::DEBUG => tracing::debug!(target: "chainwatch_events", event = %payload, "processed event"),
			_ => tracing::info!(target: "chainwatch_events", event = %payload, "processed event"),
		});
		Ok(())
	}
}
