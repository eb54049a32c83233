//! Environment configuration for the newswire pipeline.
//!
//! Every knob is an environment variable, read once at process start into a
//! [`Config`] value that is passed down explicitly. Nothing in the pipeline
//! reads the environment after that point.

mod util;

pub use util::{parse_bool, parse_bool_var, truthy_var};

/// Run configuration, resolved from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker-pool width for all parallel stages. Floor of 1.
    pub concurrency: usize,
    /// Log level name (`DEBUG`/`INFO`/`WARNING`/`ERROR`). Default `WARNING`.
    pub log_level: String,
    /// Disables object-store uploads and remote existence probes.
    pub no_upload: bool,
    /// CDN base URL that serves cached thumbnails.
    pub pcdn_url_base: String,
    /// Public bucket: aggregated feed, report, sources list.
    pub pub_s3_bucket: String,
    /// Private bucket: padded thumbnail blobs.
    pub priv_s3_bucket: String,
    /// Basename for the registry inputs/outputs (`<sources_file>.csv` etc.).
    pub sources_file: String,
    /// Optional error-reporting endpoint.
    pub sentry_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            concurrency: concurrency_from_env(),
            log_level: var_or("LOG_LEVEL", "WARNING"),
            no_upload: truthy_var("NO_UPLOAD"),
            pcdn_url_base: var_or("PCDN_URL_BASE", "https://pcdn.brave.software"),
            pub_s3_bucket: var_or("PUB_S3_BUCKET", "brave-today-cdn-development"),
            priv_s3_bucket: var_or("PRIV_S3_BUCKET", "brave-private-cdn-development"),
            sources_file: var_or("SOURCES_FILE", "sources"),
            sentry_url: std::env::var("SENTRY_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }

    /// The `tracing` filter directive matching `log_level`.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level.to_ascii_uppercase().as_str() {
            "DEBUG" => "debug",
            "INFO" => "info",
            "ERROR" | "CRITICAL" => "error",
            _ => "warn",
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn concurrency_from_env() -> usize {
    std::env::var("CONCURRENCY")
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .unwrap_or_else(num_cpus::get)
        .max(1)
}
