// Tracing subscriber setup for the `triad` binary.

use std::str::FromStr;

use eyre::Result;
use serde::Deserialize;
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingProperties {
    /// Verbosity of the default filter, e.g. "debug" or "info".
    #[serde(default = "default_level")]
    pub level: String,
    /// Full `EnvFilter` directive string. Overrides `level` when set.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingProperties {
    fn default() -> Self {
        Self {
            level: default_level(),
            filter: None,
            format: LogFormat::default(),
        }
    }
}

impl LoggingProperties {
    /// Filter directives derived from these properties.
    pub fn directives(&self) -> Result<String> {
        match &self.filter {
            Some(filter) => Ok(filter.clone()),
            None => {
                let level = Level::from_str(&self.level)?;
                Ok(format!("triadtrust={level},triadstream={level},triad={level}"))
            }
        }
    }
}

fn format_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let f = fmt::layer().with_thread_ids(true).with_thread_names(true);
    match format {
        LogFormat::Compact => f.compact().boxed(),
        LogFormat::Json => f.json().boxed(),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(properties: &LoggingProperties) -> Result<()> {
    let filter_layer = EnvFilter::builder().parse(properties.directives()?)?;

    Registry::default()
        .with(filter_layer)
        .with(format_layer(properties.format))
        .try_init()?;

    Ok(())
}
