//! Structured logging setup for cgate services
//!
//! Besides subscriber setup this crate owns [`PayloadTrace`], the opt-in
//! channel that records plaintext and ciphertext payloads. It is separate
//! from operational logging so payloads never reach logs unless asked for.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::fmt;
use std::sync::Arc;
use tracing_subscriber::{
    fmt as subscriber_fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target used for payload trace events
pub const PAYLOAD_TARGET: &str = "cgate::payload";

/// Initialize structured logging for cgate services
///
/// This sets up:
/// - JSON formatted logs (for production)
/// - Environment-based log level filtering
/// - Service name tagging
pub fn init_logging(service_name: &str, default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            subscriber_fmt::layer()
                .json()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(false)
                .with_span_list(false),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(service = service_name, "Logging initialized");
    }
}

/// Initialize simple console logging (for development and the CLI)
///
/// Writes to stderr so command output on stdout stays clean.
pub fn init_console_logging(service_name: &str, default_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(service = service_name, "Console logging initialized");
    }
}

/// Caller-supplied payload logger: `(label, value)`
pub type TraceFn = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Where payload traces go
#[derive(Clone, Default)]
pub enum PayloadTrace {
    /// Nothing is recorded
    #[default]
    Disabled,
    /// `debug!` events on the [`PAYLOAD_TARGET`] target
    Tracing,
    /// Handed to a caller function
    Custom(TraceFn),
}

impl PayloadTrace {
    /// Build a trace sink from a caller function
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        PayloadTrace::Custom(Arc::new(f))
    }

    /// `Tracing` when enabled, `Disabled` otherwise
    pub fn from_flag(enabled: bool) -> Self {
        if enabled {
            PayloadTrace::Tracing
        } else {
            PayloadTrace::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, PayloadTrace::Disabled)
    }

    /// Record one labelled payload. Never fails.
    pub fn record(&self, label: &str, value: &str) {
        match self {
            PayloadTrace::Disabled => {}
            PayloadTrace::Tracing => {
                tracing::debug!(target: PAYLOAD_TARGET, label = label, value = value, "payload");
            }
            PayloadTrace::Custom(f) => f(label, value),
        }
    }
}

impl fmt::Debug for PayloadTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadTrace::Disabled => write!(f, "PayloadTrace::Disabled"),
            PayloadTrace::Tracing => write!(f, "PayloadTrace::Tracing"),
            PayloadTrace::Custom(_) => write!(f, "PayloadTrace::Custom(..)"),
        }
    }
}
