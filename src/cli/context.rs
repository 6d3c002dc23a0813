//! Service wiring for CLI commands
//!
//! Resolves the configuration, initialises logging and opens the durable
//! stores every command works against.

use super::config::{default_config_path, default_data_path, LoggingConfig, OriginBindConfig};
use originbind::admin::AdminService;
use originbind::gatekeeper::{AccessGate, AccessHistory, AuditLog};
use originbind::geo::{GeoResolver, IpApiLookup};
use originbind::persistence::{
    RegistrationStore, ACCESS_HISTORY_FILE, FAILED_LOGINS_FILE, REGISTRATIONS_FILE,
};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Opened services for one CLI invocation.
pub struct Context {
    pub config: OriginBindConfig,
    pub store: Arc<RegistrationStore>,
    pub audit: Arc<AuditLog>,
    pub history: Option<Arc<AccessHistory>>,
    pub geo: Option<Arc<GeoResolver>>,
}

impl Context {
    /// Load configuration and open every store.
    ///
    /// Configuration is taken from `--config` if given, otherwise from
    /// `config.toml` in the data directory. A default file is written if none
    /// exists. `--data-dir` overrides `storage.data_dir`.
    pub fn load(
        config_path: Option<String>,
        data_dir: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (config_path, data_dir) = resolve_paths(config_path, data_dir);

        let created = !config_path.exists();
        if created {
            let dir = data_dir.clone().unwrap_or_else(default_data_path);
            OriginBindConfig::create_default(&config_path, &dir)?;
        }

        let mut config = OriginBindConfig::load(&config_path)?;
        if let Some(dir) = data_dir {
            config.storage.data_dir = dir;
        }

        init_logging(&config.logging)?;
        if created {
            info!(path = %config_path.display(), "default configuration created");
        }

        Self::from_config(config)
    }

    /// Open every store described by `config`. Does not touch logging.
    pub fn from_config(config: OriginBindConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let data_dir = &config.storage.data_dir;

        let store = Arc::new(RegistrationStore::open(data_dir.join(REGISTRATIONS_FILE))?);
        let audit = Arc::new(AuditLog::open(data_dir.join(FAILED_LOGINS_FILE))?);

        let history = if config.access_history.enabled {
            Some(Arc::new(AccessHistory::open(
                data_dir.join(ACCESS_HISTORY_FILE),
                config.access_history.max_entries,
            )?))
        } else {
            None
        };

        let geo = if config.geo.enabled {
            let lookup = IpApiLookup::new(config.geo.api_url.clone(), config.geo.timeout())?;
            Some(Arc::new(GeoResolver::new(
                Arc::new(lookup),
                config.geo.cache_ttl(),
                config.geo.timeout(),
            )))
        } else {
            None
        };

        Ok(Self {
            config,
            store,
            audit,
            history,
            geo,
        })
    }

    /// Access gate over the opened stores.
    pub fn gate(&self) -> AccessGate {
        let mut gate = AccessGate::new(
            Arc::clone(&self.store),
            Arc::clone(&self.audit),
            self.config.gate_policy(),
        );
        if let Some(history) = &self.history {
            gate = gate.with_history(Arc::clone(history));
        }
        if let Some(geo) = &self.geo {
            gate = gate.with_geo(Arc::clone(geo));
        }
        gate
    }

    /// Admin service over the opened stores.
    pub fn admin(&self) -> AdminService {
        let admin = AdminService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.audit),
            self.config.policy.max_origins_per_identity,
        );
        match &self.history {
            Some(history) => admin.with_history(Arc::clone(history)),
            None => admin,
        }
    }
}

/// Work out the config file path and the data directory override.
fn resolve_paths(
    config_path: Option<String>,
    data_dir: Option<String>,
) -> (PathBuf, Option<PathBuf>) {
    let data_dir = data_dir.map(PathBuf::from);
    let config_path = config_path.map(PathBuf::from).unwrap_or_else(|| {
        let dir = data_dir.clone().unwrap_or_else(default_data_path);
        default_config_path(&dir)
    });
    (config_path, data_dir)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr, or to the
/// configured file without ANSI colours. Installing twice is a no-op.
pub fn init_logging(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if let Some(path) = &logging.file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    if let Err(e) = installed {
        debug!(error = %e, "tracing subscriber already installed");
    }
    Ok(())
}

/// Context over `dir` with geolocation off, for command tests.
#[cfg(test)]
pub(crate) fn test_context(dir: &std::path::Path) -> Context {
    let mut config = OriginBindConfig::new(dir.to_path_buf());
    config.geo.enabled = false;
    Context::from_config(config).unwrap()
}
