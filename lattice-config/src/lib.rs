//! Layered configuration for the Lattice control plane and gateway.
//!
//! Options are plain serde structs with defaults. [`load`] composes three
//! layers with ascending precedence: configuration file, process environment
//! (`LATTICE__` prefix, `__` separator), and explicit overrides applied by the
//! binary's flag parsing. The dotted keys documented on each field are the
//! canonical option names (`watch.interval`, `shutdown.timeout`, ...).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration load: {0}")]
    Load(#[from] config::ConfigError),
}

/// Serde adapter for duration fields; accepts humantime strings ("60s",
/// "120ms") or an integer number of seconds.
pub mod duration {
    use std::fmt;
    use std::time::Duration;

    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration string such as \"60s\" or a number of seconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                humantime::parse_duration(v).map_err(de::Error::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration::from_secs(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                u64::try_from(v)
                    .map(Duration::from_secs)
                    .map_err(de::Error::custom)
            }
        }

        de.deserialize_any(DurationVisitor)
    }
}

fn default_true() -> bool {
    true
}

/// Control-plane RPC server options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlPlaneOptions {
    /// Listen address for the resource store gRPC server.
    pub listen: String,
    /// `enable.reflection` — exposes gRPC server reflection.
    pub enable_reflection: bool,
}

impl Default for ControlPlaneOptions {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:7070".to_string(),
            enable_reflection: false,
        }
    }
}

/// Data-plane (gateway) server options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataPlaneOptions {
    pub listen: String,
    /// `tls.disable` — serve plaintext h2c instead of TLS.
    pub tls_disable: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
    /// `shutdown.timeout` — grace period before the server force-closes.
    #[serde(with = "duration")]
    pub shutdown_timeout: Duration,
}

impl Default for DataPlaneOptions {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            tls_disable: false,
            tls_cert_path: None,
            tls_key_path: None,
            shutdown_timeout: Duration::from_secs(120),
        }
    }
}

/// Resource store options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// PostgreSQL connection URL; the in-memory backend is used when unset.
    pub database_url: Option<String>,
    /// `watch.interval` — tail poll interval between event scans.
    #[serde(with = "duration")]
    pub watch_interval: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            database_url: None,
            watch_interval: Duration::from_secs(60),
        }
    }
}

/// Options shared by every resource synchronizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// `resource.store.namespace` — namespace consumed by each projector.
    pub namespace: String,
    /// Address of the resource store the projectors dial.
    pub store_address: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            store_address: "http://127.0.0.1:7070".to_string(),
        }
    }
}

/// Gateway and FaaS bridge options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayOptions {
    /// `grpc.server.stream.timeout.header` — metadata key carrying the
    /// server-stream continuation timeout.
    pub stream_timeout_header: String,
    /// `nounce.header` — propagated verbatim into FaaS envelopes.
    pub nounce_header: String,
    /// `server.stream.topic.prefix` — pub/sub topic prefix for signal-driven
    /// continuations.
    pub stream_topic_prefix: String,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            stream_timeout_header: "x-server-stream-timeout".to_string(),
            nounce_header: "x-nounce".to_string(),
            stream_topic_prefix: "lambda.server.stream:".to_string(),
        }
    }
}

/// Workflow worker options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    /// `worker.task.queue` — workflow task queue.
    pub task_queue: String,
    /// Base URL of the workflow engine bridge; the worker projector is only
    /// started when set.
    pub engine_endpoint: Option<String>,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            task_queue: "lattice".to_string(),
            engine_endpoint: None,
        }
    }
}

/// Function-as-a-service invoker options.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FaasOptions {
    /// Base URL functions are invoked under (`{endpoint}/{function_name}`).
    pub endpoint: Option<String>,
}

/// Which subsystems this process runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ComponentOptions {
    #[serde(default = "default_true")]
    pub store: bool,
    #[serde(default = "default_true")]
    pub gateway: bool,
    pub xds: bool,
    pub worker: bool,
}

impl Default for ComponentOptions {
    fn default() -> Self {
        Self {
            store: true,
            gateway: true,
            xds: false,
            worker: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LatticeOptions {
    pub components: ComponentOptions,
    pub control_plane: ControlPlaneOptions,
    pub data_plane: DataPlaneOptions,
    pub store: StoreOptions,
    pub sync: SyncOptions,
    pub gateway: GatewayOptions,
    pub worker: WorkerOptions,
    pub faas: FaasOptions,
}

/// Loads options from an optional file plus the environment.
///
/// Precedence (low to high): file, environment. Flag overrides are applied by
/// the caller after loading, preserving the flag > env > file order.
pub fn load(file: Option<&Path>) -> Result<LatticeOptions, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("LATTICE")
            .separator("__")
            .try_parsing(true),
    );

    let options = builder.build()?.try_deserialize()?;
    Ok(options)
}
