//! # Lattice Server
//!
//! Composition root for the Lattice service mesh. Depending on the enabled
//! components, one process hosts:
//!
//! - the resource store gRPC server (control plane),
//! - the edge gateway (data plane) with its policy projector,
//! - the xDS projector feeding the embedded discovery cache,
//! - the workflow trigger manager.
//!
//! Projectors consume the store through the watch protocol, dialing the
//! control-plane address even when colocated; a projector failure is fatal
//! for the process, so a supervisor restarts it with a fresh snapshot.

mod invoker;
mod workflow;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lattice_config::LatticeOptions;
use lattice_core::connector::StoreConnector;
use lattice_core::faas::LambdaGatewayHandler;
use lattice_core::gateway::bridge::{self, BridgeState};
use lattice_core::gateway::{Gateway, GatewayHandler, GatewayProjector};
use lattice_core::projector::{MemoryXdsCache, XdsProjector};
use lattice_core::pubsub::PubSub;
use lattice_core::store::memory::MemoryStore;
use lattice_core::store::postgres::PostgresStore;
use lattice_core::store::service::StoreService;
use lattice_core::store::StoreBackend;
use lattice_core::sync::{EventHandler, Synchronizer};
use lattice_core::worker::TriggerManager;
use lattice_proto::services::resource_store_server::ResourceStoreServer;
use lattice_proto::services::WatchResourcesRequest;

use crate::invoker::HttpFunctionInvoker;
use crate::workflow::HttpWorkflowClient;

/// Command line arguments; each overrides its configuration counterpart.
#[derive(Parser, Debug)]
#[command(name = "lattice-server")]
#[command(about = "Service mesh control plane with an edge data-plane gateway")]
struct Args {
    /// Path to a configuration file (TOML)
    #[arg(long, env = "LATTICE_CONFIG")]
    config: Option<PathBuf>,

    /// Control-plane (resource store gRPC) listen address
    #[arg(long, env = "LATTICE_CONTROL_LISTEN")]
    control_listen: Option<String>,

    /// Data-plane (gateway) listen address
    #[arg(long, env = "LATTICE_DATA_LISTEN")]
    data_listen: Option<String>,

    /// PostgreSQL URL backing the resource store
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Resource store namespace consumed by the projectors
    #[arg(long, env = "LATTICE_NAMESPACE")]
    namespace: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut options = lattice_config::load(args.config.as_deref())?;

    // Flags win over environment and file layers.
    if let Some(listen) = args.control_listen {
        options.control_plane.listen = listen;
    }
    if let Some(listen) = args.data_listen {
        options.data_plane.listen = listen;
    }
    if let Some(url) = args.database_url {
        options.store.database_url = Some(url);
    }
    if let Some(namespace) = args.namespace {
        options.sync.namespace = namespace;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lattice_server=debug,lattice_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("configuration loaded");

    if let Some(url) = options.store.database_url.clone() {
        info!("connecting to PostgreSQL resource store");
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(&url)
            .await
            .context("database connection failed")?;

        let store = PostgresStore::new(pool);
        store.migrate().await.context("schema migration failed")?;
        info!("database migrations applied");

        run(options, Arc::new(store)).await
    } else {
        warn!("no database URL configured; using the in-memory resource store");
        run(options, Arc::new(MemoryStore::new())).await
    }
}

async fn run<B: StoreBackend>(options: LatticeOptions, backend: Arc<B>) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    {
        let shutdown_tx = Arc::clone(&shutdown_tx);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    let mut tasks: Vec<(&'static str, JoinHandle<anyhow::Result<()>>)> = Vec::new();

    if options.components.store {
        tasks.push((
            "store",
            tokio::spawn(serve_store(
                options.clone(),
                Arc::clone(&backend),
                shutdown_rx.clone(),
            )),
        ));
    }

    if options.components.gateway {
        let mut handlers: Vec<Arc<dyn GatewayHandler>> = Vec::new();
        if let Some(endpoint) = options.faas.endpoint.clone() {
            let hub = Arc::new(PubSub::new());
            handlers.push(Arc::new(LambdaGatewayHandler::new(
                Arc::new(HttpFunctionInvoker::new(endpoint)),
                options.gateway.clone(),
                Some(hub),
            )));
        } else {
            warn!("no function endpoint configured; gateway policies will not be callable");
        }

        let gateway = Arc::new(Gateway::new(handlers));

        tasks.push((
            "gateway-sync",
            tokio::spawn(run_projector(
                "gateway",
                options.clone(),
                GatewayProjector::new(Arc::clone(&gateway)),
                Arc::clone(&shutdown_tx),
                shutdown_rx.clone(),
            )),
        ));
        tasks.push((
            "data-plane",
            tokio::spawn(serve_data_plane(
                options.clone(),
                gateway,
                shutdown_rx.clone(),
            )),
        ));
    }

    if options.components.xds {
        let cache = Arc::new(MemoryXdsCache::new());
        tasks.push((
            "xds-sync",
            tokio::spawn(run_projector(
                "xds",
                options.clone(),
                XdsProjector::new(cache),
                Arc::clone(&shutdown_tx),
                shutdown_rx.clone(),
            )),
        ));
    }

    if options.components.worker {
        match options.worker.engine_endpoint.clone() {
            Some(endpoint) => {
                let manager = TriggerManager::new(
                    HttpWorkflowClient::new(endpoint),
                    options.worker.task_queue.clone(),
                );
                tasks.push((
                    "worker-sync",
                    tokio::spawn(run_projector(
                        "worker",
                        options.clone(),
                        manager,
                        Arc::clone(&shutdown_tx),
                        shutdown_rx.clone(),
                    )),
                ));
            }
            None => warn!("worker enabled without an engine endpoint; skipping"),
        }
    }

    let mut failure = None;
    for (name, task) in tasks {
        match task.await {
            Ok(Ok(())) => info!(component = name, "component stopped"),
            Ok(Err(err)) => {
                error!(component = name, error = %err, "component failed");
                failure.get_or_insert(err);
            }
            Err(err) => {
                error!(component = name, error = %err, "component panicked");
                failure.get_or_insert_with(|| anyhow::anyhow!("component {name} panicked"));
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn serve_store<B: StoreBackend>(
    options: LatticeOptions,
    backend: Arc<B>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = options
        .control_plane
        .listen
        .parse()
        .context("control plane listen address")?;

    if options.control_plane.enable_reflection {
        // The checked-in service stubs carry no file descriptor set, so the
        // reflection surface has nothing to serve.
        warn!("gRPC reflection requested but no descriptor set is embedded");
    }

    let service = StoreService::new(backend, options.store.watch_interval);

    info!(%addr, "resource store listening");
    tonic::transport::Server::builder()
        .add_service(ResourceStoreServer::new(service))
        .serve_with_shutdown(addr, async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await
        .context("resource store server")
}

async fn serve_data_plane(
    options: LatticeOptions,
    gateway: Arc<Gateway>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = options
        .data_plane
        .listen
        .parse()
        .context("data plane listen address")?;

    let state = Arc::new(BridgeState {
        gateway,
        options: options.gateway.clone(),
    });
    let app = bridge::router(state);

    if options.data_plane.tls_disable {
        info!(%addr, "gateway listening (h2c)");

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("bind data plane listener")?;

        let graceful = {
            let mut shutdown_rx = shutdown_rx.clone();
            async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            }
        };

        let force_close = async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
            tokio::time::sleep(options.data_plane.shutdown_timeout).await;
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(graceful);
        tokio::select! {
            result = async move { server.await } => result.context("data plane server"),
            _ = force_close => {
                warn!("data plane shutdown timeout exceeded, closing");
                Ok(())
            }
        }
    } else {
        let cert = options
            .data_plane
            .tls_cert_path
            .clone()
            .context("tls enabled but no certificate path configured")?;
        let key = options
            .data_plane
            .tls_key_path
            .clone()
            .context("tls enabled but no key path configured")?;

        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
            .await
            .context("loading TLS material")?;

        info!(%addr, "gateway listening (tls)");

        let handle = axum_server::Handle::new();
        {
            let handle = handle.clone();
            let timeout = options.data_plane.shutdown_timeout;
            tokio::spawn(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
                handle.graceful_shutdown(Some(timeout));
            });
        }

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .context("data plane server")
    }
}

/// Connects to the store, opens the watch and drives one projector. Any
/// synchronizer error is fatal: it flips the shutdown signal so the process
/// restarts with a fresh snapshot under its supervisor.
async fn run_projector<H: EventHandler + 'static>(
    name: &'static str,
    options: LatticeOptions,
    handler: H,
    shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let connector = StoreConnector::new(options.sync.store_address.clone());

    let result = tokio::select! {
        _ = shutdown_rx.wait_for(|stop| *stop) => return Ok(()),
        result = drive_sync(name, connector, options.sync.namespace.clone(), handler) => result,
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(projector = name, error = %err, "projector failed, shutting down");
            let _ = shutdown_tx.send(true);
            Err(err.into())
        }
    }
}

async fn drive_sync<H: EventHandler + 'static>(
    name: &'static str,
    connector: StoreConnector,
    namespace: String,
    handler: H,
) -> lattice_core::Result<()> {
    let mut client = connector.connect().await?;

    info!(projector = name, %namespace, "starting resource sync");
    let stream = client
        .watch(WatchResourcesRequest { namespace })
        .await
        .map_err(lattice_core::LatticeError::from)?
        .into_inner();

    Synchronizer::new(handler).run(stream).await
}
