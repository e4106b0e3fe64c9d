//! Builds a [`Server`] hosting the services enabled in a [`TesseraConfig`].
//!
//! Each enabled service contributes a router (mounted under its configured
//! prefix) and its handlers. Services with background work are registered in
//! the DI container and started by lifecycle hooks in this order:
//!
//! 1. service directory
//! 2. broker, then its topics
//! 3. message consumer
//! 4. word-count job
//! 5. document point store, then its status reporter
//!
//! Shutdown runs the same hooks in reverse.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tessera_config::{ConfigError, Dispatch, PointBackend, TesseraConfig};
use tessera_core::di::Container;
use tessera_server::{
    AccessPolicy, HandlerRegistry, Lifecycle, LifecycleError, ReadinessCheck, Router, Server,
    ServerConfig,
};
use thiserror::Error;

use crate::broker::Broker;
use crate::directory::ServiceDirectory;
use crate::echo::{EchoClient, EchoRoutes, EchoService, RemoteEcho};
use crate::employees::{EmployeeRegistry, EmployeesService, RegistryClient, RemoteRegistry};
use crate::graph::{GraphService, PersonGraph};
use crate::greeting::GreetingService;
use crate::messaging::{MessageConsumer, MessageService};
use crate::oauth2::{OAuth2Service, ROLE_USER};
use crate::points::{
    DocumentCollection, DocumentError, DocumentPointStore, MemoryPointStore, PointStore,
    PointsService, StatusReporter,
};
use crate::wordcount::{LongMapAccumulator, WordCountJob, WordCountService};

const POINTS_COLLECTION: &str = "points";

/// Failures while assembling the server.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A remote dispatch target has no directory entry.
    #[error("no service directory entry for {0}")]
    MissingDirectoryEntry(&'static str),

    /// The point collection could not be opened.
    #[error("failed to open point storage: {0}")]
    Storage(#[from] DocumentError),

    /// A scratch directory could not be created.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The outbound HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// A scratch directory owned by the running server.
#[derive(Debug)]
pub struct ScratchDir(TempDir);

impl ScratchDir {
    /// Path of the directory.
    pub fn path(&self) -> &std::path::Path {
        self.0.path()
    }
}

struct Parts {
    router: Router,
    handlers: HandlerRegistry,
    container: Container,
    lifecycle: Lifecycle,
    readiness: ReadinessCheck,
}

impl Parts {
    fn mount(&mut self, prefix: &str, (router, handlers): (Router, HandlerRegistry)) {
        tracing::debug!(prefix, routes = router.route_count(), "Mounting service");
        self.router.mount(prefix, router);
        self.handlers.merge(handlers);
    }

    fn hooks<S, Fs, T, U>(&mut self, name: &'static str, startup: S, shutdown: T)
    where
        S: Fn(&mut Container) -> Fs + Send + Sync + 'static,
        Fs: std::future::Future<Output = Result<(), LifecycleError>> + Send + 'static,
        T: Fn(&mut Container) -> U + Send + Sync + 'static,
        U: std::future::Future<Output = Result<(), LifecycleError>> + Send + 'static,
    {
        let lifecycle = std::mem::take(&mut self.lifecycle);
        self.lifecycle = lifecycle
            .on_startup_named(name, startup)
            .on_shutdown_named(name, shutdown);
    }
}

fn server_config(config: &TesseraConfig) -> ServerConfig {
    ServerConfig::builder()
        .http_addr(config.server.http_addr.clone())
        .shutdown_timeout(config.shutdown_timeout())
        .request_timeout(config.request_timeout())
        .max_connections(config.server.max_connections)
        .build()
}

fn resolve_url(directory: &ServiceDirectory, service: &'static str) -> Result<String, AssemblyError> {
    directory
        .resolve(service)
        .ok_or(AssemblyError::MissingDirectoryEntry(service))
}

/// Builds the server for `config`.
///
/// The configuration is validated first. Nothing is started: background
/// services start when the server runs its startup hooks.
pub async fn build_server(config: &TesseraConfig) -> Result<Server, AssemblyError> {
    config.validate()?;
    let apps = &config.apps;

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?;

    let mut parts = Parts {
        router: Router::new(),
        handlers: HandlerRegistry::new(),
        container: Container::new(),
        lifecycle: Lifecycle::new(),
        readiness: ReadinessCheck::new(),
    };

    let directory = Arc::new(ServiceDirectory::with_entries(apps.directory.clone()));
    parts.container.register(Arc::clone(&directory));
    parts.hooks(
        "directory",
        |container| {
            let directory = container.resolve::<ServiceDirectory>();
            async move {
                if let Some(directory) = directory {
                    directory
                        .start()
                        .map_err(|e| LifecycleError::with_source("service directory", e))?;
                }
                Ok(())
            }
        },
        |container| {
            let directory = container.resolve::<ServiceDirectory>();
            async move {
                if let Some(directory) = directory {
                    directory.stop();
                }
                Ok(())
            }
        },
    );

    let mut authenticator = None;
    if apps.oauth2.enabled {
        let oauth = OAuth2Service::from_config(&apps.oauth2);
        authenticator = Some(oauth.authenticator());
        parts.mount(&apps.oauth2.mount, oauth.routes());
        parts.container.register(Arc::new(oauth));
    }

    // The broker backs messaging and word count.
    let mut topics = Vec::new();
    if apps.messaging.enabled {
        topics.push(apps.messaging.topic.clone());
    }
    if apps.wordcount.enabled {
        topics.push(apps.wordcount.topic.clone());
    }
    let broker = (!topics.is_empty()).then(|| {
        let broker = Arc::new(match &apps.broker.data_dir {
            Some(dir) => Broker::with_data_dir(dir.clone()),
            None => Broker::new(),
        });
        parts.container.register(Arc::clone(&broker));
        broker
    });
    if broker.is_some() {
        let topics = Arc::new(topics);
        parts.hooks(
            "broker",
            move |container| {
                let broker = container.resolve_required::<Broker>();
                let topics = Arc::clone(&topics);
                async move {
                    let broker = broker.map_err(|e| LifecycleError::with_source("broker", e))?;
                    broker
                        .start()
                        .await
                        .map_err(|e| LifecycleError::with_source("broker start failed", e))?;
                    for topic in topics.iter() {
                        broker
                            .create_topic(topic)
                            .await
                            .map_err(|e| LifecycleError::with_source("topic creation failed", e))?;
                    }
                    Ok(())
                }
            },
            |container| {
                let broker = container.resolve::<Broker>();
                async move {
                    if let Some(broker) = broker {
                        broker.stop().await;
                    }
                    Ok(())
                }
            },
        );
    }

    if let Some(broker) = broker.as_ref().filter(|_| apps.messaging.enabled) {
        let topic = &apps.messaging.topic;
        parts.mount(
            &apps.messaging.mount,
            MessageService::new(Arc::clone(broker), topic.clone()).routes(),
        );

        let consumer = Arc::new(MessageConsumer::new(Arc::clone(broker), topic.clone()));
        parts.container.register(Arc::clone(&consumer));
        parts.readiness = std::mem::take(&mut parts.readiness)
            .add_check("message-consumer", move || consumer.is_running());
        parts.hooks(
            "message-consumer",
            |container| {
                let consumer = container.resolve_required::<MessageConsumer>();
                async move {
                    let consumer =
                        consumer.map_err(|e| LifecycleError::with_source("message consumer", e))?;
                    consumer
                        .start()
                        .await
                        .map_err(|e| LifecycleError::with_source("consumer start failed", e))
                }
            },
            |container| {
                let consumer = container.resolve::<MessageConsumer>();
                async move {
                    if let Some(consumer) = consumer {
                        consumer.stop().await;
                    }
                    Ok(())
                }
            },
        );
    }

    if let Some(broker) = broker.as_ref().filter(|_| apps.wordcount.enabled) {
        let wordcount = &apps.wordcount;
        let accumulator = Arc::new(LongMapAccumulator::new());
        parts.mount(
            &wordcount.mount,
            WordCountService::new(
                Arc::clone(broker),
                wordcount.topic.clone(),
                Arc::clone(&accumulator),
            )
            .routes(),
        );
        parts.container.register(Arc::new(WordCountJob::new(
            Arc::clone(broker),
            wordcount.topic.clone(),
            Duration::from_millis(wordcount.batch_interval_ms),
            accumulator,
        )));
        parts.hooks(
            "wordcount-job",
            |container| {
                let job = container.resolve_required::<WordCountJob>();
                async move {
                    let job = job.map_err(|e| LifecycleError::with_source("word-count job", e))?;
                    job.start()
                        .await
                        .map_err(|e| LifecycleError::with_source("word-count job start failed", e))
                }
            },
            |container| {
                let job = container.resolve::<WordCountJob>();
                async move {
                    if let Some(job) = job {
                        job.stop().await;
                    }
                    Ok(())
                }
            },
        );
    }

    if apps.points.enabled {
        let store: Arc<dyn PointStore> = match apps.points.backend {
            PointBackend::Memory => Arc::new(MemoryPointStore::new()),
            PointBackend::Document => {
                let dir = match &apps.points.data_dir {
                    Some(dir) => dir.clone(),
                    None => {
                        let scratch = ScratchDir(tempfile::Builder::new().prefix("points").tempdir()?);
                        let path: PathBuf = scratch.path().to_path_buf();
                        parts.container.register(Arc::new(scratch));
                        path
                    }
                };
                tracing::info!(dir = %dir.display(), "Using point storage directory");
                let collection = DocumentCollection::open(&dir, POINTS_COLLECTION).await?;
                let store = Arc::new(DocumentPointStore::new(Arc::new(collection)));
                parts.container.register(Arc::clone(&store));
                if apps.points.report_status {
                    parts
                        .container
                        .register(Arc::new(StatusReporter::new(Arc::clone(&store))));
                }
                parts.hooks(
                    "point-store",
                    |container| {
                        let store = container.resolve_required::<DocumentPointStore>();
                        let reporter = container.resolve::<StatusReporter>();
                        async move {
                            let store =
                                store.map_err(|e| LifecycleError::with_source("point store", e))?;
                            store
                                .start()
                                .await
                                .map_err(|e| LifecycleError::with_source("point store start failed", e))?;
                            if let Some(reporter) = reporter {
                                reporter.start();
                            }
                            Ok(())
                        }
                    },
                    |container| {
                        let reporter = container.resolve::<StatusReporter>();
                        async move {
                            if let Some(reporter) = reporter {
                                reporter.stop().await;
                            }
                            Ok(())
                        }
                    },
                );
                store
            }
        };
        parts.mount(&apps.points.mount, PointsService::new(store).routes());
    }

    if apps.employees.enabled {
        let registry = Arc::new(EmployeeRegistry::new());
        let legacy_client = match apps.employees.dispatch {
            Dispatch::Local => RegistryClient::Local(Arc::clone(&registry)),
            Dispatch::Remote => RegistryClient::Remote(RemoteRegistry::new(
                http.clone(),
                resolve_url(&directory, "employees")?,
            )),
        };
        parts.container.register(Arc::clone(&registry));
        parts.mount(
            &apps.employees.mount,
            EmployeesService::new(registry, legacy_client).routes(),
        );
    }

    if apps.echo.enabled {
        let service = Arc::new(EchoService);
        let client = match apps.echo.dispatch {
            Dispatch::Local => EchoClient::Local(Arc::clone(&service)),
            Dispatch::Remote => {
                EchoClient::Remote(RemoteEcho::new(http.clone(), resolve_url(&directory, "echo")?))
            }
        };
        let mut routes = EchoRoutes::new(service, client);
        if apps.oauth2.enabled {
            routes = routes.guarded(AccessPolicy::user_role(ROLE_USER));
        }
        parts.mount(&apps.echo.mount, routes.routes());
    }

    if apps.graph.enabled {
        let graph = Arc::new(PersonGraph::new());
        parts.container.register(Arc::clone(&graph));
        parts.mount(&apps.graph.mount, GraphService::new(graph).routes());
    }

    if apps.greeting.enabled {
        parts.mount(
            &apps.greeting.mount,
            GreetingService::from_config(&apps.greeting).routes(),
        );
    }

    tracing::info!(
        routes = parts.router.route_count(),
        handlers = parts.handlers.len(),
        guarded = authenticator.is_some(),
        "Services assembled"
    );

    let mut builder = Server::builder()
        .config(server_config(config))
        .router(parts.router)
        .handlers(parts.handlers)
        .container(parts.container)
        .lifecycle(parts.lifecycle)
        .readiness(parts.readiness)
        .service_name(config.telemetry.service_name.clone());
    if let Some(version) = &config.telemetry.service_version {
        builder = builder.service_version(version.clone());
    }
    if let Some(authenticator) = authenticator {
        builder = builder.authenticator(authenticator);
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = TesseraConfig::default();
        config.apps.graph.mount = "/".to_string();
        config.apps.wordcount.mount = "/".to_string();
        assert!(matches!(
            build_server(&config).await,
            Err(AssemblyError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_document_backend_uses_scratch_dir() {
        let mut config = TesseraConfig::default();
        config.apps.points.backend = PointBackend::Document;
        assert!(build_server(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_default_config_builds() {
        assert!(build_server(&TesseraConfig::default()).await.is_ok());
    }
}
