//! DispatcherBuilder - wiring and startup validation.
//!
//! Everything that can be wrong with the setup (invalid settings, a queue
//! nobody registered a handler for, a missing port) is reported by `build()`
//! before the first cycle runs.
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）

use std::sync::Arc;

use crate::app::config::DispatcherConfig;
use crate::app::dispatcher::OutboxDispatcher;
use crate::domain::ConfigError;
use crate::ports::{OutboxRepository, Publisher};
use crate::typed::{EventSchema, HandlerRegistry, RegistryError, ValidatedHandler};

/// Builds an `OutboxDispatcher`.
///
/// # Example
/// ```ignore
/// let dispatcher = DispatcherBuilder::new()
///     .config(DispatcherConfig::default().with_batch_size(50))
///     .register_schema::<UserCreated>()?
///     .expect_queues(&["user_events"])
///     .repository(store)
///     .publisher(broker)
///     .build()?;
/// ```
///
/// # Fail-fast
/// - `expect_queues()` lists queues that must have a handler
/// - `build()` checks expected ⊆ registered and validates the config
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    registry: HandlerRegistry,
    expected_queues: Option<Vec<String>>,
    repository: Option<Arc<dyn OutboxRepository>>,
    publisher: Option<Arc<dyn Publisher>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Missing handlers for queues: {0:?}. These queues were expected but not registered.")]
    MissingHandlers(Vec<String>),

    #[error("no outbox repository configured")]
    MissingRepository,

    #[error("no publisher configured")]
    MissingPublisher,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: DispatcherConfig::default(),
            registry: HandlerRegistry::new(),
            expected_queues: None,
            repository: None,
            publisher: None,
        }
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Service name stamped on outgoing messages.
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.config.source = Some(source.into());
        self
    }

    pub fn register<H: ValidatedHandler + 'static>(
        mut self,
        queue: &str,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register(queue, handler)?;
        Ok(self)
    }

    pub fn register_schema<S: EventSchema>(mut self) -> Result<Self, RegistryError> {
        self.registry.register_schema::<S>()?;
        Ok(self)
    }

    /// Use a registry assembled elsewhere, replacing anything registered so far.
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn expect_queues(mut self, queues: &[&str]) -> Self {
        self.expected_queues = Some(queues.iter().map(|q| q.to_string()).collect());
        self
    }

    pub fn repository(mut self, repository: Arc<dyn OutboxRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> Result<OutboxDispatcher, BuildError> {
        self.config.validate()?;

        if let Some(expected) = &self.expected_queues {
            let missing: Vec<String> = expected
                .iter()
                .filter(|q| !self.registry.contains(q))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingHandlers(missing));
            }
        }

        let repository = self.repository.ok_or(BuildError::MissingRepository)?;
        let publisher = self.publisher.ok_or(BuildError::MissingPublisher)?;

        Ok(OutboxDispatcher {
            repository,
            publisher,
            registry: Arc::new(self.registry),
            batch_size: self.config.batch_size,
            poll_interval: self.config.poll_interval(),
            max_in_flight: self.config.max_in_flight,
            publish_timeout: self.config.publish_timeout(),
            retry: self.config.retry_budget(),
            source: self.config.source,
        })
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
