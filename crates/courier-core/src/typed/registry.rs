//! HandlerRegistry - queue name -> validated handler.
//!
//! Built once during startup (mutable), then frozen behind an `Arc` and shared
//! read-only with the dispatcher. No locks are needed at lookup time.
//!
//! # 学習ポイント
//! - HashMap で型消去された trait object を管理
//! - Generic method (`register_schema::<S>`) での登録
//! - Arc による共有所有権（ビルド後は読み取り専用）

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{SchemaHandler, ValidatedHandler};
use super::schema::EventSchema;
use crate::domain::QueueName;

/// HandlerRegistry maps each queue to exactly one handler.
///
/// # Example
/// ```ignore
/// let mut registry = HandlerRegistry::new();
/// registry.register_schema::<UserCreated>()?;
/// registry.register("audit", handler_fn(|p| Ok(Message::new(p.clone().into()))))?;
///
/// let handler = registry.get(&QueueName::new("user_events"));
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<QueueName, Arc<dyn ValidatedHandler>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for queue '{0}' is already registered")]
    AlreadyRegistered(QueueName),

    #[error("queue name must not be empty")]
    EmptyQueueName,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<H: ValidatedHandler + 'static>(
        &mut self,
        queue: impl Into<QueueName>,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register_arc(queue, Arc::new(handler))
    }

    pub fn register_arc(
        &mut self,
        queue: impl Into<QueueName>,
        handler: Arc<dyn ValidatedHandler>,
    ) -> Result<(), RegistryError> {
        let queue = queue.into();
        if queue.is_empty() {
            return Err(RegistryError::EmptyQueueName);
        }
        if self.handlers.contains_key(&queue) {
            return Err(RegistryError::AlreadyRegistered(queue));
        }
        self.handlers.insert(queue, handler);
        Ok(())
    }

    /// Register a `SchemaHandler<S>` on `S::QUEUE`.
    pub fn register_schema<S: EventSchema>(&mut self) -> Result<(), RegistryError> {
        self.register(S::QUEUE, SchemaHandler::<S>::new())
    }

    pub fn get(&self, queue: &QueueName) -> Option<Arc<dyn ValidatedHandler>> {
        self.handlers.get(queue).cloned()
    }

    pub fn contains(&self, queue: &str) -> bool {
        self.handlers.contains_key(queue)
    }

    /// Registered queue names, sorted.
    pub fn queues(&self) -> Vec<QueueName> {
        let mut queues: Vec<QueueName> = self.handlers.keys().cloned().collect();
        queues.sort();
        queues
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, Payload, Rejection};
    use crate::typed::handler::handler_fn;
    use crate::typed::schema::test_schemas::{OrderPlaced, UserCreated};

    fn passthrough(p: &Payload) -> Result<Message, Rejection> {
        Ok(Message::new(serde_json::Value::Object(p.clone())))
    }

    #[test]
    fn register_and_get() {
        let mut registry = HandlerRegistry::new();
        registry.register_schema::<UserCreated>().unwrap();

        assert!(registry.get(&QueueName::new(UserCreated::QUEUE)).is_some());
        assert!(registry.get(&QueueName::new("unknown")).is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register_schema::<UserCreated>().unwrap();

        let result = registry.register(UserCreated::QUEUE, handler_fn(passthrough));
        assert!(matches!(
            result,
            Err(RegistryError::AlreadyRegistered(q)) if q.as_str() == "user_events"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_queue_name_is_rejected() {
        let mut registry = HandlerRegistry::new();
        let result = registry.register(" ", handler_fn(passthrough));
        assert!(matches!(result, Err(RegistryError::EmptyQueueName)));
        assert!(registry.is_empty());
    }

    #[test]
    fn queues_are_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register_schema::<UserCreated>().unwrap();
        registry.register_schema::<OrderPlaced>().unwrap();
        registry.register("audit", handler_fn(passthrough)).unwrap();

        let queues: Vec<String> = registry
            .queues()
            .into_iter()
            .map(|q| q.as_str().to_string())
            .collect();
        assert_eq!(queues, vec!["audit", "order_events", "user_events"]);
        assert!(registry.contains("audit"));
    }
}
