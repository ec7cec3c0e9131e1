//! Validated handlers - raw payload in, broker-ready message or rejection out.
//!
//! - `ValidatedHandler`: object-safe trait stored in the registry
//! - `SchemaHandler<S>`: type erasure over an `EventSchema` (decode, validate, re-encode)
//! - `FnHandler`: closure adapter for ad-hoc handlers
//!
//! # 学習ポイント
//! - Object-safe な async trait (`ValidatedHandler`)
//! - Type erasure パターン (`SchemaHandler<S>` → `dyn ValidatedHandler`)
//! - クロージャを trait 実装に包むアダプタ (`FnHandler`)

use std::marker::PhantomData;

use async_trait::async_trait;

use super::schema::EventSchema;
use crate::domain::{Message, Payload, Rejection};

/// ValidatedHandler turns a raw payload into a message.
///
/// A `Rejection` is permanent: the dispatcher marks the record failed and
/// never retries it. Handlers may be invoked more than once for the same
/// record (redelivery after a lost commit), so they must not have side
/// effects of their own.
#[async_trait]
pub trait ValidatedHandler: Send + Sync {
    async fn transform(&self, payload: &Payload) -> Result<Message, Rejection>;
}

/// Validates payloads against the schema `S`.
pub struct SchemaHandler<S: EventSchema> {
    _marker: PhantomData<fn() -> S>,
}

impl<S: EventSchema> SchemaHandler<S> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<S: EventSchema> Default for SchemaHandler<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: EventSchema> ValidatedHandler for SchemaHandler<S> {
    async fn transform(&self, payload: &Payload) -> Result<Message, Rejection> {
        let event: S = serde_json::from_value(serde_json::Value::Object(payload.clone()))
            .map_err(|e| Rejection::new(format!("schema for {}: {e}", S::QUEUE)))?;

        event.validate().map_err(Rejection::new)?;

        let body = serde_json::to_value(&event)
            .map_err(|e| Rejection::new(format!("re-encode for {}: {e}", S::QUEUE)))?;
        Ok(Message::new(body))
    }
}

/// Adapts a plain function or closure.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Payload) -> Result<Message, Rejection> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ValidatedHandler for FnHandler<F>
where
    F: Fn(&Payload) -> Result<Message, Rejection> + Send + Sync,
{
    async fn transform(&self, payload: &Payload) -> Result<Message, Rejection> {
        (self.f)(payload)
    }
}

/// Shorthand for `FnHandler::new`.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Payload) -> Result<Message, Rejection> + Send + Sync,
{
    FnHandler::new(f)
}
