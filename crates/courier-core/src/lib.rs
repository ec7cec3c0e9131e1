//! courier-core
//!
//! Transactional-outbox dispatcher: moves records written next to business
//! data into a message broker with at-least-once delivery.
//!
//! # Modules
//! - **domain**: records, messages, outcomes, retry budget, errors
//! - **ports**: OutboxRepository / RepositorySession, Publisher, Clock, IdGenerator
//! - **typed**: validated handlers, event schemas, HandlerRegistry
//! - **app**: DispatcherBuilder, OutboxDispatcher, DispatcherHandle
//! - **impls**: in-memory store and publishers for tests and demos

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;
