//! Infrastructure layer: event store, command dispatch, orchestration
//! services and read-model projections.

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod services;

#[cfg(test)]
mod integration_tests;
