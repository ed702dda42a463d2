//! Actor-based hub and device runtime
//!
//! Each actor runs as an independent async task and is reached through a cloneable
//! handle that wraps its command channel.
//!
//! ## Architecture Overview
//!
//! ```text
//!   device ──HTTP──►┌──────────────┐  commands  ┌──────────────┐
//!   device ──HTTP──►│  axum routes │───────────►│  StoreActor  │ owns devices, sensors,
//!                   └──────────────┘  (mpsc)    └──────┬───────┘ alert history
//!                                                      │ publishes
//!                                            ┌─────────▼─────────┐
//!                                            │ Broadcast Channel │ (HubEvent)
//!                                            └─────────┬─────────┘
//!                                 ┌────────────────────┼────────────────────┐
//!                          ┌──────▼──────┐      ┌──────▼──────┐      ┌──────▼──────┐
//!                          │ WebSocket 1 │      │ WebSocket 2 │      │ WebSocket N │
//!                          └─────────────┘      └─────────────┘      └─────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **StoreActor**: single writer for all hub state, source of every fanout event
//! - **DeviceActor**: polls sensors, calibrates and debounces
//! - **ReporterActor**: resolves the hub and delivers a device's reports one at a time
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Events**: The store publishes to a broadcast channel for fan-out
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod device;
pub mod messages;
pub mod reporter;
pub mod store;
