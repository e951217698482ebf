//! `mocap-runtime` – Capture session engine
//!
//! Turns the latest channel samples into keyframed poses on the host scene
//! at a fixed rate, and owns the lifecycle of a capture session.
//!
//! # Modules
//!
//! - [`session`] – [`SessionController`][session::SessionController]: the
//!   `Idle ⇄ Capturing` state machine that binds the listener, registers the
//!   sample tick and tears both down again.
//! - [`scheduler`] – [`SampleScheduler`][scheduler::SampleScheduler] and
//!   [`FrameClock`][scheduler::FrameClock]: the host-driven tick that maps
//!   wall-clock time onto scene frames.
//! - [`applier`] – [`MappingApplier`][applier::MappingApplier]: writes
//!   samples onto joints and objects and inserts keyframes.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.

pub mod applier;
pub mod scheduler;
pub mod session;
pub mod telemetry;

pub use applier::{ApplyStats, MappingApplier};
pub use scheduler::{DEFAULT_SAMPLE_INTERVAL, FrameClock, SampleScheduler};
pub use session::{SessionConfig, SessionController, SessionInfo, SessionState};
pub use telemetry::{TracerProviderGuard, init_tracing};
