//! `armbridge-motion` – drives the arm through the stored joint-angle rows.
//!
//! # Modules
//!
//! - [`link`] – the [`ControllerLink`][link::ControllerLink] trait: one
//!   connect → send → (receive) → close cycle per command, with
//!   [`TcpControllerLink`][link::TcpControllerLink] for the real controller
//!   and [`DryRunLink`][link::DryRunLink] for rehearsals.
//! - [`dispatcher`] – [`MotionDispatcher`][dispatcher::MotionDispatcher]: the
//!   `Idle → Sending(i) → Done | Aborted` state machine that paces commands,
//!   applies the failure policy and honours cancellation.

pub mod dispatcher;
pub mod link;

pub use dispatcher::{DispatchReport, DispatchState, DispatcherConfig, MotionDispatcher};
pub use link::{ControllerLink, DryRunLink, TcpControllerLink, TransportError};
