//! Credit underwriting engine.
//!
//! A request flows through [`workflows::underwriting`]: it is validated and routed to one engine,
//! which extracts bureau features ([`workflows::bureau`]), enriches the applicant record
//! ([`workflows::features`]), scores it ([`workflows::scoring`]), segments the probabilities
//! ([`workflows::segmentation`]) and turns the result into a decision.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
