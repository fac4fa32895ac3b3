//! Observability for canvasflow: subscriber initialisation and the attribute
//! names used on workflow spans.

pub mod attrs;
pub mod tracing_setup;
