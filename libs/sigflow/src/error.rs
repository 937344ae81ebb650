//! Error types for sigflow
//!
//! Defines the core error types used throughout sigflow. Topology failures
//! (type mismatches, double connects, foreign blocks) are *not* errors in
//! this sense: they are reported through [`ConnectionResult`] variants so
//! that graph-editing code can branch on them without unwinding.
//!
//! [`ConnectionResult`]: crate::port::ConnectionResult

use thiserror::Error;

use crate::lifecycle::TransitionError;
use crate::port::PortAccessError;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("flow graph error: {0}")]
    Graph(String),

    #[error("port error: {0}")]
    Port(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    PortAccess(#[from] PortAccessError),
}

/// Result type that uses FlowError
pub type Result<T> = std::result::Result<T, FlowError>;
