//! Error taxonomy for topology assembly and simulation control.
//!
//! Every fallible operation in the crate returns [`SimResult`]. Errors fall
//! into four classes (see [`ErrorClass`]): configuration errors are fixed by
//! correcting the parameters and retrying the same call, topology errors need
//! graph edits, lifecycle errors guard state transitions of a session, and
//! engine errors are reported verbatim from the external simulation engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::address::RangeViolation;
use crate::component::PortDirection;
use crate::controller::LifecycleState;

/// Coarse classification of a [`SimError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Raised while building descriptors; locally recoverable.
    Configuration,
    /// Raised by `connect()` or `validate()`; needs graph edits.
    Topology,
    /// Guards a lifecycle transition of the current session.
    Lifecycle,
    /// Opaque failure delegated from the simulation engine.
    Engine,
}

/// Errors raised while assembling or driving a simulation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("invalid parameter `{option}` on `{component}`: {constraint}")]
    InvalidParameter {
        component: String,
        option: String,
        constraint: String,
    },

    #[error("component name `{0}` is already registered")]
    DuplicateName(String),

    #[error("cannot link `{from}` to `{to}`: both ports are {direction}")]
    DirectionMismatch {
        from: String,
        to: String,
        direction: PortDirection,
    },

    #[error("port `{0}` is already linked")]
    AlreadyLinked(String),

    #[error("unknown component `{0}`")]
    UnknownComponent(String),

    #[error("component `{component}` has no port named `{port}`")]
    UnknownPort { component: String, port: String },

    #[error("cannot link component `{0}` to itself")]
    SelfLink(String),

    #[error("component `{0}` is not a CPU")]
    NotACpu(String),

    #[error("topology is disconnected: {0}")]
    DisconnectedGraph(String),

    #[error("port `{0}` is not linked")]
    DanglingPort(String),

    #[error("memory controller ranges do not partition the physical address space: {0}")]
    AddressRangeOverlap(RangeViolation),

    #[error("request path forms a cycle through `{0}`")]
    TransportCycle(String),

    #[error("topology has no CPU to drive it")]
    MissingRoot,

    #[error("CPU `{0}` has no workload bound")]
    UnboundCpu(String),

    #[error("CPU `{0}` already has a workload bound")]
    AlreadyBound(String),

    #[error("executable `{path}` cannot be loaded: {reason}")]
    MissingExecutable { path: PathBuf, reason: String },

    #[error("topology validation failed: {0}")]
    ValidationFailed(#[source] Box<SimError>),

    #[error("session has halted; no further runs are permitted")]
    SessionHalted,

    #[error("cannot {operation} while the session is {state}")]
    InvalidTransition {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("session was abandoned after a failed instantiation: {0}")]
    SessionPoisoned(String),

    #[error("{0}")]
    Engine(String),
}

impl SimError {
    /// Returns the class this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            SimError::InvalidParameter { .. } | SimError::DuplicateName(_) => {
                ErrorClass::Configuration
            }
            SimError::DirectionMismatch { .. }
            | SimError::AlreadyLinked(_)
            | SimError::UnknownComponent(_)
            | SimError::UnknownPort { .. }
            | SimError::SelfLink(_)
            | SimError::NotACpu(_)
            | SimError::DisconnectedGraph(_)
            | SimError::DanglingPort(_)
            | SimError::AddressRangeOverlap(_)
            | SimError::TransportCycle(_)
            | SimError::MissingRoot => ErrorClass::Topology,
            SimError::UnboundCpu(_)
            | SimError::AlreadyBound(_)
            | SimError::MissingExecutable { .. }
            | SimError::ValidationFailed(_)
            | SimError::SessionHalted
            | SimError::InvalidTransition { .. }
            | SimError::SessionPoisoned(_) => ErrorClass::Lifecycle,
            SimError::Engine(_) => ErrorClass::Engine,
        }
    }

    /// Shorthand for an [`SimError::InvalidParameter`].
    pub fn invalid_param(
        component: impl Into<String>,
        option: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        SimError::InvalidParameter {
            component: component.into(),
            option: option.into(),
            constraint: constraint.into(),
        }
    }
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;
