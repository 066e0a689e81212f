//! `coffret-broker` - the trust boundary around the Coffret vault.
//!
//! Holds everything that talks to the outside world: offline licence
//! verification and online activation, the interactive approval gate, the
//! loopback access server with its handshake file, session lifecycle
//! (idle auto-lock, shutdown), and broker configuration.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;

pub mod license;

pub mod approval;
pub mod protocol;

pub mod handshake;
pub mod server;

pub mod session;

pub mod config;

pub use approval::{
    AccessAction, ApprovalBroker, ApprovalDecision, ApprovalGate, TerminalApproval,
};
pub use config::BrokerConfig;
pub use error::BrokerError;
pub use handshake::{Handshake, HANDSHAKE_FILE};
pub use license::{
    Activation, ActivationError, LicenseFailure, LicenseStatus, LicenseVerifier, LICENSE_FILE,
    PRODUCT_TAG,
};
pub use protocol::{AccessRequest, AccessResponse};
pub use server::{AccessServer, MAX_BODY_BYTES};
pub use session::{shutdown, ActivityTracker, IdleLock, DEFAULT_IDLE_LOCK};
