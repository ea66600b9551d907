//! Unified error types for the Pet Smart Home firmware.
//!
//! One enum per failure family, all funnelling into [`Error`] so the
//! [`ErrorReporter`](crate::reporter::ErrorReporter) can handle every
//! reportable condition through a single path.
//!
//! | Family        | Fatal-looking?                  | Handling                          |
//! |---------------|---------------------------------|-----------------------------------|
//! | Connectivity  | connect failures yes, publish no| ERROR state / skipped publish     |
//! | Protocol      | no                              | discarded with a log line         |
//! | Update        | yes                             | ERROR state, update flag cleared  |
//! | Storage       | no                              | logged, memory stays authoritative|
//! | Config        | no                              | patch rejected, logged            |

use core::fmt;

pub use crate::app::ports::StorageError;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Connectivity(ConnectivityError),
    Protocol(ProtocolError),
    Update(UpdateError),
    Storage(StorageError),
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connectivity(e) => write!(f, "connectivity: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Update(e) => write!(f, "update: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Connectivity errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    /// No SSID configured.
    NoCredentials,
    /// The network driver refused to start association.
    AssociationRejected,
    /// Association did not complete inside the timeout window.
    AssociationTimeout,
    /// The broker refused or did not answer the session request.
    SessionRefused,
    /// Subscribing to a device topic failed.
    SubscribeFailed,
    /// A publish was attempted without an active session.
    NotConnected,
    PublishFailed,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::AssociationRejected => write!(f, "WiFi driver rejected association"),
            Self::AssociationTimeout => write!(f, "WiFi association timed out"),
            Self::SessionRefused => write!(f, "MQTT session refused"),
            Self::SubscribeFailed => write!(f, "MQTT subscribe failed"),
            Self::NotConnected => write!(f, "no active MQTT session"),
            Self::PublishFailed => write!(f, "MQTT publish failed"),
        }
    }
}

impl From<ConnectivityError> for Error {
    fn from(e: ConnectivityError) -> Self {
        Self::Connectivity(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is not valid JSON or does not match the expected shape.
    Malformed,
    /// Command document lacks a `command` string.
    MissingCommand,
    /// Form body is not valid UTF-8 / percent encoding.
    BadForm,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed payload"),
            Self::MissingCommand => write!(f, "missing \"command\" field"),
            Self::BadForm => write!(f, "malformed form body"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Update errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    AlreadyInProgress,
    InvalidSize,
    BeginFailed,
    WriteFailed,
    NotReceiving,
    Overflow,
    IncompleteTransfer,
    VerifyFailed,
    BootSetFailed,
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInProgress => write!(f, "firmware update already in progress"),
            Self::InvalidSize => write!(f, "firmware size out of range"),
            Self::BeginFailed => write!(f, "update begin failed"),
            Self::WriteFailed => write!(f, "update write failed"),
            Self::NotReceiving => write!(f, "no update session open"),
            Self::Overflow => write!(f, "image larger than declared size"),
            Self::IncompleteTransfer => write!(f, "image shorter than declared size"),
            Self::VerifyFailed => write!(f, "image verification failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
        }
    }
}

impl From<UpdateError> for Error {
    fn from(e: UpdateError) -> Self {
        Self::Update(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors (type lives with the StoragePort)
// ---------------------------------------------------------------------------

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed range validation; the message names field and range.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}
