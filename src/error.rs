//! definition of the general ethercat error type

use std::sync::Arc;
use thiserror::Error;

/**
    general object reporting an unexpected result regarding the bus configuration or the cyclic exchanges

    Its variants are meant to help finding the cause responsible for the problem and how to deal with it.

    - configuration errors ([Self::Duplicate], [Self::Config], [Self::Slave], [Self::SlaveNotFound], [Self::NotFound], [Self::Capacity]) happen before the realtime loop starts and must abort the bus bring-up
    - [Self::InvalidArgument] is returned by setters rejecting a value, the previous value is kept
    - [Self::Timeout] and [Self::Master] can happen at runtime and are not fatal for the cyclic loop
    - [Self::Thread] is returned when joining a loop thread that panicked
*/
#[derive(Clone, Debug, Error)]
pub enum EthercatError {
    /// error caused by communication support
    ///
    /// these errors are exterior to this library
    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),

    /// error reported by the master transport
    #[error("master: {0}")]
    Master(&'static str),

    /// structural misuse of a configuration object, not attached to a particular slave
    #[error("configuration: {0}")]
    Config(&'static str),

    /// misconfiguration of the given slave
    #[error("slave {slave:?}: {message}")]
    Slave {slave: String, message: &'static str},

    /// the bus does not report a device matching the slave identity
    #[error("slave {name:?} not found on the bus (alias {alias}, position {position})")]
    SlaveNotFound {name: String, alias: u16, position: u16},

    /// a name or position is already registered in its container
    #[error("{0} is already registered")]
    Duplicate(String),

    /// lookup of an unknown name, this is a programming error in the bus description
    #[error("no {entry:?} in {list} of slave {slave:?}")]
    NotFound {slave: String, list: &'static str, entry: String},

    /// a setter received a value it cannot accept
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// a fixed-capacity storage is full
    #[error("capacity exceeded: {0}")]
    Capacity(&'static str),

    /// error is due to too much time elapsed, but does not compromise the communication
    ///
    /// these errors are generally contextual and the operation can be retried.
    #[error("timeout: {0}")]
    Timeout(&'static str),

    /// the realtime loop thread ended abnormally, the loop state is lost
    #[error("realtime thread: {0}")]
    Thread(&'static str),
}

/// convenient alias to simplify return annotations
pub type EthercatResult<T=()> = core::result::Result<T, EthercatError>;

impl From<std::io::Error> for EthercatError {
    fn from(src: std::io::Error) -> Self {
        EthercatError::Io(Arc::new(src))
    }
}

impl EthercatError {
    /// true for the errors that must stop the bus bring-up
    pub fn is_configuration(&self) -> bool {
        matches!(self,
            Self::Config(_)
            | Self::Slave {..}
            | Self::SlaveNotFound {..}
            | Self::Duplicate(_)
            | Self::NotFound {..}
            | Self::Capacity(_)
            )
    }
}
