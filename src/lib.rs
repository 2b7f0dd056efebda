/*!
    Realtime core of an ethercat master: synchronization of the master clock with the bus distributed clock, and configuration model of the slaves driven by the cyclic loop.

    The bus itself (frames, mailbox protocol, state machine) is driven by an implementor of [master::Master]. This crate decides what to configure and what to exchange each cycle:

    - [slave::EthercatSlave] describes a device: identity, PDO mapping ([sync::SyncInfo], [pdo::PdoEntriesList]), parameters and telemetry ([sdo::SdoList])
    - [slaves::SlavesContainer] owns all the slave descriptions of a bus
    - [timer::Timer] paces the loop, optionally following the distributed clock
    - [mailbox::MailboxManager] schedules the SDO transfers
    - [cycle::Cycle] runs all of it in a realtime loop

    Every object exchanged with the slaves is a [coe::CoeObject] whose value can be read from any thread while the loop runs.
*/

pub mod error;
pub mod registers;
pub mod coe;
pub mod pdo;
pub mod sync;
pub mod sdo;
pub mod master;
pub mod slave;
pub mod slaves;
pub mod clock;
pub mod timer;
pub mod mailbox;
pub mod cycle;
pub mod emulated;

pub use crate::error::{EthercatError, EthercatResult};
pub use crate::coe::CoeObject;
pub use crate::master::Master;
pub use crate::slave::EthercatSlave;
pub use crate::slaves::SlavesContainer;
pub use crate::timer::{Timer, TimerConfig, EthercatTimer};
pub use crate::cycle::{Cycle, CycleConfig, CycleHandle};
