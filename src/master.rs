/*!
    Boundary with the ethercat master transport.

    The frames exchange, bus scanning and mailbox encoding are not done by this crate, they are delegated to an implementor of [Master] (a kernel master, a pure-rust master, or [crate::emulated::EmulatedMaster] when no bus is available).

    The trait is split in two groups of methods:

    - configuration methods, called once before the realtime loop, that may block and allocate
    - cyclic methods, called from the realtime thread, that must return without waiting for the bus
*/

use crate::{
    registers::SyncDirection,
    sync::PdoAssignment,
    error::EthercatResult,
    };
use core::{fmt, time::Duration};


/// identity a slave description must match on the bus
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SlaveIdentity {
    pub alias: u16,
    pub position: u16,
    pub vendor_id: u32,
    pub product_code: u32,
}

/// opaque handle to a slave configuration held by the master
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct SlaveConfig(u32);
impl SlaveConfig {
    pub fn new(index: u32) -> Self  {Self(index)}
    pub fn index(&self) -> u32  {self.0}
}
impl fmt::Debug for SlaveConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SlaveConfig({})", self.0)
    }
}

/// opaque handle to a mailbox SDO request held by the master
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct SdoRequest(u32);
impl SdoRequest {
    pub fn new(index: u32) -> Self  {Self(index)}
    pub fn index(&self) -> u32  {self.0}
}
impl fmt::Debug for SdoRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SdoRequest({})", self.0)
    }
}

/// progress of an SDO request
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestState {
    /// never issued
    Unused,
    /// transfer in progress
    Busy,
    /// last transfer succeeded
    Success,
    /// last transfer failed, aborted by the slave or timed out
    Error,
}

/**
    distributed clock settings of one slave

    Cycle and shift times are in nanoseconds. Sync1 is disabled with a null cycle time.
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SlaveClockConfig {
    /// content of the DC activation registers, see [crate::registers::AssignActivate]
    pub assign_activate: u16,
    pub sync0_cycle: u32,
    pub sync0_shift: i32,
    pub sync1_cycle: u32,
    pub sync1_shift: i32,
}
impl SlaveClockConfig {
    /// sync0 only setting
    pub fn sync0(assign_activate: u16, cycle: u32, shift: i32) -> Self {
        Self {assign_activate, sync0_cycle: cycle, sync0_shift: shift, sync1_cycle: 0, sync1_shift: 0}
    }
}

/// operations this crate requires from the master transport
pub trait Master {
    // configuration

    /**
        obtain the configuration handle for the device at the given address.

        Must fail with [crate::EthercatError::SlaveNotFound] if vendor id and product code do not match what the bus reports at this address
    */
    fn configure_slave(&mut self, identity: SlaveIdentity) -> EthercatResult<SlaveConfig>;
    /// assign the given PDOs to a sync manager channel, replacing previous assignments. Entries must be mapped in the given order
    fn config_pdos(&mut self, config: SlaveConfig, sync_manager: u8, direction: SyncDirection, pdos: &[PdoAssignment]) -> EthercatResult;
    /// set the distributed clock parameters of a slave
    fn config_dc(&mut self, slave: SlaveConfig, clock: SlaveClockConfig) -> EthercatResult;
    /// use the clock of the given slave as bus reference clock
    fn select_reference_clock(&mut self, slave: SlaveConfig) -> EthercatResult;
    /// create a mailbox request for one object, `size` is the byte size of its value
    fn create_sdo_request(&mut self, slave: SlaveConfig, index: u16, subindex: u8, size: usize, timeout: Duration) -> EthercatResult<SdoRequest>;

    // cyclic

    /// fetch the frames received since last cycle
    fn receive(&mut self) -> EthercatResult;
    /// queue and send the frames of this cycle
    fn send(&mut self) -> EthercatResult;
    /// set the master application time, in nanoseconds
    fn application_time(&mut self, time: u64);
    /// lower 32 bits of the reference clock time received in the last frame
    fn reference_clock_time(&mut self) -> EthercatResult<u32>;
    /// propagate the reference clock time to all slaves clocks
    fn sync_slave_clocks(&mut self);

    fn sdo_request_state(&mut self, request: SdoRequest) -> RequestState;
    /// start writing the given bytes into the object
    fn sdo_request_write(&mut self, request: SdoRequest, data: &[u8]);
    /// start reading the object
    fn sdo_request_read(&mut self, request: SdoRequest);
    /// copy the last data read into `data` and return the byte count
    fn sdo_request_data(&self, request: SdoRequest, data: &mut [u8]) -> usize;
}
