/*!
    bit-level views of the slave registers this crate configures. This should be used instead of any hardcoded register value.
*/

use bilge::prelude::*;

/**
    content of the DC activation registers (0x0980 - 0x0981), given to the master as `assign_activate` when configuring distributed clocks

    Typical values are `0x0300` (cyclic operation + sync0) and `0x0700` (cyclic operation + sync0 + sync1).

    ETG.1000.4 table 61
*/
#[bitsize(16)]
#[derive(FromBits, DebugBits, Copy, Clone, PartialEq)]
pub struct AssignActivate {
    /// sync out unit controled by PDI instead of ethercat
    pub sync_out_pdi: bool,
    reserved: u3,
    /// latch in unit 0 controled by PDI instead of ethercat
    pub latch0_pdi: bool,
    /// latch in unit 1 controled by PDI instead of ethercat
    pub latch1_pdi: bool,
    reserved: u2,

    /// enable cyclic operation of the sync unit
    pub cyclic_operation: bool,
    /// generate sync0 pulses
    pub sync0: bool,
    /// generate sync1 pulses
    pub sync1: bool,
    /// auto-activation by writing the start time
    pub auto_activation: bool,
    /// extend the start time from 32 to 64 bits
    pub start_time_extension: bool,
    /// check that the start time is in the future
    pub start_time_check: bool,
    /// near future configuration (1/2 DC width instead of ~2.1s)
    pub near_future: bool,
    /// generate sync signals immediately for debugging
    pub sync_debug: bool,
}

impl AssignActivate {
    /// whether this value activates anything at all
    pub fn is_active(&self) -> bool  {u16::from(*self) != 0}
}

/// ETG.1000.4 table 58
#[bitsize(2)]
#[derive(TryFromBits, Debug, Copy, Clone, Eq, PartialEq)]
pub enum SyncDirection {
    /// sync manager buffer is read by the master (TxPDO)
    Read = 0,
    /// sync manager buffer is written by the master (RxPDO)
    Write = 1,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_activate_layout() {
        let value = AssignActivate::from(0x0300u16);
        assert!(value.cyclic_operation());
        assert!(value.sync0());
        assert!(! value.sync1());
        assert!(value.is_active());

        let value = AssignActivate::from(0x0700u16);
        assert!(value.cyclic_operation());
        assert!(value.sync0());
        assert!(value.sync1());
        assert!(! value.sync_out_pdi());
        assert!(! AssignActivate::from(0u16).is_active());
    }
}
