/*!
    Assignment of PDO mappings to the sync managers of a slave.

    # Example of PDO assignment

    ```
    # use etherdc::{pdo::PdoEntriesList, sync::SyncInfo, slave::EthercatSlave};
    # fn main() -> etherdc::EthercatResult {
    # let mut slave = EthercatSlave::new();
    let mut rxpdo = PdoEntriesList::new();
    rxpdo.add_entry("control", 0x7001, 0x00, 16)?;
    let mut txpdo = PdoEntriesList::new();
    txpdo.add_entry("status", 0x6001, 0x01, 32)?;

    let mut sync = SyncInfo::new();
    sync.add_rx_pdo(0x1600, rxpdo)?;
    sync.add_tx_pdo(0x1a00, txpdo)?;
    sync.create()?;
    slave.register_sync(sync)?;
    # Ok(())
    # }
    ```
*/

use crate::{
    coe::CoeObject,
    pdo::PdoEntriesList,
    registers::SyncDirection,
    error::{EthercatError, EthercatResult},
    };
use core::ops::Range;

/// max number of PDOs that can be assigned to one sync manager
pub const MAX_PDOS: usize = 32;
/// sync manager channel receiving the master outputs (RxPDO)
pub const RX_SYNC_MANAGER: u8 = 2;
/// sync manager channel sending the slave inputs (TxPDO)
pub const TX_SYNC_MANAGER: u8 = 3;
/// indices of the objects configuring RxPDOs
pub const RX_PDO_INDICES: Range<u16> = 0x1600 .. 0x1800;
/// indices of the objects configuring TxPDOs
pub const TX_PDO_INDICES: Range<u16> = 0x1a00 .. 0x1c00;

/// one PDO and its mapped entries
#[derive(Debug)]
pub struct PdoAssignment {
    /// index of the SDO that configures the PDO
    pub index: u16,
    pub entries: PdoEntriesList,
}

/// PDO assignments of one sync manager channel, as given to the master
#[derive(Debug, Copy, Clone)]
pub struct SyncManagerConfig<'a> {
    pub index: u8,
    pub direction: SyncDirection,
    pub pdos: &'a [PdoAssignment],
}

/**
    groups PDO entries lists into receive and transmit process data assignments

    A sync info is filled by the slave builders, then finalized with [Self::create]. A slave refuses to configure its PDOs from a sync info that was not created.
*/
#[derive(Debug, Default)]
pub struct SyncInfo {
    rx: heapless::Vec<PdoAssignment, MAX_PDOS>,
    tx: heapless::Vec<PdoAssignment, MAX_PDOS>,
    created: bool,
}

impl SyncInfo {
    pub fn new() -> Self  {Self::default()}

    /// assign a PDO written by the master, PDOs are applied in registration order
    pub fn add_rx_pdo(&mut self, index: u16, entries: PdoEntriesList) -> EthercatResult {
        if self.created
            {return Err(EthercatError::Config("sync info already created"))}
        Self::push(&mut self.rx, index, entries)
    }
    /// assign a PDO read by the master, PDOs are applied in registration order
    pub fn add_tx_pdo(&mut self, index: u16, entries: PdoEntriesList) -> EthercatResult {
        if self.created
            {return Err(EthercatError::Config("sync info already created"))}
        Self::push(&mut self.tx, index, entries)
    }
    fn push(pdos: &mut heapless::Vec<PdoAssignment, MAX_PDOS>, index: u16, entries: PdoEntriesList) -> EthercatResult {
        if pdos.iter().any(|pdo| pdo.index == index)
            {return Err(EthercatError::Duplicate(format!("pdo {:#x}", index)))}
        pdos.push(PdoAssignment {index, entries})
            .map_err(|_| EthercatError::Capacity("too many pdos assigned to a sync manager"))
    }

    /**
        finalize the assignments, nothing can be added afterward.

        PDO indices must lie in their class range (`0x1600` for RxPDOs, `0x1a00` for TxPDOs)
    */
    pub fn create(&mut self) -> EthercatResult {
        if self.created
            {return Err(EthercatError::Config("sync info already created"))}
        if self.rx.iter().any(|pdo| ! RX_PDO_INDICES.contains(&pdo.index))
            {return Err(EthercatError::Config("rx pdo index out of the 0x1600 range"))}
        if self.tx.iter().any(|pdo| ! TX_PDO_INDICES.contains(&pdo.index))
            {return Err(EthercatError::Config("tx pdo index out of the 0x1a00 range"))}
        self.created = true;
        Ok(())
    }
    pub fn is_created(&self) -> bool  {self.created}

    pub fn rx_pdos(&self) -> &[PdoAssignment]  {&self.rx}
    pub fn tx_pdos(&self) -> &[PdoAssignment]  {&self.tx}

    /// sync manager channels to configure, outputs first
    pub fn sync_managers(&self) -> [SyncManagerConfig<'_>; 2] {[
        SyncManagerConfig {index: RX_SYNC_MANAGER, direction: SyncDirection::Write, pdos: &self.rx},
        SyncManagerConfig {index: TX_SYNC_MANAGER, direction: SyncDirection::Read, pdos: &self.tx},
    ]}

    /// find an object by name among all RxPDOs
    pub fn rx_entry(&self, name: &str) -> Option<&CoeObject> {
        self.rx.iter().find_map(|pdo| pdo.entries.get(name))
    }
    /// find an object by name among all TxPDOs
    pub fn tx_entry(&self, name: &str) -> Option<&CoeObject> {
        self.tx.iter().find_map(|pdo| pdo.entries.get(name))
    }
}
