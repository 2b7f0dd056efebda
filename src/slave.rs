
use crate::{
    coe::CoeObject,
    sync::SyncInfo,
    sdo::{SdoList, SdoUsage},
    registers::AssignActivate,
    master::{Master, SlaveConfig, SlaveIdentity},
    error::{EthercatError, EthercatResult},
    };
use log::{debug, info};


/**
    description of one ethercat slave: its identity, its process data mapping, its parameters and telemetry objects.

    Slave descriptions are populated by device-specific builders using only the public methods of this struct, [SyncInfo], [crate::pdo::PdoEntriesList] and [SdoList], and then owned by a [crate::slaves::SlavesContainer].

    ## Example

    The following is a typical slave description

    ```
    use etherdc::{pdo::PdoEntriesList, sync::SyncInfo, sdo::SdoList, slave::EthercatSlave};

    let mut rxpdo = PdoEntriesList::new();
    rxpdo.add_entry("DO0", 0x7002, 0x01, 1).unwrap();
    let mut txpdo = PdoEntriesList::new();
    txpdo.add_entry("DI0", 0x6002, 0x01, 1).unwrap();

    let mut sync = SyncInfo::new();
    sync.add_rx_pdo(0x1600, rxpdo).unwrap();
    sync.add_tx_pdo(0x1a00, txpdo).unwrap();
    sync.create().unwrap();

    let mut parameters = SdoList::new();
    parameters.add_object("filter", 0x8000, 0x01, 8, Some(2)).unwrap();
    parameters.set_timeout(500);

    let mut slave = EthercatSlave::new();
    slave.set_slave_info("io_module", 0, 0, 0x0086_0816, 0x2000_8033).unwrap();
    slave.register_sync(sync).unwrap();
    slave.register_parameter_sdo(parameters).unwrap();
    // only if using distributed clocks
    slave.set_assign_activate(0x0300);
    ```

    At bring-up the slave is then [configured](Self::configure) against the master, and its [PDOs](Self::create_pdo) and [SDOs](Self::create_sdo) are created.
*/
#[derive(Debug, Default)]
pub struct EthercatSlave {
    name: String,
    alias: u16,
    position: u16,
    vendor_id: u32,
    product_code: u32,
    /// whether the identity has been set
    identified: bool,

    /// handle obtained from the master in [Self::configure]
    config: Option<SlaveConfig>,
    sync: Option<SyncInfo>,
    parameters: Option<SdoList>,
    telemetry: Option<SdoList>,
    assign_activate: u16,

    pdo_created: bool,
    sdo_created: bool,
}

impl EthercatSlave {
    pub fn new() -> Self  {Self::default()}

    /// set the slave identity, this can be done only once
    pub fn set_slave_info(&mut self, name: &str, alias: u16, position: u16, vendor_id: u32, product_code: u32) -> EthercatResult {
        if self.identified
            {return Err(self.error("slave info already set"))}
        if name.is_empty()
            {return Err(EthercatError::InvalidArgument("slave name cannot be empty"))}
        self.name = name.into();
        self.alias = alias;
        self.position = position;
        self.vendor_id = vendor_id;
        self.product_code = product_code;
        self.identified = true;
        Ok(())
    }
    /// set the DC activation mask, only needed for slaves using distributed clocks
    pub fn set_assign_activate(&mut self, assign_activate: u16) {
        self.assign_activate = assign_activate;
    }

    pub fn name(&self) -> &str  {&self.name}
    pub fn alias(&self) -> u16  {self.alias}
    pub fn position(&self) -> u16  {self.position}
    pub fn vendor_id(&self) -> u32  {self.vendor_id}
    pub fn product_code(&self) -> u32  {self.product_code}
    pub fn is_identified(&self) -> bool  {self.identified}
    pub fn assign_activate(&self) -> u16  {self.assign_activate}
    /// bit-level view of [Self::assign_activate]
    pub fn assign_activation(&self) -> AssignActivate  {AssignActivate::from(self.assign_activate)}
    pub fn identity(&self) -> SlaveIdentity {
        SlaveIdentity {
            alias: self.alias,
            position: self.position,
            vendor_id: self.vendor_id,
            product_code: self.product_code,
        }
    }

    /// register the created sync info holding the slave PDOs
    pub fn register_sync(&mut self, sync: SyncInfo) -> EthercatResult {
        if self.sync.is_some()
            {return Err(self.error("sync info already registered"))}
        self.sync = Some(sync);
        Ok(())
    }
    /**
        register the parameters SDO list.

        Each object in it having a value will be written to the slave once, during the mailbox writing phase at the start of the realtime loop.
    */
    pub fn register_parameter_sdo(&mut self, sdos: SdoList) -> EthercatResult {
        if self.parameters.is_some()
            {return Err(self.error("parameter sdo list already registered"))}
        self.parameters = Some(sdos);
        Ok(())
    }
    /**
        register the telemetry SDO list.

        Each object in it will be updated cyclically once the initial writing phase is completed, whenever no other mailbox transaction is pending.
    */
    pub fn register_telemetry_sdo(&mut self, sdos: SdoList) -> EthercatResult {
        if self.telemetry.is_some()
            {return Err(self.error("telemetry sdo list already registered"))}
        self.telemetry = Some(sdos);
        Ok(())
    }

    pub fn sync(&self) -> Option<&SyncInfo>  {self.sync.as_ref()}
    pub fn parameter_sdo(&self) -> Option<&SdoList>  {self.parameters.as_ref()}
    pub fn telemetry_sdo(&self) -> Option<&SdoList>  {self.telemetry.as_ref()}
    /// SDO list registered for the given usage
    pub fn sdo(&self, usage: SdoUsage) -> Option<&SdoList> {
        match usage {
            SdoUsage::Parameter => self.parameters.as_ref(),
            SdoUsage::Telemetry => self.telemetry.as_ref(),
        }
    }
    /// configuration handle, available after [Self::configure]
    pub fn config(&self) -> Option<SlaveConfig>  {self.config}

    pub fn get_tx_pdo_entry(&self, name: &str) -> EthercatResult<&CoeObject> {
        self.sync.as_ref()
            .and_then(|sync| sync.tx_entry(name))
            .ok_or_else(|| self.not_found("tx pdo", name))
    }
    pub fn get_rx_pdo_entry(&self, name: &str) -> EthercatResult<&CoeObject> {
        self.sync.as_ref()
            .and_then(|sync| sync.rx_entry(name))
            .ok_or_else(|| self.not_found("rx pdo", name))
    }
    pub fn get_parameter_sdo_entry(&self, name: &str) -> EthercatResult<&CoeObject> {
        self.parameters.as_ref()
            .and_then(|sdos| sdos.get(name))
            .ok_or_else(|| self.not_found("parameter sdo", name))
    }
    pub fn get_telemetry_sdo_entry(&self, name: &str) -> EthercatResult<&CoeObject> {
        self.telemetry.as_ref()
            .and_then(|sdos| sdos.get(name))
            .ok_or_else(|| self.not_found("telemetry sdo", name))
    }

    /**
        obtain a configuration handle from the master for this slave identity.

        Fails with [EthercatError::SlaveNotFound] if the device on the bus does not match
    */
    pub fn configure<M: Master + ?Sized>(&mut self, master: &mut M) -> EthercatResult {
        if ! self.identified
            {return Err(EthercatError::Config("slave info must be set before configuring a slave"))}
        let config = master.configure_slave(self.identity())
            .map_err(|err| match err {
                EthercatError::SlaveNotFound {..} => EthercatError::SlaveNotFound {
                    name: self.name.clone(),
                    alias: self.alias,
                    position: self.position,
                    },
                other => other,
            })?;
        debug!("slave {:?} configured as {:?}", self.name, config);
        self.config = Some(config);
        Ok(())
    }

    /**
        apply the registered PDO assignments to the slave sync managers.

        RxPDOs then TxPDOs are applied in registration order, each with its entries in list order. The sync info must have been created, and this can be done only once.
    */
    pub fn create_pdo<M: Master + ?Sized>(&mut self, master: &mut M) -> EthercatResult {
        let config = self.config.ok_or_else(|| self.error("slave must be configured before creating pdos"))?;
        if self.pdo_created
            {return Err(self.error("pdos already created"))}
        let Some(sync) = self.sync.as_ref()
            else {return Ok(())};
        if ! sync.is_created()
            {return Err(self.error("sync info used before being created"))}

        for channel in sync.sync_managers() {
            if channel.pdos.is_empty()  {continue}
            master.config_pdos(config, channel.index, channel.direction, channel.pdos)?;
        }
        self.pdo_created = true;
        info!("slave {:?}: {} rx and {} tx pdos created", self.name, sync.rx_pdos().len(), sync.tx_pdos().len());
        Ok(())
    }

    /// create the mailbox requests for the parameter and telemetry objects, this can be done only once
    pub fn create_sdo<M: Master + ?Sized>(&mut self, master: &mut M) -> EthercatResult {
        let config = self.config.ok_or_else(|| self.error("slave must be configured before creating sdos"))?;
        if self.sdo_created
            {return Err(self.error("sdos already created"))}
        for sdos in [self.parameters.as_mut(), self.telemetry.as_mut()].into_iter().flatten() {
            let timeout = sdos.timeout();
            for (object, request) in sdos.entries_mut() {
                *request = Some(master.create_sdo_request(
                    config,
                    object.index(),
                    object.subindex(),
                    object.byte_length(),
                    timeout,
                    )?);
            }
        }
        self.sdo_created = true;
        Ok(())
    }

    fn error(&self, message: &'static str) -> EthercatError {
        EthercatError::Slave {slave: self.name.clone(), message}
    }
    fn not_found(&self, list: &'static str, entry: &str) -> EthercatError {
        EthercatError::NotFound {slave: self.name.clone(), list, entry: entry.into()}
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pdo::PdoEntriesList,
        emulated::{EmulatedMaster, EmulatedDevice},
        };

    fn io_module() -> EthercatSlave {
        let mut rxpdo = PdoEntriesList::new();
        rxpdo.add_entry("DO0", 0x7002, 0x01, 1).unwrap();
        let mut txpdo = PdoEntriesList::new();
        txpdo.add_entry("DI0", 0x6002, 0x01, 1).unwrap();
        let mut sync = SyncInfo::new();
        sync.add_rx_pdo(0x1601, rxpdo).unwrap();
        sync.add_tx_pdo(0x1a01, txpdo).unwrap();
        sync.create().unwrap();
        let mut telemetry = SdoList::new();
        telemetry.add_object("temperature", 0x2026, 0x00, 16, None).unwrap();

        let mut slave = EthercatSlave::new();
        slave.set_slave_info("io", 0, 0, 0x0086_0816, 0x2000_8033).unwrap();
        slave.register_sync(sync).unwrap();
        slave.register_telemetry_sdo(telemetry).unwrap();
        slave
    }

    #[test]
    fn identity_set_once() {
        let mut slave = io_module();
        assert!(slave.set_slave_info("other", 0, 1, 1, 1).is_err());
        assert_eq!(slave.name(), "io");
        assert_eq!(slave.identity().vendor_id, 0x0086_0816);
    }

    #[test]
    fn lookups() {
        let slave = io_module();
        let entry = slave.get_rx_pdo_entry("DO0").unwrap();
        assert_eq!((entry.index(), entry.subindex(), entry.bit_length()), (0x7002, 0x01, 1));
        assert!(slave.get_tx_pdo_entry("DI0").is_ok());
        assert!(slave.get_telemetry_sdo_entry("temperature").is_ok());
        match slave.get_tx_pdo_entry("DO0") {
            Err(EthercatError::NotFound {slave, entry, ..}) => {
                assert_eq!(slave, "io");
                assert_eq!(entry, "DO0");
            },
            other => panic!("unexpected {:?}", other),
        }
        assert!(slave.get_parameter_sdo_entry("temperature").is_err());
    }

    #[test]
    fn configure_checks_identity() {
        let mut master = EmulatedMaster::new(vec![
            EmulatedDevice::new(0, 0, 0x0086_0816, 0x1111),
            ]);
        let mut slave = io_module();
        match slave.configure(&mut master) {
            Err(EthercatError::SlaveNotFound {name, position, ..}) => {
                assert_eq!(name, "io");
                assert_eq!(position, 0);
            },
            other => panic!("unexpected {:?}", other),
        }
        assert!(slave.config().is_none());
    }

    #[test]
    fn pdos_created_once() {
        let mut master = EmulatedMaster::new(vec![
            EmulatedDevice::new(0, 0, 0x0086_0816, 0x2000_8033),
            ]);
        let mut slave = io_module();
        assert!(slave.create_pdo(&mut master).is_err());
        slave.configure(&mut master).unwrap();
        slave.create_pdo(&mut master).unwrap();
        assert!(slave.create_pdo(&mut master).is_err());

        let config = slave.config().unwrap();
        let mapping = master.pdo_mapping(config, 2).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping[0].0, 0x1601);
        assert_eq!(mapping[0].1, vec![(0x7002u16, 0x01u8, 1u32)]);
        assert_eq!(master.pdo_mapping(config, 3).unwrap().len(), 1);
    }

    #[test]
    fn pdo_mapping_keeps_order() {
        let mut master = EmulatedMaster::new(vec![
            EmulatedDevice::new(0, 0, 1, 2),
            ]);
        let mut outputs = PdoEntriesList::new();
        for channel in [3, 1, 2] {
            outputs.add_entry(&format!("DO{}", channel), 0x7002, channel, 1).unwrap();
        }
        let mut setpoint = PdoEntriesList::new();
        setpoint.add_entry("position", 0x607a, 0x00, 32).unwrap();
        setpoint.add_entry("control", 0x6040, 0x00, 16).unwrap();
        let mut sync = SyncInfo::new();
        sync.add_rx_pdo(0x1601, setpoint).unwrap();
        sync.add_rx_pdo(0x1600, outputs).unwrap();
        sync.create().unwrap();

        let mut slave = EthercatSlave::new();
        slave.set_slave_info("drive", 0, 0, 1, 2).unwrap();
        slave.register_sync(sync).unwrap();
        slave.configure(&mut master).unwrap();
        slave.create_pdo(&mut master).unwrap();

        let mapping = master.pdo_mapping(slave.config().unwrap(), 2).unwrap();
        assert_eq!(mapping.iter().map(|pdo| pdo.0).collect::<Vec<_>>(), vec![0x1601, 0x1600]);
        assert_eq!(mapping[0].1, vec![(0x607a, 0x00, 32), (0x6040, 0x00, 16)]);
        assert_eq!(mapping[1].1, vec![(0x7002, 3, 1), (0x7002, 1, 1), (0x7002, 2, 1)]);
    }

    #[test]
    fn uncreated_sync_is_rejected() {
        let mut master = EmulatedMaster::new(vec![
            EmulatedDevice::new(0, 0, 1, 2),
            ]);
        let mut slave = EthercatSlave::new();
        slave.set_slave_info("drive", 0, 0, 1, 2).unwrap();
        let mut sync = SyncInfo::new();
        sync.add_tx_pdo(0x1a00, PdoEntriesList::new()).unwrap();
        slave.register_sync(sync).unwrap();
        slave.configure(&mut master).unwrap();
        assert!(matches!(slave.create_pdo(&mut master), Err(EthercatError::Slave {..})));
    }

    #[test]
    fn sdo_requests_created() {
        let mut master = EmulatedMaster::new(vec![
            EmulatedDevice::new(0, 0, 0x0086_0816, 0x2000_8033),
            ]);
        let mut slave = io_module();
        slave.configure(&mut master).unwrap();
        slave.create_sdo(&mut master).unwrap();
        assert!(slave.telemetry_sdo().unwrap().entries().iter().all(|entry| entry.request().is_some()));
        assert!(slave.create_sdo(&mut master).is_err());
    }
}
