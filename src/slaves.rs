//! ownership and lookup of all the slaves of a bus

use crate::{
    slave::EthercatSlave,
    master::Master,
    error::{EthercatError, EthercatResult},
    };
use std::collections::HashMap;
use log::info;


/**
    owns every [EthercatSlave] of the bus.

    Slaves are stored in registration order and keep their index for the whole session. Lookup by name and by `(alias, position)` goes through indices built during registration, never modified once the realtime loop runs.
*/
#[derive(Debug, Default)]
pub struct SlavesContainer {
    slaves: Vec<EthercatSlave>,
    names: HashMap<String, usize>,
    positions: HashMap<(u16, u16), usize>,
}

impl SlavesContainer {
    pub fn new() -> Self  {Self::default()}

    /**
        take ownership of a slave and return its index.

        The slave identity must be set, and neither its name nor its address may already be registered.
    */
    pub fn register(&mut self, slave: EthercatSlave) -> EthercatResult<usize> {
        if ! slave.is_identified()
            {return Err(EthercatError::Config("slave info must be set before registering a slave"))}
        if self.names.contains_key(slave.name())
            {return Err(EthercatError::Duplicate(format!("slave name {:?}", slave.name())))}
        let address = (slave.alias(), slave.position());
        if self.positions.contains_key(&address)
            {return Err(EthercatError::Duplicate(format!("slave address alias {} position {}", address.0, address.1)))}

        let index = self.slaves.len();
        self.names.insert(slave.name().into(), index);
        self.positions.insert(address, index);
        self.slaves.push(slave);
        Ok(index)
    }

    pub fn get(&self, name: &str) -> EthercatResult<&EthercatSlave> {
        self.index_of(name)
            .map(|index| &self.slaves[index])
            .ok_or_else(|| Self::unknown(name))
    }
    pub fn get_mut(&mut self, name: &str) -> EthercatResult<&mut EthercatSlave> {
        match self.index_of(name) {
            Some(index) => Ok(&mut self.slaves[index]),
            None => Err(Self::unknown(name)),
        }
    }
    /// slave at the given bus address
    pub fn at(&self, alias: u16, position: u16) -> Option<&EthercatSlave> {
        self.positions.get(&(alias, position)).map(|&index| &self.slaves[index])
    }
    pub fn index_of(&self, name: &str) -> Option<usize>  {self.names.get(name).copied()}
    /// slave by registration index
    pub fn slave(&self, index: usize) -> Option<&EthercatSlave>  {self.slaves.get(index)}

    pub fn iter(&self) -> impl Iterator<Item=&EthercatSlave>  {self.slaves.iter()}
    pub fn iter_mut(&mut self) -> impl Iterator<Item=&mut EthercatSlave>  {self.slaves.iter_mut()}
    pub fn len(&self) -> usize  {self.slaves.len()}
    pub fn is_empty(&self) -> bool  {self.slaves.is_empty()}

    /**
        configure every slave against the master, then create their PDOs and SDOs.

        This is the slaves part of the bus bring-up and stops at the first failing slave.
    */
    pub fn configure<M: Master + ?Sized>(&mut self, master: &mut M) -> EthercatResult {
        for slave in self.slaves.iter_mut() {
            slave.configure(master)?;
            slave.create_pdo(master)?;
            slave.create_sdo(master)?;
        }
        info!("{} slaves configured", self.slaves.len());
        Ok(())
    }

    fn unknown(name: &str) -> EthercatError {
        EthercatError::NotFound {slave: name.into(), list: "slaves container", entry: name.into()}
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn slave(name: &str, alias: u16, position: u16) -> EthercatSlave {
        let mut slave = EthercatSlave::new();
        slave.set_slave_info(name, alias, position, 0x2, 0x0444_3052).unwrap();
        slave
    }

    #[test]
    fn lookup_by_name_and_address() {
        let mut slaves = SlavesContainer::new();
        assert_eq!(slaves.register(slave("coupler", 0, 0)).unwrap(), 0);
        assert_eq!(slaves.register(slave("drive", 0, 1)).unwrap(), 1);
        assert_eq!(slaves.get("drive").unwrap().position(), 1);
        assert_eq!(slaves.at(0, 0).unwrap().name(), "coupler");
        assert_eq!(slaves.index_of("drive"), Some(1));
        assert!(matches!(slaves.get("absent"), Err(EthercatError::NotFound {..})));
        slaves.get_mut("drive").unwrap().set_assign_activate(0x0300);
        assert_eq!(slaves.slave(1).unwrap().assign_activate(), 0x0300);
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut slaves = SlavesContainer::new();
        slaves.register(slave("drive", 0, 1)).unwrap();
        assert!(matches!(slaves.register(slave("drive", 0, 2)), Err(EthercatError::Duplicate(_))));
        assert!(matches!(slaves.register(slave("other", 0, 1)), Err(EthercatError::Duplicate(_))));
        // same position under another alias is another address
        slaves.register(slave("aliased", 7, 1)).unwrap();
        assert_eq!(slaves.len(), 2);
    }

    #[test]
    fn unidentified_slave_is_rejected() {
        let mut slaves = SlavesContainer::new();
        assert!(matches!(slaves.register(EthercatSlave::new()), Err(EthercatError::Config(_))));
        assert!(slaves.is_empty());
    }
}
