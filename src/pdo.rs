//! ordered lists of CoE objects forming one PDO mapping

use crate::{
    coe::CoeObject,
    error::{EthercatError, EthercatResult},
    };

/**
    sequence of CoE objects mapped in one PDO

    The order of insertion is the order of the objects in the process data image, so it defines the memory layout downstream code will index into. Once the list is moved into a [crate::sync::SyncInfo] it cannot be modified anymore.

    ```
    use etherdc::pdo::PdoEntriesList;

    let mut rxpdo = PdoEntriesList::new();
    rxpdo.add_entry("DO0", 0x7002, 0x01, 1).unwrap();
    rxpdo.add_entry("DO1", 0x7002, 0x02, 1).unwrap();
    assert_eq!(rxpdo.bit_size(), 2);
    ```
*/
#[derive(Default, Debug)]
pub struct PdoEntriesList {
    entries: Vec<CoeObject>,
}

impl PdoEntriesList {
    pub fn new() -> Self  {Self::default()}

    /// append an object at the end of the mapping, names must be unique in the list
    pub fn add_entry(&mut self, name: &str, index: u16, subindex: u8, bit_length: u32) -> EthercatResult<&CoeObject> {
        if self.get(name).is_some()
            {return Err(EthercatError::Duplicate(format!("pdo entry {:?}", name)))}
        self.entries.push(CoeObject::new(name, index, subindex, bit_length)?);
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn get(&self, name: &str) -> Option<&CoeObject> {
        self.entries.iter().find(|entry| entry.name() == name)
    }
    /// entries in mapping order
    pub fn iter(&self) -> impl Iterator<Item=&CoeObject>  {self.entries.iter()}
    pub fn len(&self) -> usize  {self.entries.len()}
    pub fn is_empty(&self) -> bool  {self.entries.is_empty()}

    /// size of the mapped data in bits
    pub fn bit_size(&self) -> u32 {
        self.entries.iter().map(|entry| entry.bit_length()).sum()
    }
}
