/*!
Named collections of SDOs (Service Data Objects) exchanged through the slave's mailbox.

The same structure serves two purposes depending on the slot of [crate::slave::EthercatSlave] it is registered into:

- **parameters**: every object having a value is written once to the slave, during the mailbox writing phase preceding the normal cyclic operation
- **telemetry**: every object is read again and again from the slave once the writing phase is over, as long as no other mailbox transaction is pending

# Example

```
# use etherdc::sdo::SdoList;
# fn main() -> etherdc::EthercatResult {
let mut parameters = SdoList::new();
parameters.add_object("home_offset", 0x607c, 0x00, 32, Some(-50000))?;
parameters.set_timeout(500);

let mut telemetry = SdoList::new();
telemetry.add_object("temperature", 0x2026, 0x00, 16, None)?;
telemetry.set_timeout(500);
# Ok(())
# }
```
*/

use crate::{
    coe::CoeObject,
    master::SdoRequest,
    error::{EthercatError, EthercatResult},
    };
use core::time::Duration;

/// mailbox timeout applied when none is set
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// role of an [SdoList] in a slave
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SdoUsage {
    /// written once before cyclic operation
    Parameter,
    /// read cyclically
    Telemetry,
}

/// object of an SDO list, with the mailbox request created for it
#[derive(Debug)]
pub struct SdoEntry {
    object: CoeObject,
    default: Option<i64>,
    request: Option<SdoRequest>,
}
impl SdoEntry {
    pub fn object(&self) -> &CoeObject  {&self.object}
    /// value given at registration
    pub fn default_value(&self) -> Option<i64>  {self.default}
    /// request handle, existing once the slave SDOs are created
    pub fn request(&self) -> Option<SdoRequest>  {self.request}
}

/// named CoE objects exchanged through the mailbox with a common timeout
#[derive(Debug)]
pub struct SdoList {
    entries: Vec<SdoEntry>,
    timeout: Duration,
}

impl Default for SdoList {
    fn default() -> Self {
        Self {entries: Vec::new(), timeout: DEFAULT_TIMEOUT}
    }
}

impl SdoList {
    pub fn new() -> Self  {Self::default()}

    /// register an object, with a default value or `None`
    pub fn add_object(&mut self, name: &str, index: u16, subindex: u8, bit_length: u32, value: Option<i64>) -> EthercatResult<&CoeObject> {
        if self.get(name).is_some()
            {return Err(EthercatError::Duplicate(format!("sdo {:?}", name)))}
        let object = CoeObject::new(name, index, subindex, bit_length)?;
        if let Some(value) = value
            {object.store(value)}
        self.entries.push(SdoEntry {object, default: value, request: None});
        Ok(&self.entries[self.entries.len() - 1].object)
    }

    /// set the mailbox timeout in milliseconds
    pub fn set_timeout(&mut self, milliseconds: u32) {
        self.timeout = Duration::from_millis(milliseconds.into());
    }
    pub fn timeout(&self) -> Duration  {self.timeout}

    pub fn get(&self, name: &str) -> Option<&CoeObject> {
        self.entries.iter()
            .map(|entry| &entry.object)
            .find(|object| object.name() == name)
    }
    /// position of an object in the list
    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.object.name() == name)
    }
    pub fn entry(&self, index: usize) -> Option<&SdoEntry>  {self.entries.get(index)}
    pub fn entries(&self) -> &[SdoEntry]  {&self.entries}
    /// objects in registration order
    pub fn iter(&self) -> impl Iterator<Item=&CoeObject>  {self.entries.iter().map(|entry| &entry.object)}
    pub fn len(&self) -> usize  {self.entries.len()}
    pub fn is_empty(&self) -> bool  {self.entries.is_empty()}

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item=(&CoeObject, &mut Option<SdoRequest>)> {
        self.entries.iter_mut().map(|entry| (&entry.object, &mut entry.request))
    }
}
