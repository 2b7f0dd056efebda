/*!
    CoE (Canopen over Ethercat) objects: a named entry of a slave's dictionnary of objects, with the current value exchanged with the slave.

    An object identity (index, subindex, bit length) never changes once created. Its value is stored in atomics so that the realtime thread can update it while any other thread takes a consistent snapshot with [CoeObject::load], without locking.
*/

use crate::error::{EthercatError, EthercatResult};
use core::{
    fmt,
    sync::atomic::{AtomicBool, AtomicI64, Ordering::*},
    };

/// maximum bit length of an object value handled by this crate
pub const MAX_BIT_LENGTH: u32 = 64;

/// one CoE object (PDO entry or SDO) with its last known value
pub struct CoeObject {
    name: String,
    /// index of the item in the slave's dictionnary of objects
    index: u16,
    /// subindex in the item
    subindex: u8,
    bit_length: u32,

    value: AtomicI64,
    /// false until the value has been written by the user or read from the slave
    defined: AtomicBool,
}

impl CoeObject {
    /// object without value, `bit_length` must be in `1 ..= 64`
    pub fn new(name: impl Into<String>, index: u16, subindex: u8, bit_length: u32) -> EthercatResult<Self> {
        if bit_length == 0 || bit_length > MAX_BIT_LENGTH
            {return Err(EthercatError::InvalidArgument("object bit length must be in 1..=64"))}
        Ok(Self {
            name: name.into(),
            index,
            subindex,
            bit_length,
            value: AtomicI64::new(0),
            defined: AtomicBool::new(false),
        })
    }
    /// object holding an initial value
    pub fn with_value(name: impl Into<String>, index: u16, subindex: u8, bit_length: u32, value: i64) -> EthercatResult<Self> {
        let object = Self::new(name, index, subindex, bit_length)?;
        object.store(value);
        Ok(object)
    }

    pub fn name(&self) -> &str  {&self.name}
    pub fn index(&self) -> u16  {self.index}
    pub fn subindex(&self) -> u8  {self.subindex}
    pub fn bit_length(&self) -> u32  {self.bit_length}
    /// number of bytes needed to transfer the value
    pub fn byte_length(&self) -> usize  {(self.bit_length as usize + 7) / 8}

    /// current value, or `None` if never written nor read
    pub fn load(&self) -> Option<i64> {
        if self.defined.load(SeqCst)
            {Some(self.value.load(SeqCst))}
        else
            {None}
    }
    /// current value interpreted as a signed integer of `bit_length` bits
    pub fn load_signed(&self) -> Option<i64> {
        self.load().map(|value| {
            let shift = 64 - self.bit_length;
            (value << shift) >> shift
        })
    }
    pub fn store(&self, value: i64) {
        self.value.store(value, SeqCst);
        self.defined.store(true, SeqCst);
    }
    /// forget the current value
    pub fn clear(&self) {
        self.defined.store(false, SeqCst);
    }
    pub fn is_defined(&self) -> bool  {self.defined.load(SeqCst)}

    /// value masked to the object's bit length
    pub fn bits(&self) -> Option<u64> {
        self.load().map(|value| (value as u64) & self.mask())
    }
    fn mask(&self) -> u64 {
        if self.bit_length >= 64  {u64::MAX}
        else  {(1 << self.bit_length) - 1}
    }

    /**
        write the value little endian in `dst` as expected by a mailbox transfer

        return the number of bytes written, or `None` if the object has no value or `dst` is too small
    */
    pub fn pack(&self, dst: &mut [u8]) -> Option<usize> {
        let len = self.byte_length();
        if dst.len() < len  {return None}
        let bits = self.bits()?;
        dst[.. len].copy_from_slice(&bits.to_le_bytes()[.. len]);
        Some(len)
    }
    /// set the value from little endian bytes received from the slave, extra bytes are ignored
    pub fn unpack(&self, src: &[u8]) {
        let len = self.byte_length().min(src.len());
        let mut raw = [0; 8];
        raw[.. len].copy_from_slice(&src[.. len]);
        self.store((u64::from_le_bytes(raw) & self.mask()) as i64);
    }
}

impl fmt::Debug for CoeObject {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CoeObject {{name: {:?}, index: {:#x}, sub: {:#x}, bits: {}, value: {:?}}}",
            self.name, self.index, self.subindex, self.bit_length, self.load())
    }
}
