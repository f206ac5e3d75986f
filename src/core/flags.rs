//! Registration flag bits.

use bitflags::bitflags;

bitflags! {
    /// Behaviour bits carried in the single flags byte of a registration message.
    ///
    /// Unknown bits are retained so a message re-encodes byte-for-byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RegistrationFlags: u8 {
        /// Client only uploads through the covert channel
        const UPLOAD_ONLY = 0x01;
        /// Registration targets a phantom rather than a real decoy
        const DARK_DECOY = 0x02;
        /// Prepend a PROXY protocol header when connecting to the covert target
        const PROXY_HEADER = 0x04;
        /// Client requested tunnel inactivity logging
        const USE_TIL = 0x10;
    }
}

impl RegistrationFlags {
    /// Build from the raw wire byte, keeping bits this station does not know
    pub fn from_wire(byte: u8) -> Self {
        Self::from_bits_retain(byte)
    }
}
