pub mod parse;

pub type Byte = u8; // 1 byte

/// Number of RAM cells in an LS-8 machine.
pub const MEMORY_SIZE: usize = 256;

/// Emulates the 256 bytes of RAM addressed by the CPU.
///
/// Addresses are [`Byte`]s, so every representable address is in range
/// and accesses cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Memory {
    /// The actual data of the memory
    pub data: [Byte; MEMORY_SIZE],
}

impl Default for Memory {
    /// Initializes the memory with every cell zeroed
    fn default() -> Self {
        Memory {
            data: [0; MEMORY_SIZE],
        }
    }
}

impl Memory {
    /// Reads a byte from the memory
    pub fn read_byte(&self, address: Byte) -> Byte {
        self.data[address as usize]
    }

    /// Writes a byte to the memory
    pub fn write_byte(&mut self, address: Byte, value: Byte) {
        self.data[address as usize] = value;
    }

    /// Writes an array of bytes to the memory, starting at `address`
    pub fn write_array(&mut self, address: Byte, data: &[Byte]) {
        let start = address as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
    }
}

/// Writes a block of program bytes directly into the memory
#[macro_export]
macro_rules! write_program {
    ( $mem:ident : $addr:expr => $( $byte:expr ),+ $(,)? ) => {
        $mem.write_array($addr, &[
            $(
                $byte as $crate::memory::Byte,
            )+
        ]);
    };
}
