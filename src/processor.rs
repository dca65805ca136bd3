use std::cmp::Ordering;
use std::convert::TryFrom;
use std::error;
use std::fmt;
use std::io::{self, Write};

use crate::memory::{Byte, Memory};
use log::*;
use num_enum::IntoPrimitive;
use num_enum::TryFromPrimitive;

/// Index of the stack pointer register, R7.
pub const SP: usize = 7;
/// Where the stack pointer starts on an empty machine, just below the
/// memory-mapped region at the top of RAM.
pub const INITIAL_SP: Byte = 0xF4;

/// Emulates an LS-8 CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Processor {
    /// Program counter
    pub pc: Byte,
    /// General-purpose registers R0 through R7; R7 doubles as the stack pointer
    pub reg: [Byte; 8],
    /// Comparison flags, rewritten by every CMP
    pub flag: Flag,
    /// Whether the processor is still willing to execute
    pub state: State,
}

/// Result of the most recent CMP, or [`Flag::Clear`] before the first one.
///
/// Exactly one of the three comparison outcomes holds at a time, so the
/// flags register collapses to an enum instead of a bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Flag {
    /// No CMP has run yet
    Clear = 0b000,
    /// The operands were equal
    Equal = 0b001,
    /// The first operand was greater
    Greater = 0b010,
    /// The first operand was less
    Less = 0b100,
}

/// Execution state of the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Executing instructions
    Running,
    /// Stopped cleanly by HLT
    Halted,
    /// Stopped by a fault; the machine must be rebuilt to run again
    Faulted,
}

/// A condition the processor cannot execute past.
///
/// Every variant records the program counter of the offending
/// instruction, so a fault can be traced back to the program bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The byte under the program counter is not an instruction
    InvalidOpcode { opcode: Byte, pc: Byte },
    /// DIV or MOD with zero in the second operand register
    DivisionByZero { pc: Byte },
    /// An operand named a register index outside R0..R7
    AddressOutOfRange { index: Byte, pc: Byte },
    /// The host sink rejected PRN or PRA output
    Output(io::ErrorKind),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::InvalidOpcode { opcode, pc } => {
                write!(f, "invalid instruction 0b{:08b} at address {:#04x}", opcode, pc)
            }
            Fault::DivisionByZero { pc } => write!(f, "divide by zero at address {:#04x}", pc),
            Fault::AddressOutOfRange { index, pc } => {
                write!(f, "register {} out of range at address {:#04x}", index, pc)
            }
            Fault::Output(kind) => write!(f, "failed to write program output: {:?}", kind),
        }
    }
}

impl error::Error for Fault {}

impl Default for Processor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor {
    /// Initializes a CPU in the power-on state: everything zeroed except
    /// the stack pointer, which starts at [`INITIAL_SP`].
    pub fn new() -> Self {
        let mut reg = [0; 8];
        reg[SP] = INITIAL_SP;
        Self {
            pc: 0,
            reg,
            flag: Flag::Clear,
            state: State::Running,
        }
    }

    /// Runs instructions until the processor leaves [`State::Running`].
    ///
    /// On a fault the processor is left [`State::Faulted`] with `pc` still
    /// on the offending instruction, and calling this again does nothing.
    pub fn execute_until_halt<W: Write>(
        &mut self,
        memory: &mut Memory,
        out: &mut W,
    ) -> Result<(), Fault> {
        while self.state == State::Running {
            if let Err(fault) = self.execute(memory, out) {
                self.state = State::Faulted;
                return Err(fault);
            }
        }
        debug!("halted at {:#04x}", self.pc);
        Ok(())
    }

    /// Runs one fetch, decode, execute cycle.
    pub fn execute<W: Write>(&mut self, memory: &mut Memory, out: &mut W) -> Result<(), Fault> {
        let byte = memory.read_byte(self.pc);
        let instruction = Instruction::decode(byte, self.pc)?;
        self.execute_instruction(instruction, memory, out)?;

        // Instructions that mutate the program counter have already
        // placed it; everything else steps past its operands.
        if !instruction.sets_pc {
            self.pc = self.pc.wrapping_add(instruction.size);
        }
        Ok(())
    }

    /// Executes a single decoded instruction against memory and the
    /// output sink.
    pub fn execute_instruction<W: Write>(
        &mut self,
        instruction: Instruction,
        memory: &mut Memory,
        out: &mut W,
    ) -> Result<(), Fault> {
        // Operand slots; shorter instructions simply never read them.
        let operand_a = memory.read_byte(self.pc.wrapping_add(1));
        let operand_b = memory.read_byte(self.pc.wrapping_add(2));

        match instruction.opcode {
            Opcode::ADD
            | Opcode::SUB
            | Opcode::MUL
            | Opcode::DIV
            | Opcode::MOD
            | Opcode::INC
            | Opcode::DEC
            | Opcode::CMP
            | Opcode::AND
            | Opcode::NOT
            | Opcode::OR
            | Opcode::XOR
            | Opcode::SHL
            | Opcode::SHR => self.alu(instruction.opcode, operand_a, operand_b)?,
            Opcode::NOP => {
                debug!("NOP");
            }
            Opcode::HLT => {
                self.state = State::Halted;

                debug!("HLT");
            }
            Opcode::LDI => {
                *self.reg_mut(operand_a)? = operand_b;

                debug!("LDI r{}: {}", operand_a, operand_b);
            }
            Opcode::LD => {
                let address = self.read_reg(operand_b)?;
                let value = memory.read_byte(address);
                *self.reg_mut(operand_a)? = value;

                debug!("LD r{} r{}: {}", operand_a, operand_b, value);
            }
            Opcode::ST => {
                let address = self.read_reg(operand_a)?;
                let value = self.read_reg(operand_b)?;
                memory.write_byte(address, value);

                debug!("ST r{} r{}: {}", operand_a, operand_b, value);
            }
            Opcode::PUSH => {
                let value = self.read_reg(operand_a)?;
                self.push_byte(memory, value);

                debug!("PUSH r{}: {}", operand_a, value);
            }
            Opcode::POP => {
                // The destination is validated before the stack pointer moves.
                let value = memory.read_byte(self.reg[SP]);
                *self.reg_mut(operand_a)? = value;
                self.reg[SP] = self.reg[SP].wrapping_add(1);

                debug!("POP r{}: {}", operand_a, value);
            }
            Opcode::PRN => {
                let value = self.read_reg(operand_a)?;
                writeln!(out, "{}", value).map_err(|err| Fault::Output(err.kind()))?;

                debug!("PRN r{}: {}", operand_a, value);
            }
            Opcode::PRA => {
                let value = self.read_reg(operand_a)?;
                write!(out, "{}", value as char).map_err(|err| Fault::Output(err.kind()))?;

                debug!("PRA r{}: {:?}", operand_a, value as char);
            }
            Opcode::CALL => {
                let target = self.read_reg(operand_a)?;
                let ret = self.pc.wrapping_add(instruction.size);
                self.push_byte(memory, ret);
                self.pc = target;

                debug!("CALL r{}: {:#04x}, returning to {:#04x}", operand_a, target, ret);
            }
            Opcode::RET => {
                self.pc = self.pop_byte(memory);

                debug!("RET: {:#04x}", self.pc);
            }
            Opcode::JMP => {
                self.pc = self.read_reg(operand_a)?;

                debug!("JMP r{}: {:#04x}", operand_a, self.pc);
            }
            Opcode::JEQ => self.jump_if(instruction.opcode, operand_a, self.flag == Flag::Equal)?,
            Opcode::JNE => self.jump_if(instruction.opcode, operand_a, self.flag != Flag::Equal)?,
            Opcode::JGT => {
                self.jump_if(instruction.opcode, operand_a, self.flag == Flag::Greater)?
            }
            Opcode::JLT => self.jump_if(instruction.opcode, operand_a, self.flag == Flag::Less)?,
            Opcode::JLE => self.jump_if(
                instruction.opcode,
                operand_a,
                matches!(self.flag, Flag::Less | Flag::Equal),
            )?,
            Opcode::JGE => self.jump_if(
                instruction.opcode,
                operand_a,
                matches!(self.flag, Flag::Greater | Flag::Equal),
            )?,
            // Encoded but no interrupt controller is wired up.
            Opcode::INT | Opcode::IRET => {
                return Err(Fault::InvalidOpcode {
                    opcode: instruction.opcode.into(),
                    pc: self.pc,
                })
            }
        }

        Ok(())
    }

    /// Executes an ALU-class instruction. Results are truncated to eight
    /// bits; DIV and MOD fault on a zero divisor.
    fn alu(&mut self, op: Opcode, reg_a: Byte, reg_b: Byte) -> Result<(), Fault> {
        match op {
            Opcode::ADD => {
                let b = self.read_reg(reg_b)?;
                let a = self.reg_mut(reg_a)?;
                *a = a.wrapping_add(b);

                debug!("ADD r{} r{}: {}", reg_a, reg_b, *a);
            }
            Opcode::SUB => {
                let b = self.read_reg(reg_b)?;
                let a = self.reg_mut(reg_a)?;
                *a = a.wrapping_sub(b);

                debug!("SUB r{} r{}: {}", reg_a, reg_b, *a);
            }
            Opcode::MUL => {
                let b = self.read_reg(reg_b)?;
                let a = self.reg_mut(reg_a)?;
                *a = a.wrapping_mul(b);

                debug!("MUL r{} r{}: {}", reg_a, reg_b, *a);
            }
            Opcode::DIV => {
                let b = self.read_reg(reg_b)?;
                if b == 0 {
                    return Err(Fault::DivisionByZero { pc: self.pc });
                }
                let a = self.reg_mut(reg_a)?;
                *a /= b;

                debug!("DIV r{} r{}: {}", reg_a, reg_b, *a);
            }
            Opcode::MOD => {
                let b = self.read_reg(reg_b)?;
                if b == 0 {
                    return Err(Fault::DivisionByZero { pc: self.pc });
                }
                let a = self.reg_mut(reg_a)?;
                *a %= b;

                debug!("MOD r{} r{}: {}", reg_a, reg_b, *a);
            }
            Opcode::INC => {
                let a = self.reg_mut(reg_a)?;
                *a = a.wrapping_add(1);

                debug!("INC r{}: {}", reg_a, *a);
            }
            Opcode::DEC => {
                let a = self.reg_mut(reg_a)?;
                *a = a.wrapping_sub(1);

                debug!("DEC r{}: {}", reg_a, *a);
            }
            Opcode::CMP => {
                let a = self.read_reg(reg_a)?;
                let b = self.read_reg(reg_b)?;
                self.flag = match a.cmp(&b) {
                    Ordering::Equal => Flag::Equal,
                    Ordering::Greater => Flag::Greater,
                    Ordering::Less => Flag::Less,
                };

                debug!("CMP r{} r{}: {:?}", reg_a, reg_b, self.flag);
            }
            Opcode::AND => {
                let b = self.read_reg(reg_b)?;
                let a = self.reg_mut(reg_a)?;
                *a &= b;

                debug!("AND r{} r{}: {}", reg_a, reg_b, *a);
            }
            Opcode::NOT => {
                let a = self.reg_mut(reg_a)?;
                *a = !*a;

                debug!("NOT r{}: {}", reg_a, *a);
            }
            Opcode::OR => {
                let b = self.read_reg(reg_b)?;
                let a = self.reg_mut(reg_a)?;
                *a |= b;

                debug!("OR r{} r{}: {}", reg_a, reg_b, *a);
            }
            Opcode::XOR => {
                let b = self.read_reg(reg_b)?;
                let a = self.reg_mut(reg_a)?;
                *a ^= b;

                debug!("XOR r{} r{}: {}", reg_a, reg_b, *a);
            }
            Opcode::SHL => {
                // A count of eight or more clears the register; the native
                // operator would wrap the count instead.
                let b = self.read_reg(reg_b)?;
                let a = self.reg_mut(reg_a)?;
                *a = a.checked_shl(b.into()).unwrap_or(0);

                debug!("SHL r{} r{}: {}", reg_a, reg_b, *a);
            }
            Opcode::SHR => {
                let b = self.read_reg(reg_b)?;
                let a = self.reg_mut(reg_a)?;
                *a = a.checked_shr(b.into()).unwrap_or(0);

                debug!("SHR r{} r{}: {}", reg_a, reg_b, *a);
            }
            // Never dispatched here: every opcode with the ALU class bit
            // is matched above.
            op => {
                return Err(Fault::InvalidOpcode {
                    opcode: op.into(),
                    pc: self.pc,
                })
            }
        }

        Ok(())
    }

    /// Conditional jump: to the address in the named register when `taken`,
    /// past this two-byte instruction otherwise.
    fn jump_if(&mut self, op: Opcode, reg: Byte, taken: bool) -> Result<(), Fault> {
        let target = self.read_reg(reg)?;
        if taken {
            self.pc = target;
        } else {
            self.pc = self.pc.wrapping_add(2);
        }

        debug!("{} r{}: taken={}", op, reg, taken);
        Ok(())
    }

    fn read_reg(&self, index: Byte) -> Result<Byte, Fault> {
        self.reg
            .get(index as usize)
            .copied()
            .ok_or(Fault::AddressOutOfRange { index, pc: self.pc })
    }

    fn reg_mut(&mut self, index: Byte) -> Result<&mut Byte, Fault> {
        let pc = self.pc;
        self.reg
            .get_mut(index as usize)
            .ok_or(Fault::AddressOutOfRange { index, pc })
    }

    fn push_byte(&mut self, memory: &mut Memory, value: Byte) {
        self.reg[SP] = self.reg[SP].wrapping_sub(1);
        memory.write_byte(self.reg[SP], value);
    }

    fn pop_byte(&mut self, memory: &mut Memory) -> Byte {
        let value = memory.read_byte(self.reg[SP]);
        self.reg[SP] = self.reg[SP].wrapping_add(1);
        value
    }
}

/// One decoded instruction: the opcode plus the classification bits
/// packed into its pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    /// Total size in bytes, opcode included
    pub size: Byte,
    /// Whether the instruction routes through the ALU
    pub is_alu: bool,
    /// Whether the instruction places the program counter itself
    pub sets_pc: bool,
}

impl Instruction {
    /// Decodes a raw byte fetched at `pc`.
    ///
    /// The classification fields come straight out of the bit pattern:
    /// the top two bits give the operand count, bit 5 marks ALU
    /// instructions and bit 4 marks instructions that set the program
    /// counter.
    pub fn decode(byte: Byte, pc: Byte) -> Result<Self, Fault> {
        let opcode =
            Opcode::try_from(byte).map_err(|_| Fault::InvalidOpcode { opcode: byte, pc })?;
        Ok(Self {
            opcode,
            size: (byte >> 6) + 1,
            is_alu: byte & 0b0010_0000 != 0,
            sets_pc: byte & 0b0001_0000 != 0,
        })
    }
}

macro_rules! opcodes {
    ( $( $( #[doc = $doc:expr] )+ $name:ident = $pattern:literal , )+ ) => {
        /// The instruction set.
        ///
        /// Patterns follow the layout `AABCDDDD`: `AA` is the operand
        /// count, `B` the ALU class bit, `C` the sets-PC bit and `DDDD`
        /// distinguishes instructions within a class.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
        #[derive(TryFromPrimitive, IntoPrimitive)]
        pub enum Opcode {
            $(
                $( #[doc = $doc] )+
                $name = $pattern,
            )+
        }

        impl Opcode {
            /// Every opcode the processor knows.
            pub const ALL: &'static [Self] = &[
                $( Self::$name , )+
            ];

            pub fn name(&self) -> &'static str {
                match self {
                    $( Self::$name => stringify!($name) , )+
                }
            }
        }

        impl ::std::fmt::Display for Opcode {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }
    }
}

opcodes! {
    // ALU class (bit 5 set)
    /// Add two registers into the first
    ADD = 0b1010_0000,
    /// Subtract the second register from the first
    SUB = 0b1010_0001,
    /// Multiply two registers into the first
    MUL = 0b1010_0010,
    /// Divide the first register by the second
    DIV = 0b1010_0011,
    /// Remainder of dividing the first register by the second
    MOD = 0b1010_0100,
    /// Increment a register
    INC = 0b0110_0101,
    /// Decrement a register
    DEC = 0b0110_0110,
    /// Compare two registers and set the flags
    CMP = 0b1010_0111,
    /// Bitwise AND of two registers into the first
    AND = 0b1010_1000,
    /// Bitwise complement of a register
    NOT = 0b0110_1001,
    /// Bitwise OR of two registers into the first
    OR = 0b1010_1010,
    /// Bitwise XOR of two registers into the first
    XOR = 0b1010_1011,
    /// Shift the first register left by the count in the second
    SHL = 0b1010_1100,
    /// Shift the first register right by the count in the second
    SHR = 0b1010_1101,

    // PC mutators (bit 4 set)
    /// Call the subroutine at the address held in a register
    /// @param register Register holding the subroutine address
    CALL = 0b0101_0000,
    /// Return from the current subroutine
    RET = 0b0001_0001,
    /// Issue an interrupt (reserved, nothing handles it)
    INT = 0b0101_0010,
    /// Return from an interrupt handler (reserved, nothing handles it)
    IRET = 0b0001_0011,
    /// Jump to the address held in a register
    JMP = 0b0101_0100,
    /// Jump if the equal flag is set
    JEQ = 0b0101_0101,
    /// Jump if the equal flag is clear
    JNE = 0b0101_0110,
    /// Jump if the greater flag is set
    JGT = 0b0101_0111,
    /// Jump if the less flag is set
    JLT = 0b0101_1000,
    /// Jump if the less or the equal flag is set
    JLE = 0b0101_1001,
    /// Jump if the greater or the equal flag is set
    JGE = 0b0101_1010,

    // Plain instructions
    /// No operation
    NOP = 0b0000_0000,
    /// Stop execution
    HLT = 0b0000_0001,
    /// Set a register to an immediate value
    /// @param register The destination register
    /// @param value The value to store
    LDI = 0b1000_0010,
    /// Load a register from the memory address held in another register
    LD = 0b1000_0011,
    /// Store a register at the memory address held in another register
    ST = 0b1000_0100,
    /// Push a register value onto the stack
    PUSH = 0b0100_0101,
    /// Pop the top of the stack into a register
    POP = 0b0100_0110,
    /// Print the numeric value of a register, one line per call
    PRN = 0b0100_0111,
    /// Print the register value as an ASCII character
    PRA = 0b0100_1000,
}
