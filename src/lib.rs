//! Emulator for the LS-8, an 8-bit CPU with 256 bytes of RAM, eight
//! general-purpose registers and a downward-growing stack.
//!
//! [`memory::Memory`] holds the RAM image, usually loaded from a program
//! file of newline-delimited binary patterns (see [`memory::parse`]).
//! [`processor::Processor`] runs the fetch-decode-execute loop over it
//! until the program halts or faults.

pub mod memory;
pub mod processor;
