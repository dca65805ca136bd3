//! ```text
//! # print8.ls8: print the number 8
//! 10000010 # LDI R0,8
//! 00000000
//! 00001000
//! 01000111 # PRN R0
//! 00000000
//! 00000001 # HLT
//! ```
//!
//! One instruction byte per line, written as eight `0`/`1` characters.
//! Everything after a `#` is a comment. Lines that are blank or not an
//! 8-bit pattern after comment stripping are skipped, not rejected, so a
//! malformed program loads partially instead of failing fast.

use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use super::{Byte, Memory, MEMORY_SIZE};

/// Errors the program loader can produce.
///
/// Malformed lines are not among them; the format skips those.
#[derive(Debug)]
pub enum ParseError {
    /// The program has more instruction bytes than the machine has memory.
    ProgramTooLarge { line: usize },
    /// The program file could not be read.
    Io(io::Error),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::ProgramTooLarge { line } => write!(
                f,
                "program does not fit in {} bytes of memory (line {})",
                MEMORY_SIZE, line
            ),
            ParseError::Io(err) => write!(f, "failed to read program: {}", err),
        }
    }
}

impl error::Error for ParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ParseError::Io(err) => Some(err),
            ParseError::ProgramTooLarge { .. } => None,
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(err: io::Error) -> Self {
        ParseError::Io(err)
    }
}

/// Tries to parse one comment-stripped line as an instruction byte.
///
/// A significant line is exactly eight `0`/`1` characters. The
/// starts-with check is not redundant: `from_str_radix` accepts a
/// leading sign, which the format does not.
fn parse_pattern(code: &str) -> Option<Byte> {
    if !code.starts_with('0') && !code.starts_with('1') {
        return None;
    }
    if code.len() != 8 {
        return None;
    }
    Byte::from_str_radix(code, 2).ok()
}

impl FromStr for Memory {
    type Err = ParseError;

    /// Parses program text into a fresh memory image, instruction bytes
    /// at address 0 upward in line order.
    fn from_str(s: &str) -> Result<Memory, ParseError> {
        let mut memory = Memory::default();
        let mut address: usize = 0;

        for (nr, raw) in s.lines().enumerate() {
            let line_nr = nr + 1;
            let code = match raw.find('#') {
                Some(comment) => &raw[..comment],
                None => raw,
            };
            let code = code.trim();
            if code.is_empty() {
                continue;
            }

            let byte = match parse_pattern(code) {
                Some(byte) => byte,
                None => {
                    log::debug!("[{}] not an 8-bit pattern, skipped: {:?}", line_nr, code);
                    continue;
                }
            };

            if address >= MEMORY_SIZE {
                return Err(ParseError::ProgramTooLarge { line: line_nr });
            }
            log::debug!("[{}] 0b{:08b} -> {:#04x}", line_nr, byte, address);
            memory.data[address] = byte;
            address += 1;
        }

        Ok(memory)
    }
}

impl Memory {
    /// Loads a program file into a fresh memory image.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Memory, ParseError> {
        fs::read_to_string(path)?.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    #[test]
    fn parse_print8() -> Result<()> {
        let data = "\
            # print8.ls8: print the number 8\n\
            \n\
            10000010 # LDI R0,8\n\
            00000000\n\
            00001000\n\
            01000111 # PRN R0\n\
            00000000\n\
            00000001 # HLT\n";

        let mem: Memory = data.parse()?;

        assert_eq!(
            &mem.data[..6],
            &[0b10000010, 0, 8, 0b01000111, 0, 0b00000001]
        );
        assert_eq!(mem.data[6], 0);

        Ok(())
    }

    #[test]
    fn comment_only_and_blank_lines_load_nothing() -> Result<()> {
        let mem: Memory = "# just a comment\n\n   \n# another\n".parse()?;
        assert_eq!(mem, Memory::default());

        Ok(())
    }

    #[test]
    fn malformed_lines_are_skipped() -> Result<()> {
        // Seven chars, nine chars, hex digits, a stray sign (which
        // from_str_radix alone would accept), inner whitespace, and a
        // trailing word without a comment marker.
        let data = "\
            1010101\n\
            101010101\n\
            1000001f\n\
            +1000010\n\
            1000 010\n\
            10000010 LDI\n\
            00001000\n";

        let mem: Memory = data.parse()?;

        // Only the final line is a valid pattern; it lands at address 0.
        assert_eq!(mem.data[0], 0b00001000);
        assert_eq!(mem.data[1], 0);

        Ok(())
    }

    #[test]
    fn skipped_lines_do_not_leave_holes() -> Result<()> {
        let data = "00000001\nbogus\n00000010\n";

        let mem: Memory = data.parse()?;

        assert_eq!(&mem.data[..3], &[1, 2, 0]);

        Ok(())
    }

    #[test]
    fn program_longer_than_memory_is_rejected() {
        let mut data = String::new();
        for _ in 0..MEMORY_SIZE + 1 {
            data.push_str("00000000\n");
        }

        match data.parse::<Memory>() {
            Err(ParseError::ProgramTooLarge { line }) => assert_eq!(line, MEMORY_SIZE + 1),
            other => panic!("expected ProgramTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn program_filling_memory_exactly_loads() -> Result<()> {
        let mut data = String::new();
        for _ in 0..MEMORY_SIZE {
            data.push_str("11111111\n");
        }

        let mem: Memory = data.parse()?;

        assert_eq!(mem.data[MEMORY_SIZE - 1], 0xFF);

        Ok(())
    }
}
