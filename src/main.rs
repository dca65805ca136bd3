use std::env;
use std::io;
use std::path::PathBuf;

use color_eyre::eyre::{eyre, Result, WrapErr};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use ls8::memory::Memory;
use ls8::processor::Processor;

fn main() -> Result<()> {
    color_eyre::install()?;

    let mut level = LevelFilter::Warn;
    let mut path: Option<PathBuf> = None;
    for arg in env::args_os().skip(1) {
        if arg == "-v" || arg == "--verbose" {
            level = LevelFilter::Debug;
        } else if arg.to_string_lossy().starts_with('-') {
            return Err(eyre!("unknown option {}", arg.to_string_lossy()));
        } else if path.is_none() {
            path = Some(PathBuf::from(arg));
        } else {
            return Err(eyre!("expected exactly one program file"));
        }
    }
    let path = path.ok_or_else(|| eyre!("usage: ls8 [-v|--verbose] <program.ls8>"))?;

    SimpleLogger::new().with_level(level).init()?;

    let mut memory = Memory::from_file(&path)
        .wrap_err_with(|| format!("failed to load program {}", path.display()))?;

    let mut cpu = Processor::new();
    let stdout = io::stdout();
    cpu.execute_until_halt(&mut memory, &mut stdout.lock())
        .wrap_err("program faulted")?;

    Ok(())
}
