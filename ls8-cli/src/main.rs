use std::io::Write;
use std::path::PathBuf;

use cpu::{Cpu, Device, Error, Exit, program};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

/// LS8 runner
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Program to load and execute, one binary byte per line
    program: PathBuf,

    /// Log the CPU state before every instruction
    ///
    /// Trace lines are logged at `info` level, so they are hidden if
    /// `LS8_LOG` is set to `warn` or quieter.
    #[clap(long)]
    trace: bool,

    /// Stop after executing this many instructions
    #[clap(long)]
    max_steps: Option<usize>,
}

/// Prints `PRN` values to `stdout`, one per line
struct Console<W> {
    out: W,
    err: Option<std::io::Error>,
}

impl<W: Write> Device for Console<W> {
    fn print(&mut self, value: u8) {
        if self.err.is_none() {
            self.err = writeln!(self.out, "{value}").err();
        }
    }
}

fn main() -> Result<()> {
    let env = env_logger::Env::default()
        .filter_or("LS8_LOG", "info")
        .write_style_or("LS8_LOG", "always");
    env_logger::init_from_env(env);

    let args = Args::parse();
    let text = std::fs::read_to_string(&args.program)
        .with_context(|| format!("failed to read {:?}", args.program))?;
    let rom = program::parse(&text)
        .with_context(|| format!("failed to parse {:?}", args.program))?;

    let mut vm = Cpu::new();
    vm.load(&rom)?;
    info!("loaded {} bytes from {:?}", rom.len(), args.program);

    let mut dev = Console {
        out: std::io::stdout().lock(),
        err: None,
    };
    let start = std::time::Instant::now();
    let r = vm.run_until(&mut dev, |vm, _dev, i| {
        if args.trace {
            info!("{}", vm.trace());
        }
        args.max_steps.is_some_and(|n| i >= n)
    });
    dev.out.flush().context("failed to flush stdout")?;
    if let Some(e) = dev.err.take() {
        return Err(e).context("failed to write to stdout");
    }
    drop(dev);

    match r {
        Ok(Exit::Halted) => {
            info!("halted at {:#04x} after {:?}", vm.pc(), start.elapsed());
        }
        Ok(Exit::Stopped) => {
            warn!(
                "stopped at {:#04x} after {} instructions",
                vm.pc(),
                args.max_steps.unwrap_or_default()
            );
        }
        Err(Error::BadInstruction { opcode, trace }) => {
            println!("Bad instruction {opcode:#04x}");
            println!("{trace}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn run(rom: &[u8]) -> Vec<u8> {
        let mut vm = Cpu::new();
        vm.load(rom).unwrap();
        let mut dev = Console {
            out: Vec::<u8>::new(),
            err: None,
        };
        vm.run(&mut dev).unwrap();
        assert!(dev.err.is_none());
        dev.out
    }

    #[test]
    fn prints_decimal_lines() {
        let out = run(&[
            0x82, 0, 8, // LDI R0, 8
            0x82, 1, 9, // LDI R1, 9
            0xa2, 0, 1, // MUL R0, R1
            0x47, 0, // PRN R0
            0x47, 1, // PRN R1
            0x01, // HLT
        ]);
        assert_eq!(out, b"72\n9\n");
    }

    #[test]
    fn prints_full_byte_range() {
        let out = run(&[0x82, 0, 255, 0x47, 0, 0x82, 0, 0, 0x47, 0, 0x01]);
        assert_eq!(String::from_utf8(out).unwrap(), "255\n0\n");
    }
}
