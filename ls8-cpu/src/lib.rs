//! LS8 virtual machine
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

#[cfg(feature = "alloc")]
extern crate alloc;

mod alu;
#[cfg(feature = "alloc")]
pub mod program;

pub use alu::{AluOp, AluOutput, Flags, UnsupportedOperation};

use core::fmt;
use static_assertions::const_assert_eq;
use thiserror::Error;

/// Size of RAM, in bytes
pub const RAM_SIZE: usize = 256;

/// Number of general-purpose registers
pub const REGISTER_COUNT: usize = 8;

/// Index of the register used as the stack pointer
pub const SP: usize = 7;

/// Value of the stack pointer at boot
///
/// The stack grows down from here; nothing stops it from running into the
/// program below.
pub const SP_INIT: u8 = 0xf4;

// The program counter and stack pointer are bytes, so they can address all
// of RAM and nothing more
const_assert_eq!(RAM_SIZE, u8::MAX as usize + 1);
const_assert_eq!(REGISTER_COUNT, 1 << 3);

/// A single decoded LS8 instruction
///
/// The two high bits of each opcode are its operand count (`AABCDDDD`
/// encoding), which is checked in the unit tests.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    /// Halt
    Hlt,
    /// Return from subroutine
    Ret,
    /// Push a register onto the stack
    Push,
    /// Pop the stack into a register
    Pop,
    /// Print a register as a decimal number
    Prn,
    /// Call the subroutine at the address in a register
    Call,
    /// Jump to the address in a register
    Jmp,
    /// Jump if the `E` flag is set
    Jeq,
    /// Jump if the `E` flag is clear
    Jne,
    /// Load an immediate value into a register
    Ldi,
    /// Arithmetic or comparison
    Alu(AluOp),
}

impl Op {
    /// Every instruction known to the CPU
    pub const ALL: [Op; 13] = [
        Op::Hlt,
        Op::Ret,
        Op::Push,
        Op::Pop,
        Op::Prn,
        Op::Call,
        Op::Jmp,
        Op::Jeq,
        Op::Jne,
        Op::Ldi,
        Op::Alu(AluOp::Add),
        Op::Alu(AluOp::Mul),
        Op::Alu(AluOp::Cmp),
    ];

    /// Looks up an opcode, returning `None` if it isn't an instruction
    #[inline]
    pub const fn decode(opcode: u8) -> Option<Self> {
        let op = match opcode {
            0x01 => Op::Hlt,
            0x11 => Op::Ret,
            0x45 => Op::Push,
            0x46 => Op::Pop,
            0x47 => Op::Prn,
            0x50 => Op::Call,
            0x54 => Op::Jmp,
            0x55 => Op::Jeq,
            0x56 => Op::Jne,
            0x82 => Op::Ldi,
            0xa0 => Op::Alu(AluOp::Add),
            0xa2 => Op::Alu(AluOp::Mul),
            0xa7 => Op::Alu(AluOp::Cmp),
            _ => return None,
        };
        Some(op)
    }

    /// Returns the opcode byte for this instruction
    pub const fn opcode(self) -> u8 {
        match self {
            Op::Hlt => 0x01,
            Op::Ret => 0x11,
            Op::Push => 0x45,
            Op::Pop => 0x46,
            Op::Prn => 0x47,
            Op::Call => 0x50,
            Op::Jmp => 0x54,
            Op::Jeq => 0x55,
            Op::Jne => 0x56,
            Op::Ldi => 0x82,
            Op::Alu(a) => a.opcode(),
        }
    }

    /// Returns the assembler mnemonic
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Op::Hlt => "HLT",
            Op::Ret => "RET",
            Op::Push => "PUSH",
            Op::Pop => "POP",
            Op::Prn => "PRN",
            Op::Call => "CALL",
            Op::Jmp => "JMP",
            Op::Jeq => "JEQ",
            Op::Jne => "JNE",
            Op::Ldi => "LDI",
            Op::Alu(a) => a.mnemonic(),
        }
    }

    /// Number of operand bytes following the opcode
    pub const fn operands(self) -> u8 {
        self.opcode() >> 6
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Snapshot of the CPU state, used for diagnostics
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Trace {
    /// Program counter
    pub pc: u8,
    /// Flags register
    pub flags: Flags,
    /// Bytes at `PC`, `PC+1` and `PC+2`
    ///
    /// Bytes past the end of RAM read as zero.
    pub bytes: [u8; 3],
    /// General-purpose registers
    pub reg: [u8; REGISTER_COUNT],
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.bytes;
        write!(
            f,
            "TRACE: {:02X} | {:02X} | {a:02X} {b:02X} {c:02X} |",
            self.pc,
            self.flags.bits(),
        )?;
        for r in self.reg {
            write!(f, " {r:02X}")?;
        }
        Ok(())
    }
}

/// Errors which stop the CPU
#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The program counter landed on a byte which isn't an opcode
    #[error("bad instruction {opcode:#04x} at address {addr:#04x}", addr = .trace.pc)]
    BadInstruction {
        /// Offending byte
        opcode: u8,
        /// CPU state when the byte was fetched
        trace: Trace,
    },

    /// The program doesn't fit in RAM
    #[error("program is {len} bytes, but RAM only holds {max}", max = RAM_SIZE)]
    ProgramTooLarge {
        /// Length of the rejected program
        len: usize,
    },
}

/// Outcome of a single [`Cpu::step`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// The instruction executed and the CPU can keep going
    Running,
    /// The CPU executed `HLT`
    Halted,
}

/// Reason why [`Cpu::run_until`] returned
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Exit {
    /// The CPU executed `HLT`
    Halted,
    /// The caller's predicate asked to stop
    Stopped,
}

/// Trait for the host side of the CPU
pub trait Device {
    /// Receives a register value printed with `PRN`
    fn print(&mut self, value: u8);
}

/// Device which does nothing
pub struct EmptyDevice;
impl Device for EmptyDevice {
    fn print(&mut self, _value: u8) {
        // nothing to do here
    }
}

/// Collects printed values, in order
#[cfg(feature = "alloc")]
impl Device for alloc::vec::Vec<u8> {
    fn print(&mut self, value: u8) {
        self.push(value);
    }
}

/// The LS8 CPU, along with its RAM
#[derive(Clone)]
pub struct Cpu {
    /// 256 bytes of RAM, holding both program and stack
    ram: [u8; RAM_SIZE],
    /// General-purpose registers; `R7` is the stack pointer
    reg: [u8; REGISTER_COUNT],
    /// Address of the next opcode
    pc: u8,
    fl: Flags,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("pc", &self.pc)
            .field("fl", &self.fl)
            .field("reg", &self.reg)
            .finish_non_exhaustive()
    }
}

impl Cpu {
    /// Builds a new CPU with zeroed RAM and registers
    ///
    /// The stack pointer starts at [`SP_INIT`].
    pub fn new() -> Self {
        let mut reg = [0u8; REGISTER_COUNT];
        reg[SP] = SP_INIT;
        Self {
            ram: [0u8; RAM_SIZE],
            reg,
            pc: 0,
            fl: Flags::default(),
        }
    }

    /// Copies a program into RAM, starting at address 0
    ///
    /// Returns an error (and leaves RAM unchanged) if the program is larger
    /// than RAM.
    pub fn load(&mut self, program: &[u8]) -> Result<(), Error> {
        let Some(dst) = self.ram.get_mut(..program.len()) else {
            return Err(Error::ProgramTooLarge { len: program.len() });
        };
        dst.copy_from_slice(program);
        Ok(())
    }

    /// Reads a byte from RAM
    ///
    /// Addresses past the end of RAM read as zero.
    #[inline]
    pub fn ram_read(&self, addr: usize) -> u8 {
        self.ram.get(addr).copied().unwrap_or(0)
    }

    /// Writes a byte to RAM
    ///
    /// Writes past the end of RAM are dropped.
    #[inline]
    pub fn ram_write(&mut self, addr: usize, v: u8) {
        if let Some(b) = self.ram.get_mut(addr) {
            *b = v;
        }
    }

    /// Shared borrow of the entire RAM array
    #[inline]
    pub fn ram(&self) -> &[u8; RAM_SIZE] {
        &self.ram
    }

    /// Returns the program counter
    #[inline]
    pub fn pc(&self) -> u8 {
        self.pc
    }

    /// Moves the program counter
    #[inline]
    pub fn set_pc(&mut self, pc: u8) {
        self.pc = pc;
    }

    /// Reads a register
    ///
    /// # Panics
    /// If `i >= REGISTER_COUNT`
    #[inline]
    pub fn reg(&self, i: usize) -> u8 {
        self.reg[i]
    }

    /// Writes a register
    ///
    /// # Panics
    /// If `i >= REGISTER_COUNT`
    #[inline]
    pub fn set_reg(&mut self, i: usize, v: u8) {
        self.reg[i] = v;
    }

    /// Shared borrow of the register file
    #[inline]
    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.reg
    }

    /// Returns the stack pointer (`R7`)
    #[inline]
    pub fn sp(&self) -> u8 {
        self.reg[SP]
    }

    /// Returns the flags register
    #[inline]
    pub fn flags(&self) -> Flags {
        self.fl
    }

    /// Captures the current CPU state
    pub fn trace(&self) -> Trace {
        let pc = usize::from(self.pc);
        Trace {
            pc: self.pc,
            flags: self.fl,
            bytes: [
                self.ram_read(pc),
                self.ram_read(pc + 1),
                self.ram_read(pc + 2),
            ],
            reg: self.reg,
        }
    }

    /// Reads a byte from RAM at the program counter
    #[inline]
    fn next(&self, pc: &mut u8) -> u8 {
        let out = self.ram[usize::from(*pc)];
        *pc = pc.wrapping_add(1);
        out
    }

    /// Reads a register operand at the program counter
    ///
    /// Only the low three bits select the register.
    #[inline]
    fn next_reg(&self, pc: &mut u8) -> usize {
        usize::from(self.next(pc) & 0b111)
    }

    #[inline]
    fn push(&mut self, v: u8) {
        let sp = self.reg[SP].wrapping_sub(1);
        self.reg[SP] = sp;
        self.ram[usize::from(sp)] = v;
    }

    #[inline]
    fn pop(&mut self) -> u8 {
        let sp = self.reg[SP];
        self.reg[SP] = sp.wrapping_add(1);
        self.ram[usize::from(sp)]
    }

    /// Executes a single instruction at the program counter
    ///
    /// On `HLT`, the program counter is left pointing at the `HLT` opcode.
    pub fn step<D: Device>(&mut self, dev: &mut D) -> Result<Step, Error> {
        let mut pc = self.pc;
        let opcode = self.next(&mut pc);
        let Some(op) = Op::decode(opcode) else {
            return Err(Error::BadInstruction {
                opcode,
                trace: self.trace(),
            });
        };
        match self.op(op, dev, pc) {
            Some(next) => {
                self.pc = next;
                Ok(Step::Running)
            }
            None => Ok(Step::Halted),
        }
    }

    /// Runs the CPU from the current program counter until it halts
    pub fn run<D: Device>(&mut self, dev: &mut D) -> Result<(), Error> {
        while self.step(dev)? == Step::Running {}
        Ok(())
    }

    /// Runs the CPU until it halts or `f` returns `true`
    ///
    /// `f` is called before each fetch, with the number of instructions
    /// executed so far.
    pub fn run_until<D: Device, F>(
        &mut self,
        dev: &mut D,
        mut f: F,
    ) -> Result<Exit, Error>
    where
        F: FnMut(&Cpu, &mut D, usize) -> bool,
    {
        let mut i = 0;
        loop {
            if f(self, dev, i) {
                return Ok(Exit::Stopped);
            }
            if self.step(dev)? == Step::Halted {
                return Ok(Exit::Halted);
            }
            i += 1;
        }
    }

    /// Executes a single decoded operation
    ///
    /// `pc` points just past the opcode; returns the next program counter,
    /// or `None` to halt.
    #[inline]
    fn op<D: Device>(&mut self, op: Op, dev: &mut D, pc: u8) -> Option<u8> {
        match op {
            Op::Hlt => op::hlt(self, dev, pc),
            Op::Ret => op::ret(self, dev, pc),
            Op::Push => op::push(self, dev, pc),
            Op::Pop => op::pop(self, dev, pc),
            Op::Prn => op::prn(self, dev, pc),
            Op::Call => op::call(self, dev, pc),
            Op::Jmp => op::jmp(self, dev, pc),
            Op::Jeq => op::jeq(self, dev, pc),
            Op::Jne => op::jne(self, dev, pc),
            Op::Ldi => op::ldi(self, dev, pc),
            Op::Alu(a) => op::alu(self, dev, pc, a),
        }
    }
}

mod op {
    use super::*;

    /// Halt
    ///
    /// ```text
    /// HLT
    /// ```
    ///
    /// Stops the CPU. The program counter is not advanced.
    #[inline]
    pub fn hlt(_: &mut Cpu, _: &mut dyn Device, _: u8) -> Option<u8> {
        None
    }

    /// Return
    ///
    /// ```text
    /// RET
    /// ```
    ///
    /// Pops the return address from the stack into `PC`.
    #[inline]
    pub fn ret(vm: &mut Cpu, _: &mut dyn Device, _: u8) -> Option<u8> {
        Some(vm.pop())
    }

    /// Push
    ///
    /// ```text
    /// PUSH reg
    /// ```
    ///
    /// Decrements `SP`, then copies `reg` to the address in `SP`.
    #[inline]
    pub fn push(vm: &mut Cpu, _: &mut dyn Device, mut pc: u8) -> Option<u8> {
        let r = vm.next_reg(&mut pc);
        // Not `Cpu::push`: `PUSH R7` must store the decremented `SP`
        vm.reg[SP] = vm.reg[SP].wrapping_sub(1);
        vm.ram[usize::from(vm.reg[SP])] = vm.reg[r];
        Some(pc)
    }

    /// Pop
    ///
    /// ```text
    /// POP reg
    /// ```
    ///
    /// Copies the value at the address in `SP` into `reg`, then increments
    /// `SP`.
    #[inline]
    pub fn pop(vm: &mut Cpu, _: &mut dyn Device, mut pc: u8) -> Option<u8> {
        let r = vm.next_reg(&mut pc);
        // Not `Cpu::pop`: `POP R7` increments `SP` after the load
        vm.reg[r] = vm.ram[usize::from(vm.reg[SP])];
        vm.reg[SP] = vm.reg[SP].wrapping_add(1);
        Some(pc)
    }

    /// Print
    ///
    /// ```text
    /// PRN reg
    /// ```
    ///
    /// Sends the value of `reg` to the device.
    #[inline]
    pub fn prn(vm: &mut Cpu, dev: &mut dyn Device, mut pc: u8) -> Option<u8> {
        let r = vm.next_reg(&mut pc);
        dev.print(vm.reg[r]);
        Some(pc)
    }

    /// Call
    ///
    /// ```text
    /// CALL reg
    /// ```
    ///
    /// Pushes the address of the following instruction (`PC+2`), then jumps
    /// to the address in `reg`. The target is read before the push.
    #[inline]
    pub fn call(vm: &mut Cpu, _: &mut dyn Device, mut pc: u8) -> Option<u8> {
        let r = vm.next_reg(&mut pc);
        let target = vm.reg[r];
        vm.push(pc);
        Some(target)
    }

    /// Jump
    ///
    /// ```text
    /// JMP reg
    /// ```
    #[inline]
    pub fn jmp(vm: &mut Cpu, _: &mut dyn Device, mut pc: u8) -> Option<u8> {
        let r = vm.next_reg(&mut pc);
        Some(vm.reg[r])
    }

    /// Jump if Equal
    ///
    /// ```text
    /// JEQ reg
    /// ```
    ///
    /// Jumps to the address in `reg` if the `E` flag is set, otherwise moves
    /// to `PC+2`.
    #[inline]
    pub fn jeq(vm: &mut Cpu, _: &mut dyn Device, mut pc: u8) -> Option<u8> {
        let r = vm.next_reg(&mut pc);
        Some(if vm.fl.equal() { vm.reg[r] } else { pc })
    }

    /// Jump if Not Equal
    ///
    /// ```text
    /// JNE reg
    /// ```
    ///
    /// Jumps to the address in `reg` if the `E` flag is clear, otherwise
    /// moves to `PC+2`.
    #[inline]
    pub fn jne(vm: &mut Cpu, _: &mut dyn Device, mut pc: u8) -> Option<u8> {
        let r = vm.next_reg(&mut pc);
        Some(if vm.fl.equal() { pc } else { vm.reg[r] })
    }

    /// Load Immediate
    ///
    /// ```text
    /// LDI reg imm
    /// ```
    #[inline]
    pub fn ldi(vm: &mut Cpu, _: &mut dyn Device, mut pc: u8) -> Option<u8> {
        let r = vm.next_reg(&mut pc);
        vm.reg[r] = vm.next(&mut pc);
        Some(pc)
    }

    /// ALU operations
    ///
    /// ```text
    /// ADD a b
    /// MUL a b
    /// CMP a b
    /// ```
    ///
    /// `ADD` and `MUL` store into `a`; `CMP` only touches the flags.
    #[inline]
    pub fn alu(
        vm: &mut Cpu,
        _: &mut dyn Device,
        mut pc: u8,
        op: AluOp,
    ) -> Option<u8> {
        let a = vm.next_reg(&mut pc);
        let b = vm.next_reg(&mut pc);
        match op.eval(vm.reg[a], vm.reg[b]) {
            AluOutput::Register(v) => vm.reg[a] = v,
            AluOutput::Flags(f) => vm.fl = f,
        }
        Some(pc)
    }
}

#[cfg(all(feature = "alloc", test))]
mod test {
    use super::*;

    /// Simple assembler for a line of textual opcodes
    ///
    /// Tokens are mnemonics, registers (`R0`-`R7`), or two-digit hex bytes.
    fn assemble(s: &str) -> Result<Vec<u8>, &str> {
        let mut out: Vec<u8> = vec![];
        for t in s.split_whitespace() {
            if let Some(op) = Op::ALL.iter().find(|op| op.mnemonic() == t) {
                out.push(op.opcode());
            } else if let Some(r) = t.strip_prefix('R') {
                out.push(r.parse().map_err(|_| t)?);
            } else if t.len() == 2 {
                out.push(u8::from_str_radix(t, 16).map_err(|_| t)?);
            } else {
                return Err(t);
            }
        }
        Ok(out)
    }

    fn parse_and_test(s: &str) {
        let Some((program, expected)) = s.split_once('(') else {
            return;
        };
        let expected = expected.trim().strip_suffix(')').unwrap();
        let expected: Vec<u8> = expected
            .split_whitespace()
            .map(|b| u8::from_str_radix(b, 16).unwrap())
            .collect();

        let program = assemble(program).unwrap();
        let mut vm = Cpu::new();
        vm.load(&program).unwrap();
        let mut out: Vec<u8> = vec![];
        let r = vm.run_until(&mut out, |_, _, i| i > 1000);
        assert_eq!(r, Ok(Exit::Halted), "{:?} did not halt", s.trim());
        if out != expected {
            panic!(
                "failed to execute {:?}: got {out:2x?}, expected {expected:2x?}",
                s.trim()
            );
        }
    }

    #[test]
    fn opcodes() {
        const TEST_SUITE: &str = "
            LDI R0 08 PRN R0 HLT                          ( 08 )
            LDI R0 08 LDI R1 09 MUL R0 R1 PRN R0 HLT      ( 48 )
            LDI R0 10 LDI R1 10 MUL R0 R1 PRN R0 HLT      ( 00 )
            LDI R0 1a LDI R1 2e ADD R0 R1 PRN R0 HLT      ( 48 )
            LDI R0 ff LDI R1 02 ADD R0 R1 PRN R0 PRN R1 HLT  ( 01 02 )
            LDI R0 2a PUSH R0 LDI R0 00 POP R0 PRN R0 HLT ( 2a )
            LDI R0 01 LDI R1 02 PUSH R0 PUSH R1 POP R0 POP R1 PRN R0 PRN R1 HLT  ( 02 01 )
            LDI R0 08 JMP R0 PRN R0 HLT PRN R0 HLT        ( 08 )
            LDI R1 08 CALL R1 PRN R0 HLT LDI R0 2a RET    ( 2a )
            LDI R0 05 LDI R1 05 LDI R2 11 CMP R0 R1 JEQ R2 PRN R0 HLT LDI R3 07 PRN R3 HLT  ( 07 )
            LDI R0 05 LDI R1 06 LDI R2 11 CMP R0 R1 JEQ R2 PRN R0 HLT LDI R3 07 PRN R3 HLT  ( 05 )
            LDI R0 05 LDI R1 06 LDI R2 11 CMP R0 R1 JNE R2 PRN R0 HLT LDI R3 07 PRN R3 HLT  ( 07 )
            LDI R0 05 LDI R1 05 LDI R2 11 CMP R0 R1 JNE R2 PRN R0 HLT LDI R3 07 PRN R3 HLT  ( 05 )
            LDI R0 03 LDI R1 09 CMP R0 R1 PRN R1 HLT      ( 09 )
            HLT PRN R7                                    ( )
            PRN R7 HLT                                    ( f4 )
            PUSH R0 PRN R7 POP R0 PRN R7 HLT              ( f3 f4 )
        ";
        for line in TEST_SUITE.lines() {
            parse_and_test(line);
        }
    }

    #[test]
    fn opcode_table() {
        for op in Op::ALL {
            assert_eq!(Op::decode(op.opcode()), Some(op), "{op}");
        }
        let known = (0..=u8::MAX).filter(|b| Op::decode(*b).is_some()).count();
        assert_eq!(known, Op::ALL.len());

        let arity = |m: &str| {
            Op::ALL.into_iter().find(|op| op.mnemonic() == m).unwrap()
        };
        for (m, n) in [
            ("HLT", 0),
            ("RET", 0),
            ("PUSH", 1),
            ("POP", 1),
            ("PRN", 1),
            ("CALL", 1),
            ("JMP", 1),
            ("JEQ", 1),
            ("JNE", 1),
            ("LDI", 2),
            ("ADD", 2),
            ("MUL", 2),
            ("CMP", 2),
        ] {
            assert_eq!(arity(m).operands(), n, "{m}");
        }
    }

    #[test]
    fn boot_state() {
        let vm = Cpu::new();
        assert_eq!(vm.pc(), 0);
        assert_eq!(vm.sp(), 0xf4);
        assert_eq!(vm.registers(), &[0, 0, 0, 0, 0, 0, 0, 0xf4]);
        assert_eq!(vm.flags().bits(), 0);
        assert!(vm.ram().iter().all(|b| *b == 0));
    }

    #[test]
    fn ram_bounds() {
        let mut vm = Cpu::new();
        vm.ram_write(0xff, 0x12);
        assert_eq!(vm.ram_read(0xff), 0x12);
        assert_eq!(vm.ram_read(256), 0);
        assert_eq!(vm.ram_read(300), 0);

        vm.ram_write(300, 0x34);
        assert_eq!(vm.ram_read(300), 0);
        assert!(vm.ram()[..0xff].iter().all(|b| *b == 0));
    }

    #[test]
    fn load() {
        let mut vm = Cpu::new();
        vm.load(&[0x82, 0x00, 0x08]).unwrap();
        assert_eq!(&vm.ram()[..4], &[0x82, 0x00, 0x08, 0x00]);

        assert!(vm.load(&[0u8; RAM_SIZE]).is_ok());

        let mut vm = Cpu::new();
        vm.load(&[0x01]).unwrap();
        assert_eq!(
            vm.load(&[0xaa; RAM_SIZE + 1]),
            Err(Error::ProgramTooLarge { len: 257 })
        );
        assert_eq!(vm.ram_read(0), 0x01);
        assert_eq!(vm.ram_read(1), 0x00);
    }

    #[test]
    fn multiply_and_print() {
        let mut vm = Cpu::new();
        vm.load(&[0x82, 0, 8, 0x82, 1, 9, 0xa2, 0, 1, 0x47, 0, 0x01])
            .unwrap();
        let mut out: Vec<u8> = vec![];
        vm.run(&mut out).unwrap();
        assert_eq!(out, [72]);
        assert_eq!(vm.pc(), 11);
    }

    #[test]
    fn bad_instruction() {
        let mut vm = Cpu::new();
        vm.load(&[0x82, 0, 5, 0x47, 0, 0xff, 0x01]).unwrap();
        let mut out: Vec<u8> = vec![];
        let err = vm.run(&mut out).unwrap_err();
        assert_eq!(out, [5]);

        let Error::BadInstruction { opcode, trace } = err else {
            panic!("unexpected error {err:?}");
        };
        assert_eq!(opcode, 0xff);
        assert_eq!(trace.pc, 5);
        assert_eq!(trace.bytes, [0xff, 0x01, 0x00]);
        assert_eq!(trace.reg[0], 5);
        assert_eq!(vm.pc(), 5);
        assert_eq!(
            err.to_string(),
            "bad instruction 0xff at address 0x05"
        );
    }

    #[test]
    fn trace_format() {
        let mut vm = Cpu::new();
        vm.load(&[0x82, 0x00, 0x08]).unwrap();
        vm.set_reg(3, 0xab);
        assert_eq!(
            vm.trace().to_string(),
            "TRACE: 00 | 00 | 82 00 08 | 00 00 00 AB 00 00 00 F4"
        );

        // Bytes past the end of RAM read as zero
        vm.ram_write(0xff, 0x47);
        vm.set_pc(0xff);
        assert_eq!(vm.trace().bytes, [0x47, 0, 0]);
    }

    #[test]
    fn step_advances_by_instruction_length() {
        let mut vm = Cpu::new();
        vm.load(&[0x82, 0, 8, 0x47, 0, 0x45, 0, 0x01]).unwrap();
        let mut dev = EmptyDevice;
        for pc in [3, 5, 7] {
            assert_eq!(vm.step(&mut dev), Ok(Step::Running));
            assert_eq!(vm.pc(), pc);
        }
        assert_eq!(vm.step(&mut dev), Ok(Step::Halted));
        assert_eq!(vm.pc(), 7);
        assert_eq!(vm.step(&mut dev), Ok(Step::Halted));
    }

    #[test]
    fn stack_pointer_as_operand() {
        let mut vm = Cpu::new();
        // 0: PUSH R7
        // 2: HLT
        vm.load(&[0x45, 7, 0x01]).unwrap();
        vm.run(&mut EmptyDevice).unwrap();
        assert_eq!(vm.sp(), SP_INIT - 1);
        assert_eq!(vm.ram_read(usize::from(SP_INIT - 1)), SP_INIT - 1);

        let mut vm = Cpu::new();
        // 0: LDI R0, 0x20
        // 3: PUSH R0
        // 5: POP R7
        // 7: HLT
        vm.load(&[0x82, 0, 0x20, 0x45, 0, 0x46, 7, 0x01]).unwrap();
        vm.run(&mut EmptyDevice).unwrap();
        assert_eq!(vm.sp(), 0x21);
    }

    #[test]
    fn push_pop_restores_stack_pointer() {
        for r in 0..SP {
            let mut vm = Cpu::new();
            vm.load(&[
                0x82, r as u8, 0x5a, // LDI r, 0x5a
                0x45, r as u8, // PUSH r
                0x82, r as u8, 0x00, // LDI r, 0
                0x46, r as u8, // POP r
                0x01,
            ])
            .unwrap();
            vm.run(&mut EmptyDevice).unwrap();
            assert_eq!(vm.reg(r), 0x5a);
            assert_eq!(vm.sp(), SP_INIT);
            assert_eq!(vm.ram_read(usize::from(SP_INIT) - 1), 0x5a);
        }
    }

    #[test]
    fn call_and_return() {
        let mut vm = Cpu::new();
        // 0: LDI R1, 8
        // 3: CALL R1
        // 5: HLT
        // 8: RET
        vm.load(&[0x82, 1, 8, 0x50, 1, 0x01, 0x00, 0x00, 0x11])
            .unwrap();
        let mut dev = EmptyDevice;
        vm.step(&mut dev).unwrap();
        vm.step(&mut dev).unwrap();
        assert_eq!(vm.pc(), 8);
        assert_eq!(vm.sp(), SP_INIT - 1);
        assert_eq!(vm.ram_read(usize::from(vm.sp())), 5);

        vm.step(&mut dev).unwrap();
        assert_eq!(vm.pc(), 5);
        assert_eq!(vm.sp(), SP_INIT);
        assert_eq!(vm.step(&mut dev), Ok(Step::Halted));
    }

    #[test]
    fn conditional_jumps_follow_equal_flag() {
        for (a, b) in [(1, 1), (1, 2), (2, 1), (0, 0xff)] {
            for (jump, taken_if_equal) in [(Op::Jeq, true), (Op::Jne, false)] {
                let mut vm = Cpu::new();
                // 0: LDI R0, a
                // 3: LDI R1, b
                // 6: LDI R2, 0x80
                // 9: CMP R0, R1
                // 12: J?? R2
                vm.load(&[
                    0x82, 0, a, 0x82, 1, b, 0x82, 2, 0x80, 0xa7, 0, 1,
                    jump.opcode(), 2,
                ])
                .unwrap();
                let mut dev = EmptyDevice;
                for _ in 0..5 {
                    vm.step(&mut dev).unwrap();
                }
                let taken = (a == b) == taken_if_equal;
                let expected = if taken { 0x80 } else { 14 };
                assert_eq!(vm.pc(), expected, "{jump} with {a} vs {b}");
            }
        }
    }

    #[test]
    fn run_until_stops_early() {
        let mut vm = Cpu::new();
        // 0: LDI R0, 0
        // 3: JMP R0
        vm.load(&[0x82, 0, 0, 0x54, 0]).unwrap();
        let mut n = 0;
        let r = vm.run_until(&mut EmptyDevice, |_, _, i| {
            n = i;
            i == 100
        });
        assert_eq!(r, Ok(Exit::Stopped));
        assert_eq!(n, 100);
    }

    #[test]
    fn operands_wrap_around_ram() {
        let mut vm = Cpu::new();
        vm.ram_write(0xfe, 0x82); // LDI R2, 0x33 (operands at 0xff, 0x00)
        vm.ram_write(0xff, 0x02);
        vm.ram_write(0x00, 0x33);
        vm.ram_write(0x01, 0x01);
        vm.set_pc(0xfe);
        vm.run(&mut EmptyDevice).unwrap();
        assert_eq!(vm.reg(2), 0x33);
        assert_eq!(vm.pc(), 0x01);
    }
}
