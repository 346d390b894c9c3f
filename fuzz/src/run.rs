#![no_main]

use cpu::{Cpu, Error, Exit, Op, SP};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut vm = Cpu::new();
    if vm.load(data).is_err() {
        return;
    }

    // Halt if we take more than 65K cycles
    let mut out: Vec<u8> = vec![];
    let r = vm.run_until(&mut out, |_vm, _dev, i| i > 65536);

    let mut failed = false;
    match r {
        Ok(Exit::Halted) => {
            let op = Op::decode(vm.ram_read(usize::from(vm.pc())));
            if op != Some(Op::Hlt) {
                println!("halted on {op:?} at {:#04x}", vm.pc());
                failed = true;
            }
        }
        Ok(Exit::Stopped) => (),
        Err(Error::BadInstruction { opcode, trace }) => {
            if Op::decode(opcode).is_some() || trace.pc != vm.pc() {
                println!("bogus bad instruction {opcode:#04x}: {trace}");
                failed = true;
            }
        }
        Err(e) => {
            println!("unexpected error: {e}");
            failed = true;
        }
    }
    if vm.flags().bits() & !0b111 != 0 {
        println!("reserved flag bits set: {:#010b}", vm.flags().bits());
        failed = true;
    }
    if failed {
        print!("Instructions:\n  ");
        for (i, d) in data.iter().enumerate() {
            let name = Op::decode(*d).map(|op| op.mnemonic()).unwrap_or("??");
            print!("{}{name}", if i == 0 { "" } else { " " });
        }
        println!();
        println!("  SP = {:#04x}", vm.reg(SP));
        panic!("invariant violated");
    }
});
