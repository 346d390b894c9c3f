use ls8_cpu::{Cpu, Error, Exit, program};
use std::path::Path;

fn load(name: &str) -> Cpu {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")
        .expect("CARGO_MANIFEST_DIR not set");
    let path = Path::new(&manifest_dir)
        .parent()
        .expect("missing parent directory")
        .join(format!("programs/{name}.ls8"));
    let text =
        std::fs::read_to_string(&path).expect("could not read program");
    let bytes = program::parse(&text).expect("failed to parse program");

    let mut vm = Cpu::new();
    vm.load(&bytes).expect("program does not fit in RAM");
    vm
}

fn run_and_check(name: &str, expected: &[u8]) {
    let mut vm = load(name);
    let mut out: Vec<u8> = vec![];
    let r = vm.run_until(&mut out, |_, _, i| i > 100_000);
    assert_eq!(r, Ok(Exit::Halted), "{name} did not halt");
    assert_eq!(out, expected, "bad output from {name}");
}

#[test]
fn print8() {
    run_and_check("print8", &[8]);
}

#[test]
fn mult() {
    run_and_check("mult", &[72]);
}

#[test]
fn stack() {
    run_and_check("stack", &[2, 4, 1]);
}

#[test]
fn call() {
    run_and_check("call", &[20, 30, 36, 60]);
    let mut vm = load("call");
    vm.run(&mut Vec::<u8>::new()).unwrap();
    assert_eq!(vm.sp(), ls8_cpu::SP_INIT);
}

#[test]
fn cmp() {
    run_and_check("cmp", &[1, 2, 3]);
}

#[test]
fn countdown() {
    run_and_check("countdown", &[0]);
}

#[test]
fn bad() {
    let mut vm = load("bad");
    let mut out: Vec<u8> = vec![];
    let err = vm.run(&mut out).unwrap_err();
    assert_eq!(out, [5]);
    match err {
        Error::BadInstruction { opcode, trace } => {
            assert_eq!(opcode, 0xff);
            assert_eq!(
                trace.to_string(),
                "TRACE: 05 | 00 | FF 01 00 | 05 00 00 00 00 00 00 F4"
            );
        }
        e => panic!("unexpected error {e:?}"),
    }
}
