use criterion::{Criterion, criterion_group, criterion_main};
use ls8_cpu::{Cpu, EmptyDevice};

/// `programs/countdown.ls8`, counting down from `n`
fn countdown(n: u8) -> [u8; 20] {
    [
        0x82, 0, n, // LDI R0, n
        0x82, 1, 0xff, // LDI R1, 255
        0x82, 2, 0, // LDI R2, 0
        0x82, 3, 12, // LDI R3, LOOP
        0xa0, 0, 1, // LOOP: ADD R0, R1
        0xa7, 0, 2, // CMP R0, R2
        0x56, 3, // JNE R3
    ]
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut rom = countdown(255).to_vec();
    rom.push(0x01); // HLT
    c.bench_function("countdown", |b| {
        b.iter(|| {
            let mut vm = Cpu::new();
            vm.load(&rom).unwrap();
            vm.run(&mut EmptyDevice).unwrap();
            vm.reg(0)
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
