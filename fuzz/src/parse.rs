#![no_main]

use cpu::program;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(rom) = program::parse(text) else {
        return;
    };
    let lines = text
        .lines()
        .filter(|line| !program::sanitize(line).is_empty())
        .count();
    assert_eq!(rom.len(), lines, "one byte per non-empty line");
});
