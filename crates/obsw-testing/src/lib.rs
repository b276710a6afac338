//! Helpers shared by unit tests across the workspace.
//! Not part of the public library surface.

/// Decodes a whitespace-separated hex string into bytes.
///
/// Panics on malformed input; intended for test vectors only.
pub fn hex_bytes(hex: &str) -> Vec<u8> {
    let compact: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    assert!(compact.len() % 2 == 0, "odd number of hex digits: {hex:?}");
    (0..compact.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&compact[i..i + 2], 16).expect("invalid hex digit"))
        .collect()
}

/// Hex test-vector literal: `hex!("00 05 05 01 10 aa bb")`.
#[macro_export]
macro_rules! hex {
    ($s:literal) => {
        $crate::hex_bytes($s)
    };
}

/// Initializes `env_logger` once for the calling test binary.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
