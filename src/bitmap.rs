//! A dense bit set over a fixed universe, used for the optional inner-payload
//! L4 source-port whitelist (ports 0..65535).

use bitvec::boxed::BitBox;
use bitvec::order::Lsb0;

/// A fixed-size bit set. Indices outside `[0, n_bits)` are a programming
/// error: callers are expected to only ever index with values already
/// known to be in range (the classifier indexes with a 16-bit port against
/// a 65536-bit map).
pub struct Bitmap {
    bits: BitBox<u64, Lsb0>,
}

impl Bitmap {
    /// Allocate a bitmap of `n_bits`, all initially clear.
    pub fn alloc(n_bits: usize) -> Self {
        Self { bits: BitBox::from_bitslice(bitvec::bitvec![u64, Lsb0; 0; n_bits].as_bitslice()) }
    }

    pub fn set(&mut self, i: usize) {
        self.bits.set(i, true);
    }

    pub fn get(&self, i: usize) -> bool {
        self.bits[i]
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Explicit teardown, kept for parity with the other components' alloc/free
    /// lifecycle. `Drop` already does this; callers are not required to call it.
    pub fn free(self) {
        drop(self);
    }
}

/// Parse a comma-separated list of ports (`"80,443,8080"`) into a [`Bitmap`].
///
/// Returns the offending token on malformed input.
pub fn parse_port_list(raw: &str) -> Result<Bitmap, String> {
    let mut bitmap = Bitmap::alloc(65536);
    for token in raw.split(',') {
        let token = token.trim();
        let port: u16 = token.parse().map_err(|_| token.to_string())?;
        bitmap.set(port as usize);
    }
    Ok(bitmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_all_clear() {
        let b = Bitmap::alloc(65536);
        assert!(!b.get(0));
        assert!(!b.get(65535));
    }

    #[test]
    fn set_and_get_roundtrip() {
        let mut b = Bitmap::alloc(65536);
        b.set(443);
        assert!(b.get(443));
        assert!(!b.get(442));
        assert!(!b.get(444));
    }

    #[test]
    fn parse_port_list_accepts_comma_list() {
        let b = parse_port_list("443,8080").unwrap();
        assert!(b.get(443));
        assert!(b.get(8080));
        assert!(!b.get(80));
    }

    #[test]
    fn parse_port_list_rejects_garbage() {
        let err = parse_port_list("443,not-a-port").unwrap_err();
        assert_eq!(err, "not-a-port");
    }

    #[test]
    fn parse_port_list_rejects_out_of_range() {
        assert!(parse_port_list("70000").is_err());
    }
}
