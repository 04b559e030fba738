//! Payload masking (RFC 6455 Section 5.3).
//!
//! The mask key travels on the wire as 4 bytes and is carried through the
//! crate as the little-endian `u32` of those bytes, so `key.to_le_bytes()`
//! yields them in wire order.

/// Byte-at-a-time XOR masking.
///
/// Reference implementation for [`apply_mask`].
#[inline]
pub fn apply_mask_bytewise(data: &mut [u8], key: u32) {
    let mask = key.to_le_bytes();
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// XOR `data` in place with the 4 bytes of `key`, repeating every 4 bytes.
///
/// Applying the same key twice restores the input.
///
/// # Example
///
/// ```
/// use wswire::protocol::mask::apply_mask;
///
/// let key = u32::from_le_bytes([0x37, 0xfa, 0x21, 0x3d]);
/// let mut data = b"Hello".to_vec();
/// apply_mask(&mut data, key);
/// assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
/// ```
#[inline]
pub fn apply_mask(data: &mut [u8], key: u32) {
    if key == 0 {
        return;
    }

    let word = u64::from(key) | (u64::from(key) << 32);
    let mut chunks = data.chunks_exact_mut(8);
    for chunk in &mut chunks {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(chunk);
        let masked = u64::from_le_bytes(bytes) ^ word;
        chunk.copy_from_slice(&masked.to_le_bytes());
    }

    // every chunk above is a multiple of 4 bytes long, so the tail starts at
    // key offset 0
    apply_mask_bytewise(chunks.into_remainder(), key);
}
