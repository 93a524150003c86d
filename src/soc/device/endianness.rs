/// Widest single access a register region accepts.
pub const MAX_ACCESS_BYTES: usize = 8;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    #[inline(always)]
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Endianness::Little
        } else {
            Endianness::Big
        }
    }

    /// Packs up to eight bytes into a zero-extended `u64`.
    #[inline(always)]
    pub fn decode_bytes(self, bytes: &[u8]) -> u64 {
        assert!(bytes.len() <= MAX_ACCESS_BYTES, "value exceeds 64 bits");
        if bytes.is_empty() {
            return 0;
        }
        let mut buf = [0u8; MAX_ACCESS_BYTES];
        match self {
            Endianness::Little => {
                buf[..bytes.len()].copy_from_slice(bytes);
                u64::from_le_bytes(buf)
            }
            Endianness::Big => {
                let start = MAX_ACCESS_BYTES - bytes.len();
                buf[start..].copy_from_slice(bytes);
                u64::from_be_bytes(buf)
            }
        }
    }

    /// Splits the low `byte_len` bytes of `value` into storage order. Only the
    /// first `byte_len` bytes of the returned array are meaningful.
    #[inline(always)]
    pub fn encode_bytes(self, value: u64, byte_len: usize) -> [u8; MAX_ACCESS_BYTES] {
        assert!(byte_len <= MAX_ACCESS_BYTES, "value exceeds 64 bits");
        let mut out = [0u8; MAX_ACCESS_BYTES];
        if byte_len == 0 {
            return out;
        }
        let masked = value & mask_bytes(byte_len);
        match self {
            Endianness::Little => {
                out[..byte_len].copy_from_slice(&masked.to_le_bytes()[..byte_len]);
            }
            Endianness::Big => {
                let start = MAX_ACCESS_BYTES - byte_len;
                out[..byte_len].copy_from_slice(&masked.to_be_bytes()[start..]);
            }
        }
        out
    }
}

#[inline(always)]
pub(crate) fn mask_bytes(byte_len: usize) -> u64 {
    if byte_len >= MAX_ACCESS_BYTES {
        u64::MAX
    } else {
        (1u64 << (byte_len * 8)) - 1
    }
}
