use tiledb_common::physical::PhysicalType;
use tiledb_common::{Error, Result};

/// Bridges a [PhysicalType] to the fixed-width native-endian byte encoding
/// the binary cell layout uses (§6: "Multi-byte integers are
/// platform-native endianness"). Kept local to this crate since the binary
/// cursor format, not the physical-type taxonomy itself, owns this concern.
pub trait BinaryCodec: PhysicalType {
    const SIZE: usize;

    fn read_ne(bytes: &[u8]) -> Self;
    fn write_ne(self, out: &mut Vec<u8>);

    /// Renders the value as a CSV field (§4.2's formatter, sentinel
    /// substitution excluded -- callers check `null`/`del_sentinel` first).
    fn format_text(self, precision: usize) -> String;

    /// Parses a CSV field back into a value; the inverse of
    /// [BinaryCodec::format_text] for non-sentinel tokens.
    fn parse_text(s: &str) -> std::result::Result<Self, String>;
}

macro_rules! binary_codec_impls {
    ($($T:ty),+) => {
        $(
            impl BinaryCodec for $T {
                const SIZE: usize = std::mem::size_of::<$T>();

                fn read_ne(bytes: &[u8]) -> Self {
                    <$T>::from_ne_bytes(bytes.try_into().expect(concat!(
                        "caller must pass exactly ", stringify!($T), "::SIZE bytes"
                    )))
                }

                fn write_ne(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_ne_bytes());
                }

                fn format_text(self, _precision: usize) -> String {
                    self.to_string()
                }

                fn parse_text(s: &str) -> std::result::Result<Self, String> {
                    s.parse::<$T>().map_err(|e| e.to_string())
                }
            }
        )+
    };
}

binary_codec_impls!(u8, u16, u32, u64, i8, i16, i32, i64);

macro_rules! binary_codec_float_impls {
    ($($T:ty),+) => {
        $(
            impl BinaryCodec for $T {
                const SIZE: usize = std::mem::size_of::<$T>();

                fn read_ne(bytes: &[u8]) -> Self {
                    <$T>::from_ne_bytes(bytes.try_into().expect(concat!(
                        "caller must pass exactly ", stringify!($T), "::SIZE bytes"
                    )))
                }

                fn write_ne(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_ne_bytes());
                }

                fn format_text(self, precision: usize) -> String {
                    format!("{self:.precision$}")
                }

                fn parse_text(s: &str) -> std::result::Result<Self, String> {
                    s.parse::<$T>().map_err(|e| e.to_string())
                }
            }
        )+
    };
}

binary_codec_float_impls!(f32, f64);

/// Reads `count` consecutive `T` values starting at `bytes[0..]`, failing
/// with `Codec` if the buffer is shorter than declared (§7).
pub fn read_values<T: BinaryCodec>(bytes: &[u8], count: usize) -> Result<Vec<T>> {
    let need = count * T::SIZE;
    if bytes.len() < need {
        return Err(Error::codec(format!(
            "cell buffer shorter than declared: need {need} bytes, have {}",
            bytes.len()
        )));
    }
    Ok((0..count)
        .map(|i| T::read_ne(&bytes[i * T::SIZE..(i + 1) * T::SIZE]))
        .collect())
}

pub fn write_values<T: BinaryCodec>(values: &[T], out: &mut Vec<u8>) {
    for &v in values {
        v.write_ne(out);
    }
}
