/// Dispatches on a [tiledb_common::datatype::CellType], binding `$T` to the
/// matching concrete Rust type inside `$body`. `Char` and `UInt8` are both
/// one-byte, but kept as distinct arms since `Char`'s sentinel values are the
/// printable `*`/`$` bytes rather than `u8::MAX`/`u8::MAX - 1` (§6).
#[macro_export]
macro_rules! cell_type_go {
    ($cell_type:expr, $T:ident, $body:block) => {
        match $cell_type {
            ::tiledb_common::datatype::CellType::Char => {
                type $T = u8;
                $body
            }
            ::tiledb_common::datatype::CellType::Int8 => {
                type $T = i8;
                $body
            }
            ::tiledb_common::datatype::CellType::UInt8 => {
                type $T = u8;
                $body
            }
            ::tiledb_common::datatype::CellType::Int16 => {
                type $T = i16;
                $body
            }
            ::tiledb_common::datatype::CellType::UInt16 => {
                type $T = u16;
                $body
            }
            ::tiledb_common::datatype::CellType::Int32 => {
                type $T = i32;
                $body
            }
            ::tiledb_common::datatype::CellType::UInt32 => {
                type $T = u32;
                $body
            }
            ::tiledb_common::datatype::CellType::Int64 => {
                type $T = i64;
                $body
            }
            ::tiledb_common::datatype::CellType::UInt64 => {
                type $T = u64;
                $body
            }
            ::tiledb_common::datatype::CellType::Float32 => {
                type $T = f32;
                $body
            }
            ::tiledb_common::datatype::CellType::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}
