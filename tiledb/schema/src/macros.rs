/// Dispatches on a schema's `coords_type`, binding `$T` to the matching
/// concrete coordinate type inside `$body`. This is the one seam where the
/// closed coordinate-type sum (§1 non-goals: "re-expressed as a closed sum
/// over the coordinate-type set") turns a runtime tag back into a
/// compile-time type, the same role the teacher's `physical_value_go!`
/// family of macros plays for its `Datatype` enum.
#[macro_export]
macro_rules! coords_type_go {
    ($schema:expr, $T:ident, $body:block) => {
        match $schema.coords_type() {
            ::tiledb_common::datatype::CoordsType::Int32 => {
                type $T = i32;
                $body
            }
            ::tiledb_common::datatype::CoordsType::Int64 => {
                type $T = i64;
                $body
            }
            ::tiledb_common::datatype::CoordsType::Float32 => {
                type $T = f32;
                $body
            }
            ::tiledb_common::datatype::CoordsType::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}

/// Like [coords_type_go] but only the two integral arms, for call sites
/// restricted to [crate::geometry::IntegralCoord] (Hilbert order, tile ids).
/// The non-integral arms return `$on_float` instead of expanding `$body`.
#[macro_export]
macro_rules! integral_coords_type_go {
    ($schema:expr, $T:ident, $body:block, $on_float:expr) => {
        match $schema.coords_type() {
            ::tiledb_common::datatype::CoordsType::Int32 => {
                type $T = i32;
                $body
            }
            ::tiledb_common::datatype::CoordsType::Int64 => {
                type $T = i64;
                $body
            }
            ::tiledb_common::datatype::CoordsType::Float32
            | ::tiledb_common::datatype::CoordsType::Float64 => $on_float,
        }
    };
}
