pub mod attribute;
pub mod dimension;
pub mod geometry;
pub mod hilbert;
#[macro_use]
pub mod macros;
pub mod schema;

pub use attribute::AttributeData;
pub use dimension::DimensionData;
pub use geometry::{
    cell_id_hilbert, expand_domain, get_cell_pos, is_contained_in_tile_slab_col,
    is_contained_in_tile_slab_row, precedes, subarray_overlap, succeeds, tile_id,
    CoordValue, IntegralCoord, Overlap, Range,
};
pub use schema::{ArraySchema, SchemaError, DEFAULT_CAPACITY, DEFAULT_CONSOLIDATION_STEP};
