pub mod chunk_reader;
pub mod error;
pub mod half_core;
pub mod ply_header;
pub mod ply_record;
pub mod splatv_core;

#[cfg(target_arch = "wasm32")]
mod chunk_wasm;
#[cfg(target_arch = "wasm32")]
mod half_wasm;
#[cfg(target_arch = "wasm32")]
mod splatv_wasm;

pub use chunk_reader::{ChunkAssembler, ChunkDescriptor, ChunkState, read_chunks};
pub use error::PlyError;
pub use half_core::{float_to_half, pack_half_2x16};
pub use ply_header::{PlyField, PlyHeader, PlyScalarType, parse_header, parse_header_with_limit};
pub use ply_record::{FieldRef, PlyRecords};
pub use splatv_core::{
    ConvertOptions, FieldRange, SplatvTextureCore, TEXTURE_WIDTH, convert_ply_to_splatv,
    convert_ply_to_splatv_with_opts, field_ranges, importance_scores, pack_texture,
    sort_by_importance,
};

#[cfg(target_arch = "wasm32")]
pub use chunk_wasm::read_chunks_js;
#[cfg(target_arch = "wasm32")]
pub use half_wasm::{float_to_half as float_to_half_js, pack_half_2x16 as pack_half_2x16_js};
#[cfg(target_arch = "wasm32")]
pub use splatv_wasm::{SplatvTexture, process_ply_buffer, process_ply_buffer_with_opts};
