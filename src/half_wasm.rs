use wasm_bindgen::prelude::*;

use crate::half_core;

#[wasm_bindgen(js_name = floatToHalf)]
pub fn float_to_half(value: f32) -> u16 {
    half_core::float_to_half(value)
}

#[wasm_bindgen(js_name = packHalf2x16)]
pub fn pack_half_2x16(x: f32, y: f32) -> u32 {
    half_core::pack_half_2x16(x, y)
}
