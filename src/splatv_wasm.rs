use wasm_bindgen::prelude::*;

use crate::splatv_core::{
    ConvertOptions, SplatvTextureCore, convert_ply_to_splatv, convert_ply_to_splatv_with_opts,
};

#[wasm_bindgen]
pub struct SplatvTexture {
    inner: SplatvTextureCore,
}

#[wasm_bindgen]
impl SplatvTexture {
    #[wasm_bindgen(getter)]
    pub fn texdata(&self) -> js_sys::Uint32Array {
        unsafe { js_sys::Uint32Array::view(&self.inner.texdata) }
    }

    #[wasm_bindgen(getter)]
    pub fn texwidth(&self) -> u32 {
        self.inner.texwidth
    }

    #[wasm_bindgen(getter)]
    pub fn texheight(&self) -> u32 {
        self.inner.texheight
    }

    #[wasm_bindgen(getter, js_name = vertexCount)]
    pub fn vertex_count(&self) -> u32 {
        self.inner.vertex_count
    }

    #[wasm_bindgen(getter)]
    pub fn positions(&self) -> js_sys::Float32Array {
        unsafe { js_sys::Float32Array::view(&self.inner.positions) }
    }
}

#[wasm_bindgen(js_name = processPlyBuffer)]
pub fn process_ply_buffer(bytes: &[u8]) -> Result<SplatvTexture, JsValue> {
    let inner = convert_ply_to_splatv(bytes).map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(SplatvTexture { inner })
}

#[wasm_bindgen(js_name = processPlyBufferWithOpts)]
pub fn process_ply_buffer_with_opts(
    bytes: &[u8],
    texture_width: u32,
    report_field_ranges: bool,
) -> Result<SplatvTexture, JsValue> {
    let opts = ConvertOptions::default()
        .with_texture_width(texture_width)
        .with_field_ranges(report_field_ranges);
    let inner = convert_ply_to_splatv_with_opts(bytes, &opts)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(SplatvTexture { inner })
}
