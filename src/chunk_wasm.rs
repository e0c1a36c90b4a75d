use std::collections::VecDeque;

use futures::{Stream, stream};
use js_sys::{Array, Function, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::ReadableStreamDefaultReader;

use crate::chunk_reader::{ChunkDescriptor, read_chunks};

fn descriptor(value: JsValue) -> Result<ChunkDescriptor<JsValue>, JsValue> {
    let size = Reflect::get(&value, &JsValue::from_str("size"))?
        .as_f64()
        .filter(|s| *s >= 0.0 && s.fract() == 0.0)
        .ok_or_else(|| JsValue::from_str("readChunks: chunk needs a non-negative integer size"))?;
    Ok(ChunkDescriptor::new(size as usize, value))
}

fn queue_to_js(queue: &VecDeque<ChunkDescriptor<JsValue>>, chunks: &Array) {
    chunks.set_length(0);
    for chunk in queue {
        chunks.push(&chunk.meta);
    }
}

fn queue_from_js(
    chunks: &Array,
    queue: &mut VecDeque<ChunkDescriptor<JsValue>>,
) -> Result<(), JsValue> {
    queue.clear();
    for value in chunks.iter() {
        queue.push_back(descriptor(value)?);
    }
    Ok(())
}

fn fragments(
    reader: ReadableStreamDefaultReader,
) -> impl Stream<Item = Result<Vec<u8>, JsValue>> {
    stream::unfold(Some(reader), |reader| async move {
        let reader = reader?;
        let result = match JsFuture::from(reader.read()).await {
            Ok(result) => result,
            Err(e) => return Some((Err(e), None)),
        };
        match Reflect::get(&result, &JsValue::from_str("done")) {
            Ok(done) if done.is_truthy() => return None,
            Ok(_) => {}
            Err(e) => return Some((Err(e), None)),
        }
        match Reflect::get(&result, &JsValue::from_str("value")) {
            Ok(value) => Some((Ok(Uint8Array::new(&value).to_vec()), Some(reader))),
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Calls `handleChunk(chunk, arrayBuffer, fillOffset, chunks)` as chunks fill up.
///
/// `chunks` is the caller's queue; entries pushed onto it by the handler are read next.
#[wasm_bindgen(js_name = readChunks)]
pub async fn read_chunks_js(
    reader: ReadableStreamDefaultReader,
    chunks: Array,
    handle_chunk: Function,
) -> Result<(), JsValue> {
    let mut queue = chunks
        .iter()
        .map(descriptor)
        .collect::<Result<VecDeque<_>, _>>()?;

    let res = read_chunks(fragments(reader), &mut queue, |chunk, buffer, offset, queue| {
        queue_to_js(queue, &chunks);
        let args = Array::new();
        args.push(&chunk.meta);
        args.push(&Uint8Array::from(buffer).buffer());
        args.push(&JsValue::from(offset as u32));
        args.push(&chunks);
        handle_chunk.apply(&JsValue::NULL, &args)?;
        queue_from_js(&chunks, queue)
    })
    .await;

    queue_to_js(&queue, &chunks);
    res
}
