use std::collections::VecDeque;

use futures::{Stream, StreamExt};
use log::debug;

/// A chunk the reader should assemble: its size in bytes plus caller data.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDescriptor<M> {
    pub size: usize,
    pub meta: M,
}

impl<M> ChunkDescriptor<M> {
    pub fn new(size: usize, meta: M) -> Self {
        Self { size, meta }
    }
}

/// Reader state between fragments.
///
/// Completing a chunk is transient: it is only seen as the handler's offset-0
/// call, after which the reader is awaiting the next queued chunk or drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    /// A chunk is in progress and needs more bytes.
    AwaitingChunk,
    /// No chunk left to fill.
    Drained,
}

/// Reassembles byte fragments into the chunks queued by the caller.
///
/// The handler is called with `(chunk, buffer, fill_offset, queue)`:
/// - once per completed chunk, with the full buffer and offset 0;
/// - on partial progress, with the chunk-sized buffer and the number of bytes filled so far;
/// - from [`ChunkAssembler::finish`], with only the buffered bytes and offset 0.
///
/// The handler may push more descriptors onto `queue`; they are picked up as
/// soon as the current chunk completes.
#[derive(Debug)]
pub struct ChunkAssembler<M> {
    current: Option<ChunkDescriptor<M>>,
    buffer: Vec<u8>,
    filled: usize,
}

impl<M> ChunkAssembler<M> {
    /// Takes the first chunk off `queue`.
    pub fn new(queue: &mut VecDeque<ChunkDescriptor<M>>) -> Self {
        let mut assembler = Self {
            current: None,
            buffer: Vec::new(),
            filled: 0,
        };
        assembler.start_next(queue);
        assembler
    }

    pub fn state(&self) -> ChunkState {
        match self.current {
            Some(_) => ChunkState::AwaitingChunk,
            None => ChunkState::Drained,
        }
    }

    pub fn current(&self) -> Option<&ChunkDescriptor<M>> {
        self.current.as_ref()
    }

    /// Bytes buffered for the current chunk.
    pub fn filled(&self) -> usize {
        self.filled
    }

    fn start_next(&mut self, queue: &mut VecDeque<ChunkDescriptor<M>>) {
        self.current = queue.pop_front();
        self.filled = 0;
        self.buffer.clear();
        if let Some(chunk) = &self.current {
            self.buffer.resize(chunk.size, 0);
        }
    }

    /// Feeds one fragment. Bytes left over once the queue is drained are dropped.
    pub fn push<E, H>(
        &mut self,
        mut fragment: &[u8],
        queue: &mut VecDeque<ChunkDescriptor<M>>,
        handler: &mut H,
    ) -> Result<ChunkState, E>
    where
        H: FnMut(&ChunkDescriptor<M>, &[u8], usize, &mut VecDeque<ChunkDescriptor<M>>) -> Result<(), E>,
    {
        while let Some(chunk) = &self.current {
            let need = chunk.size - self.filled;
            if fragment.len() < need {
                if !fragment.is_empty() {
                    let end = self.filled + fragment.len();
                    self.buffer[self.filled..end].copy_from_slice(fragment);
                    self.filled = end;
                    handler(chunk, &self.buffer, self.filled, queue)?;
                }
                return Ok(ChunkState::AwaitingChunk);
            }

            self.buffer[self.filled..].copy_from_slice(&fragment[..need]);
            fragment = &fragment[need..];
            handler(chunk, &self.buffer, 0, queue)?;
            debug!(
                "chunk reader: completed {} byte chunk, {} queued",
                chunk.size,
                queue.len()
            );
            self.start_next(queue);
        }
        Ok(ChunkState::Drained)
    }

    /// Ends the input, handing any chunk in progress to the handler as is.
    pub fn finish<E, H>(
        &mut self,
        queue: &mut VecDeque<ChunkDescriptor<M>>,
        handler: &mut H,
    ) -> Result<(), E>
    where
        H: FnMut(&ChunkDescriptor<M>, &[u8], usize, &mut VecDeque<ChunkDescriptor<M>>) -> Result<(), E>,
    {
        if let Some(chunk) = self.current.take() {
            debug!(
                "chunk reader: source ended {} of {} bytes into a chunk",
                self.filled, chunk.size
            );
            handler(&chunk, &self.buffer[..self.filled], 0, queue)?;
            self.filled = 0;
            self.buffer.clear();
        }
        Ok(())
    }
}

/// Reads `source` until `queue` is drained or the source ends.
///
/// Fragments are processed in arrival order. The first error, from the source
/// or the handler, stops reading and is returned.
pub async fn read_chunks<S, B, E, M, H>(
    source: S,
    queue: &mut VecDeque<ChunkDescriptor<M>>,
    mut handler: H,
) -> Result<(), E>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    H: FnMut(&ChunkDescriptor<M>, &[u8], usize, &mut VecDeque<ChunkDescriptor<M>>) -> Result<(), E>,
{
    let mut assembler = ChunkAssembler::new(queue);
    if assembler.state() == ChunkState::Drained {
        return Ok(());
    }

    let mut source = std::pin::pin!(source);
    while let Some(fragment) = source.next().await {
        let fragment = fragment?;
        if assembler.push(fragment.as_ref(), queue, &mut handler)? == ChunkState::Drained {
            return Ok(());
        }
    }
    assembler.finish(queue, &mut handler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use futures::stream;

    type Event = (&'static str, Vec<u8>, usize);

    fn run(
        sizes: &[(usize, &'static str)],
        fragments: Vec<Vec<u8>>,
    ) -> (Result<(), String>, Vec<Event>) {
        let mut queue: VecDeque<_> = sizes
            .iter()
            .map(|&(size, name)| ChunkDescriptor::new(size, name))
            .collect();
        let mut events = Vec::new();
        let source = stream::iter(fragments.into_iter().map(Ok::<_, String>));
        let res = block_on(read_chunks(source, &mut queue, |chunk, buf, offset, _| {
            events.push((chunk.meta, buf.to_vec(), offset));
            Ok(())
        }));
        (res, events)
    }

    #[test]
    fn test_split_fragments() {
        let (res, events) = run(
            &[(4, "a"), (4, "b")],
            vec![vec![1, 2, 3], vec![4, 5, 6, 7, 8]],
        );
        res.unwrap();
        assert_eq!(
            events,
            vec![
                ("a", vec![1, 2, 3, 0], 3),
                ("a", vec![1, 2, 3, 4], 0),
                ("b", vec![5, 6, 7, 8], 0),
            ]
        );
    }

    #[test]
    fn test_coalesced_fragment_completes_many_chunks() {
        let (res, events) = run(
            &[(2, "a"), (1, "b"), (3, "c")],
            vec![vec![1, 2, 3, 4, 5, 6, 99]],
        );
        res.unwrap();
        assert_eq!(
            events,
            vec![
                ("a", vec![1, 2], 0),
                ("b", vec![3], 0),
                ("c", vec![4, 5, 6], 0),
            ]
        );
    }

    #[test]
    fn test_source_ends_mid_chunk() {
        let (res, events) = run(&[(4, "a"), (4, "b")], vec![vec![1, 2, 3, 4, 5], vec![6]]);
        res.unwrap();
        assert_eq!(
            events,
            vec![
                ("a", vec![1, 2, 3, 4], 0),
                ("b", vec![5, 0, 0, 0], 1),
                ("b", vec![5, 6, 0, 0], 2),
                ("b", vec![5, 6], 0),
            ]
        );
    }

    #[test]
    fn test_empty_queue_never_calls_handler() {
        let (res, events) = run(&[], vec![vec![1, 2, 3]]);
        res.unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_handler_extends_queue() {
        // a 4-byte header chunk announces the size of the body chunk
        let mut queue = VecDeque::from([ChunkDescriptor::new(4, "header")]);
        let mut bodies = Vec::new();
        let fragments = vec![vec![3, 0], vec![0, 0, 7, 8], vec![9, 10]];
        let source = stream::iter(fragments.into_iter().map(Ok::<_, ()>));

        block_on(read_chunks(source, &mut queue, |chunk, buf, offset, queue| {
            match chunk.meta {
                "header" if offset == 0 => {
                    let size = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
                    queue.push_back(ChunkDescriptor::new(size as usize, "body"));
                }
                "body" if offset == 0 => bodies.push(buf.to_vec()),
                _ => {}
            }
            Ok(())
        }))
        .unwrap();

        assert_eq!(bodies, vec![vec![7, 8, 9]]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_errors_stop_reading() {
        let mut queue = VecDeque::from([ChunkDescriptor::new(2, ()), ChunkDescriptor::new(2, ())]);
        let source = stream::iter(vec![Ok(vec![1u8, 2]), Err("boom"), Ok(vec![3, 4])]);
        let mut calls = 0;
        let res = block_on(read_chunks(source, &mut queue, |_, _, _, _| {
            calls += 1;
            Ok(())
        }));
        assert_eq!(res, Err("boom"));
        assert_eq!(calls, 1);

        let mut queue = VecDeque::from([ChunkDescriptor::new(1, ())]);
        let source = stream::iter(vec![Ok::<_, &str>(vec![1u8])]);
        let res = block_on(read_chunks(source, &mut queue, |_, _, _, _| Err("rejected")));
        assert_eq!(res, Err("rejected"));
    }

    #[test]
    fn test_assembler_states() {
        let mut queue = VecDeque::from([ChunkDescriptor::new(3, 'a')]);
        let mut seen = Vec::new();
        let mut handler = |c: &ChunkDescriptor<char>, buf: &[u8], off: usize, _: &mut VecDeque<_>| {
            seen.push((c.meta, buf.len(), off));
            Ok::<_, ()>(())
        };

        let mut assembler = ChunkAssembler::new(&mut queue);
        assert_eq!(assembler.state(), ChunkState::AwaitingChunk);
        assert_eq!(assembler.current().map(|c| c.size), Some(3));

        let state = assembler.push(&[1, 2], &mut queue, &mut handler).unwrap();
        assert_eq!(state, ChunkState::AwaitingChunk);
        assert_eq!(assembler.filled(), 2);

        let state = assembler.push(&[], &mut queue, &mut handler).unwrap();
        assert_eq!(state, ChunkState::AwaitingChunk);

        let state = assembler.push(&[3, 4], &mut queue, &mut handler).unwrap();
        assert_eq!(state, ChunkState::Drained);
        assembler.finish(&mut queue, &mut handler).unwrap();

        assert_eq!(seen, vec![('a', 3, 2), ('a', 3, 0)]);
    }
}
