//! Chunked and pipelined posting
//!
//! Moves of one toolpath depend on each other, so chunks are posted
//! strictly in order. What runs in parallel is posting and consuming: a
//! worker thread posts chunk N+1 while the caller writes out chunk N.

use std::sync::mpsc;
use std::thread;

use axispost_core::{PostError, PostedMove, ToolpathPoint};
use axispost_kinematics::ContinuityState;
use tracing::{debug, warn};

use crate::pipeline::{ChunkError, Poster};

/// Finished chunks buffered between the worker and the consumer
const CHANNEL_DEPTH: usize = 2;

type ChunkMessage = Result<(usize, Vec<PostedMove>), ChunkError>;

/// Split `len` moves into near-equal chunks of at most `desired` moves
///
/// Sizes differ by at most one, so there is no short trailing chunk.
pub fn optimal_chunk_sizes(len: usize, desired: usize) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let desired = desired.max(1);
    let count = len.div_ceil(desired);
    let base = len / count;
    let extra = len % count;
    (0..count).map(|i| base + usize::from(i < extra)).collect()
}

/// Post `toolpath` in chunks and hand each finished chunk to `consume` in
/// order
///
/// The final call carries the moves flushed at the end of the run. Returns
/// the state after the last chunk.
pub fn post_pipelined<F>(
    poster: &Poster,
    toolpath: &[ToolpathPoint],
    desired_chunk: usize,
    mut consume: F,
) -> Result<ContinuityState, ChunkError>
where
    F: FnMut(usize, Vec<PostedMove>),
{
    let sizes = optimal_chunk_sizes(toolpath.len(), desired_chunk);
    debug!("Posting {} moves in {} chunks", toolpath.len(), sizes.len());

    thread::scope(|scope| {
        let (tx, rx) = mpsc::sync_channel::<ChunkMessage>(CHANNEL_DEPTH);

        let worker = scope.spawn(move || {
            let mut state = ContinuityState::new();
            let mut start = 0;
            for (chunk, size) in sizes.iter().enumerate() {
                let slice = &toolpath[start..start + size];
                start += size;
                match poster.post_chunk(slice, state) {
                    Ok(out) => {
                        state = out.state;
                        if tx.send(Ok((chunk, out.moves))).is_err() {
                            return None;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return None;
                    }
                }
            }
            let boundary = state.clone();
            match poster.finish(&mut state) {
                Ok(tail) => {
                    let _ = tx.send(Ok((sizes.len(), tail)));
                    Some(state)
                }
                Err(error) => {
                    let _ = tx.send(Err(ChunkError {
                        chunk: sizes.len(),
                        failed_index: boundary.next_index,
                        error,
                        boundary: Box::new(boundary),
                    }));
                    None
                }
            }
        });

        for message in rx {
            let (chunk, moves) = message?;
            consume(chunk, moves);
        }

        match worker.join() {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Err(ChunkError {
                chunk: 0,
                failed_index: 0,
                error: PostError::other("posting stopped before the last chunk"),
                boundary: Box::default(),
            }),
            Err(_) => {
                warn!("Posting worker panicked");
                Err(ChunkError {
                    chunk: 0,
                    failed_index: 0,
                    error: PostError::other("posting worker panicked"),
                    boundary: Box::default(),
                })
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_sizes_have_no_runt() {
        assert_eq!(optimal_chunk_sizes(0, 10), Vec::<usize>::new());
        assert_eq!(optimal_chunk_sizes(10, 10), vec![10]);
        assert_eq!(optimal_chunk_sizes(11, 10), vec![6, 5]);
        assert_eq!(optimal_chunk_sizes(25, 10), vec![9, 8, 8]);
        assert_eq!(optimal_chunk_sizes(3, 0), vec![1, 1, 1]);
        for len in 1..60 {
            for desired in 1..12 {
                let sizes = optimal_chunk_sizes(len, desired);
                assert_eq!(sizes.iter().sum::<usize>(), len);
                assert!(sizes.iter().all(|&s| s <= desired && s > 0));
                let (min, max) = (sizes.iter().min().unwrap(), sizes.iter().max().unwrap());
                assert!(max - min <= 1);
            }
        }
    }
}
