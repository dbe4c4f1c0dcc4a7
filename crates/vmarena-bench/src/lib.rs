//! Benchmark workloads for the vmarena allocator.
//!
//! Provides deterministic allocation traces shared by the criterion benches:
//!
//! - [`frame_workload`]: per-frame bursts of mixed-size pushes, cleared at
//!   frame end (the typical scratch-arena pattern)
//! - [`nested_workload`]: push/mark/rewind sequences with nested scopes
//! - [`replay`]: drive any arena through a trace

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use vmarena::{Arena, ArenaError, MemoryBackend, Zeroing};

/// One step of an allocation trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Push `size` bytes.
    Push { size: usize, zeroed: bool },
    /// Remember the current position.
    Mark,
    /// Rewind to the most recent unconsumed mark.
    Rewind,
    /// Rewind past every allocation.
    Clear,
}

/// Size distribution: mostly small objects with an occasional large buffer.
fn sample_size(rng: &mut ChaCha8Rng, max_small: usize, max_large: usize) -> usize {
    let roll = rng.next_u32() % 100;
    let bound = if roll < 90 { max_small } else { max_large };
    1 + (rng.next_u64() as usize) % bound.max(1)
}

/// `frames` frames of `allocs_per_frame` pushes each, every frame ending in
/// [`Step::Clear`].
///
/// Deterministic for a given `seed`.
pub fn frame_workload(seed: u64, frames: usize, allocs_per_frame: usize) -> Vec<Step> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut steps = Vec::with_capacity(frames * (allocs_per_frame + 1));
    for _ in 0..frames {
        for _ in 0..allocs_per_frame {
            steps.push(Step::Push {
                size: sample_size(&mut rng, 256, 64 * 1024),
                zeroed: rng.next_u32() % 2 == 0,
            });
        }
        steps.push(Step::Clear);
    }
    steps
}

/// Random pushes interleaved with nested mark/rewind pairs, at most
/// `max_depth` deep. Every mark is matched by a rewind.
pub fn nested_workload(seed: u64, len: usize, max_depth: usize) -> Vec<Step> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut steps = Vec::with_capacity(len + max_depth);
    let mut depth = 0;
    for _ in 0..len {
        let step = match rng.next_u32() % 8 {
            0 if depth < max_depth => {
                depth += 1;
                Step::Mark
            }
            1 if depth > 0 => {
                depth -= 1;
                Step::Rewind
            }
            _ => Step::Push {
                size: sample_size(&mut rng, 128, 4096),
                zeroed: false,
            },
        };
        steps.push(step);
    }
    steps.extend(std::iter::repeat_n(Step::Rewind, depth));
    steps
}

/// Run `steps` against `arena`, returning the peak position reached.
///
/// # Errors
///
/// Propagates commit failures from the arena.
pub fn replay<B: MemoryBackend>(arena: &mut Arena<B>, steps: &[Step]) -> Result<usize, ArenaError> {
    let mut marks = Vec::new();
    let mut peak = arena.pos();
    for step in steps {
        match *step {
            Step::Push { size, zeroed } => {
                let zeroing = if zeroed { Zeroing::Zeroed } else { Zeroing::Overwrite };
                arena.push(size, zeroing)?;
                peak = peak.max(arena.pos());
            }
            Step::Mark => marks.push(arena.pos()),
            Step::Rewind => {
                if let Some(mark) = marks.pop() {
                    arena.pop_to(mark);
                }
            }
            Step::Clear => {
                marks.clear();
                arena.pop_clear();
            }
        }
    }
    Ok(peak)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmarena::{kib, mib, ArenaConfig, HEADER_SIZE};

    #[test]
    fn workloads_are_deterministic() {
        assert_eq!(frame_workload(7, 4, 32), frame_workload(7, 4, 32));
        assert_ne!(frame_workload(7, 4, 32), frame_workload(8, 4, 32));
        assert_eq!(nested_workload(3, 500, 4), nested_workload(3, 500, 4));
    }

    #[test]
    fn nested_workload_balances_marks() {
        let steps = nested_workload(11, 1000, 6);
        let marks = steps.iter().filter(|s| **s == Step::Mark).count();
        let rewinds = steps.iter().filter(|s| **s == Step::Rewind).count();
        assert_eq!(marks, rewinds);
    }

    #[test]
    fn replay_ends_frames_at_the_header() {
        let config = ArenaConfig::new(mib(64), kib(64)).with_poison_unzeroed(false);
        let mut arena = Arena::with_config(config).unwrap();
        let peak = replay(&mut arena, &frame_workload(1, 8, 64)).unwrap();
        assert!(peak > HEADER_SIZE);
        assert_eq!(arena.pos(), HEADER_SIZE);
    }

    #[test]
    fn enclosing_mark_rewinds_a_nested_workload_to_start() {
        let mut arena = Arena::new(mib(16), kib(64)).unwrap();
        arena.push(24, Zeroing::Zeroed).unwrap();
        let start = arena.pos();

        let mut steps = vec![Step::Mark];
        steps.extend(nested_workload(5, 2000, 8));
        steps.push(Step::Rewind);
        let peak = replay(&mut arena, &steps).unwrap();

        assert!(peak > start);
        assert_eq!(arena.pos(), start);
    }
}
