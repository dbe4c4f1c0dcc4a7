//! Backend failures surface as errors and leave the arena consistent.

use std::error::Error;

use vmarena::{kib, mib, ArenaError, BackendErrorKind, BackendOp, FixedArena, Zeroing, HEADER_SIZE};
use vmarena_test_utils::fixtures::{faulty_arena, faulty_heap_arena, quiet_config};
use vmarena_test_utils::Faults;

#[test]
fn reservation_failure_is_reported_without_commit() {
    let (result, log) = faulty_arena(quiet_config(mib(1), kib(64)), Faults::reserve());
    let err = result.unwrap_err();
    match &err {
        ArenaError::ReservationFailed { requested, source } => {
            assert_eq!(*requested, mib(1));
            assert_eq!(source.op, BackendOp::Reserve);
        }
        other => panic!("unexpected error: {other}"),
    }
    let calls = log.snapshot();
    assert_eq!((calls.reserve, calls.commit, calls.release), (1, 0, 0));
}

#[test]
fn initial_commit_failure_releases_the_reservation() {
    let (result, log) = faulty_arena(quiet_config(mib(1), kib(64)), Faults::commit_at(1));
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        ArenaError::CommitFailed { offset: 0, len, .. } if len == kib(64)
    ));
    assert_eq!(log.releases(), 1);
}

#[test]
fn growth_failure_leaves_positions_unchanged() {
    let (result, log) = faulty_arena(quiet_config(mib(1), kib(64)), Faults::commit_at(2));
    let mut arena = result.unwrap();
    let first = arena.push(1000, Zeroing::Zeroed).unwrap();
    arena.bytes_mut(first).fill(3);
    let (pos, commit_pos) = (arena.pos(), arena.commit_pos());

    let err = arena.push(kib(100), Zeroing::Zeroed).unwrap_err();
    match &err {
        ArenaError::CommitFailed { offset, len, source } => {
            assert_eq!(*offset, kib(64));
            assert_eq!(*len, kib(64));
            assert_eq!(source.kind, BackendErrorKind::Refused);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.source().is_some());
    assert_eq!(arena.pos(), pos);
    assert_eq!(arena.commit_pos(), commit_pos);
    assert!(arena.bytes(first).iter().all(|&b| b == 3));

    // The next attempt reaches the backend again and succeeds.
    arena.push(kib(100), Zeroing::Zeroed).unwrap();
    assert_eq!(arena.commit_pos(), kib(128));
    assert_eq!(log.commits(), 3);
}

#[test]
fn decommit_failure_still_lowers_commit_pos() {
    let config = quiet_config(mib(1), kib(64)).with_decommit_on_pop(true);
    let (result, log) = faulty_arena(config, Faults::decommit());
    let mut arena = result.unwrap();
    arena.push(kib(200), Zeroing::Overwrite).unwrap();
    arena.pop_clear();
    assert_eq!(arena.commit_pos(), kib(64));
    assert_eq!(log.snapshot().decommit, 1);

    // Recommitting the range that failed to decommit is fine.
    let h = arena.push(kib(200), Zeroing::Zeroed).unwrap();
    assert!(arena.bytes(h).iter().all(|&b| b == 0));
}

#[test]
fn release_failure_is_reported_by_destroy() {
    let (result, log) = faulty_heap_arena(quiet_config(kib(4), kib(4)), Faults::release());
    let arena = result.unwrap();
    let err = arena.destroy().unwrap_err();
    assert!(matches!(err, ArenaError::ReleaseFailed { .. }));
    assert_eq!(log.releases(), 1);
}

#[test]
fn release_failure_on_drop_is_only_logged() {
    let (result, log) = faulty_heap_arena(quiet_config(kib(4), kib(4)), Faults::release());
    drop(result.unwrap());
    assert_eq!(log.releases(), 1);
}

#[test]
fn fixed_arena_capacity_is_exact() {
    let mut arena = FixedArena::fixed(4096).unwrap();
    let err = arena
        .try_push(4096 - HEADER_SIZE + 1, Zeroing::Zeroed)
        .unwrap_err();
    assert!(matches!(err, ArenaError::CapacityExceeded { .. }));

    arena.push(4096 - HEADER_SIZE, Zeroing::Zeroed).unwrap();
    let err = arena.try_push(1, Zeroing::Zeroed).unwrap_err();
    assert_eq!(
        err,
        ArenaError::CapacityExceeded {
            requested: 1,
            available: 0,
        }
    );
}

#[test]
#[should_panic(expected = "arena capacity exceeded")]
fn push_past_fixed_capacity_panics() {
    let mut arena = FixedArena::fixed(4096).unwrap();
    let _ = arena.push(4096, Zeroing::Zeroed);
}
