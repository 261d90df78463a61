use super::helpers::{count_segment_files, fast_opts, open_fast, sized_opts};
use crate::*;
use anyhow::Result;
use tempfile::tempdir;

// --------------------- Basic put / read / delete ---------------------

#[test]
fn put_and_read() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    engine.put("a", Some(b"1"))?;
    engine.put("b", Some(b"2"))?;

    assert_eq!(engine.read("a")?, Some(b"1".to_vec()));
    assert_eq!(engine.read("b")?, Some(b"2".to_vec()));
    assert_eq!(engine.read("c")?, None);
    Ok(())
}

#[test]
fn overwrite_returns_newest() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    engine.put("k", Some(b"v1"))?;
    engine.put("k", Some(b"v2"))?;

    assert_eq!(engine.read("k")?, Some(b"v2".to_vec()));
    Ok(())
}

#[test]
fn delete_hides_value() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    engine.put("k", Some(b"v"))?;
    engine.delete("k")?;

    assert_eq!(engine.read("k")?, None);
    Ok(())
}

#[test]
fn put_none_is_a_delete() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    engine.put("k", Some(b"v"))?;
    engine.put("k", None)?;

    assert_eq!(engine.read("k")?, None);
    Ok(())
}

#[test]
fn put_after_delete_resurrects() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    engine.put("k", Some(b"v1"))?;
    engine.delete("k")?;
    engine.put("k", Some(b"v2"))?;

    assert_eq!(engine.read("k")?, Some(b"v2".to_vec()));
    Ok(())
}

#[test]
fn empty_value_is_distinct_from_delete() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    engine.put("k", Some(b""))?;
    assert_eq!(engine.read("k")?, Some(Vec::new()));

    engine.delete("k")?;
    assert_eq!(engine.read("k")?, None);
    Ok(())
}

#[test]
fn delete_purges_the_memtable_slot() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    engine.put("k", Some(b"v"))?;
    assert_eq!(engine.memtable_len(), 1);

    engine.delete("k")?;
    // the tombstone lives in the segment, not the buffer
    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(engine.read("k")?, None);
    Ok(())
}

// --------------------- Argument validation ---------------------

#[test]
fn empty_key_is_rejected() {
    let dir = tempdir().unwrap();
    let engine = open_fast(dir.path());

    assert!(matches!(
        engine.put("", Some(b"v")),
        Err(EngineError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.delete(""),
        Err(EngineError::InvalidArgument(_))
    ));
}

#[test]
fn batch_length_mismatch_is_rejected_before_writing() {
    let dir = tempdir().unwrap();
    let engine = open_fast(dir.path());

    let err = engine.batch_put(&["a", "b"], &[Some(&b"1"[..])]).unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));

    // nothing landed
    assert_eq!(engine.read("a").unwrap(), None);
    assert_eq!(engine.memtable_len(), 0);
}

// --------------------- batch_put ---------------------

#[test]
fn batch_put_applies_in_order() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    engine.batch_put(
        &["x", "y", "z"],
        &[Some(&b"1"[..]), Some(&b"2"[..]), Some(&b"3"[..])],
    )?;

    assert_eq!(engine.read("x")?, Some(b"1".to_vec()));
    assert_eq!(engine.read("y")?, Some(b"2".to_vec()));
    assert_eq!(engine.read("z")?, Some(b"3".to_vec()));
    Ok(())
}

#[test]
fn batch_put_with_none_entries_deletes() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    engine.put("y", Some(b"old"))?;
    engine.batch_put(&["x", "y"], &[Some(&b"1"[..]), None])?;

    assert_eq!(engine.read("x")?, Some(b"1".to_vec()));
    assert_eq!(engine.read("y")?, None);
    Ok(())
}

#[test]
fn batch_is_not_atomic_on_midway_failure() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    // the empty key fails validation after "a" has already been written
    let err = engine
        .batch_put(&["a", "", "c"], &[Some(&b"1"[..]), Some(&b"2"[..]), Some(&b"3"[..])])
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));

    assert_eq!(engine.read("a")?, Some(b"1".to_vec()));
    assert_eq!(engine.read("c")?, None);
    Ok(())
}

// --------------------- Segment rolling and size caps ---------------------

#[test]
fn full_segment_rolls_a_new_one() -> Result<()> {
    let dir = tempdir()?;
    // Each record is 8 + 4 + 100 bytes; the cap fits two of them.
    let engine = Engine::open_with(dir.path(), sized_opts(250, 1024 * 1024))?;
    assert_eq!(engine.segment_count(), 1);

    engine.put("k001", Some(&[b'x'; 100]))?;
    engine.put("k002", Some(&[b'x'; 100]))?;
    engine.put("k003", Some(&[b'x'; 100]))?;

    assert_eq!(engine.segment_count(), 2);
    for k in ["k001", "k002", "k003"] {
        assert_eq!(engine.read(k)?, Some(vec![b'x'; 100]));
    }
    Ok(())
}

#[test]
fn record_exactly_at_the_cap_fits() -> Result<()> {
    let dir = tempdir()?;
    // 8 + 1 + 55 = 64 = cap exactly
    let engine = Engine::open_with(dir.path(), sized_opts(64, 1024 * 1024))?;

    engine.put("k", Some(&[b'v'; 55]))?;
    assert_eq!(engine.segment_count(), 1);
    Ok(())
}

#[test]
fn oversized_record_is_too_large() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open_with(dir.path(), sized_opts(64, 1024 * 1024))?;

    let err = engine.put("k", Some(&[b'v'; 100])).unwrap_err();
    assert!(matches!(err, EngineError::TooLarge { .. }));

    // the failed write rolled nothing and left no trace
    assert_eq!(engine.segment_count(), 1);
    assert_eq!(engine.read("k")?, None);

    // the engine keeps working afterwards
    engine.put("small", Some(b"v"))?;
    assert_eq!(engine.read("small")?, Some(b"v".to_vec()));
    Ok(())
}

// --------------------- flush ---------------------

#[test]
fn flush_drains_memtable_into_fresh_segment() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    engine.put("a", Some(b"1"))?;
    engine.put("b", Some(b"2"))?;
    assert_eq!(engine.memtable_len(), 2);
    let before = engine.segment_count();

    engine.flush()?;

    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(engine.memtable_bytes(), 0);
    assert_eq!(engine.segment_count(), before + 1);
    assert_eq!(engine.read("a")?, Some(b"1".to_vec()));
    assert_eq!(engine.read("b")?, Some(b"2".to_vec()));
    Ok(())
}

#[test]
fn flush_on_empty_memtable_is_a_noop() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());

    let before = engine.segment_count();
    engine.flush()?;
    assert_eq!(engine.segment_count(), before);
    Ok(())
}

#[test]
fn memtable_budget_triggers_automatic_flush() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open_with(dir.path(), sized_opts(1024 * 1024, 64))?;

    let value = vec![b'x'; 40];
    engine.put("k1", Some(&value))?;
    // 2 + 40 bytes buffered, under the 64-byte budget
    assert_eq!(engine.memtable_len(), 1);

    engine.put("k2", Some(&value))?;
    // budget crossed: the buffer drained into a fresh segment
    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(engine.read("k1")?, Some(value.clone()));
    assert_eq!(engine.read("k2")?, Some(value));
    Ok(())
}

// --------------------- close ---------------------

#[test]
fn close_rejects_further_operations() -> Result<()> {
    let dir = tempdir()?;
    let engine = open_fast(dir.path());
    engine.put("k", Some(b"v"))?;

    engine.close()?;

    assert!(matches!(engine.put("x", Some(b"1")), Err(EngineError::Closed)));
    assert!(matches!(engine.read("k"), Err(EngineError::Closed)));
    assert!(matches!(engine.read_range("a", "z"), Err(EngineError::Closed)));
    assert!(matches!(engine.delete("k"), Err(EngineError::Closed)));
    assert!(matches!(
        engine.batch_put(&["a"], &[Some(&b"1"[..])]),
        Err(EngineError::Closed)
    ));
    assert!(matches!(engine.flush(), Err(EngineError::Closed)));

    // close itself is idempotent
    engine.close()?;
    Ok(())
}

#[test]
fn close_flushes_the_memtable() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = open_fast(dir.path());
        engine.put("k", Some(b"v"))?;
        engine.close()?;
    }

    // flush on close rolled a drain segment
    assert!(count_segment_files(dir.path()) >= 2);

    let engine = open_fast(dir.path());
    assert_eq!(engine.read("k")?, Some(b"v".to_vec()));
    Ok(())
}

#[test]
fn drop_closes_best_effort() -> Result<()> {
    let dir = tempdir()?;
    {
        let engine = Engine::open_with(dir.path(), fast_opts())?;
        engine.put("dropped", Some(b"v"))?;
        // engine dropped here without an explicit close
    }

    let engine = open_fast(dir.path());
    assert_eq!(engine.read("dropped")?, Some(b"v".to_vec()));
    Ok(())
}
