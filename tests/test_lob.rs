//! Integration tests for LOB streaming in both directions.

use std::io::{Read, Write};
use std::sync::Arc;

use oracle_dpi_rs::native::memory::{FaultPoint, MemColumn, MemValue, MemoryNative, Script};
use oracle_dpi_rs::native::{LobKind, Native, NativeError, NativeTypeNum, OracleTypeNum};
use oracle_dpi_rs::{BindArg, Connection, Cursor, Error, Lob, LobReader, LobWriter, Value};
use proptest::prelude::*;

fn native() -> (Arc<MemoryNative>, Arc<dyn Native>) {
    let mem = Arc::new(MemoryNative::new());
    let native: Arc<dyn Native> = mem.clone();
    (mem, native)
}

proptest! {
    #[test]
    fn prop_write_then_read_round_trips(
        data in proptest::collection::vec(any::<u8>(), 0..200),
        chunk in 1usize..64,
        read_len in 1usize..50,
    ) {
        let (mem, native) = native();
        let lob = native.lob_new_temp(LobKind::Blob).unwrap();

        let mut writer = LobWriter::new(&native, lob);
        for piece in data.chunks(chunk) {
            writer.write_all(piece).unwrap();
        }
        writer.close().unwrap();
        prop_assert_eq!(writer.offset(), data.len() as u64);
        prop_assert!(!mem.lob_is_open(lob));

        let mut reader = LobReader::new(&native, lob).unwrap();
        let mut out = Vec::new();
        let mut buf = vec![0u8; read_len];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        prop_assert_eq!(&out, &data);
        prop_assert_eq!(reader.offset(), data.len() as u64);

        drop(reader);
        native.lob_release(lob).unwrap();
        prop_assert_eq!(mem.live_lobs(), 0);
    }
}

#[test]
fn test_reader_end_of_stream_is_sticky() {
    let (mem, native) = native();
    let lob = mem.create_lob(LobKind::Clob, b"abc");
    let mut reader = LobReader::new(&native, lob).unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(reader.read(&mut buf).unwrap(), 3);
    assert_eq!(&buf[..3], b"abc");
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
    assert!(reader.is_finished());

    let reads = mem.stats().lob_reads;
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
    assert_eq!(reader.read(&mut buf).unwrap(), 0);
    assert_eq!(mem.stats().lob_reads, reads);
    assert_eq!(reader.read(&mut []).unwrap(), 0);
}

#[test]
fn test_reader_failure_names_locator_and_offset() {
    let (mem, native) = native();
    let lob = mem.create_lob(LobKind::Blob, &[1, 2, 3, 4]);
    let mut reader = LobReader::new(&native, lob).unwrap();
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).unwrap();

    mem.fail_next(FaultPoint::LobRead, NativeError::new(22275, "ORA-22275: invalid LOB locator specified"));
    let err = reader.read(&mut buf).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains(&lob.to_string()), "{}", msg);
    assert!(msg.contains("offset 2"), "{}", msg);
    assert!(msg.contains("length 2"), "{}", msg);
}

#[test]
fn test_writer_detects_short_write() {
    let (mem, native) = native();
    mem.set_short_writes(true);
    let lob = native.lob_new_temp(LobKind::Blob).unwrap();
    let mut writer = LobWriter::new(&native, lob);
    let err = writer.write_all(b"abcdef").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("does not match offset 6"), "{}", msg);

    let lob2 = native.lob_new_temp(LobKind::Blob).unwrap();
    let mut unchecked = LobWriter::new(&native, lob2).with_size_check(false);
    unchecked.write_all(b"abcdef").unwrap();
    unchecked.close().unwrap();
}

#[test]
fn test_writer_open_failure_drops_locator() {
    let (mem, native) = native();
    let lob = native.lob_new_temp(LobKind::Clob).unwrap();
    let mut writer = LobWriter::new(&native, lob);

    mem.fail_next(FaultPoint::LobOpen, NativeError::new(22289, "ORA-22289: cannot perform operation on an unopened file or LOB"));
    assert!(writer.write(b"x").is_err());
    // the locator is gone; later writes fail without native calls
    assert!(writer.write(b"x").is_err());
    assert_eq!(mem.stats().lob_writes, 0);
    writer.close().unwrap();
    assert_eq!(mem.stats().lob_closes, 0);
}

#[tokio::test]
async fn test_lob_arguments_round_trip() {
    let (mem, _) = native();
    mem.set_lob_chunk_size(5);
    let sql = "SELECT :1, :2, :3 FROM dual";
    mem.script(sql, Script::Echo);
    let conn = Connection::new(mem.clone());
    let stmt = conn.prepare(sql).await.unwrap();

    let big: Vec<u8> = (0..=255u8).cycle().take(23).collect();
    let mut cursor = stmt
        .query(vec![
            BindArg::new(Lob::from_bytes(big.clone())),
            BindArg::new(Lob::from_text("")),
            BindArg::new(Lob::null(true)),
        ])
        .await
        .unwrap();

    // 23 bytes in chunks of 5
    assert_eq!(mem.stats().lob_writes, 5);
    let exec = mem.last_execution().unwrap();
    assert_eq!(exec.binds[0].spec.oracle_type, OracleTypeNum::Blob);
    assert_eq!(exec.binds[1].spec.oracle_type, OracleTypeNum::Clob);

    let mut row = cursor.next().await.unwrap().unwrap();
    let blob = row.get_mut(0).and_then(Value::as_lob_mut).unwrap();
    assert!(!blob.is_clob);
    assert_eq!(blob.read_all().unwrap(), Some(big));

    let empty = row.get_mut(1).and_then(Value::as_lob_mut).unwrap();
    assert!(empty.is_clob);
    assert_eq!(empty.read_string().unwrap(), Some(String::new()));

    assert_eq!(row.get(2), Some(&Value::Null));

    drop(row);
    cursor.close().await.unwrap();
    stmt.close().await.unwrap();
    assert_eq!(mem.live_temp_lobs(), 0);
    assert_eq!(mem.live_vars(), 0);
}

#[tokio::test]
async fn test_clob_column_is_read_lazily() {
    let (mem, _) = native();
    let text = "ünïcødé ".repeat(100);
    mem.script(
        "SELECT doc FROM docs",
        Script::query(
            vec![MemColumn::new("DOC", OracleTypeNum::Clob, NativeTypeNum::Lob)],
            vec![vec![MemValue::Clob(text.clone())], vec![MemValue::Null]],
        ),
    );
    let conn = Connection::new(mem.clone());
    let stmt = conn.prepare("SELECT doc FROM docs").await.unwrap();
    let mut cursor = stmt.query(vec![]).await.unwrap();

    let mut row = cursor.next().await.unwrap().unwrap();
    assert_eq!(mem.stats().lob_reads, 0);
    let mut lob = match row.take(0) {
        Some(Value::Lob(lob)) => lob,
        other => panic!("expected a LOB, got {:?}", other),
    };
    assert_eq!(lob.read_string().unwrap(), Some(text));
    assert!(mem.stats().lob_reads > 1);

    let row = cursor.next().await.unwrap().unwrap();
    assert_eq!(row.get(0), Some(&Value::Null));
    assert!(cursor.next().await.unwrap().is_none());

    // the value outlives the cursor
    cursor.close().await.unwrap();
    assert_eq!(mem.live_lobs(), 1);
    drop(lob);
    assert_eq!(mem.live_lobs(), 0);
}

#[tokio::test]
async fn test_failed_lob_bind_releases_temporary() {
    let (mem, _) = native();
    let sql = "INSERT INTO docs VALUES (:1)";
    mem.script(sql, Script::dml(1));
    let conn = Connection::new(mem.clone());
    let stmt = conn.prepare(sql).await.unwrap();

    mem.set_lob_chunk_size(4);
    mem.fail_next(FaultPoint::LobWrite, NativeError::new(1691, "ORA-01691: unable to extend lob segment"));
    let err = stmt
        .execute(vec![BindArg::new(Lob::from_text("more than one chunk"))])
        .await
        .unwrap_err();
    assert_eq!(err.native_code(), Some(1691));
    assert!(err.to_string().starts_with("argument 1: "), "{}", err);
    assert_eq!(mem.live_temp_lobs(), 0);
    assert_eq!(mem.live_vars(), 0);

    assert_eq!(
        stmt.execute(vec![BindArg::new(Lob::from_text("ok"))]).await.unwrap(),
        1
    );
    assert_eq!(mem.live_temp_lobs(), 1);
    stmt.close().await.unwrap();
    assert_eq!(mem.live_temp_lobs(), 0);
}

#[test]
fn test_lob_write_errors_surface_as_crate_errors() {
    let (mem, native) = native();
    let lob = native.lob_new_temp(LobKind::Blob).unwrap();
    mem.fail_next(FaultPoint::LobWrite, NativeError::new(1691, "ORA-01691: unable to extend lob segment"));
    let mut source: &[u8] = b"payload";
    let mut writer = LobWriter::new(&native, lob);
    let err = std::io::copy(&mut source, &mut writer).unwrap_err();
    let inner = err.into_inner().unwrap().downcast::<Error>().unwrap();
    assert_eq!(inner.native_code(), Some(1691));
}
