//! Tests for WAL Entry serialization and deserialization
//!
//! These tests verify:
//! - Round-trip of commit batches (puts, deletes, empty batches)
//! - CRC32 corruption detection (data and LSN)
//! - Edge cases (truncation, malformed data, large values)

use tickvault::wal::{Operation, WalEntry, HEADER_SIZE};
use tickvault::TickError;

// =============================================================================
// Helper Functions
// =============================================================================

fn put(key: &[u8], value: &[u8]) -> Operation {
    Operation::Put {
        key: key.to_vec(),
        value: value.to_vec(),
    }
}

fn delete(key: &[u8]) -> Operation {
    Operation::Delete { key: key.to_vec() }
}

// =============================================================================
// Serialization Tests
// =============================================================================

#[test]
fn test_serialize_deserialize_batch() {
    let entry = WalEntry::new(
        7,
        vec![put(b"hello", b"world"), delete(b"gone"), put(b"", b"empty key")],
    );

    let bytes = entry.serialize().unwrap();
    let recovered = WalEntry::deserialize(&bytes).unwrap();

    assert_eq!(recovered, entry);
    assert_eq!(recovered.operations.len(), 3);
}

#[test]
fn test_serialize_deserialize_empty_batch() {
    let entry = WalEntry::new(1, Vec::new());

    let bytes = entry.serialize().unwrap();

    assert_eq!(WalEntry::deserialize(&bytes).unwrap(), entry);
}

#[test]
fn test_header_layout() {
    let entry = WalEntry::new(0x0102_0304, vec![delete(b"k")]);
    let bytes = entry.serialize().unwrap();

    assert_eq!(&bytes[0..8], &0x0102_0304u64.to_le_bytes());
    let len = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    assert_eq!(bytes.len(), HEADER_SIZE + len);

    let crc = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    assert_eq!(crc, WalEntry::compute_crc(entry.lsn, &bytes[HEADER_SIZE..]));
}

#[test]
fn test_deserialize_ignores_trailing_bytes() {
    let first = WalEntry::new(1, vec![put(b"a", b"1")]);
    let second = WalEntry::new(2, vec![put(b"b", b"2")]);
    let mut bytes = first.serialize().unwrap();
    bytes.extend(second.serialize().unwrap());

    assert_eq!(WalEntry::deserialize(&bytes).unwrap(), first);
}

// =============================================================================
// CRC Corruption Detection Tests
// =============================================================================

#[test]
fn test_crc_corruption_detected() {
    let entry = WalEntry::new(1, vec![put(b"key", b"value")]);
    let mut bytes = entry.serialize().unwrap();

    // Corrupt a byte in the data section
    if let Some(byte) = bytes.last_mut() {
        *byte ^= 0xFF;
    }

    let result = WalEntry::deserialize(&bytes);
    assert!(matches!(result, Err(TickError::WalCorruption(_))));
}

#[test]
fn test_crc_covers_lsn() {
    let entry = WalEntry::new(1, vec![put(b"key", b"value")]);
    let mut bytes = entry.serialize().unwrap();

    // Rewrite the LSN without touching the CRC
    bytes[0] = 2;

    let result = WalEntry::deserialize(&bytes);
    assert!(matches!(result, Err(TickError::WalCorruption(_))));
}

// =============================================================================
// Edge Case Tests
// =============================================================================

#[test]
fn test_truncated_entry() {
    let entry = WalEntry::new(1, vec![delete(b"key")]);
    let bytes = entry.serialize().unwrap();

    let result = WalEntry::deserialize(&bytes[..HEADER_SIZE + 2]);
    assert!(matches!(result, Err(TickError::WalCorruption(_))));
}

#[test]
fn test_header_too_small() {
    assert!(WalEntry::deserialize(&[0u8; 10]).is_err());
    assert!(WalEntry::deserialize(&[]).is_err());
}

#[test]
fn test_large_value() {
    let large_value = vec![0xAB; 1024 * 1024]; // 1 MB value
    let entry = WalEntry::new(999, vec![put(b"big_key", &large_value)]);

    let bytes = entry.serialize().unwrap();
    let recovered = WalEntry::deserialize(&bytes).unwrap();

    match &recovered.operations[0] {
        Operation::Put { key, value } => {
            assert_eq!(key, b"big_key");
            assert_eq!(value, &large_value);
        }
        other => panic!("Expected Put operation, got {:?}", other),
    }
}

#[test]
fn test_lsn_preserved() {
    for lsn in [0, 1, u64::MAX, 12345678901234] {
        let entry = WalEntry::new(lsn, vec![delete(b"key")]);
        let bytes = entry.serialize().unwrap();

        assert_eq!(WalEntry::deserialize(&bytes).unwrap().lsn, lsn);
    }
}
