#![no_main]

use libfuzzer_sys::fuzz_target;
use replica_archive::core::varint::{read_varint, varint_len, write_varint};

fuzz_target!(|data: &[u8]| {
    // Whatever decodes must re-encode to the same length or shorter
    if let Ok((value, len)) = read_varint(data) {
        assert!(len <= 10);
        assert!(varint_len(value) <= len);

        let mut buf = Vec::new();
        write_varint(&mut buf, value);
        assert_eq!(read_varint(&buf).ok(), Some((value, buf.len())));
    }
});
