use wiregram_core::ParseError;

use crate::stream::{FindOutcome, Stream};

#[test]
fn append_then_read_across_chunks() {
    let mut stream = Stream::new();
    stream.append("GET ").unwrap();
    stream.append("/index").unwrap();

    let view = stream.view();
    assert_eq!(view.size(&stream), 10);
    assert_eq!(stream.slice(0, 10).unwrap(), b"GET /index");
    assert_eq!(stream.slice(2, 6).unwrap(), b"T /i");
}

#[test]
fn append_after_freeze_fails() {
    let mut stream = Stream::new();
    stream.append("x").unwrap();
    stream.freeze();
    assert!(matches!(stream.append("y"), Err(ParseError::Frozen)));

    stream.unfreeze();
    stream.append("y").unwrap();
    assert_eq!(stream.slice(0, 2).unwrap(), b"xy");
}

#[test]
fn advance_needs_data_or_suspends() {
    let mut stream = Stream::new();
    stream.append("abc").unwrap();

    let view = stream.view();
    let advanced = view.advance(&stream, 2).unwrap();
    assert_eq!(advanced.offset(), 2);

    // Not enough data, stream still growing: suspension signal.
    match view.advance(&stream, 5) {
        Err(ParseError::MissingData { offset }) => assert_eq!(offset, 3),
        other => panic!("expected missing data, got {other:?}"),
    }

    // Same request over a frozen stream: hard parse error.
    stream.freeze();
    match view.advance(&stream, 5) {
        Err(ParseError::Recoverable { offset, .. }) => assert_eq!(offset, 0),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn bounded_view_is_exhausted_within_buffered_data() {
    let mut stream = Stream::new();
    stream.append("abcdef").unwrap();

    let bounded = stream.view().with_limit(4);
    assert_eq!(bounded.size(&stream), 4);
    assert!(bounded.exhausted(&stream));
    assert!(bounded.advance(&stream, 5).is_err());

    // A bound past the appended data can still grow.
    let open = stream.view().with_limit(10);
    assert!(!open.exhausted(&stream));
    assert!(matches!(
        open.advance(&stream, 8),
        Err(ParseError::MissingData { .. })
    ));
}

#[test]
fn views_survive_append_and_trim() {
    let mut stream = Stream::new();
    stream.append("abcd").unwrap();
    let view = stream.view().advance(&stream, 2).unwrap();

    stream.append("efgh").unwrap();
    assert_eq!(view.size(&stream), 6);

    stream.trim(2);
    assert_eq!(stream.start_offset(), 2);
    assert_eq!(stream.slice(2, 8).unwrap(), b"cdefgh");
    assert_eq!(view.advance(&stream, 3).unwrap().offset(), 5);
}

#[test]
fn trim_releases_whole_chunks_below_offset() {
    let mut stream = Stream::new();
    stream.append("ab").unwrap();
    stream.append("cd").unwrap();
    stream.append("ef").unwrap();

    stream.trim(3);
    // Chunk "ab" is gone; "cd" straddles the watermark and is kept.
    assert!(stream.byte_at(1).is_none());
    assert_eq!(stream.byte_at(3), Some(b'd'));
}

#[test]
fn find_bytes_spans_chunk_boundaries() {
    let mut stream = Stream::new();
    stream.append("abcXY").unwrap();
    stream.append("Zdef").unwrap();

    assert_eq!(
        stream.find_bytes(b"XYZ", 0, None),
        FindOutcome::Found(3)
    );
}

#[test]
fn find_bytes_is_resumable() {
    let mut stream = Stream::new();
    stream.append("aaXB").unwrap();

    // "XY" cannot match yet, but "X" at offset 2 might still start one.
    match stream.find_bytes(b"BC", 0, None) {
        FindOutcome::Partial(resume) => {
            assert_eq!(resume, 3);
            stream.append("Cd").unwrap();
            assert_eq!(stream.find_bytes(b"BC", resume, None), FindOutcome::Found(3));
        }
        other => panic!("expected partial, got {other:?}"),
    }

    stream.freeze();
    assert_eq!(stream.find_bytes(b"QQ", 0, None), FindOutcome::NotFound);
}

#[test]
fn gap_occupies_offsets_without_data() {
    let mut stream = Stream::new();
    stream.append("ab").unwrap();
    stream.append_gap(3).unwrap();
    stream.append("cd").unwrap();

    assert_eq!(stream.end_offset(), 7);
    assert_eq!(stream.byte_at(3), None);
    assert!(stream.slice(0, 7).is_err());
    assert_eq!(stream.slice(5, 7).unwrap(), b"cd");
}

#[test]
fn starts_with_is_decisive_on_partial_mismatch() {
    let mut stream = Stream::new();
    stream.append("GE").unwrap();
    let view = stream.view();

    // Prefix matches so far, needle longer than data: undecided.
    assert_eq!(view.starts_with(&stream, b"GET"), None);
    // Prefix already differs: decided without more data.
    assert_eq!(view.starts_with(&stream, b"PUT"), Some(false));

    stream.append("T /").unwrap();
    assert_eq!(view.starts_with(&stream, b"GET"), Some(true));
}
