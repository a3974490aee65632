//! Property tests for scatter-gather copies
//!
//! The same logical bytes split into 1, 3 or 7 spans must copy identically,
//! and out-of-range copies must fail without touching the destination.

use proptest::prelude::*;
use rrlite_codec::{copy, copy_typed, ProtocolError, ScatterGatherBuffer, ScatterGatherBufferMut};

/// Split `data` at the given cut points (sorted, deduplicated, in range)
fn split_at_cuts<'a>(data: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
    points.sort_unstable();
    let mut spans = Vec::with_capacity(points.len() + 1);
    let mut start = 0;
    for p in points {
        spans.push(&data[start..p]);
        start = p;
    }
    spans.push(&data[start..]);
    spans
}

fn copy_out(
    spans: &[&[u8]],
    pos: usize,
    count: usize,
    out_len: usize,
    dst_pos: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let mut out = vec![0u8; out_len];
    let src = ScatterGatherBuffer::vectored(spans);
    copy(&src, pos, &mut ScatterGatherBufferMut::single(&mut out), dst_pos, count)?;
    Ok(out)
}

prop_compose! {
    fn data_and_range()(data in proptest::collection::vec(any::<u8>(), 1..256))
        (a in 0..=data.len(), b in 0..=data.len(), data in Just(data))
        -> (Vec<u8>, usize, usize) {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        (data, start, end - start)
    }
}

proptest! {
    #[test]
    fn prop_span_splits_copy_identically(
        (data, pos, count) in data_and_range(),
        cuts3 in proptest::collection::vec(any::<usize>(), 2),
        cuts7 in proptest::collection::vec(any::<usize>(), 6),
    ) {
        let one = [&data[..]];
        let three = split_at_cuts(&data, &cuts3);
        let seven = split_at_cuts(&data, &cuts7);
        prop_assert_eq!(three.len(), 3);
        prop_assert_eq!(seven.len(), 7);

        let expected = copy_out(&one, pos, count, count + 5, 5).unwrap();
        prop_assert_eq!(&expected[5..], &data[pos..pos + count]);
        prop_assert_eq!(copy_out(&three, pos, count, count + 5, 5).unwrap(), expected.clone());
        prop_assert_eq!(copy_out(&seven, pos, count, count + 5, 5).unwrap(), expected);
    }

    #[test]
    fn prop_split_destination_matches(
        (data, pos, count) in data_and_range(),
        cuts in proptest::collection::vec(any::<usize>(), 4),
    ) {
        let src = ScatterGatherBuffer::single(&data);
        let mut backing = vec![0u8; count];
        {
            let mut points: Vec<usize> = cuts.iter().map(|c| c % (count + 1)).collect();
            points.sort_unstable();
            let mut rest: &mut [u8] = &mut backing;
            let mut parts: Vec<&mut [u8]> = Vec::new();
            let mut taken = 0;
            for p in points {
                let (head, tail) = std::mem::take(&mut rest).split_at_mut(p - taken);
                parts.push(head);
                rest = tail;
                taken = p;
            }
            parts.push(rest);
            let mut dst = ScatterGatherBufferMut::vectored(&mut parts);
            copy(&src, pos, &mut dst, 0, count).unwrap();
        }
        prop_assert_eq!(&backing[..], &data[pos..pos + count]);
    }

    #[test]
    fn prop_out_of_range_writes_nothing(
        data in proptest::collection::vec(any::<u8>(), 0..128),
        cuts in proptest::collection::vec(any::<usize>(), 2),
        pos in 0usize..160,
        count in 1usize..64,
    ) {
        prop_assume!(pos + count > data.len());
        let spans = split_at_cuts(&data, &cuts);
        let src = ScatterGatherBuffer::vectored(&spans);
        let mut out = vec![0xAAu8; 256];
        let err = copy(&src, pos, &mut ScatterGatherBufferMut::single(&mut out), 0, count).unwrap_err();
        let is_out_of_range = matches!(err, ProtocolError::OutOfRange { .. });
        prop_assert!(is_out_of_range);
        prop_assert!(out.iter().all(|b| *b == 0xAA));

        let err = copy_typed(&src, pos, 1, count, &mut ScatterGatherBufferMut::single(&mut out), 0, 1, count)
            .unwrap_err();
        let is_out_of_range = matches!(err, ProtocolError::OutOfRange { .. });
        prop_assert!(is_out_of_range);
        prop_assert!(out.iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn prop_typed_read_matches_native(values in proptest::collection::vec(any::<i64>(), 1..32), cut in any::<usize>()) {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let spans = split_at_cuts(&bytes, &[cut]);
        let src = ScatterGatherBuffer::vectored(&spans);
        let mut decoded = vec![0i64; values.len()];
        src.read_typed(0, &mut decoded).unwrap();
        prop_assert_eq!(decoded, values);
    }
}
