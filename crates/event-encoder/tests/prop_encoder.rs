use capture_common::{
    CaptureSettings, Tid,
    consts::MAX_ARG_SIZE,
    parsing::{EventRecord, EventType, HEADER_SIZE},
    time::Timestamp,
};
use event_encoder::{EventEncoder, NoMemory, ParamValue, ScratchBuffer, TruncationPolicy};
use proptest::prelude::*;

fn sendto_exit(scratch: &mut ScratchBuffer, res: i64, data: &[u8]) -> Option<bytes::Bytes> {
    let settings = CaptureSettings::default();
    let mut encoder = EventEncoder::begin(
        scratch,
        &settings,
        &NoMemory,
        EventType::SOCKET_SENDTO_X,
        Timestamp::from(1),
        Tid::from_raw(7),
    )
    .ok()?;
    let _ = encoder.push(ParamValue::I64(res));
    let _ = encoder.push(ParamValue::bytes(data));
    encoder
        .finish_with(TruncationPolicy::EmitPartial)
        .ok()
        .flatten()
        .map(|frame| frame.bytes)
}

// ---------------------------------------------------------------------------
// Property: encoded buffers decode to the same bytes, cut at the size limit
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn byte_buffers_round_trip(
        res in any::<i64>(),
        data in proptest::collection::vec(any::<u8>(), 0..70_000),
    ) {
        let mut scratch = ScratchBuffer::default();
        let bytes = sendto_exit(&mut scratch, res, &data).unwrap();
        let record = EventRecord::parse(bytes).unwrap();
        prop_assert_eq!(record.param(0).unwrap().as_i64().unwrap(), Some(res));
        let kept = data.len().min(MAX_ARG_SIZE as usize);
        prop_assert_eq!(record.param(1).unwrap().data, &data[..kept]);
    }
}

// ---------------------------------------------------------------------------
// Property: whatever the scratch capacity, emitted records are well formed
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn truncated_records_still_decode(
        capacity in (HEADER_SIZE + 4)..512,
        data in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let mut scratch = ScratchBuffer::with_capacity(capacity);
        let bytes = sendto_exit(&mut scratch, -1, &data).unwrap();
        prop_assert!(bytes.len() <= capacity);
        let record = EventRecord::parse(bytes.clone()).unwrap();
        prop_assert_eq!(record.header().len as usize, bytes.len());
        let param = record.param(1).unwrap();
        prop_assert!(param.is_empty() || param.data == &data[..]);
    }
}
