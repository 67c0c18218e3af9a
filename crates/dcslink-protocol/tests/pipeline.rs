//! End-to-end checks of the protocol pipeline without a socket:
//! catalog lookup, binding, encoding, framing, and parsing.

use dcslink_protocol::{
    API_OBJECT_BY_ID, API_WORLD_OBJECTS, Catalog, Codec, FrameBuffer,
    JsonCodec, LineCodec, Scalar, TransportRecord, Value, bind, parse,
};

const WORLD: &str = "\
16788480:
    Name: F-16C_50
    Type:
        level1: 1
        level2: 1
    Flags:
        1: Born
        2: AI_ON
16788736:
    Name: Su-27
    LatLongAlt:
        Lat: 41.6
        Long: 41.6
        Alt: 7000
";

#[test]
fn test_world_objects_round_trip_over_line_codec() {
    let api = Catalog::builtin().get(API_WORLD_OBJECTS).expect("builtin");
    let call = bind(api, Vec::<(String, Scalar)>::new()).expect("bind");
    assert_eq!(LineCodec.encode(&call).expect("encode"), b"LoGetWorldObjects()\n");

    // The reply arrives split at an awkward point.
    let wire = format!("{WORLD}\n");
    let (a, b) = wire.as_bytes().split_at(37);
    let mut buf = FrameBuffer::from(a.to_vec());
    assert!(LineCodec.decode(&mut buf).expect("decode").is_none());
    buf.extend(b);
    let reply = LineCodec.decode(&mut buf).expect("decode").expect("complete");

    let records = parse(&reply.body).expect("parse");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].get("Name").and_then(Value::as_str), Some("F-16C_50"));
    let flags = records[0].get("Flags").and_then(Value::as_list).expect("list");
    assert_eq!(flags.len(), 2);
    assert_eq!(
        records[1].get_path(&["LatLongAlt", "Alt"]).and_then(Value::as_i64),
        Some(7000)
    );
}

#[test]
fn test_object_by_id_over_json_codec() {
    let api = Catalog::builtin().get(API_OBJECT_BY_ID).expect("builtin");
    let call = bind(api, [("object_id", 16788480)]).expect("bind");

    // Play the export script: echo the request back with a result filled in.
    let sent = JsonCodec.encode(&call).expect("encode");
    let mut record: TransportRecord = serde_json::from_slice(&sent).expect("request json");
    assert_eq!(record.parameter_defs[0].value, "16788480");
    // Single-object replies carry the fields without an id header.
    record.result = "Name: F-16C_50\nLatLongAlt:\n    Alt: 7000\nCoalitionID: 2\n".into();
    let mut buf = FrameBuffer::from(serde_json::to_vec(&record).expect("reply json"));

    let reply = JsonCodec.decode(&mut buf).expect("decode").expect("complete");
    assert_eq!(reply.api_id, Some(API_OBJECT_BY_ID));
    let records = parse(&reply.body).expect("parse");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id(), None);
    assert_eq!(records[0].get("Name").and_then(Value::as_str), Some("F-16C_50"));
    assert_eq!(
        records[0].get_path(&["LatLongAlt", "Alt"]).and_then(Value::as_i64),
        Some(7000)
    );
}

#[test]
fn test_parsed_records_serialize_to_json() {
    let records = parse("1:\n  Name: Player\n  Pos:\n    x: 1.5\n").expect("parse");
    let json = serde_json::to_value(&records).expect("json");
    assert_eq!(json[0]["id"], 1);
    assert_eq!(json[0]["Name"], "Player");
    assert_eq!(json[0]["Pos"]["x"], 1.5);
}
