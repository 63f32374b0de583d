use super::*;
use serde_json::{json, Value};

fn frame_json(msg: &ClientMessage) -> Value {
    serde_json::from_str(&msg.to_frame().unwrap()).unwrap()
}

#[test]
fn test_subscribe_region_frame() {
    let msg = ClientMessage::SubscribeRegion {
        region: Region::parse("middle_east").unwrap(),
    };
    assert_eq!(
        frame_json(&msg),
        json!({ "type": "subscribe_region", "region": "middle_east" })
    );
}

#[test]
fn test_paginated_request_frame() {
    let msg = ClientMessage::request(false, 3, 100);
    assert_eq!(
        frame_json(&msg),
        json!({ "type": "request_vessels", "allVessels": false, "page": 3, "pageSize": 100 })
    );
}

#[test]
fn test_all_vessels_request_omits_pagination() {
    let msg = ClientMessage::request(true, 3, 100);
    assert_eq!(
        frame_json(&msg),
        json!({ "type": "request_vessels", "allVessels": true })
    );
}

#[test]
fn test_parse_vessel_update() {
    let text = r#"{
        "type": "vessel_update",
        "vessels": [
            {"id": "a", "latitude": 1.0, "longitude": 2.0},
            {"id": "b", "latitude": null, "longitude": null}
        ],
        "timestamp": "2026-03-01T10:00:00Z",
        "totalCount": 120,
        "totalPages": 3,
        "currentPage": 2,
        "pageSize": 50
    }"#;

    let Inbound::Batch(batch) = parse_server_message(text).unwrap() else {
        panic!("expected batch");
    };
    assert_eq!(batch.entities.len(), 2);
    assert_eq!(batch.total_count, Some(120));
    assert_eq!(batch.total_pages, Some(3));
    assert_eq!(batch.current_page, Some(2));
    assert_eq!(batch.page_size, Some(50));
    assert_eq!(
        batch.timestamp.unwrap().to_rfc3339(),
        "2026-03-01T10:00:00+00:00"
    );
}

#[test]
fn test_parse_minimal_vessel_update() {
    let Inbound::Batch(batch) =
        parse_server_message(r#"{"type":"vessel_update","vessels":[]}"#).unwrap()
    else {
        panic!("expected batch");
    };
    assert!(batch.entities.is_empty());
    assert_eq!(batch.total_count, None);
    assert_eq!(batch.timestamp, None);
}

#[test]
fn test_bad_timestamp_is_dropped() {
    let Inbound::Batch(batch) = parse_server_message(
        r#"{"type":"vessel_update","vessels":[],"timestamp":"yesterday"}"#,
    )
    .unwrap() else {
        panic!("expected batch");
    };
    assert_eq!(batch.timestamp, None);
}

#[test]
fn test_parse_server_error() {
    let inbound = parse_server_message(r#"{"type":"error","error":"region not found"}"#).unwrap();
    assert_eq!(inbound, Inbound::ServerError("region not found".to_string()));
}

#[test]
fn test_malformed_frames_rejected() {
    assert!(parse_server_message("not json").is_err());
    assert!(parse_server_message(r#"{"type":"vessel_update"}"#).is_err());
    assert!(parse_server_message(r#"{"type":"vessel_update","vessels":{}}"#).is_err());
    assert!(parse_server_message(r#"{"type":"heartbeat"}"#).is_err());
    assert!(parse_server_message(r#"{"vessels":[]}"#).is_err());
}

#[test]
fn test_poll_response_into_batch() {
    let resp: PollResponse = serde_json::from_value(json!({
        "vessels": [{"id": 7, "latitude": 10.0, "longitude": 20.0, "type": "tanker"}],
        "timestamp": "2026-03-01T10:00:00.000Z",
        "totalCount": 1,
        "totalPages": 1,
        "currentPage": 1,
        "pageSize": 500
    }))
    .unwrap();

    let batch = Batch::from(resp);
    assert_eq!(batch.entities[0].id, "7");
    assert_eq!(batch.page_size, Some(500));
    assert!(batch.timestamp.is_some());
}

#[test]
fn test_undecodable_vessel_is_skipped() {
    let frame = json!({
        "type": "vessel_update",
        "vessels": [
            {"id": "a", "latitude": 1.0, "longitude": 2.0},
            {"id": null, "latitude": 3.0, "longitude": 4.0},
            {"latitude": 5.0, "longitude": 6.0}
        ],
        "totalCount": 3
    });

    let Inbound::Batch(batch) = parse_server_message(&frame.to_string()).unwrap() else {
        panic!("expected a batch");
    };
    assert_eq!(batch.entities.len(), 1);
    assert_eq!(batch.entities[0].id, "a");
    assert_eq!(batch.total_count, Some(3));
}

#[test]
fn test_poll_response_skips_undecodable_vessel() {
    let resp: PollResponse = serde_json::from_value(json!({
        "vessels": [{"id": {"nested": true}}, {"id": 42}]
    }))
    .unwrap();

    let batch = Batch::from(resp);
    assert_eq!(batch.entities.len(), 1);
    assert_eq!(batch.entities[0].id, "42");
}
