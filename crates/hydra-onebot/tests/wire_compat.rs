//! Wire-format compatibility fixtures: literal frames as OneBot
//! implementations emit them, and the exact request shapes they expect.

use hydra_onebot::{parse_payload, ActionRequest, OnebotEvent, Payload, Segment};

#[test]
fn group_send_request_matches_wire_shape() {
    let mut request = ActionRequest::group_msg(7, vec![Segment::text("hello")]);
    request.echo = "1".into();

    let json = serde_json::to_value(&request).unwrap();
    let expected = serde_json::json!({
        "action": "send_msg",
        "params": {
            "message_type": "group",
            "group_id": 7,
            "message": [ { "type": "text", "data": { "text": "hello" } } ]
        },
        "echo": "1"
    });
    assert_eq!(json, expected);
}

#[test]
fn private_send_request_matches_wire_shape() {
    let request = ActionRequest::private_msg(2000, vec![Segment::reply("555"), Segment::text("re")]);
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["params"]["message_type"], "private");
    assert_eq!(json["params"]["user_id"], 2000);
    assert_eq!(json["params"]["message"][0]["type"], "reply");
    assert_eq!(json["params"]["message"][0]["data"]["id"], "555");
}

#[test]
fn send_ack_response_parses() {
    let frame: serde_json::Value = serde_json::from_str(
        r#"{"status":"ok","retcode":0,"data":{"message_id":555},"echo":"3"}"#,
    )
    .unwrap();
    match parse_payload(frame).unwrap() {
        Payload::Response(response) => {
            assert_eq!(response.echo, "3");
            assert_eq!(response.message_id(), Some(555));
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn group_message_event_parses_segments() {
    let frame: serde_json::Value = serde_json::from_str(
        r#"{
            "time": 1700000000,
            "self_id": 9999,
            "post_type": "message",
            "message_type": "group",
            "sub_type": "normal",
            "message_id": 555,
            "group_id": 7,
            "user_id": 1234,
            "message": [
                { "type": "reply", "data": { "id": "100" } },
                { "type": "at", "data": { "qq": "9999" } },
                { "type": "text", "data": { "text": " reply" } }
            ],
            "raw_message": "[CQ:reply,id=100][CQ:at,qq=9999] reply",
            "sender": { "user_id": 1234, "nickname": "peer", "card": "" }
        }"#,
    )
    .unwrap();

    match parse_payload(frame).unwrap() {
        Payload::Event(OnebotEvent::Message(event)) => {
            assert_eq!(event.message_id, 555);
            assert_eq!(event.group_id, 7);
            assert_eq!(event.message.len(), 3);
            assert_eq!(event.message[0].reply_id(), "100");
            assert_eq!(event.message[1].at_target(), "9999");
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn lifecycle_connect_parses() {
    let frame: serde_json::Value = serde_json::from_str(
        r#"{"time":1700000000,"self_id":9999,"post_type":"meta_event",
            "meta_event_type":"lifecycle","sub_type":"connect"}"#,
    )
    .unwrap();
    match parse_payload(frame).unwrap() {
        Payload::Event(OnebotEvent::Lifecycle(event)) => {
            assert_eq!(event.sub_type, "connect");
            assert_eq!(event.self_id, 9999);
        }
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn media_fetch_requests_match_wire_shape() {
    let record = serde_json::to_value(ActionRequest::get_record("f.amr")).unwrap();
    assert_eq!(record["action"], "get_record");
    assert_eq!(record["params"]["out_format"], "amr");

    let image = serde_json::to_value(ActionRequest::get_image("img-key")).unwrap();
    assert_eq!(image["params"]["file"], "img-key");

    let file = serde_json::to_value(ActionRequest::get_file("fid")).unwrap();
    assert_eq!(file["params"]["file_id"], "fid");

    let forward = serde_json::to_value(ActionRequest::get_forward_msg("fw")).unwrap();
    assert_eq!(forward["params"]["id"], "fw");
    assert_eq!(forward["params"]["message_id"], "fw");
}
