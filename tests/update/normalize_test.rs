//! Update normalization and webhook body parsing.

use serde_json::json;

use sharebot::update::{is_json_content_type, normalize, parse_body, MalformedPayload, UpdateKind};

use crate::common::message_json;

#[test]
fn message_update_is_classified() {
    let update = normalize(message_json(10, "hello")).expect("valid update");

    assert_eq!(update.update_id(), Some(10));
    assert_eq!(update.kind(), &UpdateKind::Message);
    assert_eq!(update.chat_id(), Some(42));
    assert_eq!(
        update.event().and_then(|e| e.get("text")),
        Some(&json!("hello"))
    );
}

#[test]
fn payload_is_kept_verbatim() {
    let raw = message_json(10, "hello");
    let update = normalize(raw.clone()).expect("valid update");
    assert_eq!(update.payload(), &raw);
}

#[test]
fn every_known_field_maps_to_its_kind() {
    let cases = [
        ("edited_message", UpdateKind::EditedMessage),
        ("channel_post", UpdateKind::ChannelPost),
        ("edited_channel_post", UpdateKind::EditedChannelPost),
        ("callback_query", UpdateKind::CallbackQuery),
        ("inline_query", UpdateKind::InlineQuery),
        ("chosen_inline_result", UpdateKind::ChosenInlineResult),
        ("shipping_query", UpdateKind::ShippingQuery),
        ("pre_checkout_query", UpdateKind::PreCheckoutQuery),
        ("poll", UpdateKind::Poll),
        ("poll_answer", UpdateKind::PollAnswer),
        ("my_chat_member", UpdateKind::MyChatMember),
        ("chat_member", UpdateKind::ChatMember),
        ("chat_join_request", UpdateKind::ChatJoinRequest),
    ];
    for (field, kind) in cases {
        let update = normalize(json!({"update_id": 1, field: {"id": "x"}}))
            .unwrap_or_else(|e| panic!("{field} should normalize: {e}"));
        assert_eq!(update.kind(), &kind);
        assert_eq!(update.kind().as_str(), field);
    }
}

#[test]
fn unknown_field_is_preserved_as_other() {
    let update = normalize(json!({"update_id": 1, "business_message": {"text": "x"}}))
        .expect("unknown kinds are not malformed");
    assert_eq!(
        update.kind(),
        &UpdateKind::Other("business_message".to_owned())
    );
    assert!(update.event().is_some());
}

#[test]
fn callback_query_chat_comes_from_its_message() {
    let update = normalize(json!({
        "update_id": 2,
        "callback_query": {"id": "q", "message": {"chat": {"id": -100}}}
    }))
    .expect("valid update");
    assert_eq!(update.chat_id(), Some(-100));
}

#[test]
fn inline_query_has_no_chat() {
    let update = normalize(json!({"update_id": 3, "inline_query": {"id": "q", "query": "x"}}))
        .expect("valid update");
    assert_eq!(update.chat_id(), None);
}

#[test]
fn update_id_is_optional() {
    let update = normalize(json!({"message": {"chat": {"id": 1}}})).expect("valid update");
    assert_eq!(update.update_id(), None);
}

#[test]
fn null_event_fields_are_ignored() {
    let update = normalize(json!({"update_id": 4, "message": null, "poll": {"id": "p"}}))
        .expect("valid update");
    assert_eq!(update.kind(), &UpdateKind::Poll);

    assert_eq!(
        normalize(json!({"update_id": 4, "message": null})),
        Err(MalformedPayload::NoEvent)
    );
}

#[test]
fn non_objects_are_malformed() {
    assert_eq!(
        normalize(json!([1, 2, 3])),
        Err(MalformedPayload::NotAnObject("array"))
    );
    assert_eq!(
        normalize(json!("text")),
        Err(MalformedPayload::NotAnObject("string"))
    );
    assert_eq!(normalize(json!(null)), Err(MalformedPayload::NotAnObject("null")));
}

#[test]
fn non_integer_update_id_is_malformed() {
    assert_eq!(
        normalize(json!({"update_id": "7", "message": {}})),
        Err(MalformedPayload::InvalidUpdateId)
    );
    assert_eq!(
        normalize(json!({"update_id": 1.5, "message": {}})),
        Err(MalformedPayload::InvalidUpdateId)
    );
}

#[test]
fn empty_object_has_no_event() {
    assert_eq!(normalize(json!({})), Err(MalformedPayload::NoEvent));
    assert_eq!(normalize(json!({"update_id": 9})), Err(MalformedPayload::NoEvent));
}

#[test]
fn each_normalization_gets_a_fresh_event_id() {
    let a = normalize(message_json(1, "x")).expect("valid update");
    let b = normalize(message_json(1, "x")).expect("valid update");

    assert_ne!(a.event_id(), b.event_id());
    assert!(a.same_shape(&b));
    assert!(!a.same_shape(&normalize(message_json(2, "x")).expect("valid update")));
}

#[test]
fn json_content_type_detection() {
    assert!(is_json_content_type(Some("application/json")));
    assert!(is_json_content_type(Some("application/json; charset=utf-8")));
    assert!(is_json_content_type(Some("APPLICATION/JSON")));
    assert!(!is_json_content_type(Some("text/plain")));
    assert!(!is_json_content_type(Some("application/jsonp")));
    assert!(!is_json_content_type(None));
}

#[test]
fn parse_body_checks_content_type_first() {
    let body = message_json(1, "x").to_string();
    assert_eq!(
        parse_body(Some("text/plain"), body.as_bytes()),
        Err(MalformedPayload::ContentType)
    );
    assert_eq!(
        parse_body(None, b"not json"),
        Err(MalformedPayload::ContentType)
    );
}

#[test]
fn parse_body_rejects_invalid_json() {
    let err = parse_body(Some("application/json"), b"{\"update_id\":").expect_err("truncated");
    assert!(matches!(err, MalformedPayload::InvalidJson(_)));
    assert!(err.to_string().to_lowercase().contains("json"));
}

#[test]
fn parse_body_accepts_a_valid_update() {
    let body = message_json(8, "x").to_string();
    let update = parse_body(Some("application/json"), body.as_bytes()).expect("valid body");
    assert_eq!(update.update_id(), Some(8));
}
