use super::*;

fn legacy_body(id: &str) -> String {
    format!(
        r#"{{"Id":"{id}","Header":{{"Sender":"TelemetryService","BodyTypeName":"ProcessLog"}},"Body":"{{\"step\":1}}"}}"#
    )
}

#[test]
fn legacy_frame_with_trailing_separator_is_stripped_before_parsing() {
    let mut frame = legacy_body("11111111-0000-0000-0000-000000000001").into_bytes();
    frame.push(RECORD_SEPARATOR);

    let messages = Variant::Legacy.decode_frame(&frame).expect("frame decodes");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "11111111-0000-0000-0000-000000000001");
    assert_eq!(messages[0].sender, "TelemetryService");
    assert_eq!(messages[0].body_type_name, "ProcessLog");
}

#[test]
fn legacy_frame_without_separator_decodes_full_buffer() {
    let frame = legacy_body("11111111-0000-0000-0000-000000000002").into_bytes();

    let messages = Variant::Legacy.decode_frame(&frame).expect("frame decodes");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].body, r#"{"step":1}"#);
}

#[test]
fn legacy_frame_with_malformed_json_is_an_error() {
    let err = Variant::Legacy
        .decode_frame(b"{not json")
        .expect_err("malformed frame should fail");
    assert!(matches!(err, ProtocolError::Json(_)));
}

#[test]
fn legacy_frame_tolerates_missing_header() {
    let frame = br#"{"Id":"abc","Body":"hello"}"#;

    let messages = Variant::Legacy.decode_frame(frame).expect("frame decodes");
    assert_eq!(messages[0].id, "abc");
    assert_eq!(messages[0].sender, "");
    assert_eq!(messages[0].body, "hello");
}

fn hub_envelope(ids: &[&str]) -> String {
    let arguments: Vec<String> = ids
        .iter()
        .map(|id| format!(r#"{{"Id":"{id}","Header":{{"Sender":"s","BodyTypeName":"t"}},"Body":"b"}}"#))
        .collect();
    format!(
        r#"{{"type":1,"target":"Message","arguments":[{}]}}"#,
        arguments.join(",")
    )
}

#[test]
fn hub_frame_with_two_envelopes_decodes_both_in_order() {
    let mut frame = hub_envelope(&["a-1"]).into_bytes();
    frame.push(RECORD_SEPARATOR);
    frame.extend_from_slice(hub_envelope(&["a-2"]).as_bytes());
    frame.push(RECORD_SEPARATOR);

    let messages = Variant::Hub.decode_frame(&frame).expect("frame decodes");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, "a-1");
    assert_eq!(messages[1].id, "a-2");
}

#[test]
fn hub_envelope_with_empty_arguments_produces_no_messages() {
    // SignalR keep-alive: `{"type":6}` terminated by the record separator.
    let mut frame = br#"{"type":6}"#.to_vec();
    frame.push(RECORD_SEPARATOR);
    frame.extend_from_slice(hub_envelope(&["real"]).as_bytes());
    frame.push(RECORD_SEPARATOR);

    let messages = Variant::Hub.decode_frame(&frame).expect("frame decodes");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "real");
}

#[test]
fn hub_envelope_preserves_sub_message_order_within_one_envelope() {
    let mut frame = hub_envelope(&["m-1", "m-2", "m-3"]).into_bytes();
    frame.push(RECORD_SEPARATOR);

    let messages = Variant::Hub.decode_frame(&frame).expect("frame decodes");
    let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m-1", "m-2", "m-3"]);
}

#[test]
fn malformed_hub_envelope_is_dropped_and_the_rest_still_decode() {
    let mut frame = b"{broken".to_vec();
    frame.push(RECORD_SEPARATOR);
    frame.extend_from_slice(hub_envelope(&["survivor"]).as_bytes());
    frame.push(RECORD_SEPARATOR);

    let messages = Variant::Hub.decode_frame(&frame).expect("frame decodes");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, "survivor");
}

#[test]
fn hub_frame_with_only_separators_is_empty() {
    let frame = [RECORD_SEPARATOR, RECORD_SEPARATOR];
    let messages = Variant::Hub.decode_frame(&frame).expect("frame decodes");
    assert!(messages.is_empty());
}

#[test]
fn handshake_constant_is_record_separator_terminated() {
    let bytes = HUB_HANDSHAKE.as_bytes();
    assert_eq!(*bytes.last().expect("non-empty"), RECORD_SEPARATOR);
    // Everything before the separator must be the plain protocol object.
    assert_eq!(
        &HUB_HANDSHAKE[..HUB_HANDSHAKE.len() - 1],
        r#"{"protocol":"json","version":1}"#
    );
}

#[test]
fn negotiate_response_parses_token_fields() {
    let body = r#"{"connectionId":"cid","connectionToken":"tok-123","negotiateVersion":1}"#;
    let response = NegotiateResponse::parse(body).expect("negotiate parses");
    assert_eq!(response.connection_id, "cid");
    assert_eq!(response.connection_token, "tok-123");
    assert_eq!(response.negotiate_version, 1);
}

#[test]
fn negotiate_response_without_token_is_rejected() {
    let err = NegotiateResponse::parse(r#"{"connectionId":"cid"}"#)
        .expect_err("token is required");
    assert!(matches!(err, ProtocolError::MissingToken));
}

#[test]
fn token_response_parses_oauth_fields() {
    let body = r#"{"access_token":"abc","expires_in":3600,"token_type":"Bearer"}"#;
    let token: TokenResponse = serde_json::from_str(body).expect("token parses");
    assert_eq!(token.access_token, "abc");
    assert_eq!(token.expires_in, 3600);
    assert_eq!(token.token_type, "Bearer");
}

#[test]
fn socket_paths_differ_per_variant() {
    assert_eq!(Variant::Legacy.socket_path(), "/0/Nui/ViewModule.aspx.ashx");
    assert_eq!(Variant::Hub.socket_path(), "/msg");
}
