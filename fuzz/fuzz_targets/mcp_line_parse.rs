#![no_main]

use libfuzzer_sys::fuzz_target;
use tau_mcp_proxy::{McpMessage, MessageKind};

fuzz_target!(|data: &[u8]| {
    let Some(message) = McpMessage::parse(data) else {
        return;
    };
    match message.kind() {
        MessageKind::Request => assert!(message.method().is_some() && message.id().is_some()),
        MessageKind::Response => assert!(message.id().is_some()),
        MessageKind::Notification => assert!(message.request_id().is_none()),
    }
    let encoded = message.to_line().expect("object re-encodes");
    assert_eq!(McpMessage::parse(&encoded).as_ref(), Some(&message));
});
