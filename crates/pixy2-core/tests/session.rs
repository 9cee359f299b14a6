mod common;

use common::*;
use pixy2_core::demo::{DemoConfig, SimulatedPixy};
use pixy2_core::protocol::commands::response;
use pixy2_core::protocol::{
    ConnectionState, Pixy2, ProtocolError, SessionConfig, SyncMode, DEFAULT_LINK_ARGUMENT,
};
use pretty_assertions::assert_eq;
use std::io::Write;

#[test]
fn test_version_query() {
    let mut pixy = Pixy2::new(ScriptedLink::new().respond(version_response()));

    let version = pixy.get_version().unwrap().clone();
    assert_eq!(version.hardware, 1);
    assert_eq!(version.firmware_major, 2);
    assert_eq!(version.firmware_minor, 0);
    assert_eq!(version.firmware_build, 5);
    assert_eq!(version.firmware_type_str(), "video");

    assert_eq!(pixy.link().sent, vec![vec![0xAE, 0xC1, 0x0E, 0x00]]);
    assert_eq!(pixy.sync_mode(), SyncMode::Checksummed);
}

#[test]
fn test_version_error_response_is_busy() {
    let mut pixy = Pixy2::new(ScriptedLink::new().respond(error(-1)));
    assert!(matches!(pixy.get_version(), Err(ProtocolError::Busy)));
}

#[test]
fn test_version_wrong_type() {
    let mut pixy = Pixy2::new(ScriptedLink::new().respond(resolution_response()));
    assert!(matches!(
        pixy.get_version(),
        Err(ProtocolError::UnexpectedResponse {
            expected: response::VERSION,
            actual: response::RESOLUTION
        })
    ));
}

#[test]
fn test_resolution_wrong_type() {
    let mut pixy = Pixy2::new(ScriptedLink::new().respond(result(0)));
    assert!(matches!(
        pixy.get_resolution(),
        Err(ProtocolError::UnexpectedResponse {
            expected: response::RESOLUTION,
            actual: response::RESULT
        })
    ));
    assert_eq!(pixy.frame_width(), None);
}

#[test]
fn test_version_info_is_cached() {
    let mut pixy = Pixy2::new(ScriptedLink::new().respond(version_response()));
    assert_eq!(pixy.version_info().unwrap().hardware, 1);
    assert_eq!(pixy.version_info().unwrap().hardware, 1);
    assert_eq!(pixy.link().sent.len(), 1);
}

#[test]
fn test_resolution_query() {
    let mut pixy = Pixy2::new(ScriptedLink::new().respond(resolution_response()));

    let res = pixy.get_resolution().unwrap();
    assert_eq!((res.width, res.height), (288, 224));
    assert_eq!(pixy.frame_width(), Some(288));
    assert_eq!(pixy.frame_height(), Some(224));
    // one placeholder byte
    assert_eq!(pixy.link().sent_payload(0), &[0u8][..]);
}

#[test]
fn test_init_fetches_version_and_resolution() {
    let link = ScriptedLink::new()
        .respond(version_response())
        .respond(resolution_response());
    let mut pixy = Pixy2::new(link);
    assert_eq!(pixy.state(), ConnectionState::Disconnected);

    pixy.init().unwrap();
    assert_eq!(pixy.state(), ConnectionState::Connected);
    assert_eq!(pixy.link().open_argument, Some(DEFAULT_LINK_ARGUMENT));
    assert_eq!(pixy.link().sent_types(), vec![0x0E, 0x0C]);
    assert_eq!(pixy.version().map(|v| v.firmware_build), Some(5));
    assert_eq!(pixy.resolution().map(|r| r.width), Some(288));
}

#[test]
fn test_init_retries_until_version_answers() {
    let link = ScriptedLink::new()
        .respond(error(-2))
        .respond(Vec::new())
        .respond(version_response())
        .respond(resolution_response());
    let mut pixy = Pixy2::with_config(link, fast_config());

    pixy.init().unwrap();
    assert_eq!(pixy.link().sent_types(), vec![0x0E, 0x0E, 0x0E, 0x0C]);
}

#[test]
fn test_init_times_out() {
    let link = ScriptedLink::new().otherwise(error(-2));
    let mut pixy = Pixy2::with_config(link, fast_config());

    assert!(matches!(pixy.init(), Err(ProtocolError::Timeout)));
    assert_eq!(pixy.state(), ConnectionState::Error);
    assert!(pixy.link().sent.len() > 1);
}

#[test]
fn test_init_open_failure() {
    let mut link = ScriptedLink::new();
    link.fail_open = true;
    let mut pixy = Pixy2::new(link);

    assert!(matches!(pixy.init(), Err(ProtocolError::Transport(-1))));
    assert_eq!(pixy.state(), ConnectionState::Disconnected);
    assert!(pixy.link().sent.is_empty());
}

#[test]
fn test_failed_open_never_closes_link() {
    let mut link = ScriptedLink::new();
    link.fail_open = true;
    {
        let mut pixy = Pixy2::new(&mut link);
        assert!(pixy.init().is_err());
        pixy.close();
    }
    assert_eq!(link.open_calls, 1);
    assert_eq!(link.close_calls, 0);
}

#[test]
fn test_send_failure_propagates() {
    let mut link = ScriptedLink::new();
    link.fail_send = true;
    let mut pixy = Pixy2::new(link);
    assert!(matches!(pixy.get_version(), Err(ProtocolError::Transport(-3))));
}

#[test]
fn test_drop_closes_link() {
    let mut link = ScriptedLink::new()
        .respond(version_response())
        .respond(resolution_response());
    {
        let mut pixy = Pixy2::new(&mut link);
        pixy.init().unwrap();
    }
    assert_eq!(link.close_calls, 1);
}

#[test]
fn test_plain_framing_accepted() {
    let payload = [
        0x01, 0x00, 2, 0, 0x05, 0x00, b'v', b'i', b'd', b'e', b'o', 0, 0, 0, 0, 0,
    ];
    let mut pixy = Pixy2::new(ScriptedLink::new().respond(plain(response::VERSION, &payload)));
    assert_eq!(pixy.get_version().unwrap().hardware, 1);
    assert_eq!(pixy.sync_mode(), SyncMode::Plain);
}

#[test]
fn test_leading_garbage_skipped() {
    let mut bytes = vec![0x00, 0xFF, 0xC1, 0x12];
    bytes.extend(version_response());
    let mut pixy = Pixy2::new(ScriptedLink::new().respond(bytes));
    assert_eq!(pixy.get_version().unwrap().firmware_major, 2);
}

#[test]
fn test_corrupted_payload_rejected() {
    let clean = version_response();
    // sync(2) + type + length + checksum(2) precede the payload
    for index in 6..clean.len() {
        let mut bytes = clean.clone();
        bytes[index] ^= 0x01;
        let mut pixy = Pixy2::new(ScriptedLink::new().respond(bytes));
        assert!(
            matches!(
                pixy.get_version(),
                Err(ProtocolError::ChecksumMismatch { .. })
            ),
            "corruption at byte {} went unnoticed",
            index
        );
        assert!(pixy.version().is_none());
    }
}

#[test]
fn test_no_response_is_sync_timeout() {
    let mut pixy = Pixy2::new(ScriptedLink::new());
    assert!(matches!(pixy.get_version(), Err(ProtocolError::SyncTimeout)));
}

#[test]
fn test_change_program_polls_until_positive() {
    let link = ScriptedLink::new()
        .respond(result(0))
        .respond(result(-1))
        .respond(result(1))
        .respond(resolution_response());
    let mut pixy = Pixy2::new(link);

    pixy.change_program("line").unwrap();

    let link = pixy.link();
    assert_eq!(link.sent_types(), vec![0x02, 0x02, 0x02, 0x0C]);
    let payload = link.sent_payload(0);
    assert_eq!(payload.len(), 33);
    assert_eq!(&payload[..4], b"line");
    assert!(payload[4..].iter().all(|&b| b == 0));
    assert_eq!(pixy.frame_width(), Some(288));
}

#[test]
fn test_change_program_truncates_long_names() {
    let name = "a".repeat(40);
    let link = ScriptedLink::new()
        .respond(result(1))
        .respond(resolution_response());
    let mut pixy = Pixy2::new(link);

    pixy.change_program(&name).unwrap();
    assert_eq!(pixy.link().sent_payload(0), "a".repeat(33).as_bytes());
}

#[test]
fn test_change_program_link_failure_ends_loop() {
    let link = ScriptedLink::new().respond(result(0));
    let mut pixy = Pixy2::new(link);
    assert!(matches!(
        pixy.change_program("video"),
        Err(ProtocolError::SyncTimeout)
    ));
    assert_eq!(pixy.link().sent.len(), 2);
}

#[test]
fn test_setters_clamp_and_encode() {
    let link = ScriptedLink::new().otherwise(result(0));
    let mut pixy = Pixy2::new(link);

    assert_eq!(pixy.set_camera_brightness(300).unwrap(), 0);
    assert_eq!(pixy.set_servos(-10, 5000).unwrap(), 0);
    assert_eq!(pixy.set_led(-1, 128, 999).unwrap(), 0);
    assert_eq!(pixy.set_led_rgb(0x0A_0B_0C).unwrap(), 0);
    assert_eq!(pixy.set_lamp(true, false).unwrap(), 0);

    let link = pixy.link();
    assert_eq!(link.sent_types(), vec![0x10, 0x12, 0x14, 0x14, 0x16]);
    assert_eq!(link.sent_payload(0), &[255u8][..]);
    assert_eq!(link.sent_payload(1), &[0u8, 0, 0xE8, 0x03][..]);
    assert_eq!(link.sent_payload(2), &[0u8, 128, 255][..]);
    assert_eq!(link.sent_payload(3), &[0x0Au8, 0x0B, 0x0C][..]);
    assert_eq!(link.sent_payload(4), &[1u8, 0][..]);
}

#[test]
fn test_result_truncated_to_byte() {
    let link = ScriptedLink::new().respond(result(60)).respond(result(-2));
    let mut pixy = Pixy2::new(link);
    assert_eq!(pixy.get_fps().unwrap(), 60);
    assert_eq!(pixy.set_lamp(false, false).unwrap(), -2);
}

#[test]
fn test_setter_response_validation() {
    let link = ScriptedLink::new()
        .respond(checksummed(response::RESULT, &[0, 0]))
        .respond(error(-1));
    let mut pixy = Pixy2::new(link);

    assert!(matches!(
        pixy.set_camera_brightness(10),
        Err(ProtocolError::InvalidLength {
            expected: 4,
            actual: 2
        })
    ));
    assert!(matches!(
        pixy.set_camera_brightness(10),
        Err(ProtocolError::UnexpectedResponse {
            expected: response::RESULT,
            actual: response::ERROR
        })
    ));
}

#[test]
fn test_traffic_counters() {
    let mut pixy = Pixy2::new(ScriptedLink::new().respond(version_response()));
    pixy.get_version().unwrap();

    let counters = pixy.counters();
    assert_eq!(counters.tx_packets, 1);
    assert_eq!(counters.tx_bytes, 4);
    assert_eq!(counters.rx_packets, 1);
    // sync + 4-byte header + 16-byte payload
    assert_eq!(counters.rx_bytes, 22);
}

#[test]
fn test_session_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "link_argument": 2, "poll_timeout_ms": 250, "sync_attempts": 8 }}"#
    )
    .unwrap();

    let config = SessionConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.link_argument, 2);
    assert_eq!(config.poll_timeout_ms, 250);
    assert_eq!(config.sync_attempts, 8);
    assert_eq!(config.poll_interval_us, 500);

    let link = ScriptedLink::new()
        .respond(version_response())
        .respond(resolution_response());
    let mut pixy = Pixy2::with_config(link, config);
    pixy.init().unwrap();
    assert_eq!(pixy.link().open_argument, Some(2));
}

#[test]
fn test_session_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = SessionConfig::from_json_file(dir.path().join("missing.json"));
    assert!(matches!(result, Err(ProtocolError::Config(_))));
}

#[test]
fn test_demo_session_end_to_end() {
    let mut pixy = Pixy2::new(SimulatedPixy::new(DemoConfig {
        busy_polls: 1,
        ..DemoConfig::default()
    }));
    pixy.init().unwrap();
    assert_eq!(pixy.state(), ConnectionState::Connected);

    for _ in 0..3 {
        assert_eq!(pixy.get_all_blocks().unwrap().len(), 3);
    }
    pixy.change_program("line").unwrap();
    assert_eq!(pixy.link().program(), "line");
    assert!(!pixy.get_main_features().unwrap().is_empty());

    pixy.close();
    assert_eq!(pixy.state(), ConnectionState::Disconnected);
}
