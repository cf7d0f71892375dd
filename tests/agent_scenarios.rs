//! End-to-end scenarios (§8): drives a real [`Agent`] over an in-memory
//! duplex transport with a scripted fake sandbox engine, so the whole
//! LOAD/START/STOP/STATUS lifecycle runs deterministically without real
//! hardware or a compiled `.wasm` binary.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use wasm_agent_firmware::agent::Agent;
use wasm_agent_firmware::config::AgentConfig;
use wasm_agent_firmware::crc32::crc32;
use wasm_agent_firmware::gpio::CountingOutputPin;
use wasm_agent_firmware::sandbox::fake::{encode, FakeEngine, FakeModule, ScriptedExport};
use wasm_agent_firmware::transport::fake::DuplexEnd;

/// Spins up an agent wired to one end of an in-memory duplex pipe,
/// returning the other end for the test to drive, plus the GPIO toggle
/// counter handle.
fn spawn_test_agent(
    mut config: AgentConfig,
    engine: FakeEngine,
) -> (DuplexEnd, Arc<std::sync::atomic::AtomicUsize>) {
    config.device_id = "test-node".to_string();

    let (agent_end, gw_end) = DuplexEnd::pair(Duration::from_millis(50));
    let (reader, writer) = agent_end.split();

    let gpio = CountingOutputPin::new();
    let toggles = gpio.handle();

    let agent = Arc::new(Agent::new(config, engine, Box::new(writer), Box::new(gpio)));
    wasm_agent_firmware::agent::spawn(agent, Box::new(reader));

    (gw_end, toggles)
}

fn send_line(gw: &mut DuplexEnd, line: &str) {
    gw.write_all(line.as_bytes()).unwrap();
    gw.write_all(b"\n").unwrap();
}

fn read_line(gw: &mut DuplexEnd, timeout: Duration) -> String {
    let deadline = Instant::now() + timeout;
    let mut acc = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        if Instant::now() >= deadline {
            panic!(
                "timed out waiting for a reply line; got so far: {:?}",
                String::from_utf8_lossy(&acc)
            );
        }
        match gw.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                acc.extend_from_slice(&buf[..n]);
                if let Some(pos) = acc.iter().position(|&b| b == b'\n') {
                    return String::from_utf8_lossy(&acc[..pos])
                        .trim_end_matches('\r')
                        .to_string();
                }
            }
            Err(_) => continue,
        }
    }
}

fn fast_config() -> AgentConfig {
    AgentConfig {
        binary_upload_timeout_secs: 2,
        gpio_toggle_sleep_ms: 0,
        ..AgentConfig::default()
    }
}

#[test]
fn scenario_1_happy_load_and_void_call_toggles_gpio_once() {
    let module = FakeModule::new().with_export("run", ScriptedExport::ToggleLoop { iterations: 1 });
    let bytes = encode(&module);
    let crc = crc32(&bytes);

    let (mut gw, toggles) = spawn_test_agent(fast_config(), FakeEngine::default());

    // Drain the HELLO greeting.
    read_line(&mut gw, Duration::from_secs(1));

    send_line(&mut gw, &format!("LOAD module_id=m1 size={} crc32={:08x}", bytes.len(), crc));
    let ready = read_line(&mut gw, Duration::from_secs(1));
    assert_eq!(ready, format!("LOAD_READY size={} crc32={:08x}", bytes.len(), crc));

    gw.write_all(&bytes).unwrap();
    assert_eq!(read_line(&mut gw, Duration::from_secs(1)), "LOAD_OK");

    send_line(&mut gw, "START module_id=m1 func=run");
    assert_eq!(read_line(&mut gw, Duration::from_secs(1)), "START_OK");
    assert_eq!(
        read_line(&mut gw, Duration::from_secs(1)),
        "RESULT status=OK func=run"
    );

    assert_eq!(toggles.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn scenario_2_crc_mismatch_leaves_slot_empty() {
    let module = FakeModule::new().with_export("run", ScriptedExport::VoidNoop);
    let mut bytes = encode(&module);
    let declared_crc = crc32(&bytes);
    // Flip one payload byte after computing the declared CRC so the
    // agent's recomputed CRC mismatches.
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let (mut gw, _toggles) = spawn_test_agent(fast_config(), FakeEngine::default());
    read_line(&mut gw, Duration::from_secs(1));

    send_line(
        &mut gw,
        &format!("LOAD module_id=m2 size={} crc32={:08x}", bytes.len(), declared_crc),
    );
    read_line(&mut gw, Duration::from_secs(1)); // LOAD_READY

    gw.write_all(&bytes).unwrap();
    let reply = read_line(&mut gw, Duration::from_secs(1));
    assert!(reply.starts_with("LOAD_ERR code=BAD_CRC"));

    send_line(&mut gw, "STATUS");
    let status = read_line(&mut gw, Duration::from_secs(1));
    assert_eq!(status, "STATUS_OK modules=\"none\" runner=IDLE");
}

#[test]
fn scenario_3_integer_args_and_return() {
    let module = FakeModule::new().with_export("add", ScriptedExport::Sum);
    let bytes = encode(&module);
    let crc = crc32(&bytes);

    let (mut gw, _toggles) = spawn_test_agent(fast_config(), FakeEngine::default());
    read_line(&mut gw, Duration::from_secs(1));

    send_line(&mut gw, &format!("LOAD module_id=m3 size={} crc32={:08x}", bytes.len(), crc));
    read_line(&mut gw, Duration::from_secs(1)); // LOAD_READY
    gw.write_all(&bytes).unwrap();
    assert_eq!(read_line(&mut gw, Duration::from_secs(1)), "LOAD_OK");

    send_line(&mut gw, "START module_id=m3 func=add args=\"a=200,b=26\"");
    assert_eq!(read_line(&mut gw, Duration::from_secs(1)), "START_OK");
    assert_eq!(
        read_line(&mut gw, Duration::from_secs(1)),
        "RESULT status=OK func=add ret_i32=226"
    );
}

#[test]
fn scenario_4_busy_rejection_then_eventual_completion() {
    let module = FakeModule::new()
        .with_export("loop", ScriptedExport::ToggleLoop { iterations: 5 })
        .with_export("add", ScriptedExport::Sum);
    let bytes = encode(&module);
    let crc = crc32(&bytes);

    let mut config = fast_config();
    config.gpio_toggle_sleep_ms = 50;
    let (mut gw, _toggles) = spawn_test_agent(config, FakeEngine::default());
    read_line(&mut gw, Duration::from_secs(1));

    send_line(&mut gw, &format!("LOAD module_id=m4 size={} crc32={:08x}", bytes.len(), crc));
    read_line(&mut gw, Duration::from_secs(1));
    gw.write_all(&bytes).unwrap();
    assert_eq!(read_line(&mut gw, Duration::from_secs(1)), "LOAD_OK");

    send_line(&mut gw, "START module_id=m4 func=loop");
    assert_eq!(read_line(&mut gw, Duration::from_secs(1)), "START_OK");

    send_line(&mut gw, "START module_id=m4 func=add args=\"a=1,b=2\"");
    assert_eq!(read_line(&mut gw, Duration::from_secs(2)), "RESULT status=BUSY");

    assert_eq!(
        read_line(&mut gw, Duration::from_secs(2)),
        "RESULT status=OK func=loop"
    );
}

#[test]
fn scenario_5_cooperative_stop() {
    let module = FakeModule::new().with_export("loop", ScriptedExport::ToggleLoop { iterations: 1_000 });
    let bytes = encode(&module);
    let crc = crc32(&bytes);

    let mut config = fast_config();
    config.gpio_toggle_sleep_ms = 20;
    let (mut gw, _toggles) = spawn_test_agent(config, FakeEngine::default());
    read_line(&mut gw, Duration::from_secs(1));

    send_line(&mut gw, &format!("LOAD module_id=m5 size={} crc32={:08x}", bytes.len(), crc));
    read_line(&mut gw, Duration::from_secs(1));
    gw.write_all(&bytes).unwrap();
    assert_eq!(read_line(&mut gw, Duration::from_secs(1)), "LOAD_OK");

    send_line(&mut gw, "START module_id=m5 func=loop");
    assert_eq!(read_line(&mut gw, Duration::from_secs(1)), "START_OK");

    send_line(&mut gw, "STOP module_id=m5");
    assert_eq!(
        read_line(&mut gw, Duration::from_secs(1)),
        "STOP_OK status=PENDING"
    );

    assert_eq!(
        read_line(&mut gw, Duration::from_secs(5)),
        "RESULT status=STOPPED func=loop"
    );
}

#[test]
fn scenario_6_upload_timeout_then_recovers() {
    let mut config = fast_config();
    config.binary_upload_timeout_secs = 1;
    let (mut gw, _toggles) = spawn_test_agent(config, FakeEngine::default());
    read_line(&mut gw, Duration::from_secs(1));

    send_line(&mut gw, "LOAD module_id=m6 size=1024 crc32=deadbeef");
    read_line(&mut gw, Duration::from_secs(1)); // LOAD_READY

    gw.write_all(&[0u8; 100]).unwrap();
    let reply = read_line(&mut gw, Duration::from_secs(3));
    assert_eq!(
        reply,
        "LOAD_ERR code=TIMEOUT msg=\"binary payload not received\""
    );

    send_line(&mut gw, "STATUS");
    assert_eq!(
        read_line(&mut gw, Duration::from_secs(1)),
        "STATUS_OK modules=\"none\" runner=IDLE"
    );

    let module = FakeModule::new().with_export("run", ScriptedExport::VoidNoop);
    let bytes = encode(&module);
    let crc = crc32(&bytes);
    send_line(&mut gw, &format!("LOAD module_id=m6b size={} crc32={:08x}", bytes.len(), crc));
    read_line(&mut gw, Duration::from_secs(1)); // LOAD_READY
    gw.write_all(&bytes).unwrap();
    assert_eq!(read_line(&mut gw, Duration::from_secs(1)), "LOAD_OK");
}
