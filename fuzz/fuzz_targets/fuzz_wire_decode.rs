#![no_main]

use libfuzzer_sys::fuzz_target;
use phantom_station::core::WireMessage;

fuzz_target!(|data: &[u8]| {
    // Untrusted registration bytes: decode must return, never panic
    if let Ok(msg) = WireMessage::decode(data) {
        let _ = msg.secret.clone().into_keys();
    }
});
