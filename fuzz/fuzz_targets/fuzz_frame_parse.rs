#![no_main]

use libfuzzer_sys::fuzz_target;
use phantom_station::detector::CapturedFrame;

fuzz_target!(|data: &[u8]| {
    let caplen = data.len() as u32;
    if let Some(frame) = CapturedFrame::from_ethernet(caplen, data) {
        let _ = frame.tcp_dst_port();
        let _ = frame.dst_ip();
    }
    let _ = CapturedFrame::from_ip(caplen, data);
});
