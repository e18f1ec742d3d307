#![no_main]

use libfuzzer_sys::fuzz_target;
use logsentry_monitor::notify::telegram::{MAX_MESSAGE_CHARS, split_message};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // 작은 한도로도 실행해 강제 분할 경로를 탄다
    for limit in [16, MAX_MESSAGE_CHARS] {
        for chunk in split_message(text, limit) {
            assert!(chunk.chars().count() <= limit);
        }
    }
});
