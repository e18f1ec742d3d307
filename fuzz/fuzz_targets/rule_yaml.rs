#![no_main]

use libfuzzer_sys::fuzz_target;
use logsentry_monitor::rule::{RuleLoader, RuleSet};

fuzz_target!(|data: &[u8]| {
    // YAML 파서는 &str을 받으므로 UTF-8 변환 필요
    if let Ok(yaml_str) = std::str::from_utf8(data) {
        if let Ok(rules) = RuleLoader::parse_yaml(yaml_str, "fuzz-input.yml") {
            // 검증/컴파일도 크래시 없이 Ok 또는 Err을 반환해야 한다
            let _ = RuleSet::compile(&rules);
        }
    }
});
