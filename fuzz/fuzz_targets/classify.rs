#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use logsentry_core::config::RuleConfig;
use logsentry_core::types::Severity;
use logsentry_monitor::rule::{MAX_SAMPLE_CHARS, MAX_SAMPLES, RuleSet, classify};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 규칙 목록 (최대 8개로 제한)
    rules: Vec<FuzzRule>,
    /// 분류 대상 로그 내용
    content: String,
}

#[derive(Arbitrary, Debug)]
struct FuzzRule {
    pattern: String,
    category: String,
    critical: bool,
}

fuzz_target!(|input: FuzzInput| {
    let configs: Vec<RuleConfig> = input
        .rules
        .iter()
        .take(8)
        .map(|r| RuleConfig {
            pattern: r.pattern.clone(),
            category: r.category.clone(),
            severity: if r.critical {
                Severity::Critical
            } else {
                Severity::Warn
            },
        })
        .collect();

    // 잘못된 정규식은 컴파일 에러로 끝나야 한다
    let Ok(rules) = RuleSet::compile(&configs) else {
        return;
    };

    let batches = classify(&input.content, &rules);
    let lines = input.content.lines().count() as u64;
    let matched: u64 = batches.iter().map(|b| b.match_count).sum();
    assert!(matched <= lines);

    for batch in &batches {
        assert!(batch.sample_lines.len() <= MAX_SAMPLES);
        // 이스케이프 후 한 문자는 최대 6문자(&quot;)
        for sample in &batch.sample_lines {
            assert!(sample.chars().count() <= MAX_SAMPLE_CHARS * 6);
        }
    }
});
