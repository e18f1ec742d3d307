//! 분류기 -- 새 로그 내용을 카테고리별 이벤트 배치로 묶습니다.
//!
//! [`classify`]는 I/O가 없는 순수 함수입니다. 같은 입력과 규칙에 대해 항상 같은 결과를 냅니다.

use std::collections::BTreeMap;

use logsentry_core::types::{EventBatch, Severity};

use super::RuleSet;

/// 배치당 보관하는 샘플 라인 수
pub const MAX_SAMPLES: usize = 2;

/// 샘플 라인 최대 길이 (문자 수, 이스케이프 전)
pub const MAX_SAMPLE_CHARS: usize = 300;

/// 새 로그 내용을 분류합니다.
///
/// - 빈 라인은 무시합니다.
/// - 라인마다 CRITICAL 티어를 먼저 평가하고, 매칭이 없을 때만 WARN 티어를 평가합니다.
/// - 티어 안에서는 선언 순서상 첫 매칭 규칙만 인정합니다.
/// - 결과는 CRITICAL 배치가 먼저, 각 티어 안에서는 규칙 선언 순서입니다.
///   같은 카테고리를 여러 규칙이 공유하면 하나의 배치로 합쳐집니다.
///
/// 매칭이 없으면 빈 목록을 반환합니다.
pub fn classify(content: &str, rules: &RuleSet) -> Vec<EventBatch> {
    // 키: (티어 순위, 카테고리가 처음 나타난 규칙 순번)
    let mut groups: BTreeMap<(u8, usize), EventBatch> = BTreeMap::new();
    let mut first_rule_of: BTreeMap<(Severity, &str), usize> = BTreeMap::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let hit = rules
            .first_match(line, Severity::Critical)
            .or_else(|| rules.first_match(line, Severity::Warn));
        let Some(rule_idx) = hit else {
            continue;
        };

        let rule = &rules.rules()[rule_idx];
        let anchor = *first_rule_of
            .entry((rule.severity, rule.category.as_str()))
            .or_insert(rule_idx);

        let batch = groups
            .entry((tier_rank(rule.severity), anchor))
            .or_insert_with(|| EventBatch::new(rule.category.clone(), rule.severity));
        batch.match_count += 1;
        if batch.sample_lines.len() < MAX_SAMPLES {
            batch.sample_lines.push(render_sample(line));
        }
    }

    groups.into_values().collect()
}

fn tier_rank(severity: Severity) -> u8 {
    match severity {
        Severity::Critical => 0,
        Severity::Warn => 1,
    }
}

/// 샘플 라인을 길이 제한 후 HTML 이스케이프합니다.
fn render_sample(line: &str) -> String {
    escape_html(truncate_chars(line.trim_end(), MAX_SAMPLE_CHARS))
}

/// 문자 경계를 지키며 최대 `max_chars` 문자로 자릅니다.
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// 알림 본문에 넣을 텍스트의 HTML 특수문자를 이스케이프합니다.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsentry_core::config::RuleConfig;

    fn rules(specs: &[(&str, &str, Severity)]) -> RuleSet {
        let configs: Vec<RuleConfig> = specs
            .iter()
            .map(|(p, c, s)| RuleConfig {
                pattern: (*p).to_owned(),
                category: (*c).to_owned(),
                severity: *s,
            })
            .collect();
        RuleSet::compile(&configs).unwrap()
    }

    fn default_rules() -> RuleSet {
        rules(&[
            (r"auth\.failed", "AUTH_FAIL", Severity::Critical),
            ("rate limit", "RATE_LIMITED", Severity::Warn),
            ("timeout", "TIMEOUT", Severity::Warn),
        ])
    }

    #[test]
    fn no_matches_yields_empty() {
        assert!(classify("all good\nnothing here\n", &default_rules()).is_empty());
        assert!(classify("", &default_rules()).is_empty());
    }

    #[test]
    fn groups_and_counts_matches() {
        let content = "auth.failed user=a\nauth.failed user=b\nauth.failed user=c\nrate limit hit\n";
        let batches = classify(content, &default_rules());

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].category, "AUTH_FAIL");
        assert_eq!(batches[0].severity, Severity::Critical);
        assert_eq!(batches[0].match_count, 3);
        assert_eq!(batches[0].sample_lines.len(), MAX_SAMPLES);
        assert_eq!(batches[0].sample_lines[0], "auth.failed user=a");
        assert_eq!(batches[1].category, "RATE_LIMITED");
        assert_eq!(batches[1].match_count, 1);
    }

    #[test]
    fn critical_wins_over_warn_on_same_line() {
        let batches = classify("auth.failed after timeout\n", &default_rules());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].category, "AUTH_FAIL");
    }

    #[test]
    fn first_rule_wins_within_tier() {
        let set = rules(&[
            ("timeout", "TIMEOUT", Severity::Warn),
            ("upstream", "UPSTREAM", Severity::Warn),
        ]);
        let batches = classify("upstream timeout\n", &set);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].category, "TIMEOUT");
    }

    #[test]
    fn critical_batches_come_first() {
        let content = "timeout\nauth.failed\n";
        let batches = classify(content, &default_rules());
        assert_eq!(batches[0].severity, Severity::Critical);
        assert_eq!(batches[1].category, "TIMEOUT");
    }

    #[test]
    fn shared_category_merges_into_one_batch() {
        let set = rules(&[
            ("login failed", "AUTH_FAIL", Severity::Critical),
            ("bad password", "AUTH_FAIL", Severity::Critical),
        ]);
        let batches = classify("bad password\nlogin failed\n", &set);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].match_count, 2);
    }

    #[test]
    fn samples_are_escaped() {
        let batches = classify("auth.failed <script>&\"x\"\n", &default_rules());
        assert_eq!(
            batches[0].sample_lines[0],
            "auth.failed &lt;script&gt;&amp;&quot;x&quot;"
        );
    }

    #[test]
    fn samples_are_truncated_on_char_boundary() {
        let line = format!("auth.failed {}", "가".repeat(400));
        let batches = classify(&line, &default_rules());
        assert_eq!(batches[0].sample_lines[0].chars().count(), MAX_SAMPLE_CHARS);
    }

    #[test]
    fn truncate_short_string_is_unchanged() {
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
    }
}
