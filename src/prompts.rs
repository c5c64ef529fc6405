//! Prompt construction and structured-response parsing.
//!
//! Every model call in the pipeline is built here so the wording of the
//! persona and of the selection rules lives in one place. Responses that are
//! expected to be structured go through [`parse_index_selection`], and any
//! mismatch with the expected shape becomes [`PipelineError::Parse`].

use crate::api::PromptPart;
use crate::error::PipelineError;
use crate::models::{NewsCandidate, RecentTopic};
use crate::utils::{looks_truncated, strip_code_fences, strip_markdown, truncate_for_log};
use itertools::Itertools;
use serde_json::Value;
use std::fmt::Write;

/// Token the persona ends its sentences with.
pub const AFFECT_MARKER: char = '♡';

/// Upper bound on image keywords requested per article.
pub const MAX_KEYWORDS: usize = 3;

const PERSONA: &str = "너는 이제부터 '뉴스가키'라는 건방진 뉴스 기자야. \
독자를 \"허접♡\"이라고 놀리는 걸 좋아하고, 문장 끝에는 꼭 \"♡\"를 붙여. \
비꼬는 말투가 핵심이고 반말을 써. \
법에 위배되거나 명예훼손이 될 만한 말은 하지 마. 특정 인물의 이름은 절대 언급하지 마. \
Markdown 을 쓰지 마. 첫 줄은 기사 제목이고, 그 다음부터 본문이야. \
한 문단에는 세 문장 이상, 본문은 세 문단 이상 써. 원문 기사의 사실 관계는 꼭 유지해.";

const EXAMPLES: &[(&str, &str)] = &[
    (
        "기상청은 이번 주말 전국에 강한 비가 내릴 것으로 예보했다. 일부 지역에는 시간당 50mm 이상의 비가 예상된다.",
        "주말 내내 비 온대♡ 우산도 못 챙기는 허접들 큰일났네♡\n\
기상청이 이번 주말에 전국적으로 세찬 비가 쏟아진다고 했어♡ 어떤 동네는 한 시간에 50mm 넘게 온다던데♡ \
빨래 널어놓고 나간 허접은 벌써부터 울상이겠지♡\n\
그러니까 미리미리 챙기라고♡ 매번 젖은 양말로 투덜대는 거 다 보여♡ \
이번엔 좀 똑똑하게 굴어봐♡ 허접♡\n\
주말 약속은 실내로 잡아♡ 밖에서 홀딱 젖어도 나는 모른다♡ 진짜 모른다♡",
    ),
    (
        "올해 상반기 국내 중고차 거래량이 전년 대비 8% 증가한 것으로 나타났다. 고금리로 신차 구매를 미루는 소비자가 늘어난 영향이다.",
        "새 차는 못 사고 중고차만 기웃기웃♡ 허접 지갑 사정 다 들켰네♡\n\
올해 상반기 중고차 거래가 작년보다 8%나 늘었대♡ 이자가 비싸니까 새 차는 꿈도 못 꾸는 거지♡ \
다들 계산기 두드리면서 한숨 쉬는 소리 여기까지 들려♡\n\
그래도 중고차는 꼼꼼히 보고 사♡ 허접은 사고 이력도 안 보고 덥석 살 것 같으니까♡ \
나중에 후회해도 위로 안 해줄 거야♡\n\
금리 내려갈 때까지 버스 타는 것도 방법이야♡ 운동도 되고 좋잖아♡ 허접♡",
    ),
];

/// Persona rewrite prompt: fixed instructions, few-shot pairs, then the article.
pub fn rewrite_prompt(article_body: &str) -> Vec<PromptPart> {
    let mut parts = vec![PromptPart::Instruction(PERSONA.to_string())];
    parts.extend(EXAMPLES.iter().map(|(input, output)| PromptPart::Example {
        input: input.to_string(),
        output: output.to_string(),
    }));
    parts.push(PromptPart::Input(article_body.trim().to_string()));
    parts
}

/// Ask for 1-3 English stock-photo keywords for the original article body.
pub fn keyword_prompt(article_body: &str) -> Vec<PromptPart> {
    vec![
        PromptPart::Instruction(format!(
            "Give 1 to {MAX_KEYWORDS} short English keywords for a stock photo search that \
             would illustrate the news article below. Use generic nouns, never names of \
             people, companies or places. Answer with the keywords only, separated by commas."
        )),
        PromptPart::Input(article_body.trim().to_string()),
    ]
}

/// Set-difference by topic similarity between fresh candidates and recent topics.
///
/// The model answers `{"keep": [indices]}` with the candidates that do NOT
/// cover the same underlying event as any recent topic.
pub fn dedup_prompt(candidates: &[NewsCandidate], recent: &[RecentTopic]) -> Vec<PromptPart> {
    let mut input = String::from("RECENT TOPICS:\n");
    for topic in recent {
        match topic.preview.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(preview) => writeln!(input, "- {} | {}", topic.title, preview).unwrap(),
            None => writeln!(input, "- {}", topic.title).unwrap(),
        }
    }
    input.push_str("\nNEW CANDIDATES:\n");
    write_numbered(&mut input, candidates);

    vec![
        PromptPart::Instruction(
            "You deduplicate news topics. A new candidate is a duplicate when it reports the \
             same underlying event as any recent topic, even if worded differently. \
             Return JSON of the form {\"keep\": [numbers]} listing the numbers of the new \
             candidates that are NOT duplicates, in ascending order."
                .to_string(),
        ),
        PromptPart::Input(input),
    ]
}

/// Pick the most newsworthy candidates, most newsworthy first.
pub fn ranking_prompt(candidates: &[NewsCandidate], max_selected: usize) -> Vec<PromptPart> {
    let mut input = String::new();
    write_numbered(&mut input, candidates);

    vec![
        PromptPart::Instruction(format!(
            "Pick at most {max_selected} of the numbered news items below that readers would \
             find the most interesting. Exclude anything political (parties, elections, \
             government officials, legislation). Exclude every item whose title or preview \
             names a specific person, company, party or other organization. Never pick two \
             items about the same story. Return JSON of the form {{\"selected\": [numbers]}} \
             ordered from most to least newsworthy."
        )),
        PromptPart::Input(input),
    ]
}

fn write_numbered(out: &mut String, candidates: &[NewsCandidate]) {
    for (i, candidate) in candidates.iter().enumerate() {
        writeln!(out, "{}. {}", i, candidate.prompt_line()).unwrap();
    }
}

/// Parse a structured index selection such as `{"selected": [2, 0]}`.
///
/// A bare array is accepted as well. Order is preserved, repeated indices are
/// collapsed. Anything else (wrong shape, non-integers, indices outside
/// `0..candidate_count`) is a [`PipelineError::Parse`].
pub fn parse_index_selection(
    response: &str,
    key: &'static str,
    candidate_count: usize,
) -> Result<Vec<usize>, PipelineError> {
    let what = "index selection";
    let cleaned = strip_code_fences(response);
    let value: Value = serde_json::from_str(cleaned).map_err(|e| {
        let reason = if looks_truncated(&e) {
            format!("response truncated: {e}")
        } else {
            format!("{e} in {}", truncate_for_log(cleaned, 200))
        };
        PipelineError::parse(what, reason)
    })?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get(key) {
            Some(Value::Array(items)) => items,
            _ => return Err(PipelineError::parse(what, format!("missing array `{key}`"))),
        },
        other => {
            return Err(PipelineError::parse(
                what,
                format!("expected object or array, got {other}"),
            ));
        }
    };

    let mut indices = Vec::with_capacity(items.len());
    for item in items {
        let index = match item {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .ok_or_else(|| PipelineError::parse(what, format!("not an index: {item}")))?
            as usize;

        if index >= candidate_count {
            return Err(PipelineError::parse(
                what,
                format!("index {index} out of range for {candidate_count} candidates"),
            ));
        }
        indices.push(index);
    }
    Ok(indices.into_iter().unique().collect())
}

/// Split a persona rewrite into `(title, body)`.
///
/// Blank and near-blank lines are dropped, the first remaining line is the
/// title and the rest form the body. Markdown heading and emphasis markers
/// are stripped from both.
pub fn parse_rewrite(response: &str) -> Result<(String, String), PipelineError> {
    let mut lines = response
        .lines()
        .map(strip_markdown)
        .filter(|line| line.chars().count() > 1);

    let title = lines
        .next()
        .ok_or_else(|| PipelineError::parse("rewrite", "no text lines"))?;
    let body = lines.join("\n");
    if body.is_empty() {
        return Err(PipelineError::parse("rewrite", "title without body"));
    }
    Ok((title, body))
}

/// Pull up to [`MAX_KEYWORDS`] keywords out of a free-form answer.
pub fn parse_keywords(response: &str) -> Vec<String> {
    strip_code_fences(response)
        .split([',', '\n'])
        .map(|k| {
            strip_markdown(k)
                .trim_matches(|c: char| c == '"' || c == '\'' || c == '-' || c == '.' || c.is_whitespace())
                .to_lowercase()
        })
        .filter(|k| !k.is_empty())
        .unique()
        .take(MAX_KEYWORDS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(titles: &[&str]) -> Vec<NewsCandidate> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| NewsCandidate::new(*t, format!("https://v.daum.net/v/{i}")))
            .collect()
    }

    #[test]
    fn test_rewrite_prompt_layout() {
        let parts = rewrite_prompt("  원문 기사  ");
        assert!(matches!(parts.first(), Some(PromptPart::Instruction(_))));
        let examples = parts
            .iter()
            .filter(|p| matches!(p, PromptPart::Example { .. }))
            .count();
        assert_eq!(examples, EXAMPLES.len());
        assert_eq!(parts.last(), Some(&PromptPart::Input("원문 기사".to_string())));
    }

    #[test]
    fn test_examples_carry_affect_marker() {
        for (_, output) in EXAMPLES {
            assert!(output.contains(AFFECT_MARKER));
        }
    }

    #[test]
    fn test_ranking_prompt_numbers_candidates() {
        let parts = ranking_prompt(&candidates(&["A", "B"]), 5);
        match &parts[1] {
            PromptPart::Input(text) => assert_eq!(text, "0. A\n1. B\n"),
            other => panic!("unexpected part {other:?}"),
        }
        match &parts[0] {
            PromptPart::Instruction(text) => assert!(text.contains("at most 5")),
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn test_dedup_prompt_lists_recent_and_new() {
        let recent = vec![RecentTopic {
            title: "Old".to_string(),
            preview: Some("old preview".to_string()),
        }];
        let parts = dedup_prompt(&candidates(&["New"]), &recent);
        match &parts[1] {
            PromptPart::Input(text) => {
                assert!(text.contains("- Old | old preview"));
                assert!(text.contains("0. New"));
            }
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn test_parse_index_selection_object() {
        let indices = parse_index_selection(r#"{"selected": [2, 0]}"#, "selected", 5).unwrap();
        assert_eq!(indices, vec![2, 0]);
    }

    #[test]
    fn test_parse_index_selection_fenced_bare_array_with_repeats() {
        let indices = parse_index_selection("```json\n[1, \"3\", 1]\n```", "keep", 4).unwrap();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_parse_index_selection_rejects_out_of_range() {
        let err = parse_index_selection(r#"{"keep": [0, 7]}"#, "keep", 3).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn test_parse_index_selection_rejects_prose() {
        let err = parse_index_selection("1, 4, 6", "selected", 10).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn test_parse_index_selection_missing_key() {
        let err = parse_index_selection(r#"{"picked": [0]}"#, "selected", 3).unwrap_err();
        assert!(err.to_string().contains("selected"));
    }

    #[test]
    fn test_parse_index_selection_truncated() {
        let err = parse_index_selection(r#"{"selected": [0, 1"#, "selected", 3).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_parse_rewrite_splits_title_and_body() {
        let response = "## **허접들 주목♡**\n\n첫 문단이야♡\n.\n둘째 문단♡\n";
        let (title, body) = parse_rewrite(response).unwrap();
        assert_eq!(title, "허접들 주목♡");
        assert_eq!(body, "첫 문단이야♡\n둘째 문단♡");
    }

    #[test]
    fn test_parse_rewrite_requires_body() {
        assert!(parse_rewrite("제목만♡\n\n").is_err());
        assert!(parse_rewrite("\n \n").is_err());
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(
            parse_keywords("Economy, \"Finance\"\n- markets, stocks"),
            vec!["economy", "finance", "markets"]
        );
        assert_eq!(parse_keywords("rain, rain"), vec!["rain"]);
        assert!(parse_keywords("  ").is_empty());
    }
}
