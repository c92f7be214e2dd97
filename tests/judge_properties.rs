//! End-to-end properties of `Judge::judge` through the public API.

use interview_judge::{ErrorKind, Judge, JudgeConfig, Submission, SubmissionVerdict, TestCase};
use serde_json::json;

fn judge() -> Judge {
    let mut config = JudgeConfig::default();
    config.sandbox.test_timeout_ms = 500;
    config.process.timeout_ms = 3000;
    Judge::new(config)
}

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

fn submission(language: &str, source: &str, cases: &[(&str, &str, &str)]) -> Submission {
    Submission {
        source_code: source.to_string(),
        language: language.to_string(),
        test_cases: cases
            .iter()
            .map(|(id, input, expected)| TestCase::new(*id, *input, *expected))
            .collect(),
        entry_point: None,
    }
}

fn passed(verdict: &SubmissionVerdict) -> Vec<bool> {
    verdict.outcomes.iter().map(|o| o.passed).collect()
}

const SUM_CASES: &[(&str, &str, &str)] = &[("t1", "2, 3", "5"), ("t2", "-1, 1", "0"), ("t3", "2, 2", "5")];

#[tokio::test]
async fn javascript_sum() {
    let verdict = judge()
        .judge(&submission("javascript", "function add(a, b) { return a + b; }", SUM_CASES))
        .await;

    assert!(verdict.overall_error.is_none());
    assert_eq!(passed(&verdict), vec![true, true, false]);
    assert_eq!(verdict.outcomes[0].output, Some(json!(5)));

    let ids: Vec<_> = verdict.outcomes.iter().map(|o| o.test_case_id.as_str()).collect();
    assert_eq!(ids, ["t1", "t2", "t3"]);
}

#[tokio::test]
async fn python_sum() {
    if !python_available() {
        return;
    }

    let verdict = judge()
        .judge(&submission("python", "def add(a, b):\n    return a + b\n", SUM_CASES))
        .await;

    assert!(verdict.overall_error.is_none(), "{:?}", verdict.overall_message);
    assert_eq!(passed(&verdict), vec![true, true, false]);
    assert_eq!(verdict.outcomes[0].output, Some(json!(5)));
}

#[tokio::test]
async fn judging_is_idempotent() {
    let judge = judge();
    let js = submission("js", "function add(a, b) { return a + b; }", SUM_CASES);
    assert_eq!(passed(&judge.judge(&js).await), passed(&judge.judge(&js).await));

    if python_available() {
        let py = submission("py", "def add(a, b):\n    return a + b\n", SUM_CASES);
        assert_eq!(passed(&judge.judge(&py).await), passed(&judge.judge(&py).await));
    }
}

#[tokio::test]
async fn syntax_errors_have_no_outcomes() {
    let judge = judge();

    let verdict = judge
        .judge(&submission("js", "function add(a, b) { return a + ; }", SUM_CASES))
        .await;
    assert_eq!(verdict.overall_error, Some(ErrorKind::SyntaxError));
    assert!(verdict.outcomes.is_empty());

    let verdict = judge
        .judge(&submission("python", "def add(a, b)\n    return a + b\n", SUM_CASES))
        .await;
    assert_eq!(verdict.overall_error, Some(ErrorKind::SyntaxError));
    assert!(verdict.outcomes.is_empty());
}

#[tokio::test]
async fn missing_entry_point() {
    let judge = judge();

    let verdict = judge.judge(&submission("js", "const x = 1;", SUM_CASES)).await;
    assert_eq!(verdict.overall_error, Some(ErrorKind::NoEntryPoint));
    assert!(verdict.outcomes.is_empty());

    let verdict = judge.judge(&submission("python", "x = 1\n", SUM_CASES)).await;
    assert_eq!(verdict.overall_error, Some(ErrorKind::NoEntryPoint));
    assert!(verdict.outcomes.is_empty());
}

#[tokio::test]
async fn unsupported_language() {
    let verdict = judge().judge(&submission("brainfuck", "+", SUM_CASES)).await;
    assert_eq!(verdict.overall_error, Some(ErrorKind::UnsupportedLanguage));
    assert!(verdict.outcomes.is_empty());
}

#[tokio::test]
async fn load_crash_has_no_outcomes() {
    let judge = judge();

    let verdict = judge
        .judge(&submission("js", "throw new Error('boom');\nfunction add(a, b) { return a + b; }", SUM_CASES))
        .await;
    assert_eq!(verdict.overall_error, Some(ErrorKind::RuntimeError));
    assert!(verdict.outcomes.is_empty());

    if !python_available() {
        return;
    }
    let verdict = judge
        .judge(&submission("python", "raise ValueError('boom')\n\ndef add(a, b):\n    return a + b\n", SUM_CASES))
        .await;
    assert_eq!(verdict.overall_error, Some(ErrorKind::RuntimeError));
    assert!(verdict.outcomes.is_empty(), "{:?}", verdict.outcomes);
    let message = verdict.overall_message.as_deref().unwrap();
    assert!(message.contains("ValueError: boom"), "{message}");
    assert!(!message.contains("judge-"), "{message}");
}

#[tokio::test]
async fn in_process_timeout_spares_siblings() {
    let source = "function f(n) { while (n < 0) {} return n; }";
    let cases = [("a", "1", "1"), ("b", "-1", "0"), ("c", "2", "2")];

    let verdict = judge().judge(&submission("js", source, &cases)).await;
    assert!(verdict.overall_error.is_none());
    assert_eq!(passed(&verdict), vec![true, false, true]);
    assert_eq!(verdict.outcomes[1].error_kind, Some(ErrorKind::Timeout));
}

#[tokio::test]
async fn isolated_timeout_pads_remaining_cases() {
    if !python_available() {
        return;
    }

    let source = "def f(n):\n    while n < 0:\n        pass\n    return n\n";
    let cases = [("a", "1", "1"), ("b", "-1", "0"), ("c", "2", "2")];

    let verdict = judge().judge(&submission("python", source, &cases)).await;
    assert_eq!(verdict.overall_error, Some(ErrorKind::Timeout));
    assert_eq!(verdict.outcomes.len(), 3);
    assert!(verdict.outcomes[0].passed);
    assert_eq!(verdict.outcomes[1].error_kind, Some(ErrorKind::Timeout));
    assert_eq!(verdict.outcomes[2].error_kind, Some(ErrorKind::NotRun));
}

#[tokio::test]
async fn per_test_failures_do_not_abort_siblings() {
    let source = "function first(xs) { return xs[0].value; }";
    let cases = [
        ("ok", r#"[{"value": 7}]"#, "7"),
        ("throws", "[]", "null"),
        ("malformed", "[1,", "1"),
        ("after", r#"[{"value": "x"}]"#, r#""x""#),
    ];

    let verdict = judge().judge(&submission("js", source, &cases)).await;
    let kinds: Vec<_> = verdict.outcomes.iter().map(|o| o.error_kind).collect();
    assert_eq!(
        kinds,
        vec![
            None,
            Some(ErrorKind::RuntimeError),
            Some(ErrorKind::MalformedTestData),
            None
        ]
    );
    assert_eq!(passed(&verdict), vec![true, false, false, true]);
}

#[tokio::test]
async fn outcomes_match_test_cases_when_no_overall_error() {
    if !python_available() {
        return;
    }

    let source = "def f(xs):\n    return sorted(xs)\n";
    let cases = [
        ("a", "[3, 1, 2]", "[1, 2, 3]"),
        ("b", "[]", "[]"),
        ("c", "{\"not\": \"a list\"}", "[\"not\"]"),
        ("d", "oops", "1"),
    ];

    let verdict = judge().judge(&submission("python", source, &cases)).await;
    assert!(verdict.overall_error.is_none());
    assert_eq!(verdict.outcomes.len(), cases.len());
    for (outcome, (id, _, _)) in verdict.outcomes.iter().zip(cases) {
        assert_eq!(outcome.test_case_id, id);
    }
    assert_eq!(verdict.outcomes[3].error_kind, Some(ErrorKind::MalformedTestData));
}

#[tokio::test]
async fn score_summary() {
    let verdict = judge()
        .judge(&submission("js", "function add(a, b) { return a + b; }", SUM_CASES))
        .await;

    let summary = verdict.summary(SUM_CASES.len(), Some(30.0));
    assert_eq!(summary.total_tests, 3);
    assert_eq!(summary.passed_tests, 2);
    assert!((summary.score - 20.0).abs() < 1e-9);
}
