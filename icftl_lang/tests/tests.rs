use icftl_core::{
    ClosurePolicy, Decision, Event, Outcome, Scope, ScopeKey, SpecErrorKind, Session, Verdict,
};
use icftl_lang::{Format, load, parse_str};
use std::{path::Path, sync::Arc};

#[test]
fn text_file() {
    let loaded = load(Path::new("./tests/services.icftl")).expect("load");
    assert!(loaded.errors.is_empty());
    let names: Vec<_> = loaded
        .specifications
        .iter()
        .map(|s| s.name().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "positive_input",
            "auth_before_query",
            "session_closed",
            "fast_response",
            "fast_handle"
        ]
    );
    assert_eq!(loaded.specifications[2].scope(), Scope::PerOccurrence);
    assert_eq!(loaded.specifications[3].scope(), Scope::Global);
}

#[test]
fn json_file() {
    let loaded = load(Path::new("./tests/services.json")).expect("load");
    assert_eq!(loaded.specifications.len(), 2);
    assert_eq!(loaded.errors.len(), 1);
    assert_eq!(loaded.errors[0].specification, "no_check");
    assert_eq!(loaded.errors[0].kind, SpecErrorKind::MissingCheck);
}

#[test]
fn formats_agree() {
    let text = load(Path::new("./tests/services.icftl")).expect("load");
    let json = load(Path::new("./tests/services.json")).expect("load");
    for (lhs, rhs) in text.specifications.iter().zip(&json.specifications) {
        assert_eq!(lhs.to_string(), rhs.to_string());
    }
}

#[test]
fn compile_errors_are_isolated() {
    let loaded = load(Path::new("./tests/broken.icftl")).expect("load");
    assert_eq!(loaded.specifications.len(), 1);
    assert_eq!(loaded.specifications[0].name().as_ref(), "fine");
    let kinds: Vec<_> = loaded.errors.iter().map(|err| err.kind.clone()).collect();
    assert!(matches!(
        kinds[0],
        SpecErrorKind::IncomparableOperands { .. }
    ));
    assert_eq!(kinds[1], SpecErrorKind::ForwardReference("y".into()));
    assert!(matches!(
        kinds[2],
        SpecErrorKind::Arity {
            expected: 3,
            found: 2,
            ..
        }
    ));
    assert_eq!(kinds[3], SpecErrorKind::MissingUntil("x".into()));
}

#[test]
fn syntax_error_has_offset() {
    let err = load(Path::new("./tests/syntax_error.icftl")).expect_err("syntax error");
    let message = format!("{err:#}");
    assert!(message.contains("syntax_error.icftl"));
    assert!(message.contains("at byte 27"));
}

#[test]
fn missing_file() {
    assert!(load(Path::new("./tests/missing.icftl")).is_err());
}

#[test]
fn monitor_loaded_specifications() {
    let raw = parse_str(
        "spec auth { forall a in calls(auth) until exit(handle); forall q in calls(query); check before(a, q) }",
        Format::Text,
    )
    .expect("parse");
    let loaded = icftl_lang::compile_all(raw);
    let mut session = Session::new(loaded.specifications, ClosurePolicy::False);
    let mut verdicts = Vec::new();
    for event in [
        Event::new(1, "calls(query)", 1),
        Event::new(2, "calls(auth)", 1),
        Event::new(3, "exit(handle)", 1),
        Event::new(4, "calls(auth)", 2),
        Event::new(5, "calls(query)", 2),
    ] {
        verdicts.extend(session.process(Arc::new(event)));
    }
    let outcomes: Vec<_> = verdicts.iter().map(|v| v.outcome).collect();
    assert_eq!(outcomes, vec![Outcome::False, Outcome::True]);
}

#[test]
fn monitor_services() {
    let loaded = load(Path::new("./tests/services.icftl")).expect("load");
    let mut session = Session::new(loaded.specifications, ClosurePolicy::False);
    let mut verdicts = Vec::new();
    for event in [
        Event::new(1, "enter(handle)", 1).with_value("value", 5i64),
        Event::new(2, "changes(session)", 1).with_value("open", true),
        Event::new(3, "changes(session)", 1).with_value("open", false),
        Event::new(100, "exit(handle)", 1),
        Event::new(200, "enter(handle)", 1).with_value("value", 1i64),
        Event::new(201, "changes(session)", 1).with_value("open", true),
        Event::new(700, "exit(handle)", 1),
    ] {
        verdicts.extend(session.process(Arc::new(event)));
    }
    assert_eq!(session.open_bindings(), 0);
    let of = |name: &str| -> Vec<&Verdict> {
        verdicts
            .iter()
            .filter(|v| v.specification.as_ref() == name)
            .collect()
    };

    // Every session change is settled by the exit of its own call.
    let sessions = of("session_closed");
    assert_eq!(sessions.len(), 3);
    assert_eq!(sessions[0].outcome, Outcome::True);
    assert_eq!(sessions[0].decided_by, Decision::Event(3));
    assert_eq!(sessions[1].scope, ScopeKey::Occurrence(1, 0));
    assert_eq!(sessions[1].outcome, Outcome::False);
    assert_eq!(sessions[1].decided_by, Decision::ScopeClosure);
    assert_eq!(sessions[2].evidence[0].timestamp, 201);
    assert_eq!(sessions[2].outcome, Outcome::False);

    let durations: Vec<_> = of("fast_handle")
        .iter()
        .map(|v| (v.outcome, v.decided_by))
        .collect();
    assert_eq!(
        durations,
        vec![
            (Outcome::True, Decision::Event(100)),
            (Outcome::False, Decision::Event(700)),
        ]
    );
}
