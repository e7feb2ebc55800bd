use tamper_guard::{
    DataType, Guard, GuardConfig, HttpMethod, InboundRequest, IntegrityViolation, RuleSpec, Scope,
    Session, StateToken, Strategy,
};

fn guard_with(config: GuardConfig) -> Guard {
    Guard::new(config)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Composes one page with a single link and returns its token.
fn compose_link(guard: &Guard, session: &Session, action: &str, params: &[(&str, &str)]) -> String {
    let mut composer = guard.composer(session);
    composer.start_page().unwrap();
    composer.begin_request(HttpMethod::Get, action).unwrap();
    for (name, value) in params {
        composer.compose(name, value, false, None).unwrap();
    }
    let token = composer.end_request().unwrap();
    composer.end_page().unwrap();
    token.to_string()
}

fn request(session: &Session, action: &str, token: &str, params: &[(&str, &str)]) -> InboundRequest {
    params
        .iter()
        .fold(InboundRequest::new(HttpMethod::Get, action), |r, (k, v)| r.param(k, v))
        .param(session.state_parameter_name(), token)
}

#[test]
fn unchanged_link_validates_and_changed_link_is_tampering() {
    init_tracing();
    let guard = guard_with(GuardConfig::builder().confidentiality(false).build().unwrap());
    let session = guard.new_session("s-1");
    let token = compose_link(&guard, &session, "/test.do", &[("p1", "2")]);

    let ok = guard.validate(&session, &request(&session, "/test.do", &token, &[("p1", "2")]));
    assert!(ok.is_valid());

    let bad = guard.validate(&session, &request(&session, "/test.do", &token, &[("p1", "3")]));
    assert_eq!(
        bad.violation(),
        Some(&IntegrityViolation::ParameterTampered {
            parameter: "p1".to_string(),
            submitted: "3".to_string(),
            expected: vec!["2".to_string()],
        })
    );
}

#[test]
fn every_state_of_a_page_round_trips() {
    let guard = guard_with(GuardConfig::default());
    let session = guard.new_session("s-1");

    let mut composer = guard.composer(&session);
    composer.start_page().unwrap();
    let mut links = Vec::new();
    for i in 0..4 {
        let action = format!("/item{}.do", i);
        composer.begin_request(HttpMethod::Get, &action).unwrap();
        let shown = composer.compose("id", &format!("item-{}", i), false, None).unwrap();
        let token = composer.end_request().unwrap().to_string();
        links.push((action, shown, token));
    }
    composer.end_page().unwrap();

    for (i, (action, shown, token)) in links.iter().enumerate() {
        let result = guard.validate(&session, &request(&session, action, token, &[("id", shown)]));
        let validated = result.request().expect("integrity holds");
        let state = validated.state().unwrap();

        assert_eq!(state.action(), action);
        assert_eq!(state.index(), i);
        assert_eq!(validated.parameter("id"), Some(format!("item-{}", i).as_str()));
    }
}

#[test]
fn confidential_placeholders_map_back() {
    let guard = guard_with(GuardConfig::default());
    let session = guard.new_session("s-1");

    let mut composer = guard.composer(&session);
    composer.start_page().unwrap();
    composer.begin_request(HttpMethod::Post, "/account.do").unwrap();
    let first = composer.compose("account", "DE89-3704", false, None).unwrap();
    let second = composer.compose("account", "GB29-6016", false, None).unwrap();
    let token = composer.end_request().unwrap().to_string();
    composer.end_page().unwrap();

    assert_ne!(first, "DE89-3704");
    assert_ne!(second, "GB29-6016");

    let result = guard.validate(
        &session,
        &request(&session, "/account.do", &token, &[("account", &second)]),
    );
    assert!(result.is_valid());
    assert_eq!(result.request().unwrap().parameter("account"), Some("GB29-6016"));
}

#[test]
fn evicted_page_no_longer_resolves() {
    init_tracing();
    let k = 3;
    let guard = guard_with(GuardConfig::builder().max_pages_per_session(k).build().unwrap());
    let session = guard.new_session("s-1");

    let tokens: Vec<String> = (0..=k)
        .map(|_| compose_link(&guard, &session, "/a.do", &[]))
        .collect();

    let first = guard.validate(&session, &request(&session, "/a.do", &tokens[0], &[]));
    assert!(matches!(
        first.violation(),
        Some(IntegrityViolation::ExpiredOrTamperedState { .. })
    ));
    for token in &tokens[1..] {
        assert!(guard.validate(&session, &request(&session, "/a.do", token, &[])).is_valid());
    }
}

#[test]
fn slow_page_stored_after_faster_one_stays_resolvable() {
    let guard = guard_with(GuardConfig::builder().max_pages_per_session(1).build().unwrap());
    let session = guard.new_session("s-1");

    let mut slow = guard.composer(&session);
    slow.start_page().unwrap();
    let mut fast = guard.composer(&session);
    fast.start_page().unwrap();
    assert!(slow.page_id() < fast.page_id());

    fast.begin_request(HttpMethod::Get, "/fast.do").unwrap();
    fast.end_request().unwrap();
    fast.end_page().unwrap();

    slow.begin_request(HttpMethod::Get, "/slow.do").unwrap();
    let shown = slow.compose("id", "7", false, None).unwrap();
    let token = slow.end_request().unwrap().to_string();
    slow.end_page().unwrap();

    let result = guard.validate(&session, &request(&session, "/slow.do", &token, &[("id", &shown)]));
    assert!(result.is_valid(), "{:?}", result.violation());
}

#[test]
fn placeholder_lookalike_values_stay_literal_without_confidentiality() {
    let guard = guard_with(GuardConfig::builder().confidentiality(false).build().unwrap());
    let session = guard.new_session("s-1");

    let mut composer = guard.composer(&session);
    composer.start_page().unwrap();
    composer.begin_request(HttpMethod::Get, "/purge.do").unwrap();
    assert_eq!(composer.compose("v", "delete-all", false, None).unwrap(), "delete-all");
    assert_eq!(composer.compose("v", "~0", false, None).unwrap(), "~0");
    let token = composer.end_request().unwrap().to_string();
    composer.end_page().unwrap();

    let result = guard.validate(&session, &request(&session, "/purge.do", &token, &[("v", "~0")]));
    let validated = result.request().expect("integrity holds");
    assert_eq!(validated.values("v"), &["~0".to_string()]);
}

#[test]
fn tolerated_undeclared_parameters_still_meet_editable_rules() {
    let guard = guard_with(
        GuardConfig::builder()
            .confidentiality(false)
            .reject_undeclared_parameters(false)
            .builtin_default_rules(true)
            .build()
            .unwrap(),
    );
    let session = guard.new_session("s-1");
    let token = compose_link(&guard, &session, "/view.do", &[("id", "1")]);

    let clean = guard.validate(
        &session,
        &request(&session, "/view.do", &token, &[("id", "1"), ("ref", "home")]),
    );
    assert!(clean.is_valid());

    let dirty = guard.validate(
        &session,
        &request(&session, "/view.do", &token, &[("id", "1"), ("ref", "<script>x</script>")]),
    );
    assert!(!dirty.is_valid());
    assert_eq!(dirty.field_errors().len(), 1);
    assert_eq!(dirty.field_errors()[0].parameter(), "ref");
}

#[test]
fn application_scope_is_shared_and_page_scope_is_not() {
    let guard = guard_with(GuardConfig::default());
    let owner = guard.new_session("owner");
    let other = guard.new_session("other");

    let mut composer = guard.composer(&owner);
    composer.start_page().unwrap();
    composer.start_scope(Scope::Application).unwrap();
    composer.begin_request(HttpMethod::Get, "/public.do").unwrap();
    let app_token = composer.end_request().unwrap().to_string();
    composer.end_scope().unwrap();
    composer.begin_request(HttpMethod::Get, "/private.do").unwrap();
    let page_token = composer.end_request().unwrap().to_string();
    composer.end_page().unwrap();

    assert!(app_token.starts_with("A-"));
    assert!(guard.validate(&other, &request(&other, "/public.do", &app_token, &[])).is_valid());
    assert!(!guard.validate(&other, &request(&other, "/private.do", &page_token, &[])).is_valid());
    assert!(guard.validate(&owner, &request(&owner, "/private.do", &page_token, &[])).is_valid());

    // Relabelling a page-scoped state as application scoped does not help.
    let relabelled = format!("A-{}", page_token);
    assert!(!guard.validate(&other, &request(&other, "/private.do", &relabelled, &[])).is_valid());
}

#[test]
fn invalidated_session_forgets_pages() {
    let guard = guard_with(GuardConfig::default());
    let session = guard.new_session("s-1");
    let token = compose_link(&guard, &session, "/a.do", &[]);

    session.invalidate();

    let result = guard.validate(&session, &request(&session, "/a.do", &token, &[]));
    assert!(matches!(
        result.violation(),
        Some(IntegrityViolation::ExpiredOrTamperedState { .. })
    ));
}

#[test]
fn forged_nonce_is_rejected() {
    let guard = guard_with(GuardConfig::default());
    let session = guard.new_session("s-1");
    let token = compose_link(&guard, &session, "/a.do", &[]);

    let parsed: StateToken = token.parse().unwrap();
    let forged = match parsed.body() {
        tamper_guard::TokenBody::Memory {
            page_id,
            state_index,
            nonce,
        } => {
            let flipped = if nonce.starts_with('0') { "1" } else { "0" };
            format!("{}-{}-{}{}", page_id, state_index, flipped, &nonce[1..])
        }
        tamper_guard::TokenBody::Cipher { .. } => unreachable!("memory strategy"),
    };

    assert!(!guard.validate(&session, &request(&session, "/a.do", &forged, &[])).is_valid());
}

#[test]
fn missing_and_malformed_tokens() {
    let guard = guard_with(GuardConfig::default());
    let session = guard.new_session("s-1");

    let missing = guard.validate(&session, &InboundRequest::new(HttpMethod::Get, "/a.do"));
    assert_eq!(missing.violation(), Some(&IntegrityViolation::MissingState));

    let malformed = guard.validate(&session, &request(&session, "/a.do", "not-a-token", &[]));
    assert!(matches!(
        malformed.violation(),
        Some(IntegrityViolation::MalformedToken { .. })
    ));
}

#[test]
fn cipher_tokens_validate_without_cache() {
    let guard = guard_with(
        GuardConfig::builder()
            .strategy(Strategy::Cipher)
            .confidentiality(false)
            .build()
            .unwrap(),
    );
    let session = guard.new_session("s-1");
    let token = compose_link(&guard, &session, "/test.do", &[("p1", "2")]);

    assert!(session.pages().is_empty());
    assert!(guard
        .validate(&session, &request(&session, "/test.do", &token, &[("p1", "2")]))
        .is_valid());
    assert!(!guard
        .validate(&session, &request(&session, "/test.do", &token, &[("p1", "3")]))
        .is_valid());

    // Another session holds another key.
    let other = guard.new_session("s-2");
    let result = guard.validate(&other, &request(&other, "/test.do", &token, &[("p1", "2")]));
    assert!(matches!(
        result.violation(),
        Some(IntegrityViolation::ExpiredOrTamperedState { .. })
    ));
}

#[test]
fn application_cipher_tokens_cross_sessions() {
    let guard = guard_with(GuardConfig::builder().strategy(Strategy::Cipher).build().unwrap());
    let owner = guard.new_session("owner");
    let other = guard.new_session("other");

    let mut composer = guard.composer(&owner);
    composer.start_page().unwrap();
    composer.start_scope(Scope::Application).unwrap();
    composer.begin_request(HttpMethod::Get, "/catalog.do").unwrap();
    let shown = composer.compose("category", "books", false, None).unwrap();
    let token = composer.end_request().unwrap().to_string();
    composer.end_scope().unwrap();
    composer.end_page().unwrap();

    let result = guard.validate(&other, &request(&other, "/catalog.do", &token, &[("category", &shown)]));
    assert!(result.is_valid());
    assert_eq!(result.request().unwrap().parameter("category"), Some("books"));
}

#[test]
fn editable_rules_follow_url_order() {
    let guard = guard_with(
        GuardConfig::builder()
            .rule(RuleSpec::accept("anything", "(?s).*").url("/insecure/.*"))
            .default_rule(RuleSpec::accept("strict", "[A-Za-z ]*"))
            .build()
            .unwrap(),
    );
    let session = guard.new_session("s-1");

    let mut tokens = Vec::new();
    for action in ["/insecure/comment.do", "/secure/comment.do"] {
        let mut composer = guard.composer(&session);
        composer.start_page().unwrap();
        composer.begin_request(HttpMethod::Post, action).unwrap();
        composer
            .compose("comment", "", true, Some(DataType::Textarea))
            .unwrap();
        tokens.push(composer.end_request().unwrap().to_string());
        composer.end_page().unwrap();
    }

    let value = "<b>1 & 2</b>";
    let insecure = guard.validate(
        &session,
        &request(&session, "/insecure/comment.do", &tokens[0], &[("comment", value)]),
    );
    assert!(insecure.is_valid());

    let secure = guard.validate(
        &session,
        &request(&session, "/secure/comment.do", &tokens[1], &[("comment", value)]),
    );
    assert!(!secure.is_valid());
    assert!(secure.violation().is_none());
    assert_eq!(secure.field_errors()[0].rule(), "strict");
}

#[test]
fn editable_errors_accumulate_across_fields() {
    let guard = guard_with(
        GuardConfig::builder()
            .default_rule(RuleSpec::accept("digits", "[0-9]*"))
            .build()
            .unwrap(),
    );
    let session = guard.new_session("s-1");

    let mut composer = guard.composer(&session);
    composer.start_page().unwrap();
    composer.begin_request(HttpMethod::Post, "/order.do").unwrap();
    composer.compose("qty", "", true, Some(DataType::Text)).unwrap();
    composer.compose("zip", "", true, Some(DataType::Text)).unwrap();
    let token = composer.end_request().unwrap().to_string();
    composer.end_page().unwrap();

    let result = guard.validate(
        &session,
        &request(&session, "/order.do", &token, &[("qty", "ten"), ("zip", "1x")]),
    );
    let names: Vec<_> = result.field_errors().iter().map(|e| e.parameter()).collect();
    assert_eq!(names, vec!["qty", "zip"]);
}

#[test]
fn link_query_parameters_are_required() {
    let guard = guard_with(GuardConfig::default());
    let session = guard.new_session("s-1");

    let mut composer = guard.composer(&session);
    composer.start_page().unwrap();
    composer.begin_request(HttpMethod::Get, "/view.do").unwrap();
    let query = composer
        .compose_params("id=42&mode=full", HttpMethod::Get, "UTF-8")
        .unwrap();
    let token = composer.end_request().unwrap().to_string();
    composer.end_page().unwrap();
    assert_eq!(query, "id=~0&mode=~0");

    let full = guard.validate(
        &session,
        &request(&session, "/view.do", &token, &[("id", "~0"), ("mode", "~0")]),
    );
    assert_eq!(full.request().unwrap().parameter("id"), Some("42"));

    let dropped = guard.validate(&session, &request(&session, "/view.do", &token, &[("id", "~0")]));
    assert_eq!(
        dropped.violation(),
        Some(&IntegrityViolation::RequiredParameterMissing {
            parameter: "mode".to_string()
        })
    );
}

#[test]
fn token_for_other_action_is_rejected() {
    let guard = guard_with(GuardConfig::default());
    let session = guard.new_session("s-1");
    let token = compose_link(&guard, &session, "/view.do", &[]);

    let result = guard.validate(&session, &request(&session, "/delete.do", &token, &[]));
    assert!(matches!(
        result.violation(),
        Some(IntegrityViolation::ActionMismatch { .. })
    ));
}

#[test]
fn config_from_json_drives_validation() {
    let config = GuardConfig::from_json(
        r#"{ "confidentiality": false, "start_pages": ["/", "/login\\.do"] }"#,
    )
    .unwrap();
    let guard = guard_with(config);
    let session = guard.new_session("s-1");

    let login = InboundRequest::new(HttpMethod::Post, "/login.do").param("user", "alice");
    assert!(guard.validate(&session, &login).is_valid());
}

#[test]
fn concurrent_requests_share_a_session() {
    let guard = guard_with(GuardConfig::builder().max_pages_per_session(64).build().unwrap());
    let session = guard.new_session("s-1");

    std::thread::scope(|scope| {
        for t in 0..4 {
            let (guard, session) = (&guard, &session);
            scope.spawn(move || {
                for i in 0..10 {
                    let value = format!("{}-{}", t, i);
                    let mut composer = guard.composer(session);
                    composer.start_page().unwrap();
                    composer.begin_request(HttpMethod::Get, "/a.do").unwrap();
                    let shown = composer.compose("v", &value, false, None).unwrap();
                    let token = composer.end_request().unwrap().to_string();
                    composer.end_page().unwrap();

                    let result =
                        guard.validate(session, &request(session, "/a.do", &token, &[("v", &shown)]));
                    assert_eq!(result.request().unwrap().parameter("v"), Some(value.as_str()));
                }
            });
        }
    });

    assert_eq!(session.pages().len(), 40);
}
