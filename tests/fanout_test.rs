mod common;

use common::{admin_with_tokens, sample_alert, state_with_mocks};
use sos_push_service::alert_handler::handle_alert;
use sos_push_service::fcm_sender::FcmError;
use sos_push_service::models::{AdminUser, HandlerOutcome, SosAlert};

#[tokio::test]
async fn dispatches_to_every_admin_token() {
    let (state, directory, sender) = state_with_mocks(vec![
        admin_with_tokens(&["tok_a", "tok_b"]),
        admin_with_tokens(&["tok_c"]),
    ]);

    let outcome = handle_alert(&state, &sample_alert(), "alert123").await;

    let HandlerOutcome::Dispatched(report) = outcome else {
        panic!("expected dispatch, got {:?}", outcome);
    };
    assert_eq!(report.success_count, 3);
    assert_eq!(report.failure_count, 0);
    assert!(report.token_errors.is_empty());

    assert_eq!(directory.get_queried_roles(), vec!["admin"]);

    let sent = sender.get_sent_messages();
    assert_eq!(sent.len(), 3);
    let sent_tokens: Vec<&str> = sent.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(sent_tokens, vec!["tok_a", "tok_b", "tok_c"]);

    // Every device gets the same data payload
    let data = sent[0].1.data.as_ref().unwrap();
    assert_eq!(data["type"], "sos_alert");
    assert_eq!(data["alertId"], "alert123");
    assert_eq!(data["studentName"], "Alice");
    for (_, payload) in &sent {
        assert_eq!(payload, &sent[0].1);
    }
}

#[tokio::test]
async fn shared_tokens_collapse_to_one_send() {
    let (state, _directory, sender) = state_with_mocks(vec![
        admin_with_tokens(&["tok_shared", "tok_a"]),
        admin_with_tokens(&["tok_shared"]),
    ]);

    let outcome = handle_alert(&state, &sample_alert(), "alert123").await;

    let HandlerOutcome::Dispatched(report) = outcome else {
        panic!("expected dispatch, got {:?}", outcome);
    };
    assert_eq!(report.success_count, 2);
    assert_eq!(sender.get_sent_messages().len(), 2);
}

#[tokio::test]
async fn no_admins_is_a_no_op() {
    let (state, _directory, sender) = state_with_mocks(vec![]);

    let outcome = handle_alert(&state, &sample_alert(), "alert123").await;

    assert_eq!(outcome, HandlerOutcome::NoAdmins);
    assert!(sender.get_sent_messages().is_empty());
}

#[tokio::test]
async fn non_admin_users_do_not_count() {
    let (state, _directory, sender) = state_with_mocks(vec![AdminUser {
        role: "student".to_string(),
        fcm_tokens: vec!["tok_a".to_string()],
    }]);

    let outcome = handle_alert(&state, &sample_alert(), "alert123").await;

    assert_eq!(outcome, HandlerOutcome::NoAdmins);
    assert!(sender.get_sent_messages().is_empty());
}

#[tokio::test]
async fn admins_without_tokens_is_a_no_op() {
    let (state, _directory, sender) =
        state_with_mocks(vec![admin_with_tokens(&[]), admin_with_tokens(&[])]);

    let outcome = handle_alert(&state, &sample_alert(), "alert123").await;

    assert_eq!(outcome, HandlerOutcome::NoTokens);
    assert!(sender.get_sent_messages().is_empty());
}

#[tokio::test]
async fn partial_failure_is_tallied_per_token() {
    let (state, _directory, sender) = state_with_mocks(vec![admin_with_tokens(&[
        "tok_1", "tok_2", "tok_3", "tok_4", "tok_5",
    ])]);

    sender.set_error_for_token("tok_2", FcmError::TokenNotRegistered);
    sender.set_error_for_token(
        "tok_4",
        FcmError::Unknown {
            code: 503,
            hint: None,
        },
    );

    let outcome = handle_alert(&state, &sample_alert(), "alert123").await;

    let HandlerOutcome::Dispatched(report) = outcome else {
        panic!("expected dispatch, got {:?}", outcome);
    };
    assert_eq!(report.success_count, 3);
    assert_eq!(report.failure_count, 2);
    assert_eq!(report.success_count + report.failure_count, 5);

    // Errors correlate to the failed tokens, in dispatch order
    assert_eq!(report.token_errors.len(), 2);
    assert_eq!(report.token_errors[0].0, "tok_2");
    assert_eq!(report.token_errors[0].1, FcmError::TokenNotRegistered);
    assert_eq!(report.token_errors[1].0, "tok_4");
}

#[tokio::test]
async fn query_failure_is_caught_not_propagated() {
    let (state, directory, sender) = state_with_mocks(vec![admin_with_tokens(&["tok_a"])]);
    directory.set_failure("firestore unreachable");

    let outcome = handle_alert(&state, &sample_alert(), "alert123").await;

    let HandlerOutcome::Failed(reason) = outcome else {
        panic!("expected failure outcome, got {:?}", outcome);
    };
    assert!(reason.contains("admin query failed"));
    assert!(sender.get_sent_messages().is_empty());
}

#[tokio::test]
async fn alert_with_missing_fields_uses_fallbacks_end_to_end() {
    let (state, _directory, sender) = state_with_mocks(vec![admin_with_tokens(&["tok_a"])]);

    let alert = SosAlert {
        student_name: Some("Alice".to_string()),
        category: Some("fire".to_string()),
        ..Default::default()
    };
    let outcome = handle_alert(&state, &alert, "alert123").await;
    assert!(matches!(outcome, HandlerOutcome::Dispatched(_)));

    let sent = sender.get_sent_messages();
    let data = sent[0].1.data.as_ref().unwrap();
    assert_eq!(data["location"], "Unknown location");
    assert_eq!(data["studentId"], "N/A");
    assert_eq!(data["description"], "");
    // Payload carries the platform delivery hints
    assert_eq!(sent[0].1.android.as_ref().unwrap()["priority"], "high");
    assert_eq!(
        sent[0].1.apns.as_ref().unwrap()["payload"]["aps"]["sound"],
        "default"
    );
}
