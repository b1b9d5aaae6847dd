//! End-to-end submission workflow tests against SQLite and an in-memory SMS gateway

mod common;

use chrono::Duration as ChronoDuration;
use std::time::Duration;

use common::{contribution, drain, guestbook, Harness};
use invite_common::db::{Domain, EntryContent, GuestbookContent};
use invite_gw::workflow::{Phase, SubmissionMode, WorkflowSettings};

const PHONE: &str = "010-1234-5678";
const OTHER_PHONE: &str = "010-9876-5432";

/// Run a guestbook submission from phone entry to stored entry
async fn submit_guestbook(h: &Harness, workflow: &invite_gw::workflow::Workflow, phone: &str, message: &str) {
    let handle = workflow.begin_submission(Domain::Guestbook, h.event);
    let step = handle.submit_phone(phone, true).await;
    assert_eq!(step.state, Phase::CodeIssued, "{:?}", step.error_message);
    let step = handle.submit_code(&h.last_code(phone)).await;
    assert_eq!(step.state, Phase::Composing, "{:?}", step.error_message);
    let step = handle.submit_content(guestbook("Kim", message)).await;
    assert_eq!(step.state, Phase::Submitted, "{:?}", step.error_message);
}

#[tokio::test]
async fn test_new_guest_creates_entry() {
    let h = Harness::new().await;
    let mut rx = h.events.subscribe();
    let workflow = h.workflow(None);
    let handle = workflow.begin_submission(Domain::Guestbook, h.event);

    let step = handle.submit_phone(PHONE, true).await;
    assert_eq!(step.state, Phase::CodeIssued);
    assert_eq!(step.mode, Some(SubmissionMode::Create));
    assert_eq!(step.code_expires_in_secs, Some(300));
    assert_eq!(h.sms.sent_count(), 1);

    let step = handle.submit_code(&h.last_code(PHONE)).await;
    assert_eq!(step.state, Phase::Composing);
    assert_eq!(step.verified_phone.as_ref().map(|p| p.as_str()), Some("+821012345678"));
    assert!(step.prefill.is_none());

    let step = handle
        .submit_content(guestbook("Kim", "Congratulations!"))
        .await;
    assert_eq!(step.state, Phase::Submitted);
    assert_eq!(step.mode, Some(SubmissionMode::Create));
    assert!(step.entry_id.is_some());

    assert_eq!(h.count_rows("guestbook_entries").await, 1);
    // The verifying session now carries the marker
    assert_eq!(
        workflow.session().marker().map(|p| p.as_str().to_string()),
        Some("+821012345678".to_string())
    );

    let events = drain(&mut rx);
    assert_eq!(
        events.iter().filter(|e| *e == "GuestbookEntryCreated").count(),
        1
    );
}

#[tokio::test]
async fn test_returning_guest_on_new_device_edits() {
    let h = Harness::new().await;
    submit_guestbook(&h, &h.workflow(None), PHONE, "Congratulations!").await;

    // Fresh session with no marker: edit instead of block
    let workflow = h.workflow(None);
    let handle = workflow.begin_submission(Domain::Guestbook, h.event);
    let step = handle.submit_phone("+82 10 1234 5678", true).await;
    assert_eq!(step.state, Phase::CodeIssued);
    assert_eq!(step.mode, Some(SubmissionMode::Edit));
    // Existing content is only shown once the phone is proven
    assert!(step.prefill.is_none());

    let step = handle.submit_code(&h.last_code(PHONE)).await;
    assert_eq!(step.state, Phase::Composing);
    assert_eq!(
        step.prefill,
        Some(EntryContent::Guestbook(GuestbookContent {
            name: "Kim".to_string(),
            message: "Congratulations!".to_string(),
            is_public: true,
        }))
    );

    let mut rx = h.events.subscribe();
    let step = handle.submit_content(guestbook("Kim", "Updated wishes")).await;
    assert_eq!(step.state, Phase::Submitted);
    assert_eq!(step.mode, Some(SubmissionMode::Edit));

    assert_eq!(h.count_rows("guestbook_entries").await, 1);
    let message: String = sqlx::query_scalar("SELECT message FROM guestbook_entries")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(message, "Updated wishes");
    assert_eq!(drain(&mut rx), vec!["GuestbookEntryUpdated".to_string()]);
}

#[tokio::test]
async fn test_same_session_is_blocked_without_sms() {
    let h = Harness::new().await;
    let workflow = h.workflow(None);
    submit_guestbook(&h, &workflow, PHONE, "Congratulations!").await;
    let sent_before = h.sms.sent_count();

    let handle = workflow.begin_submission(Domain::Guestbook, h.event);
    let step = handle.submit_phone(PHONE, true).await;

    assert_eq!(step.state, Phase::Blocked);
    let message = step.message.unwrap();
    assert!(message.contains("Kim"), "{}", message);
    assert!(message.contains("2026-05-16 12:00"), "{}", message);
    assert!(message.contains("already submitted"), "{}", message);
    assert!(message.contains("edit your message"), "{}", message);
    // The page needs the blocking entry to offer the edit action
    assert!(step.entry_id.is_some());
    assert_eq!(h.sms.sent_count(), sent_before);
}

#[tokio::test]
async fn test_restored_marker_blocks_matching_phone_only() {
    let h = Harness::new().await;
    submit_guestbook(&h, &h.workflow(None), PHONE, "Congratulations!").await;

    // Marker for someone else: treated as a different person, edit mode
    let workflow = h.workflow(Some(OTHER_PHONE));
    let handle = workflow.begin_submission(Domain::Guestbook, h.event);
    let step = handle.submit_phone(PHONE, true).await;
    assert_eq!(step.state, Phase::CodeIssued);
    assert_eq!(step.mode, Some(SubmissionMode::Edit));

    let workflow = h.workflow(Some("+821012345678"));
    let handle = workflow.begin_submission(Domain::Guestbook, h.event);
    let step = handle.submit_phone(PHONE, true).await;
    assert_eq!(step.state, Phase::Blocked);
}

#[tokio::test]
async fn test_blocked_guest_can_try_another_phone() {
    let h = Harness::new().await;
    let workflow = h.workflow(None);
    submit_guestbook(&h, &workflow, PHONE, "Congratulations!").await;

    let handle = workflow.begin_submission(Domain::Guestbook, h.event);
    assert_eq!(handle.submit_phone(PHONE, true).await.state, Phase::Blocked);

    let step = handle.submit_phone(OTHER_PHONE, true).await;
    assert_eq!(step.state, Phase::CodeIssued);
    assert_eq!(step.mode, Some(SubmissionMode::Create));
}

#[tokio::test]
async fn test_expired_code_then_resend() {
    let h = Harness::new().await;
    let workflow = h.workflow(None);
    let handle = workflow.begin_submission(Domain::Guestbook, h.event);

    handle.submit_phone(PHONE, true).await;
    let first = h.last_code(PHONE);

    h.clock.advance(ChronoDuration::seconds(301));
    let step = handle.submit_code(&first).await;
    assert_eq!(step.state, Phase::CodeIssued);
    assert_eq!(
        step.error_message.as_deref(),
        Some("The verification code is invalid or has expired.")
    );

    let step = handle.resend_code().await;
    assert_eq!(step.state, Phase::CodeIssued);
    assert!(!step.is_error(), "{:?}", step.error_message);
    assert_eq!(h.sms.sent_count(), 2);

    let second = h.last_code(PHONE);
    if second != first {
        assert!(handle.submit_code(&first).await.is_error());
    }
    let step = handle.submit_code(&second).await;
    assert_eq!(step.state, Phase::Composing);
}

#[tokio::test]
async fn test_wrong_code_keeps_guest_on_code_step() {
    let h = Harness::new().await;
    let handle = h.workflow(None).begin_submission(Domain::Guestbook, h.event);
    handle.submit_phone(PHONE, true).await;

    let code = h.last_code(PHONE);
    let wrong = if code == "000000" { "111111" } else { "000000" };
    let step = handle.submit_code(wrong).await;
    assert_eq!(step.state, Phase::CodeIssued);
    assert!(step.is_error());

    // Malformed input never reaches the verifier
    let step = handle.submit_code("12ab").await;
    assert_eq!(step.state, Phase::CodeIssued);
    assert!(step.is_error());

    assert_eq!(handle.submit_code(&code).await.state, Phase::Composing);
}

#[tokio::test]
async fn test_existing_contribution_blocks_regardless_of_marker() {
    let h = Harness::new().await;
    let workflow = h.workflow(None);
    let handle = workflow.begin_submission(Domain::Contribution, h.event);
    handle.submit_phone(PHONE, true).await;
    handle.submit_code(&h.last_code(PHONE)).await;
    let step = handle.submit_content(contribution("Park", 50_000)).await;
    assert_eq!(step.state, Phase::Submitted);
    let sent_before = h.sms.sent_count();

    for marker in [None, Some(PHONE), Some(OTHER_PHONE)] {
        let handle = h.workflow(marker).begin_submission(Domain::Contribution, h.event);
        let step = handle.submit_phone(PHONE, true).await;
        assert_eq!(step.state, Phase::Blocked, "marker {:?}", marker);
        assert!(step.message.unwrap().contains("cannot be changed"));
    }
    assert_eq!(h.sms.sent_count(), sent_before);
}

#[tokio::test]
async fn test_domains_are_checked_independently() {
    let h = Harness::new().await;
    let workflow = h.workflow(None);
    submit_guestbook(&h, &workflow, PHONE, "Congratulations!").await;

    // A guestbook entry does not block a contribution from the same phone
    let handle = workflow.begin_submission(Domain::Contribution, h.event);
    let step = handle.submit_phone(PHONE, true).await;
    assert_eq!(step.state, Phase::CodeIssued);
    assert_eq!(step.mode, Some(SubmissionMode::Create));
}

#[tokio::test]
async fn test_consent_and_phone_validation() {
    let h = Harness::new().await;
    let handle = h.workflow(None).begin_submission(Domain::Guestbook, h.event);

    let step = handle.submit_phone(PHONE, false).await;
    assert_eq!(step.state, Phase::CollectingPhone);
    assert!(step.is_error());

    let step = handle.submit_phone("12345", true).await;
    assert_eq!(step.state, Phase::CollectingPhone);
    assert!(step.is_error());

    assert_eq!(h.sms.sent_count(), 0);
}

#[tokio::test]
async fn test_sms_failure_returns_to_phone_step() {
    let h = Harness::new().await;
    let handle = h.workflow(None).begin_submission(Domain::Guestbook, h.event);

    h.sms.set_failing(true);
    let step = handle.submit_phone(PHONE, true).await;
    assert_eq!(step.state, Phase::CollectingPhone);
    assert!(step.is_error());

    h.sms.set_failing(false);
    let step = handle.submit_phone(PHONE, true).await;
    assert_eq!(step.state, Phase::CodeIssued);
}

#[tokio::test]
async fn test_resend_respects_cooldown() {
    let h = Harness::with_settings(WorkflowSettings {
        resend_cooldown: Duration::from_secs(60),
        ..common::fast_settings()
    })
    .await;
    let handle = h.workflow(None).begin_submission(Domain::Guestbook, h.event);
    let step = handle.submit_phone(PHONE, true).await;
    assert_eq!(step.resend_available_in_secs, Some(60));

    let step = handle.resend_code().await;
    assert_eq!(step.state, Phase::CodeIssued);
    assert!(step.error_message.unwrap().contains("wait"));
    assert_eq!(h.sms.sent_count(), 1);
}

#[tokio::test]
async fn test_steps_out_of_order_are_rejected() {
    let h = Harness::new().await;
    let handle = h.workflow(None).begin_submission(Domain::Guestbook, h.event);

    assert!(handle.submit_code("123456").await.is_error());
    assert!(handle.resend_code().await.is_error());
    assert!(handle
        .submit_content(guestbook("Kim", "Too early"))
        .await
        .is_error());
    // Content for the wrong domain
    assert!(handle
        .submit_content(contribution("Kim", 10_000))
        .await
        .is_error());
    assert_eq!(handle.phase().await, Phase::CollectingPhone);
    assert_eq!(h.count_rows("guestbook_entries").await, 0);
}

#[tokio::test]
async fn test_concurrent_phone_submissions_send_one_code() {
    let h = Harness::new().await;
    let handle = h.workflow(None).begin_submission(Domain::Guestbook, h.event);

    let (a, b) = tokio::join!(handle.submit_phone(PHONE, true), handle.submit_phone(PHONE, true));
    assert_eq!(a.state, Phase::CodeIssued);
    assert_eq!(b.state, Phase::CodeIssued);
    assert_eq!(h.sms.sent_count(), 1);
}

#[tokio::test]
async fn test_concurrent_content_submissions_write_once() {
    let h = Harness::new().await;
    let mut rx = h.events.subscribe();
    let handle = h.workflow(None).begin_submission(Domain::Guestbook, h.event);
    handle.submit_phone(PHONE, true).await;
    handle.submit_code(&h.last_code(PHONE)).await;

    h.store.hold_writes();
    let first = tokio::spawn({
        let handle = handle.clone();
        async move { handle.submit_content(guestbook("Kim", "Once")).await }
    });
    h.store.wait_for_entered(1).await;
    let second = tokio::spawn({
        let handle = handle.clone();
        async move { handle.submit_content(guestbook("Kim", "Once")).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.store.release_writes();

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert_eq!(first.state, Phase::Submitted);
    assert_eq!(second.state, Phase::Submitted);
    assert_eq!(first.entry_id, second.entry_id);

    assert_eq!(h.store.writes(), 1);
    assert_eq!(h.count_rows("guestbook_entries").await, 1);
    let created = drain(&mut rx)
        .into_iter()
        .filter(|e| e == "GuestbookEntryCreated")
        .count();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn test_cancel_discards_late_result_but_keeps_row() {
    let h = Harness::new().await;
    let mut rx = h.events.subscribe();
    let handle = h.workflow(None).begin_submission(Domain::Contribution, h.event);
    handle.submit_phone(PHONE, true).await;
    handle.submit_code(&h.last_code(PHONE)).await;

    h.store.hold_writes();
    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.submit_content(contribution("Park", 30_000)).await }
    });
    h.store.wait_for_entered(1).await;

    handle.cancel().await;
    h.store.release_writes();

    let step = pending.await.unwrap();
    assert_eq!(step.state, Phase::Cancelled);
    assert!(handle.is_cancelled());
    assert_eq!(handle.phase().await, Phase::Cancelled);

    // The write already happened; it stays and is still announced
    assert_eq!(h.count_rows("contributions").await, 1);
    assert!(drain(&mut rx).iter().any(|e| e == "ContributionCreated"));
}

#[tokio::test]
async fn test_cancel_during_duplicate_check_sends_no_code() {
    let h = Harness::new().await;
    let handle = h.workflow(None).begin_submission(Domain::Guestbook, h.event);

    h.store.hold_lookups();
    let pending = tokio::spawn({
        let handle = handle.clone();
        async move { handle.submit_phone(PHONE, true).await }
    });
    h.store.wait_for_lookups(1).await;

    handle.cancel().await;
    h.store.release_lookups();

    let step = pending.await.unwrap();
    assert_eq!(step.state, Phase::Cancelled);
    assert_eq!(h.sms.sent_count(), 0);
    assert_eq!(h.count_rows("verification_codes").await, 0);
}

#[tokio::test]
async fn test_edit_falls_back_to_create_when_entry_vanished() {
    let h = Harness::new().await;
    submit_guestbook(&h, &h.workflow(None), PHONE, "Congratulations!").await;

    let handle = h.workflow(None).begin_submission(Domain::Guestbook, h.event);
    let step = handle.submit_phone(PHONE, true).await;
    assert_eq!(step.mode, Some(SubmissionMode::Edit));

    sqlx::query("DELETE FROM guestbook_entries")
        .execute(&h.pool)
        .await
        .unwrap();

    let step = handle.submit_code(&h.last_code(PHONE)).await;
    assert_eq!(step.state, Phase::Composing);
    assert_eq!(step.mode, Some(SubmissionMode::Create));
    assert!(step.prefill.is_none());

    let step = handle.submit_content(guestbook("Kim", "Again")).await;
    assert_eq!(step.state, Phase::Submitted);
    assert_eq!(step.mode, Some(SubmissionMode::Create));
}

#[tokio::test]
async fn test_lost_race_reports_already_submitted() {
    let h = Harness::new().await;
    let slow = h.workflow(None).begin_submission(Domain::Contribution, h.event);
    slow.submit_phone(PHONE, true).await;
    slow.submit_code(&h.last_code(PHONE)).await;

    // A second device finishes first
    let fast = h.workflow(None).begin_submission(Domain::Contribution, h.event);
    fast.submit_phone(PHONE, true).await;
    fast.submit_code(&h.last_code(PHONE)).await;
    assert_eq!(
        fast.submit_content(contribution("Park", 10_000)).await.state,
        Phase::Submitted
    );

    let step = slow.submit_content(contribution("Park", 10_000)).await;
    assert_eq!(step.state, Phase::Composing);
    assert_eq!(
        step.error_message.as_deref(),
        Some("You have already submitted for this event.")
    );
    assert_eq!(h.count_rows("contributions").await, 1);
}
