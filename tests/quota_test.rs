mod common;

use chrono::Duration;
use common::{active_card, engine};
use parkcard::application::lifecycle::CardEdit;
use parkcard::domain::application::{AlertOutcome, NotEligible};
use parkcard::domain::ports::ApplicationStore;

const FALLBACK: &str = "+918750920902";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_lookups_never_overspend() {
    let t = engine(true, None);
    let (id, card) = active_card(&t, "Kiran", "9000000001", "FAMILY").await;
    t.clock.advance(Duration::hours(48));

    let mut handles = Vec::new();
    for _ in 0..40 {
        let engine = t.engine.clone();
        let card = card.clone();
        handles.push(tokio::spawn(async move { engine.ivr_lookup(&card).await }));
    }

    let mut dispatched = 0;
    for handle in handles {
        match handle.await.unwrap().as_str() {
            "+919000000001" => dispatched += 1,
            other => assert_eq!(other, FALLBACK),
        }
    }
    assert_eq!(dispatched, 15);

    let app = t.stores.applications.get(&id).await.unwrap().unwrap();
    assert_eq!(app.alert_used, 15);
    assert_eq!(app.alerts_left, 0);
}

#[tokio::test]
async fn test_card_is_silent_until_activation_day() {
    let t = engine(true, None);
    let (id, card) = active_card(&t, "Lata", "9000000002", "INDIVIDUAL").await;

    assert_eq!(
        t.engine.consume_one_alert(&card).await.unwrap(),
        AlertOutcome::NotEligible(NotEligible::NotYetActive)
    );
    t.clock.advance(Duration::hours(24));
    assert_eq!(t.engine.ivr_lookup(&card).await, FALLBACK);
    let app = t.stores.applications.get(&id).await.unwrap().unwrap();
    assert_eq!(app.alert_used, 0);

    t.clock.advance(Duration::hours(24));
    assert_eq!(t.engine.ivr_lookup(&format!("\"{card}\"")).await, "+919000000002");
}

#[tokio::test]
async fn test_extra_alerts_reopen_an_exhausted_card() {
    let t = engine(true, None);
    let (id, card) = active_card(&t, "Vikram", "9000000003", "PREMIUM").await;
    t.clock.advance(Duration::hours(48));

    for _ in 0..15 {
        assert_eq!(t.engine.ivr_lookup(&card).await, "+919000000003");
    }
    assert_eq!(t.engine.ivr_lookup(&card).await, FALLBACK);

    let edited = t
        .engine
        .edit_card(
            &id,
            CardEdit {
                extra_alerts_granted: Some(5),
                extra_alerts_reason: Some("VIP customer".to_string()),
                ..CardEdit::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.alert_limit, 20);
    assert_eq!(edited.alert_used, 15);
    assert_eq!(edited.alerts_left, 5);

    for _ in 0..5 {
        assert_eq!(t.engine.ivr_lookup(&card).await, "+919000000003");
    }
    assert_eq!(t.engine.ivr_lookup(&card).await, FALLBACK);

    let trail = t.engine.adjustment_trail(&id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].previous_extra_alerts, 0);
    assert_eq!(trail[0].new_extra_alerts, 5);
    assert_eq!(trail[0].adjusted_by, "support");
}

#[tokio::test]
async fn test_unknown_and_blank_tokens_fall_back() {
    let t = engine(true, None);
    assert_eq!(t.engine.ivr_lookup("").await, FALLBACK);
    assert_eq!(t.engine.ivr_lookup("4242").await, FALLBACK);
    assert_eq!(
        t.engine.consume_one_alert("  ").await.unwrap(),
        AlertOutcome::NotEligible(NotEligible::EmptyToken)
    );
}

#[tokio::test]
async fn test_digit_lookup() {
    let t = engine(true, None);
    let (_, card) = active_card(&t, "Neha", "9000000004", "FAMILY").await;

    let found = t.engine.resolve_card_phone(&card).await.unwrap();
    assert_eq!(found.mobile, "9000000004");

    assert_eq!(t.engine.resolve_card_phone("12a4").await.unwrap_err().status_code(), 400);
    assert_eq!(t.engine.resolve_card_phone("7777").await.unwrap_err().status_code(), 404);
}
