use chrono::{Duration, Utc};
use std::sync::atomic::Ordering;
use triage_shared::{DerivedValue, Ticket, TicketState};

use crate::store::TicketStore;
use crate::tests::fixtures::{new_ticket, stored_ticket};
use crate::tests::helpers::{harness, harness_with, HarnessOptions};
use crate::workflows::SyncOutcome;

#[tokio::test]
async fn test_state_progresses_with_each_write() {
    let mut h = harness();
    let ticket = h.store.create(new_ticket("Keyboard missing keys")).await.unwrap();
    assert_eq!(ticket.state(), TicketState::Created);

    let mut seen = vec![TicketState::Created];
    while let Ok(event) = h.events.try_recv() {
        if let Some(snapshot) = &event.snapshot {
            if seen.last() != Some(&snapshot.state()) {
                seen.push(snapshot.state());
            }
        }
        h.engine.process_event(event).await;
    }

    assert_eq!(seen.first(), Some(&TicketState::Created));
    assert!(seen.contains(&TicketState::PartiallyEnriched));
    assert_eq!(seen.last(), Some(&TicketState::Synced));
}

#[tokio::test]
async fn test_failed_sync_does_not_retrigger_itself() {
    let mut h = harness_with(HarnessOptions {
        crm_failures: 100,
        ..Default::default()
    });
    let ticket = h.store.create(new_ticket("Printer on fire")).await.unwrap();

    let stats = h.engine.drain(&mut h.events).await;
    assert_eq!(stats.synced, 0);
    assert!(stats.failures >= 1);

    // Only write events that were already queued may retry; failures add none
    let stored = h.records.get(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.state(), TicketState::Ready);
    assert_eq!(stored.sync_attempts as usize, stats.failures);
    assert!(stored.sync_attempts <= 2);
    assert!(stored.last_sync_error.is_some());
    assert!(stored.sync_claimed_at.is_none());
    assert!(h.events.try_recv().is_err());
}

#[tokio::test]
async fn test_sweep_recovers_failed_sync() {
    let mut h = harness_with(HarnessOptions {
        crm_failures: 100,
        ..Default::default()
    });
    let ticket = h.store.create(new_ticket("Printer on fire")).await.unwrap();
    h.engine.drain(&mut h.events).await;
    assert_eq!(h.crm_creates(), 0);

    // CRM comes back
    h.crm.failures_left.store(0, Ordering::SeqCst);

    let result = h.reconciler.run().await.unwrap();
    assert_eq!(result.tickets_checked, 1);
    assert_eq!(result.tickets_synced, 1);

    let stored = h.records.get(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.state(), TicketState::Synced);
    assert_eq!(h.crm_creates(), 1);

    // The key write notifies; the follow-up evaluation is a no-op
    let stats = h.engine.drain(&mut h.events).await;
    assert_eq!(stats.events, 1);
    assert_eq!(stats.synced, 0);

    let again = h.reconciler.run().await.unwrap();
    assert_eq!(again.tickets_checked, 0);
}

#[tokio::test]
async fn test_late_prediction_write_completes_sync() {
    let mut h = harness_with(HarnessOptions {
        sentiment_down: true,
        ..Default::default()
    });
    let ticket = h.store.create(new_ticket("Monitor flickers")).await.unwrap();
    h.engine.drain(&mut h.events).await;
    assert_eq!(h.crm_creates(), 0);

    // A sentiment value arriving through any writer re-evaluates readiness
    let written = h
        .store
        .set_derived_if_absent(ticket.id, &DerivedValue::Sentiment(-0.2))
        .await
        .unwrap();
    assert!(written.was_written());

    let stats = h.engine.drain(&mut h.events).await;
    assert_eq!(stats.synced, 1);
    assert_eq!(h.crm_creates(), 1);
    assert_eq!(h.crm.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_manual_sync_of_synced_ticket_is_noop() {
    let mut h = harness();
    let ticket = h.store.create(new_ticket("Printer on fire")).await.unwrap();
    h.engine.drain(&mut h.events).await;

    let stored = h.records.get(ticket.id).await.unwrap().unwrap();
    let outcome = h.engine.completion().handle(Some(&stored)).await;
    assert!(matches!(outcome, SyncOutcome::AlreadySynced { .. }));
    assert_eq!(h.crm_creates(), 1);
}

/// A ticket persisted before a restart whose creation event never reached the engine
fn undelivered_ticket(description: &str) -> Ticket {
    let mut ticket = stored_ticket(description);
    ticket.created_at = Utc::now() - Duration::minutes(10);
    ticket
}

#[tokio::test]
async fn test_sweep_enriches_ticket_whose_creation_event_was_lost() {
    let mut h = harness();
    let ticket = undelivered_ticket("Acme wants a refund");
    h.records.insert(ticket.clone()).await;
    assert!(h.events.try_recv().is_err());

    let result = h.reconciler.run().await.unwrap();
    assert_eq!(result.tickets_reenriched, 1);
    assert_eq!(result.fields_recovered, 4);
    assert_eq!(result.tickets_synced, 1);
    assert!(result.errors.is_empty());

    let stored = h.records.get(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.state(), TicketState::Synced);
    assert_eq!(stored.tags, Some(vec!["Acme".to_string(), "refund".to_string()]));

    // Notifications from the recovered writes find the ticket already synced
    let stats = h.engine.drain(&mut h.events).await;
    assert_eq!(stats.synced, 0);
    assert_eq!(h.crm_creates(), 1);

    let again = h.reconciler.run().await.unwrap();
    assert_eq!(again.tickets_reenriched, 0);
    assert_eq!(again.tickets_checked, 0);
}

#[tokio::test]
async fn test_sweep_leaves_recent_tickets_to_the_event_path() {
    let h = harness();
    h.store.create(new_ticket("Enrichers still running")).await.unwrap();

    let result = h.reconciler.run().await.unwrap();
    assert_eq!(result.tickets_reenriched, 0);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.language.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sweep_reports_enricher_failures_and_retries_later() {
    let mut h = harness_with(HarnessOptions {
        sentiment_down: true,
        ..Default::default()
    });
    let ticket = undelivered_ticket("Monitor flickers");
    h.records.insert(ticket.clone()).await;

    let result = h.reconciler.run().await.unwrap();
    assert_eq!(result.fields_recovered, 3);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.tickets_checked, 0);
    h.engine.drain(&mut h.events).await;
    assert_eq!(h.crm_creates(), 0);

    // Only the missing field is attempted again
    let model_calls = h.model.calls.load(Ordering::SeqCst);
    let retry = h.reconciler.run().await.unwrap();
    assert_eq!(retry.tickets_reenriched, 1);
    assert_eq!(retry.fields_recovered, 0);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), model_calls);
    assert_eq!(
        h.records.get(ticket.id).await.unwrap().unwrap().state(),
        TicketState::PartiallyEnriched
    );
}
