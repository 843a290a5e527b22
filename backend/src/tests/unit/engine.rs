use std::sync::atomic::Ordering;
use std::time::Duration;
use triage_shared::{TicketState, TicketUpdate};
use uuid::Uuid;

use crate::store::TicketStore;
use crate::tests::fixtures::new_ticket;
use crate::tests::helpers::{eventually, harness, harness_with, HarnessOptions};
use crate::workflows::{EnrichmentOutcome, SyncOutcome, TriggerEvent, TriggerType};

#[tokio::test]
async fn test_creation_converges_to_single_sync() {
    let mut h = harness();
    let ticket = h.store.create(new_ticket("Acme wants a refund")).await.unwrap();

    let stats = h.engine.drain(&mut h.events).await;

    assert_eq!(stats.fields_written, 4);
    assert_eq!(stats.synced, 1);
    assert_eq!(stats.failures, 0);
    assert_eq!(h.crm_creates(), 1);

    let stored = h.records.get(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.pred_priority, Some(2.0));
    assert_eq!(stored.pred_resolution_time, Some(4.5));
    assert_eq!(stored.pred_sentiment, Some(0.8));
    assert_eq!(
        stored.tags,
        Some(vec!["Acme".to_string(), "refund".to_string()])
    );
    assert_eq!(stored.sfdc_key.as_deref(), Some("500000000000001"));
    assert_eq!(stored.state(), TicketState::Synced);
}

#[tokio::test]
async fn test_redelivered_creation_does_not_overwrite_or_resync() {
    let mut h = harness();
    let ticket = h.store.create(new_ticket("Laptop screen cracked")).await.unwrap();
    h.engine.drain(&mut h.events).await;
    let first = h.records.get(ticket.id).await.unwrap().unwrap();

    // Same creation event, stale snapshot and all
    let report = h
        .engine
        .process_event(TriggerEvent::ticket_created(ticket.clone()))
        .await;

    assert!(report
        .enrichment
        .iter()
        .all(|(_, outcome)| *outcome == EnrichmentOutcome::LostRace));
    assert!(matches!(report.sync, SyncOutcome::Waiting { .. }));

    let stats = h.engine.drain(&mut h.events).await;
    assert_eq!(stats.events, 0);
    assert_eq!(h.crm_creates(), 1);
    assert_eq!(h.records.get(ticket.id).await.unwrap().unwrap(), first);
}

#[tokio::test]
async fn test_sentiment_failure_blocks_sync() {
    let mut h = harness_with(HarnessOptions {
        sentiment_down: true,
        ..Default::default()
    });
    let ticket = h.store.create(new_ticket("VPN drops every hour")).await.unwrap();

    let stats = h.engine.drain(&mut h.events).await;

    assert_eq!(stats.fields_written, 3);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.synced, 0);
    assert_eq!(h.crm.logins.load(Ordering::SeqCst), 0);

    let stored = h.records.get(ticket.id).await.unwrap().unwrap();
    assert!(stored.pred_sentiment.is_none());
    assert_eq!(stored.state(), TicketState::PartiallyEnriched);
}

#[tokio::test]
async fn test_empty_description_skips_language_analysis() {
    let mut h = harness();
    let ticket = h.store.create(new_ticket("")).await.unwrap();

    let stats = h.engine.drain(&mut h.events).await;

    assert_eq!(stats.fields_written, 2);
    assert_eq!(h.language.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.crm_creates(), 0);

    let stored = h.records.get(ticket.id).await.unwrap().unwrap();
    assert!(stored.tags.is_none());
    assert!(stored.pred_sentiment.is_none());
}

#[tokio::test]
async fn test_operator_update_after_sync_does_not_resync() {
    let mut h = harness();
    let ticket = h.store.create(new_ticket("Printer on fire")).await.unwrap();
    h.engine.drain(&mut h.events).await;

    let update = TicketUpdate {
        priority: Some("High".to_string()),
        t_resolution: None,
    };
    h.store.update_operator_fields(ticket.id, &update).await.unwrap();

    let stats = h.engine.drain(&mut h.events).await;
    assert_eq!(stats.events, 1);
    assert_eq!(stats.synced, 0);
    assert_eq!(h.crm_creates(), 1);
}

#[tokio::test]
async fn test_event_for_unknown_ticket_is_skipped() {
    let h = harness();
    let report = h
        .engine
        .process_event(TriggerEvent::notification(TriggerType::TicketCreated, Uuid::new_v4()))
        .await;

    assert_eq!(report.enrichment.len(), 4);
    assert!(report
        .enrichment
        .iter()
        .all(|(_, outcome)| *outcome == EnrichmentOutcome::NoSnapshot));
    assert_eq!(report.sync, SyncOutcome::NoSnapshot);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_update_events_do_not_run_enrichers() {
    let h = harness();
    let ticket = h.store.create(new_ticket("Mouse is sticky")).await.unwrap();

    let report = h
        .engine
        .process_event(TriggerEvent::ticket_updated(ticket, &["priority"]))
        .await;

    assert!(report.enrichment.is_empty());
    assert!(matches!(report.sync, SyncOutcome::Waiting { .. }));
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_engine_syncs_each_ticket_once() {
    let h = harness();
    let engine = h.engine.clone();
    let task = engine.spawn(h.events);

    let mut ids = Vec::new();
    for i in 0..10 {
        let ticket = h
            .store
            .create(new_ticket(&format!("Ticket number {}", i)))
            .await
            .unwrap();
        ids.push(ticket.id);
    }

    let records = h.records.clone();
    let all_synced = eventually(Duration::from_secs(5), || {
        let records = records.clone();
        let ids = ids.clone();
        async move {
            for id in ids {
                match records.get(id).await {
                    Ok(Some(t)) if t.sfdc_key.is_some() => {}
                    _ => return false,
                }
            }
            true
        }
    })
    .await;
    assert!(all_synced);

    // Give in-flight update events time to settle
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.crm.creates.load(Ordering::SeqCst), 10);
    task.abort();
}
