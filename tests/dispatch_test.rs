//! Ticket lifecycle through the dispatcher, against the in-memory store.

use std::sync::Arc;

use counterq::config::DispatchConfig;
use counterq::dispatch::{Dispatcher, QueueScope};
use counterq::error::{ConflictKind, Error, Result};
use counterq::event::{EventKind, TicketEvent};
use counterq::model::*;
use counterq::notify::{BroadcastNotifier, NoopNotifier, Notifier};
use counterq::store::{MemoryStore, TicketStore};

type TestDispatcher = Dispatcher<MemoryStore, BroadcastNotifier>;

fn admin() -> Identity {
    Identity::new("admin", "Ada Admin", Role::Admin)
}

fn front_desk() -> Identity {
    Identity::new("fd1", "Frank Desk", Role::FrontDesk)
}

fn requester(document: &str) -> Requester {
    Requester {
        document_type: "ID".to_string(),
        document_number: document.to_string(),
        full_name: "Jane Doe".to_string(),
        phone: "555-0100".to_string(),
        email: "jane@example.com".to_string(),
        category: "visitor".to_string(),
    }
}

/// Dispatcher with services A (Admissions) and B (Billing).
async fn setup() -> (TestDispatcher, Service, Service) {
    let dispatcher = Dispatcher::new(
        MemoryStore::new(),
        BroadcastNotifier::new(64),
        DispatchConfig::default(),
    );
    let a = dispatcher
        .create_service(&admin(), NewService::new("Admissions", "A"))
        .await
        .unwrap();
    let b = dispatcher
        .create_service(&admin(), NewService::new("Billing", "b"))
        .await
        .unwrap();
    (dispatcher, a, b)
}

async fn issue(d: &TestDispatcher, service: &Service) -> Ticket {
    d.create(&front_desk(), NewTicket::new(service.id, requester("1001")))
        .await
        .unwrap()
}

#[tokio::test]
async fn codes_are_per_service() {
    let (d, a, b) = setup().await;

    assert_eq!(issue(&d, &a).await.code.to_string(), "A-001");
    assert_eq!(issue(&d, &a).await.code.to_string(), "A-002");
    assert_eq!(issue(&d, &b).await.code.to_string(), "B-001");
}

#[tokio::test]
async fn full_lifecycle_records_people_and_times() {
    let (d, a, _) = setup().await;
    let mut events = d.notifier().subscribe();
    let staff = Identity::new("s1", "Ana Ruiz", Role::Staff).assigned([a.id]);

    let ticket = issue(&d, &a).await;
    assert_eq!(ticket.state, State::Created);
    assert_eq!(ticket.revision, 0);

    let called = d.call(&staff, ticket.id, None).await.unwrap();
    assert_eq!(called.state, State::Called);
    assert_eq!(called.staff_id.as_deref(), Some("s1"));
    assert_eq!(called.staff_name.as_deref(), Some("Ana Ruiz"));
    assert_eq!(called.desk.as_deref(), Some("Desk Ana"));
    assert!(called.wait_seconds.is_some_and(|s| s >= 0));

    let serving = d.attend(&staff, ticket.id).await.unwrap();
    assert_eq!(serving.state, State::Serving);
    assert!(serving.attended_at.is_some());

    let closed = d.close(&staff, ticket.id).await.unwrap();
    assert_eq!(closed.state, State::Closed);
    assert!(closed.closed_at.is_some());
    assert!(closed.service_seconds.is_some_and(|s| s >= 0));
    assert_eq!(closed.revision, 3);
    assert_eq!(d.get_ticket(ticket.id).await.unwrap(), closed);

    let kinds: Vec<EventKind> = (0..4).map(|_| events.try_recv().unwrap().kind).collect();
    assert_eq!(
        kinds,
        [
            EventKind::Created,
            EventKind::Called,
            EventKind::Serving,
            EventKind::Closed
        ]
    );
}

#[tokio::test]
async fn close_straight_from_called_times_service_from_call() {
    let (d, a, _) = setup().await;
    let ticket = issue(&d, &a).await;

    let called = d.call(&admin(), ticket.id, Some("Window 3".into())).await.unwrap();
    assert_eq!(called.desk.as_deref(), Some("Window 3"));

    let closed = d.close(&front_desk(), ticket.id).await.unwrap();
    assert_eq!(closed.state, State::Closed);
    assert_eq!(closed.attended_at, None);
    assert!(closed.service_seconds.is_some());
}

#[tokio::test]
async fn staff_cannot_call_outside_assignments() {
    let (d, a, b) = setup().await;
    let ticket = issue(&d, &a).await;
    let staff_b = Identity::new("s2", "Bo Lin", Role::Staff).assigned([b.id]);

    let err = d.call(&staff_b, ticket.id, None).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{err}");

    let unchanged = d.get_ticket(ticket.id).await.unwrap();
    assert_eq!(unchanged.state, State::Created);
    assert_eq!(unchanged.revision, 0);
}

#[tokio::test]
async fn role_rules() {
    let (d, a, _) = setup().await;
    let staff = Identity::new("s1", "Ana Ruiz", Role::Staff).assigned([a.id]);
    let ticket = issue(&d, &a).await;

    let err = d.call(&front_desk(), ticket.id, None).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
    let err = d.cancel(&staff, ticket.id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
    let err = d.redirect(&front_desk(), ticket.id, a.id).await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
}

#[tokio::test]
async fn cancel_only_while_waiting() {
    let (d, a, _) = setup().await;
    let waiting = issue(&d, &a).await;
    let called = issue(&d, &a).await;
    d.call(&admin(), called.id, None).await.unwrap();

    let canceled = d.cancel(&admin(), waiting.id).await.unwrap();
    assert_eq!(canceled.state, State::Canceled);
    assert_eq!(canceled.staff_name.as_deref(), Some("Canceled by: Ada Admin"));
    assert!(canceled.closed_at.is_some());

    let err = d.cancel(&admin(), called.id).await.unwrap_err();
    assert!(
        matches!(
            err,
            Error::InvalidTransition {
                from: State::Called,
                op: Operation::Cancel
            }
        ),
        "{err}"
    );
}

#[tokio::test]
async fn terminal_tickets_refuse_everything() {
    let (d, a, b) = setup().await;
    let ticket = issue(&d, &a).await;
    d.cancel(&admin(), ticket.id).await.unwrap();

    for result in [
        d.call(&admin(), ticket.id, None).await,
        d.attend(&admin(), ticket.id).await,
        d.close(&admin(), ticket.id).await,
        d.cancel(&admin(), ticket.id).await,
        d.redirect(&admin(), ticket.id, b.id).await,
    ] {
        assert!(matches!(result, Err(Error::InvalidTransition { .. })));
    }
}

#[tokio::test]
async fn attend_requires_a_call_first() {
    let (d, a, _) = setup().await;
    let ticket = issue(&d, &a).await;

    let err = d.attend(&admin(), ticket.id).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: State::Created,
            op: Operation::Attend
        }
    ));
}

#[tokio::test]
async fn unknown_ticket_is_not_found() {
    let (d, _, _) = setup().await;
    let err = d.call(&admin(), TicketId::new(), None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn redirect_reissues_code_and_resets_handling() {
    let (d, a, b) = setup().await;
    issue(&d, &b).await; // B-001
    let ticket = issue(&d, &a).await; // A-001
    let called = d.call(&admin(), ticket.id, None).await.unwrap();

    let moved = d.redirect(&admin(), ticket.id, b.id).await.unwrap();
    assert_eq!(moved.code.to_string(), "B-002");
    assert_eq!(moved.service_id, b.id);
    assert_eq!(moved.service_name, "Billing");
    assert_eq!(moved.state, State::Created);
    assert_eq!(moved.staff_id, None);
    assert_eq!(moved.desk, None);
    assert_eq!(moved.called_at, None);
    assert_eq!(moved.wait_seconds, None);
    assert_eq!(moved.created_at, called.created_at);
    assert_eq!(moved.revision, called.revision + 1);

    // The old code stays used.
    assert_eq!(issue(&d, &a).await.code.to_string(), "A-002");

    let queue = d.pending_queue(&admin(), QueueScope::Service(b.id)).await.unwrap();
    assert!(queue.position(ticket.id).is_some());
}

#[tokio::test]
async fn redirect_to_inactive_or_unknown_service_is_rejected() {
    let (d, a, b) = setup().await;
    let ticket = issue(&d, &a).await;
    d.update_service(
        &admin(),
        b.id,
        ServiceUpdate {
            active: Some(false),
            ..ServiceUpdate::default()
        },
    )
    .await
    .unwrap();

    let err = d.redirect(&admin(), ticket.id, b.id).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");
    let err = d.redirect(&admin(), ticket.id, ServiceId::new()).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err}");

    let unchanged = d.get_ticket(ticket.id).await.unwrap();
    assert_eq!(unchanged.code.to_string(), "A-001");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_on_one_ticket_succeed_once() {
    let (d, a, _) = setup().await;
    let d = Arc::new(d);
    let ticket_id = issue(&d, &a).await.id;
    let service_id = a.id;

    let mut handles = Vec::new();
    for i in 0..8 {
        let d = Arc::clone(&d);
        let desk = format!("Desk {i}");
        handles.push(tokio::spawn(async move {
            let staff = Identity::new(format!("s{i}"), format!("Staff {i}"), Role::Staff)
                .assigned([service_id]);
            d.call(&staff, ticket_id, Some(desk)).await
        }));
    }

    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(Error::Conflict {
                kind: ConflictKind::Stale,
                ..
            })
            | Err(Error::InvalidTransition { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(d.get_ticket(ticket_id).await.unwrap().revision, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_get_distinct_codes() {
    let (d, a, _) = setup().await;
    let d = Arc::new(d);
    let service_id = a.id;

    let mut handles = Vec::new();
    for i in 0..40 {
        let d = Arc::clone(&d);
        handles.push(tokio::spawn(async move {
            d.create(&front_desk(), NewTicket::new(service_id, requester(&format!("{i}"))))
                .await
                .unwrap()
                .code
                .sequence()
        }));
    }

    let mut sequences = Vec::new();
    for handle in handles {
        sequences.push(handle.await.unwrap());
    }
    sequences.sort_unstable();
    assert_eq!(sequences, (1..=40).collect::<Vec<u32>>());
}

#[tokio::test]
async fn create_validates_request() {
    let (d, a, _) = setup().await;

    let mut nameless = requester("1001");
    nameless.full_name = "   ".to_string();
    let err = d
        .create(&front_desk(), NewTicket::new(a.id, nameless))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let mut bad_email = requester("1001");
    bad_email.email = "jane.example.com".to_string();
    let err = d
        .create(&front_desk(), NewTicket::new(a.id, bad_email))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = d
        .create(&front_desk(), NewTicket::new(a.id, requester("1001")).priority("VIP"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = d
        .create(&front_desk(), NewTicket::new(ServiceId::new(), requester("1001")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // Nothing above consumed a code.
    assert_eq!(issue(&d, &a).await.code.to_string(), "A-001");
}

#[tokio::test]
async fn blank_priority_and_notes_are_dropped() {
    let (d, a, _) = setup().await;
    let ticket = d
        .create(
            &front_desk(),
            NewTicket::new(a.id, requester("1001")).priority("  ").notes(" \n"),
        )
        .await
        .unwrap();
    assert_eq!(ticket.priority, None);
    assert_eq!(ticket.notes, None);
    assert!(!ticket.is_priority());

    let ticket = d
        .create(
            &front_desk(),
            NewTicket::new(a.id, requester("1001"))
                .priority(" Senior ")
                .notes("  needs ramp "),
        )
        .await
        .unwrap();
    assert_eq!(ticket.priority.as_deref(), Some("Senior"));
    assert_eq!(ticket.notes.as_deref(), Some("needs ramp"));
}

#[tokio::test]
async fn inactive_service_takes_no_new_tickets() {
    let (d, a, _) = setup().await;
    d.update_service(
        &admin(),
        a.id,
        ServiceUpdate {
            active: Some(false),
            ..ServiceUpdate::default()
        },
    )
    .await
    .unwrap();

    let err = d
        .create(&front_desk(), NewTicket::new(a.id, requester("1001")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

/// Fails every publish.
struct BrokenNotifier;

impl Notifier for BrokenNotifier {
    async fn publish(&self, _event: &TicketEvent) -> Result<()> {
        Err(Error::Notify("display bus is down".to_string()))
    }
}

#[tokio::test]
async fn notifier_failure_does_not_undo_the_write() {
    let d = Dispatcher::new(MemoryStore::new(), BrokenNotifier, DispatchConfig::default());
    let a = d
        .create_service(&admin(), NewService::new("Admissions", "A"))
        .await
        .unwrap();

    let ticket = d
        .create(&front_desk(), NewTicket::new(a.id, requester("1001")))
        .await
        .unwrap();
    let called = d.call(&admin(), ticket.id, None).await.unwrap();

    assert_eq!(d.get_ticket(ticket.id).await.unwrap(), called);
}

#[tokio::test]
async fn events_without_subscribers_are_dropped_quietly() {
    let (d, a, _) = setup().await;
    assert_eq!(d.notifier().subscriber_count(), 0);
    let ticket = issue(&d, &a).await;
    assert_eq!(d.get_ticket(ticket.id).await.unwrap(), ticket);
}

#[tokio::test]
async fn store_timeout_bounds_storage_calls() {
    struct Stalled;

    impl TicketStore for Stalled {
        async fn get_ticket(&self, _id: TicketId) -> Result<Ticket> {
            std::future::pending().await
        }
        async fn create_ticket(&self, _t: &Ticket) -> Result<()> {
            std::future::pending().await
        }
        async fn update_ticket(&self, _t: &Ticket, _from: State) -> Result<()> {
            std::future::pending().await
        }
        async fn next_sequence(&self, _s: ServiceId, _d: chrono::NaiveDate) -> Result<u32> {
            std::future::pending().await
        }
        async fn find_tickets(
            &self,
            _f: &counterq::store::TicketFilter,
        ) -> Result<Vec<Ticket>> {
            std::future::pending().await
        }
        async fn get_service(&self, _id: ServiceId) -> Result<Service> {
            std::future::pending().await
        }
        async fn list_services(&self) -> Result<Vec<Service>> {
            std::future::pending().await
        }
        async fn insert_service(&self, _s: &Service) -> Result<()> {
            std::future::pending().await
        }
        async fn update_service(&self, _s: &Service) -> Result<()> {
            std::future::pending().await
        }
        async fn get_party(&self, _doc: &str) -> Result<Option<Party>> {
            std::future::pending().await
        }
        async fn upsert_party(&self, _p: &Party) -> Result<()> {
            std::future::pending().await
        }
        async fn get_settings(&self) -> Result<Settings> {
            std::future::pending().await
        }
        async fn put_settings(&self, _s: &Settings) -> Result<()> {
            std::future::pending().await
        }
    }

    let config = DispatchConfig {
        store_timeout: Some(std::time::Duration::from_millis(20)),
        ..DispatchConfig::default()
    };
    let d = Dispatcher::new(Stalled, NoopNotifier, config);

    let err = d.call(&admin(), TicketId::new(), None).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)), "{err}");
    assert!(err.is_transient());
}
