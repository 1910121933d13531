//! Sample data for the demonstrations.
//!
//! Three communities, five members (one without a community), three events
//! and six registrations. Ids, ages and registration dates are fixed so the
//! demonstrations print the same thing on every run.

use chrono::{TimeZone, Utc};
use ormlabs_core::LabsResult;
use ormlabs_db::{create_model, DbExecutor};

use crate::models::{Community, Event, Member, Registration};

fn communities() -> Vec<Community> {
    let mut pydevs = Community::new(1, "PyDevs");
    pydevs.locations = vec![vec![48.8566, 2.3522]];
    vec![pydevs, Community::new(2, "Rustaceans"), Community::new(3, "DataFolks")]
}

fn members() -> Vec<Member> {
    let mut ada = Member::new(1, "Ada", "Lovelace", Some(1))
        .email("ada@example.com")
        .age(36)
        .skills(&["math", "python"]);
    ada.info = serde_json::json!({
        "languages": [{"name": "English", "level": 10}, {"name": "French", "level": 6}],
        "websites": ["https://ada.example.com"]
    });
    ada.contact = Some(serde_json::json!({"phone": "555-0100"}));
    let mut grace = Member::new(3, "Grace", "Hopper", Some(2))
        .email("grace@example.com")
        .age(22)
        .skills(&["cobol", "ruby", "compilers"]);
    grace.info = serde_json::json!({
        "contact": {
            "personal": {"phone": "555-0101", "street": "8"},
            "work": {"phone": "555-0102", "street": "123"}
        },
        "websites": []
    });
    vec![
        ada,
        Member::new(2, "Alan", "Turing", Some(1)).age(41).skills(&["python", "crypto"]),
        grace,
        Member::new(4, "Linus", "Torvalds", Some(3)).age(28).skills(&["c", "rust"]),
        Member::new(5, "Margaret", "Hamilton", None)
            .email("margaret@example.com")
            .age(33),
    ]
}

fn events() -> Vec<Event> {
    let at = |month, day, hour| Utc.with_ymd_and_hms(2024, month, day, hour, 0, 0).single();
    let mut events = Vec::new();
    for (id, name, month, day) in [(1, "PyCon", 5, 15), (2, "RustConf", 9, 10), (3, "DataDay", 11, 4)] {
        if let (Some(start), Some(end)) = (at(month, day, 9), at(month, day + 2, 18)) {
            events.push(Event::new(id, name, start, end));
        }
    }
    for (event, (tickets, price, seats)) in events.iter_mut().zip([(100, 50, 120), (100, 40, 80)]) {
        event.ticket_number = Some(tickets);
        event.ticket_price = Some(price);
        event.seat_number = Some(seats);
    }
    events
}

fn registrations() -> Vec<Registration> {
    let mut registrations = Vec::new();
    for (id, member, event, (month, day)) in [
        (1, 1, 1, (4, 2)),
        (2, 1, 2, (8, 1)),
        (3, 2, 1, (5, 1)),
        (4, 3, 2, (8, 18)),
        (5, 4, 2, (9, 5)),
        (6, 4, 3, (10, 1)),
    ] {
        let mut registration = Registration::new(id, member, event);
        if let Some(on) = Utc.with_ymd_and_hms(2024, month, day, 12, 0, 0).single() {
            registration.registered_on = on;
        }
        registrations.push(registration);
    }
    if let Some(first) = registrations.first_mut() {
        first.ticket = 2;
    }
    if let Some(online) = registrations.get_mut(2) {
        online.online = true;
        online.discount = 50;
    }
    registrations
}

/// Inserts the sample data and returns the number of rows written.
///
/// # Errors
///
/// Fails with `IntegrityError` when run twice against the same database.
pub fn seed(db: &dyn DbExecutor) -> LabsResult<usize> {
    let mut written = 0;
    for community in communities() {
        create_model(db, &community)?;
        written += 1;
    }
    for member in members() {
        create_model(db, &member)?;
        written += 1;
    }
    for event in events() {
        create_model(db, &event)?;
        written += 1;
    }
    for registration in registrations() {
        create_model(db, &registration)?;
        written += 1;
    }
    tracing::info!(rows = written, "seeded sample data");
    Ok(written)
}
