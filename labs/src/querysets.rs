//! Annotated query demonstrations.
//!
//! Each demonstration walks the sample data the way a view would and returns
//! the lines it prints. [`run_demo`] wraps one in [`instrument`], so the
//! `[Statistics]` report shows what the access pattern costs. The
//! non-optimised variants make one extra round trip per parent record; the
//! optimised ones make a fixed number no matter how many parents there are.
//!
//! The bulk demonstrations work on `community_<n>` rows they insert
//! themselves and leave the sample communities alone. The discount
//! demonstrations change the stored registrations.

use std::collections::BTreeMap;

use chrono::Duration;
use ormlabs_core::{LabsError, LabsResult};
use ormlabs_db::related::{resolve_to_many, resolve_to_one};
use ormlabs_db::{
    all_models, filter_models, get_model, instrument, save_model, AggregateFunc, DbExecutor,
    Expression, Lookup, MemoryDatabase, Model, QueryStats, Record, Row, Value, When, Q,
};

use crate::models::{Community, Event, Member, Registration, COMMUNITY, EVENT, MEMBER, REGISTRATION};

/// One named demonstration.
#[derive(Debug, Clone, Copy)]
pub struct Demo {
    /// The name used on the command line and in the report.
    pub name: &'static str,
    /// What the demonstration shows.
    pub summary: &'static str,
    body: fn(&MemoryDatabase) -> LabsResult<Vec<String>>,
}

impl Demo {
    /// Runs the demonstration under instrumentation.
    pub fn run(&self, db: &MemoryDatabase) -> LabsResult<DemoRun> {
        let (lines, stats) = instrument(self.name, db.query_log(), || (self.body)(db))?;
        Ok(DemoRun { lines, stats })
    }
}

/// The outcome of an instrumented demonstration.
#[derive(Debug, Clone)]
pub struct DemoRun {
    /// What the demonstration printed.
    pub lines: Vec<String>,
    /// Its round trips.
    pub stats: QueryStats,
}

/// Every demonstration, in presentation order.
pub static DEMOS: &[Demo] = &[
    Demo {
        name: "all_communities",
        summary: "All rows in one query; relations are only fetched on demand.",
        body: all_communities,
    },
    Demo {
        name: "community_per_member_non_optimised",
        summary: "One extra query per member to fetch its community.",
        body: community_per_member_non_optimised,
    },
    Demo {
        name: "community_per_member_optimised",
        summary: "Members joined to their community in a single query.",
        body: community_per_member_optimised,
    },
    Demo {
        name: "members_per_community_non_optimised",
        summary: "One extra query per community to fetch its members.",
        body: members_per_community_non_optimised,
    },
    Demo {
        name: "members_per_community_optimised",
        summary: "Communities, then all their members in a second query.",
        body: members_per_community_optimised,
    },
    Demo {
        name: "events_per_member_non_optimised",
        summary: "One extra query per member to fetch its events.",
        body: events_per_member_non_optimised,
    },
    Demo {
        name: "events_per_member_optimised_1",
        summary: "Members, then all their events through registrations.",
        body: events_per_member_optimised_1,
    },
    Demo {
        name: "events_per_member_optimised_2",
        summary: "Members, then registrations joined to events, grouped by hand.",
        body: events_per_member_optimised_2,
    },
    Demo {
        name: "highest_discount",
        summary: "MAX over the registrations of one event.",
        body: highest_discount,
    },
    Demo {
        name: "total_sold_tickets",
        summary: "SUM over the registrations of one event.",
        body: total_sold_tickets,
    },
    Demo {
        name: "average_tickets_per_registration",
        summary: "AVG over every registration.",
        body: average_tickets_per_registration,
    },
    Demo {
        name: "event_income",
        summary: "Ticket prices computed per row and summed per event.",
        body: event_income,
    },
    Demo {
        name: "members_matching_complex_pattern",
        summary: "Composed AND/OR conditions in one WHERE clause.",
        body: members_matching_complex_pattern,
    },
    Demo {
        name: "earlier_registration_discount",
        summary: "One UPDATE with a CASE on the registration date.",
        body: earlier_registration_discount,
    },
    Demo {
        name: "has_enough_seats_gotcha",
        summary: "Every event loaded, the seats compared in memory.",
        body: has_enough_seats_gotcha,
    },
    Demo {
        name: "has_enough_seats",
        summary: "Seats compared to another column in the WHERE clause.",
        body: has_enough_seats,
    },
    Demo {
        name: "welcome_discount_non_optimized",
        summary: "Every registration loaded, changed and saved one by one.",
        body: welcome_discount_non_optimized,
    },
    Demo {
        name: "welcome_discount_optimized",
        summary: "One UPDATE computing the discount from the column.",
        body: welcome_discount_optimized,
    },
    Demo {
        name: "has_ruby_skills",
        summary: "Array containment (@>) on the skills.",
        body: has_ruby_skills,
    },
    Demo {
        name: "has_min_3_skills",
        summary: "Array length compared in the WHERE clause.",
        body: has_min_3_skills,
    },
    Demo {
        name: "python_as_first_skill",
        summary: "Array element by index, compared case-insensitively.",
        body: python_as_first_skill,
    },
    Demo {
        name: "has_website",
        summary: "JSON key present and not an empty list.",
        body: has_website,
    },
    Demo {
        name: "has_work_and_presonal_phone",
        summary: "Nested JSON keys chained into one COUNT.",
        body: has_work_and_presonal_phone,
    },
    Demo {
        name: "can_speak_french",
        summary: "JSON containment on the languages, either spelling.",
        body: can_speak_french,
    },
    Demo {
        name: "insert_list_worse_practice",
        summary: "2000 INSERT statements, each committed on its own.",
        body: insert_list_worse_practice,
    },
    Demo {
        name: "insert_list_better_practice",
        summary: "2000 INSERT statements in one transaction.",
        body: insert_list_better_practice,
    },
    Demo {
        name: "insert_list_best_practice",
        summary: "One INSERT with 2000 value rows.",
        body: insert_list_best_practice,
    },
    Demo {
        name: "update_list_worse_practice",
        summary: "One SELECT, then one UPDATE per community.",
        body: update_list_worse_practice,
    },
    Demo {
        name: "update_list_better_practice",
        summary: "One SELECT, then one UPDATE per community in one transaction.",
        body: update_list_better_practice,
    },
    Demo {
        name: "update_list_best_practice",
        summary: "One UPDATE concatenating the suffix in the database.",
        body: update_list_best_practice,
    },
    Demo {
        name: "delete_list_best_practice",
        summary: "One DELETE for every matching community.",
        body: delete_list_best_practice,
    },
];

/// Looks a demonstration up by name.
pub fn find_demo(name: &str) -> LabsResult<&'static Demo> {
    DEMOS.iter().find(|d| d.name == name).ok_or_else(|| {
        LabsError::ConfigurationError(format!(
            "Unknown demo: {name}. Expected one of: {}",
            DEMOS.iter().map(|d| d.name).collect::<Vec<_>>().join(", ")
        ))
    })
}

/// Runs one demonstration by name under instrumentation.
pub fn run_demo(db: &MemoryDatabase, name: &str) -> LabsResult<DemoRun> {
    find_demo(name)?.run(db)
}

fn joined(member: &dyn Record, community: Option<&dyn Record>) -> String {
    match community {
        Some(community) => format!("{} joined {}", member.describe(), community.describe()),
        None => format!("{} has no community", member.describe()),
    }
}

// ── Forward foreign key ────────────────────────────────────────────────

/// `SELECT ... FROM "labs_community"`. Reading a column costs nothing more.
pub fn all_communities(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    Ok(db.all(COMMUNITY)?.iter().map(|c| c.describe()).collect())
}

/// One query for the members, then one per member with a community.
pub fn community_per_member_non_optimised(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let field = db.registry().get_field(MEMBER, "community")?;
    let mut lines = Vec::new();
    for member in db.all(MEMBER)? {
        let line = match resolve_to_one(db, &*member, field) {
            Ok(community) => joined(&*member, Some(&*community)),
            Err(e) if e.is_does_not_exist() => joined(&*member, None),
            Err(e) => return Err(e),
        };
        lines.push(line);
    }
    Ok(lines)
}

/// One `LEFT OUTER JOIN` query; the communities come back cached.
pub fn community_per_member_optimised(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    Ok(db
        .select_related(MEMBER, &["community"])?
        .iter()
        .map(|m| joined(&*m.record, m.related_one("community")))
        .collect())
}

// ── Reverse foreign key ────────────────────────────────────────────────

/// One query for the communities, then one per community.
pub fn members_per_community_non_optimised(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let field = db.registry().get_field(COMMUNITY, "members")?;
    let mut lines = Vec::new();
    for community in db.all(COMMUNITY)? {
        let members = resolve_to_many(db, &*community, field)?;
        lines.push(format!("{} has {} members", community.describe(), members.len()));
    }
    Ok(lines)
}

/// Two queries: the communities, then `... WHERE "community_id" IN (...)`.
pub fn members_per_community_optimised(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    Ok(db
        .prefetch_related(COMMUNITY, &["members"])?
        .iter()
        .map(|c| {
            format!(
                "{} has {} members",
                c.record.describe(),
                c.related_many("members").len()
            )
        })
        .collect())
}

// ── Many-to-many through registrations ────────────────────────────────

/// One query for the members, then one join per member.
pub fn events_per_member_non_optimised(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let field = db.registry().get_field(MEMBER, "events")?;
    let mut lines = Vec::new();
    for member in db.all(MEMBER)? {
        let events = resolve_to_many(db, &*member, field)?;
        lines.push(format!(
            "{} registered in {} events",
            member.describe(),
            events.len()
        ));
    }
    Ok(lines)
}

/// Two queries: the members, then every event joined through registrations.
pub fn events_per_member_optimised_1(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    Ok(db
        .prefetch_related(MEMBER, &["events"])?
        .iter()
        .map(|m| {
            format!(
                "{} registered in {} events",
                m.record.describe(),
                m.related_many("events").len()
            )
        })
        .collect())
}

/// Two queries: the members, then the registrations joined to their event.
///
/// Many-to-many relations cannot be joined in, so the registrations are
/// grouped per member here.
pub fn events_per_member_optimised_2(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let members = db.all(MEMBER)?;
    let mut events_by_member: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for registration in db.select_related(REGISTRATION, &["event"])? {
        let Some(member_id) = registration.record.field_value("member_id") else {
            continue;
        };
        if let Some(event) = registration.related_one("event") {
            events_by_member
                .entry(member_id.to_string())
                .or_default()
                .push(event.describe());
        }
    }
    Ok(members
        .iter()
        .map(|m| {
            let count = events_by_member.get(&m.pk_value().to_string()).map_or(0, Vec::len);
            format!("{} registered in {count} events", m.describe())
        })
        .collect())
}

// ── Aggregation ────────────────────────────────────────────────────────

fn of_event(event_id: i64) -> Q {
    Q::filter("event", Lookup::Exact(Value::Int(event_id)))
}

/// `SELECT MAX("discount") ... WHERE "event_id" = 1`.
pub fn highest_discount(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let max = db.aggregate(
        REGISTRATION,
        &of_event(1),
        AggregateFunc::Max,
        &Expression::f("discount"),
    )?;
    Ok(vec![format!("max_discount: {max}")])
}

/// `SELECT SUM("ticket") ... WHERE "event_id" = 1`.
pub fn total_sold_tickets(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let total = db.aggregate(
        REGISTRATION,
        &of_event(1),
        AggregateFunc::Sum,
        &Expression::f("ticket"),
    )?;
    Ok(vec![format!("total_ticket: {total}")])
}

/// `SELECT AVG("ticket") FROM "labs_registration"`.
pub fn average_tickets_per_registration(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let average = db.aggregate(
        REGISTRATION,
        &Q::all(),
        AggregateFunc::Avg,
        &Expression::f("ticket"),
    )?;
    Ok(vec![match average.as_number() {
        Some(average) => format!("avg_ticket: {average:.2}"),
        None => "avg_ticket: none".to_string(),
    }])
}

/// What a registration pays: `ticket * (100 - discount) * event__ticket_price / 100`.
pub fn ticket_price() -> Expression {
    Expression::f("ticket")
        * (Expression::value(100) - Expression::f("discount"))
        * Expression::f("event__ticket_price")
        / Expression::value(100)
}

/// One grouped query joined to the events.
pub fn event_income(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let incomes = db.aggregate_by(
        REGISTRATION,
        &Q::all(),
        "event__name",
        AggregateFunc::Sum,
        &ticket_price(),
    )?;
    Ok(incomes
        .iter()
        .map(|(name, income)| match income {
            Value::Null => format!("{name} has no ticket price"),
            income => format!("{name} reaches {income}$ as an income"),
        })
        .collect())
}

// ── Conditional expressions ────────────────────────────────────────────

/// One query for the emails of the members matching
/// `(first_name LIKE 'B%' OR last_name ILIKE '%h%') AND (age < 25 OR age > 30)`.
pub fn members_matching_complex_pattern(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let name_pattern = Q::filter("first_name", Lookup::StartsWith("B".into()))
        | Q::filter("last_name", Lookup::IContains("H".into()));
    let age_pattern = Q::filter("age", Lookup::Lt(Expression::value(25)))
        | Q::filter("age", Lookup::Gt(Expression::value(30)));
    Ok(db
        .values_list(MEMBER, &(name_pattern & age_pattern), "email")?
        .iter()
        .filter_map(|email| email.as_str().map(str::to_string))
        .collect())
}

/// Gives the early registrations to RustConf a discount, in two queries: the
/// event's start, then one `UPDATE ... SET "discount" = CASE ... END`.
///
/// Registered four weeks ahead or more gives 15%, three weeks 10%, two
/// weeks 5%. Later registrations lose any discount.
pub fn earlier_registration_discount(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let event: Event = get_model(db, 2)?;
    let registered_before = |weeks: i64| {
        Q::filter(
            "registered_on",
            Lookup::Lte(Expression::value(event.start - Duration::weeks(weeks))),
        )
    };
    let discount = Expression::case(
        vec![
            When::new(registered_before(4), Expression::value(15)),
            When::new(registered_before(3), Expression::value(10)),
            When::new(registered_before(2), Expression::value(5)),
        ],
        Expression::value(0),
    );
    let updated = db.update_where(REGISTRATION, &of_event(event.id), &[("discount", discount)])?;
    Ok(vec![format!("{updated} registrations for {} updated", event.name)])
}

// ── Column references ──────────────────────────────────────────────────

fn enough_seats(name: &str) -> String {
    format!("{name} has enough seats")
}

/// One query for every event, filtered here.
pub fn has_enough_seats_gotcha(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let mut lines = Vec::new();
    for event in all_models::<Event>(db)? {
        if let (Some(seats), Some(tickets)) = (event.seat_number, event.ticket_number) {
            if seats >= tickets {
                lines.push(enough_seats(&event.name));
            }
        }
    }
    Ok(lines)
}

/// `SELECT "name" ... WHERE "seat_number" >= "ticket_number"`.
pub fn has_enough_seats(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let condition = Q::filter("seat_number", Lookup::Gte(Expression::f("ticket_number")));
    Ok(db
        .values_list(EVENT, &condition, "name")?
        .iter()
        .filter_map(Value::as_str)
        .map(enough_seats)
        .collect())
}

const WELCOME_DISCOUNT: i64 = 10;

fn discounted(count: usize) -> String {
    format!("{count} registrations discounted by {WELCOME_DISCOUNT}%")
}

/// One query for the registrations, then one `UPDATE` each, in one
/// transaction.
pub fn welcome_discount_non_optimized(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let count = db.atomic(|db| {
        let registrations = all_models::<Registration>(db)?;
        for mut registration in registrations.iter().cloned() {
            registration.discount += WELCOME_DISCOUNT;
            save_model(db, &registration)?;
        }
        Ok(registrations.len())
    })?;
    Ok(vec![discounted(count)])
}

/// `UPDATE "labs_registration" SET "discount" = ("discount" + 10)`.
pub fn welcome_discount_optimized(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let count = db.update_where(
        REGISTRATION,
        &Q::all(),
        &[(
            "discount",
            Expression::f("discount") + Expression::value(WELCOME_DISCOUNT),
        )],
    )?;
    Ok(vec![discounted(count)])
}

// ── Arrays and JSON documents ──────────────────────────────────────────

fn members_where(
    db: &MemoryDatabase,
    condition: &Q,
    line: impl Fn(&Member) -> String,
) -> LabsResult<Vec<String>> {
    Ok(filter_models::<Member>(db, condition)?.iter().map(line).collect())
}

fn familiar_with(member: &Member) -> String {
    format!("{} is familiar with : {}", member.full_name(), member.skills.join(", "))
}

/// `... WHERE "skills" @> ARRAY['ruby']`.
pub fn has_ruby_skills(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let condition = Q::filter("skills", Lookup::Contains(Value::from(vec!["ruby"])));
    members_where(db, &condition, familiar_with)
}

/// `... WHERE coalesce(array_length("skills", 1), 0) >= 3`.
pub fn has_min_3_skills(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let condition = Q::filter("skills__len", Lookup::Gte(Expression::value(3)));
    members_where(db, &condition, familiar_with)
}

/// `... WHERE UPPER("skills"[1]) = UPPER('Python')`.
pub fn python_as_first_skill(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let condition = Q::filter("skills__0", Lookup::IExact("Python".into()));
    members_where(db, &condition, |m| {
        format!("{} loves python : {}", m.full_name(), m.skills.join(", "))
    })
}

/// Members whose `info` has a non-empty `websites` list.
pub fn has_website(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let condition = Q::filter("info", Lookup::HasKey("websites".into()))
        & !Q::filter(
            "info__websites",
            Lookup::Exact(Value::Json(serde_json::json!([]))),
        );
    members_where(db, &condition, |m| {
        let websites: Vec<&str> = m.info["websites"]
            .as_array()
            .map(|sites| sites.iter().filter_map(serde_json::Value::as_str).collect())
            .unwrap_or_default();
        format!(
            "{} has {} websites: {}",
            m.full_name(),
            websites.len(),
            websites.join(", ")
        )
    })
}

/// `SELECT COUNT(*) ... WHERE "info" #> ARRAY['contact', 'work', 'phone'] > '' AND ...`.
///
/// A missing key never matches.
pub fn has_work_and_presonal_phone(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let condition = Q::filter("info__contact__work__phone", Lookup::Gt(Expression::value("")))
        & Q::filter(
            "info__contact__personal__phone",
            Lookup::Gt(Expression::value("")),
        );
    let count = db.count_where(MEMBER, &condition)?;
    Ok(vec![format!(
        "{count} members provided work and personal phone contact"
    )])
}

/// `SELECT COUNT(*) ... WHERE "info" -> 'languages' @> '[{"name": "French"}]' OR ...`.
pub fn can_speak_french(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let speaks = |name: &str| {
        Q::filter(
            "info__languages",
            Lookup::Contains(Value::Json(serde_json::json!([{ "name": name }]))),
        )
    };
    let count = db.count_where(MEMBER, &(speaks("French") | speaks("french")))?;
    Ok(vec![format!("{count} members speak French.")])
}

// ── Bulk operations ────────────────────────────────────────────────────

/// How many communities the insert demonstrations create.
pub const BULK_SIZE: usize = 2000;

const BULK_PREFIX: &str = "community";

/// An unsaved `community_<n>` row; the database assigns its id.
fn bulk_community(n: usize) -> Row {
    let mut row = Community::new(0, &format!("{BULK_PREFIX}_{n}")).to_row();
    row.set("id", Value::Null);
    row
}

fn bulk_communities() -> Q {
    Q::filter("name", Lookup::StartsWith(BULK_PREFIX.into()))
}

fn inserted(count: usize) -> Vec<String> {
    vec![format!("{count} communities inserted")]
}

fn renamed(count: usize) -> Vec<String> {
    vec![format!("{count} communities renamed")]
}

fn insert_one_by_one(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    for n in 0..BULK_SIZE {
        db.insert(COMMUNITY, bulk_community(n))?;
    }
    Ok(inserted(BULK_SIZE))
}

fn rename_one_by_one(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let communities = filter_models::<Community>(db, &bulk_communities())?;
    for mut community in communities.iter().cloned() {
        community.name.push_str(" e.V");
        save_model(db, &community)?;
    }
    Ok(renamed(communities.len()))
}

/// 2000 round trips, each its own transaction.
pub fn insert_list_worse_practice(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    insert_one_by_one(db)
}

/// Still 2000 round trips. The transaction only saves the commits.
pub fn insert_list_better_practice(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    db.atomic(insert_one_by_one)
}

/// One `INSERT ... VALUES (...), (...), ...` whatever the number of rows.
pub fn insert_list_best_practice(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let keys = db.bulk_insert(COMMUNITY, (0..BULK_SIZE).map(bulk_community).collect())?;
    Ok(inserted(keys.len()))
}

/// One query for the communities, then one `UPDATE` each.
pub fn update_list_worse_practice(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    rename_one_by_one(db)
}

/// The same round trips as [`update_list_worse_practice`] in one transaction.
pub fn update_list_better_practice(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    db.atomic(rename_one_by_one)
}

/// `UPDATE ... SET "name" = CONCAT("name", ' e.V') WHERE "name" LIKE 'community%'`.
pub fn update_list_best_practice(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let suffixed = Expression::concat([Expression::f("name"), Expression::value(" e.V")]);
    let count = db.update_where(COMMUNITY, &bulk_communities(), &[("name", suffixed)])?;
    Ok(renamed(count))
}

/// `DELETE ... WHERE "name" LIKE 'community%'`, members detached as their
/// foreign key says.
pub fn delete_list_best_practice(db: &MemoryDatabase) -> LabsResult<Vec<String>> {
    let count = db.delete_where(COMMUNITY, &bulk_communities())?;
    Ok(vec![format!("{count} communities deleted")])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_names_are_unique() {
        let mut names: Vec<&str> = DEMOS.iter().map(|d| d.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), DEMOS.len());
    }

    #[test]
    fn test_find_demo() {
        assert_eq!(find_demo("all_communities").unwrap().name, "all_communities");
        let err = find_demo("everything").unwrap_err();
        assert!(err.to_string().contains("Unknown demo: everything"));
    }

    #[test]
    fn test_bulk_community_has_no_id() {
        let row = bulk_community(7);
        assert_eq!(row.get_value("id"), Some(&Value::Null));
        assert_eq!(row.get_value("name"), Some(&Value::from("community_7")));
    }

    #[test]
    fn test_ticket_price_reads_the_event() {
        assert_eq!(ticket_price().paths(), vec!["ticket", "discount", "event__ticket_price"]);
    }

    #[test]
    fn test_joined() {
        let member = crate::models::Member::new(1, "Ada", "Lovelace", None);
        let community = crate::models::Community::new(1, "PyDevs");
        assert_eq!(joined(&member, Some(&community as &dyn Record)), "Ada Lovelace joined PyDevs");
        assert_eq!(joined(&member, None), "Ada Lovelace has no community");
    }
}
