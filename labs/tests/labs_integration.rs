//! Integration tests for the labs application: the demonstrations' round
//! trips, serialization of the sample data, the admin change lists and the
//! command line.

use std::io::Write as _;

use labs::cli::{execute, load_settings, open_database, run_checks, Command};
use labs::fixtures::seed;
use labs::models::{registration_label, registry, COMMUNITY, MEMBER, REGISTRATION};
use labs::querysets::{self, run_demo, DEMOS};
use labs::{Community, Event, Member, Registration};
use ormlabs_admin::ChangeListParams;
use ormlabs_core::{LabsError, Settings};
use ormlabs_db::serializers::{dump_snapshots, JsonSerializer};
use ormlabs_db::{
    all_models, create_model, filter_models, get_model, DbExecutor, Lookup, SerializationMixin, Value, Q,
};
use ormlabs_test::{assert_num_queries, assert_num_queries_async, TestDatabase};

fn seeded() -> TestDatabase {
    let db = TestDatabase::from_registry(registry().unwrap());
    seed(&db).unwrap();
    db.reset_query_count();
    db
}

fn run_command(command: Command) -> String {
    let db = open_database(&Settings::default()).unwrap();
    let mut out = Vec::new();
    execute(&command, &db, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

// ── Demonstrations ──────────────────────────────────────────────────

#[test]
fn test_all_communities_is_one_query() {
    let db = seeded();
    assert_num_queries(&db, 1, || {
        let lines = querysets::all_communities(db.database()).unwrap();
        assert_eq!(lines, vec!["PyDevs", "Rustaceans", "DataFolks"]);
    });
}

#[test]
fn test_community_per_member_costs() {
    let db = seeded();
    let expected = vec![
        "Ada Lovelace joined PyDevs",
        "Alan Turing joined PyDevs",
        "Grace Hopper joined Rustaceans",
        "Linus Torvalds joined DataFolks",
        "Margaret Hamilton has no community",
    ];

    // Margaret has no community, so her lookup never reaches the database.
    assert_num_queries(&db, 5, || {
        let lines = querysets::community_per_member_non_optimised(db.database()).unwrap();
        assert_eq!(lines, expected);
    });
    assert_num_queries(&db, 1, || {
        let lines = querysets::community_per_member_optimised(db.database()).unwrap();
        assert_eq!(lines, expected);
    });
}

#[test]
fn test_members_per_community_costs() {
    let db = seeded();
    let expected = vec![
        "PyDevs has 2 members",
        "Rustaceans has 1 members",
        "DataFolks has 1 members",
    ];

    assert_num_queries(&db, 4, || {
        let lines = querysets::members_per_community_non_optimised(db.database()).unwrap();
        assert_eq!(lines, expected);
    });
    assert_num_queries(&db, 2, || {
        let lines = querysets::members_per_community_optimised(db.database()).unwrap();
        assert_eq!(lines, expected);
    });
}

#[test]
fn test_events_per_member_costs() {
    let db = seeded();
    let expected = vec![
        "Ada Lovelace registered in 2 events",
        "Alan Turing registered in 1 events",
        "Grace Hopper registered in 1 events",
        "Linus Torvalds registered in 2 events",
        "Margaret Hamilton registered in 0 events",
    ];

    assert_num_queries(&db, 6, || {
        let lines = querysets::events_per_member_non_optimised(db.database()).unwrap();
        assert_eq!(lines, expected);
    });
    assert_num_queries(&db, 2, || {
        let lines = querysets::events_per_member_optimised_1(db.database()).unwrap();
        assert_eq!(lines, expected);
    });
    assert_num_queries(&db, 2, || {
        let lines = querysets::events_per_member_optimised_2(db.database()).unwrap();
        assert_eq!(lines, expected);
    });
}

#[test]
fn test_run_demo_reports_statistics() {
    let db = seeded();
    let run = run_demo(db.database(), "members_per_community_non_optimised").unwrap();
    assert_eq!(run.stats.operation, "members_per_community_non_optimised");
    assert_eq!(run.stats.count, 4);
    assert!(run
        .stats
        .report()
        .starts_with("[Statistics] : 4 queries performed in "));
}

#[test]
fn test_optimised_demos_never_cost_more() {
    let db = seeded();
    for pair in [
        ("community_per_member_non_optimised", "community_per_member_optimised"),
        ("members_per_community_non_optimised", "members_per_community_optimised"),
        ("events_per_member_non_optimised", "events_per_member_optimised_1"),
        ("events_per_member_non_optimised", "events_per_member_optimised_2"),
        ("insert_list_worse_practice", "insert_list_best_practice"),
        ("insert_list_better_practice", "insert_list_best_practice"),
        ("update_list_worse_practice", "update_list_best_practice"),
        ("update_list_better_practice", "update_list_best_practice"),
        ("welcome_discount_non_optimized", "welcome_discount_optimized"),
    ] {
        let slow = run_demo(db.database(), pair.0).unwrap();
        let fast = run_demo(db.database(), pair.1).unwrap();
        assert_eq!(slow.lines, fast.lines, "{} and {} disagree", pair.0, pair.1);
        assert!(fast.stats.count < slow.stats.count);
    }
}

fn discounts(db: &TestDatabase) -> Vec<i64> {
    all_models::<Registration>(db)
        .unwrap()
        .iter()
        .map(|r| r.discount)
        .collect()
}

fn bulk_names(db: &TestDatabase) -> Vec<String> {
    filter_models::<Community>(db, &Q::filter("name", Lookup::StartsWith("community".into())))
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect()
}

#[test]
fn test_insert_demos_costs() {
    for (name, queries) in [
        ("insert_list_worse_practice", 2000),
        ("insert_list_better_practice", 2000),
        ("insert_list_best_practice", 1),
    ] {
        let db = seeded();
        let run = run_demo(db.database(), name).unwrap();
        assert_eq!(run.stats.count, queries, "{name}");
        assert_eq!(run.lines, vec!["2000 communities inserted"]);
        assert!(!run.stats.partial_time);
        assert_eq!(db.database().row_count(COMMUNITY).unwrap(), 2003);

        let names = bulk_names(&db);
        assert_eq!(names.first().map(String::as_str), Some("community_0"));
        assert_eq!(names.last().map(String::as_str), Some("community_1999"));
    }
}

#[test]
fn test_update_demos_costs() {
    for (name, queries) in [
        ("update_list_worse_practice", 2001),
        ("update_list_better_practice", 2001),
        ("update_list_best_practice", 1),
    ] {
        let db = seeded();
        run_demo(db.database(), "insert_list_best_practice").unwrap();
        let run = run_demo(db.database(), name).unwrap();
        assert_eq!(run.stats.count, queries, "{name}");
        assert_eq!(run.lines, vec!["2000 communities renamed"]);

        let names = bulk_names(&db);
        assert_eq!(names.len(), 2000);
        assert!(names.iter().all(|n| n.ends_with(" e.V")), "{name}");
        let pydevs: Community = get_model(&db, 1).unwrap();
        assert_eq!(pydevs.name, "PyDevs");
    }
}

#[test]
fn test_delete_demo_is_one_query() {
    let db = seeded();
    run_demo(db.database(), "insert_list_best_practice").unwrap();
    let run = run_demo(db.database(), "delete_list_best_practice").unwrap();
    assert_eq!(run.stats.count, 1);
    assert_eq!(run.lines, vec!["2000 communities deleted"]);
    assert_eq!(db.database().row_count(COMMUNITY).unwrap(), 3);
    assert_eq!(db.database().row_count(MEMBER).unwrap(), 5);
}

#[test]
fn test_bulk_demos_ignore_sample_communities() {
    let db = seeded();
    assert_num_queries(&db, 1, || {
        let lines = querysets::update_list_best_practice(db.database()).unwrap();
        assert_eq!(lines, vec!["0 communities renamed"]);
    });
    assert_num_queries(&db, 1, || {
        let lines = querysets::delete_list_best_practice(db.database()).unwrap();
        assert_eq!(lines, vec!["0 communities deleted"]);
    });
}

#[test]
fn test_welcome_discount_costs() {
    let expected = vec!["6 registrations discounted by 10%"];

    let db = seeded();
    assert_num_queries(&db, 7, || {
        let lines = querysets::welcome_discount_non_optimized(db.database()).unwrap();
        assert_eq!(lines, expected);
    });
    assert_eq!(discounts(&db), vec![10, 10, 60, 10, 10, 10]);

    let db = seeded();
    assert_num_queries(&db, 1, || {
        let lines = querysets::welcome_discount_optimized(db.database()).unwrap();
        assert_eq!(lines, expected);
    });
    assert_eq!(discounts(&db), vec![10, 10, 60, 10, 10, 10]);
}

#[test]
fn test_has_enough_seats_variants_agree() {
    let db = seeded();
    assert_num_queries(&db, 1, || {
        let lines = querysets::has_enough_seats_gotcha(db.database()).unwrap();
        assert_eq!(lines, vec!["PyCon has enough seats"]);
    });
    assert_num_queries(&db, 1, || {
        let lines = querysets::has_enough_seats(db.database()).unwrap();
        assert_eq!(lines, vec!["PyCon has enough seats"]);
    });
    let sql = db.query_log().events().last().unwrap().sql.clone();
    assert!(
        sql.contains(r#""labs_event"."seat_number" >= "labs_event"."ticket_number""#),
        "{sql}"
    );
}

#[test]
fn test_aggregation_demos() {
    let db = seeded();
    for (name, expected) in [
        ("highest_discount", vec!["max_discount: 50"]),
        ("total_sold_tickets", vec!["total_ticket: 3"]),
        ("average_tickets_per_registration", vec!["avg_ticket: 1.17"]),
        (
            "event_income",
            vec![
                "DataDay has no ticket price",
                "PyCon reaches 125$ as an income",
                "RustConf reaches 120$ as an income",
            ],
        ),
    ] {
        let run = run_demo(db.database(), name).unwrap();
        assert_eq!(run.lines, expected, "{name}");
        assert_eq!(run.stats.count, 1, "{name}");
    }
}

#[test]
fn test_members_matching_complex_pattern() {
    let db = seeded();
    assert_num_queries(&db, 1, || {
        let lines = querysets::members_matching_complex_pattern(db.database()).unwrap();
        assert_eq!(lines, vec!["grace@example.com", "margaret@example.com"]);
    });
}

#[test]
fn test_earlier_registration_discount() {
    let db = seeded();
    assert_num_queries(&db, 2, || {
        let lines = querysets::earlier_registration_discount(db.database()).unwrap();
        assert_eq!(lines, vec!["3 registrations for RustConf updated"]);
    });
    let sql = db.query_log().events().last().unwrap().sql.clone();
    assert!(sql.contains("SET \"discount\" = CASE WHEN"), "{sql}");
    // PyCon's online registration keeps its discount.
    assert_eq!(discounts(&db), vec![0, 15, 50, 10, 0, 0]);
}

#[test]
fn test_array_and_json_demos() {
    let db = seeded();
    for (name, expected) in [
        (
            "has_ruby_skills",
            vec!["Grace Hopper is familiar with : cobol, ruby, compilers"],
        ),
        (
            "has_min_3_skills",
            vec!["Grace Hopper is familiar with : cobol, ruby, compilers"],
        ),
        (
            "python_as_first_skill",
            vec!["Alan Turing loves python : python, crypto"],
        ),
        (
            "has_website",
            vec!["Ada Lovelace has 1 websites: https://ada.example.com"],
        ),
        (
            "has_work_and_presonal_phone",
            vec!["1 members provided work and personal phone contact"],
        ),
        ("can_speak_french", vec!["1 members speak French."]),
    ] {
        let run = run_demo(db.database(), name).unwrap();
        assert_eq!(run.lines, expected, "{name}");
        assert_eq!(run.stats.count, 1, "{name}");
    }
}

#[test]
fn test_unknown_demo() {
    let db = seeded();
    let err = run_demo(db.database(), "members").unwrap_err();
    assert!(matches!(err, LabsError::ConfigurationError(_)));
}

#[tokio::test]
async fn test_demo_inside_async_block() {
    let db = seeded();
    assert_num_queries_async(&db, 2, || async {
        let run = run_demo(db.database(), "events_per_member_optimised_2").unwrap();
        assert_eq!(run.lines.len(), 5);
    })
    .await;
}

// ── Serialization ───────────────────────────────────────────────────

#[test]
fn test_member_dict_excludes_contact() {
    let db = seeded();
    let ada: Member = get_model(&db, 1).unwrap();
    assert!(ada.contact.is_some());

    let dict = ada.to_dict();
    assert!(!dict.contains_key("contact"));
    assert_eq!(dict.get("first_name"), Some(&Value::from("Ada")));
    assert_eq!(dict.get("community"), Some(&Value::Int(1)));
    assert_eq!(
        ada.field_names(),
        vec!["first_name", "last_name", "email", "age", "community", "skills", "info"]
    );
}

#[test]
fn test_deep_serialize_member_follows_community() {
    let db = seeded();
    let ada: Member = get_model(&db, 1).unwrap();
    let margaret: Member = get_model(&db, 5).unwrap();
    db.reset_query_count();

    let snapshots = ada.deep_serialize(&db, false).unwrap();
    let models: Vec<&str> = snapshots.iter().map(|s| s.model.as_str()).collect();
    assert_eq!(models, vec!["labs.member", "labs.community"]);
    assert_eq!(snapshots[1].pk, Value::Int(1));
    assert_eq!(db.query_count(), 1);

    let snapshots = margaret.deep_serialize(&db, false).unwrap();
    assert_eq!(snapshots.len(), 1);
}

#[test]
fn test_deep_serialize_registration_walks_depth_first() {
    let db = seeded();
    let registration: Registration = get_model(&db, 1).unwrap();
    let snapshots = registration.deep_serialize(&db, false).unwrap();
    let models: Vec<&str> = snapshots.iter().map(|s| s.model.as_str()).collect();
    assert_eq!(
        models,
        vec!["labs.registration", "labs.member", "labs.community", "labs.event"]
    );
}

#[test]
fn test_full_dict_lists_events_in_start_order() {
    let db = seeded();
    let ada: Member = get_model(&db, 1).unwrap();
    let full = ada.to_full_dict(&db).unwrap();
    let Some(Value::List(events)) = full.get("events") else {
        panic!("events missing from {:?}", full.keys());
    };
    let names: Vec<String> = events
        .iter()
        .map(|e| match e {
            Value::Json(j) => j["name"].as_str().unwrap().to_string(),
            other => panic!("unexpected event value: {other:?}"),
        })
        .collect();
    assert_eq!(names, vec!["PyCon", "RustConf"]);
}

#[test]
fn test_related_values_by_reverse_name() {
    let db = seeded();
    let pydevs: Community = get_model(&db, 1).unwrap();
    let members = pydevs.related_values(&db, "members").unwrap();
    let names: Vec<String> = members.iter().map(|m| m.describe()).collect();
    assert_eq!(names, vec!["Ada Lovelace", "Alan Turing"]);

    let pycon: Event = get_model(&db, 1).unwrap();
    assert_eq!(pycon.related_values(&db, "attendees").unwrap().len(), 2);
}

#[test]
fn test_members_fixture_round_trip() {
    let source = seeded();
    let snapshots: Vec<_> = all_models::<Member>(&source)
        .unwrap()
        .iter()
        .flat_map(|m| m.serialize())
        .collect();
    let fixture = dump_snapshots(&JsonSerializer, &snapshots).unwrap();

    let target = TestDatabase::from_registry(registry().unwrap());
    assert_eq!(target.load_fixture(&fixture).unwrap(), 5);
    assert_eq!(target.query_count(), 0);

    let ada: Member = get_model(&target, 1).unwrap();
    assert_eq!(ada.first_name, "Ada");
    assert_eq!(ada.community_id, Some(1));
    assert_eq!(ada.skills, vec!["math".to_string(), "python".to_string()]);
    // The contact is never serialized, so it does not survive.
    assert_eq!(ada.contact, None);
}

// ── Models ──────────────────────────────────────────────────────────

#[test]
fn test_registration_label_costs_two_queries() {
    let db = seeded();
    let registration: Registration = get_model(&db, 3).unwrap();
    assert_num_queries(&db, 2, || {
        assert_eq!(
            registration_label(&db, &registration).unwrap(),
            "Alan / PyCon"
        );
    });
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let db = seeded();
    let err = create_model(&db, &Registration::new(7, 1, 1)).unwrap_err();
    assert!(matches!(err, LabsError::IntegrityError(_)));
    assert_eq!(db.database().row_count(REGISTRATION).unwrap(), 6);
}

#[test]
fn test_checks_pass() {
    assert!(run_checks(&registry().unwrap()).is_empty());
}

// ── Admin ───────────────────────────────────────────────────────────

#[test]
fn test_member_changelist() {
    let db = seeded();
    let site = labs::admin::admin_site().unwrap();
    let rows = site.changelist_rows(&db, MEMBER).unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0], vec!["1", "Ada", "Lovelace", "PyDevs"]);
    assert_eq!(rows[4], vec!["5", "Margaret", "Hamilton", "-"]);
}

#[test]
fn test_registration_changelist_filtered_by_event() {
    let db = seeded();
    let site = labs::admin::admin_site().unwrap();
    let list = site
        .changelist(
            &db,
            REGISTRATION,
            &ChangeListParams::new().filter("event", "1"),
        )
        .unwrap();
    assert_eq!(list.count, 2);
    assert_eq!(list.rows[0].cells[..3], ["1", "PyCon", "Ada Lovelace"]);
    assert_eq!(list.rows[1].cells[..3], ["3", "PyCon", "Alan Turing"]);
    assert_eq!(list.rows[1].cells[4], "50");
    assert_eq!(list.rows[1].cells[5], "true");
}

// ── Command line ────────────────────────────────────────────────────

#[test]
fn test_cli_demo_prints_statistics() {
    let output = run_command(Command::Demo {
        name: "community_per_member_optimised".into(),
    });
    assert!(output.starts_with("Ada Lovelace joined PyDevs\n"));
    assert!(output.contains("[Statistics] : 1 queries performed in "));
}

#[test]
fn test_cli_demo_all() {
    let output = run_command(Command::Demo { name: "all".into() });
    for demo in DEMOS {
        assert!(output.contains(&format!("== {} ==", demo.name)));
    }
    assert_eq!(output.matches("[Statistics]").count(), DEMOS.len());
}

#[test]
fn test_cli_demos_lists_names() {
    let output = run_command(Command::Demos);
    assert_eq!(output.lines().count(), DEMOS.len());
    assert!(output.lines().next().unwrap().starts_with("all_communities"));
}

#[test]
fn test_cli_dump_compact() {
    let output = run_command(Command::Dump {
        model: "member".into(),
        deep: false,
        one_to_one: false,
        compact: true,
    });
    let parsed: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
    let objects = parsed.as_array().unwrap();
    assert_eq!(objects.len(), 5);
    assert_eq!(objects[0]["model"], "labs.member");
    assert_eq!(objects[0]["pk"], 1);
    assert!(objects[0]["fields"].get("contact").is_none());
}

#[test]
fn test_cli_dump_deep() {
    let output = run_command(Command::Dump {
        model: "labs.registration".into(),
        deep: true,
        one_to_one: false,
        compact: true,
    });
    let parsed: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
    let first: Vec<&str> = parsed.as_array().unwrap()[..4]
        .iter()
        .map(|o| o["model"].as_str().unwrap())
        .collect();
    assert_eq!(
        first,
        vec!["labs.registration", "labs.member", "labs.community", "labs.event"]
    );
}

#[test]
fn test_cli_dump_unknown_model() {
    let db = open_database(&Settings::default()).unwrap();
    let command = Command::Dump {
        model: "ticket".into(),
        deep: false,
        one_to_one: false,
        compact: false,
    };
    assert!(execute(&command, &db, &mut Vec::new()).is_err());
}

#[test]
fn test_cli_changelist() {
    let output = run_command(Command::Changelist {
        model: "community".into(),
        page: 1,
    });
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "id | name");
    assert_eq!(lines[1], "1 | PyDevs");
    assert_eq!(lines.last().unwrap(), &"3 rows, page 1 of 1");
}

#[test]
fn test_cli_check() {
    assert_eq!(
        run_command(Command::Check),
        "System check identified no issues.\n"
    );
}

// ── Settings ────────────────────────────────────────────────────────

#[test]
fn test_production_settings_disable_query_recording() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "environment = \"production\"").unwrap();

    let settings = ormlabs_core::settings_loader::from_file(file.path()).unwrap();
    assert!(!settings.record_queries);

    let db = open_database(&settings).unwrap();
    let run = run_demo(&db, "community_per_member_non_optimised").unwrap();
    assert_eq!(run.lines.len(), 5);
    assert_eq!(run.stats.count, 0);
}

#[test]
fn test_load_settings_reads_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "installed_apps = [\"labs\", \"admin\"]").unwrap();

    let settings = load_settings(Some(file.path())).unwrap();
    assert_eq!(settings.installed_apps, vec!["labs", "admin"]);
}
