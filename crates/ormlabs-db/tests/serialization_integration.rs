//! Integration tests for the serialization mixin, relation traversal, the
//! in-memory backend and query instrumentation, over a small club schema.

use std::sync::LazyLock;

use ormlabs_core::{LabsError, LabsResult};
use ormlabs_db::fields::{FieldDef, FieldType, OnDelete};
use ormlabs_db::serializers::load_fixture;
use ormlabs_db::validators::full_clean;
use ormlabs_db::{
    create_model, filter_models, get_model, instrument, measure, save_model, Accessor,
    AggregateFunc, DbExecutor, Expression, FieldFile, FieldMap, Lookup, MemoryDatabase, Model,
    ModelMeta, ModelRegistry, Row, SerializationMixin, Value, Q,
};

// ── Models ──────────────────────────────────────────────────────────

struct Person {
    id: i64,
    first_name: String,
    last_name: String,
    age: i64,
}

impl Model for Person {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("club", "person")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("first_name", FieldType::CharField).max_length(20))
                .field(FieldDef::new("last_name", FieldType::CharField).max_length(20))
                .field(FieldDef::new("age", FieldType::PositiveIntegerField).default(20))
                .serialize_exclude(&["age"])
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Person>] = &[
            Accessor::new("id", |p| Value::from(p.id)),
            Accessor::new("first_name", |p| Value::from(p.first_name.as_str())),
            Accessor::new("last_name", |p| Value::from(p.last_name.as_str())),
            Accessor::new("age", |p| Value::from(p.age)),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            age: row.get("age")?,
        })
    }
}

struct Community {
    id: i64,
    name: String,
    logo: Option<FieldFile>,
}

impl Model for Community {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("club", "community")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField).max_length(20))
                .field(
                    FieldDef::new("logo", FieldType::ImageField { upload_to: "logos".into() })
                        .nullable()
                        .blank(),
                )
                .verbose_name_plural("communities")
                .ordering(&["name"])
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Community>] = &[
            Accessor::new("id", |c| Value::from(c.id)),
            Accessor::new("name", |c| Value::from(c.name.as_str())),
            Accessor::new("logo", |c| Value::from(c.logo.clone())),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            logo: row.get_or_null("logo")?,
        })
    }
}

struct Member {
    id: i64,
    first_name: String,
    community_id: Option<i64>,
}

impl Model for Member {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("club", "member")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("first_name", FieldType::CharField).max_length(20))
                .field(
                    FieldDef::foreign_key("community", "Community", OnDelete::SetNull)
                        .nullable()
                        .related_name("members"),
                )
                .field(FieldDef::new(
                    "events",
                    FieldType::ManyToManyField {
                        to: "Event".into(),
                        through: Some("Registration".into()),
                        related_name: Some("attendees".into()),
                    },
                ))
                .ordering(&["id"])
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Member>] = &[
            Accessor::new("id", |m| Value::from(m.id)),
            Accessor::new("first_name", |m| Value::from(m.first_name.as_str())),
            Accessor::new("community_id", |m| Value::from(m.community_id)),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            first_name: row.get("first_name")?,
            community_id: row.get_or_null("community_id")?,
        })
    }
}

struct Profile {
    id: i64,
    member_id: i64,
    bio: String,
}

impl Model for Profile {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("club", "profile")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(
                    FieldDef::new(
                        "member",
                        FieldType::OneToOneField {
                            to: "Member".into(),
                            on_delete: OnDelete::Cascade,
                            related_name: None,
                        },
                    )
                    .related_name("profile"),
                )
                .field(FieldDef::new("bio", FieldType::TextField).blank())
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Profile>] = &[
            Accessor::new("id", |p| Value::from(p.id)),
            Accessor::new("member_id", |p| Value::from(p.member_id)),
            Accessor::new("bio", |p| Value::from(p.bio.as_str())),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            member_id: row.get("member_id")?,
            bio: row.get("bio")?,
        })
    }
}

struct Event {
    id: i64,
    name: String,
}

impl Model for Event {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("club", "event")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField).max_length(20))
                .ordering(&["name"])
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Event>] = &[
            Accessor::new("id", |e| Value::from(e.id)),
            Accessor::new("name", |e| Value::from(e.name.as_str())),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }
}

struct Registration {
    id: i64,
    member_id: i64,
    event_id: i64,
}

impl Model for Registration {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("club", "registration")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(
                    FieldDef::foreign_key("member", "Member", OnDelete::Cascade)
                        .related_name("registrations"),
                )
                .field(
                    FieldDef::foreign_key("event", "Event", OnDelete::Cascade)
                        .related_name("registrations"),
                )
                .unique_together(&["member", "event"])
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Registration>] = &[
            Accessor::new("id", |r| Value::from(r.id)),
            Accessor::new("member_id", |r| Value::from(r.member_id)),
            Accessor::new("event_id", |r| Value::from(r.event_id)),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            member_id: row.get("member_id")?,
            event_id: row.get("event_id")?,
        })
    }
}

struct Node {
    id: i64,
    label: String,
    next_id: Option<i64>,
}

impl Model for Node {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("club", "node")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("label", FieldType::CharField).max_length(10))
                .field(FieldDef::foreign_key("next", "Node", OnDelete::DoNothing).nullable())
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Node>] = &[
            Accessor::new("id", |n| Value::from(n.id)),
            Accessor::new("label", |n| Value::from(n.label.as_str())),
            Accessor::new("next_id", |n| Value::from(n.next_id)),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            label: row.get("label")?,
            next_id: row.get_or_null("next_id")?,
        })
    }
}

struct Team {
    id: i64,
    name: String,
}

impl Model for Team {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("p", "team")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField).max_length(20))
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Team>] = &[
            Accessor::new("id", |t| Value::from(t.id)),
            Accessor::new("name", |t| Value::from(t.name.as_str())),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
        })
    }
}

/// Excludes its only relation, plus a name that matches no field.
struct Player {
    id: i64,
    team_id: i64,
}

impl Model for Player {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("p", "player")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::foreign_key("team", "Team", OnDelete::Protect))
                .serialize_exclude(&["team", "ghost"])
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Player>] = &[
            Accessor::new("id", |p| Value::from(p.id)),
            Accessor::new("team_id", |p| Value::from(p.team_id)),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            team_id: row.get("team_id")?,
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn league_db() -> MemoryDatabase {
    let mut registry = ModelRegistry::new();
    registry.register::<Team>().unwrap();
    registry.register::<Player>().unwrap();
    let db = MemoryDatabase::new(registry).unwrap();
    create_model(
        &db,
        &Team {
            id: 1,
            name: "Lions".into(),
        },
    )
    .unwrap();
    create_model(&db, &Player { id: 1, team_id: 1 }).unwrap();
    db
}

fn club_db() -> MemoryDatabase {
    let mut registry = ModelRegistry::new();
    registry.register::<Person>().unwrap();
    registry.register::<Community>().unwrap();
    registry.register::<Member>().unwrap();
    registry.register::<Profile>().unwrap();
    registry.register::<Event>().unwrap();
    registry.register::<Registration>().unwrap();
    registry.register::<Node>().unwrap();
    MemoryDatabase::new(registry).unwrap()
}

fn member(id: i64, name: &str, community_id: Option<i64>) -> Member {
    Member {
        id,
        first_name: name.into(),
        community_id,
    }
}

fn seed_community(db: &MemoryDatabase) {
    create_model(
        db,
        &Community {
            id: 1,
            name: "PyDevs".into(),
            logo: None,
        },
    )
    .unwrap();
}

// ═════════════════════════════════════════════════════════════════════
// 1. Flat projection
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_to_dict_leaves_out_excluded_field() {
    let ada = Person {
        id: 1,
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        age: 200,
    };
    let expected: FieldMap = [
        ("first_name", Value::from("Ada")),
        ("last_name", Value::from("Lovelace")),
    ]
    .into_iter()
    .collect();
    assert_eq!(ada.to_dict(), expected);
    assert_eq!(ada.field_names(), vec!["first_name", "last_name"]);
}

#[test]
fn test_serialize_wraps_to_dict() {
    let ada = member(3, "Ada", Some(1));
    let snapshots = ada.serialize();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].model, "club.member");
    assert_eq!(snapshots[0].pk, Value::Int(3));
    assert_eq!(snapshots[0].fields, ada.to_dict());
    assert_eq!(snapshots[0].fields.keys(), vec!["first_name", "community"]);
    assert_eq!(snapshots[0].fields.get("community"), Some(&Value::Int(1)));
}

#[test]
fn test_file_field_projects_to_path() {
    let community = Community {
        id: 1,
        name: "PyDevs".into(),
        logo: Some(FieldFile::new("logos/pydevs.png")),
    };
    assert_eq!(
        community.to_dict().get("logo"),
        Some(&Value::from("logos/pydevs.png"))
    );
    assert_eq!(
        community.serialize()[0].fields.to_json(),
        serde_json::json!({"name": "PyDevs", "logo": "logos/pydevs.png"})
    );
}

#[test]
fn test_excluded_foreign_key_and_unknown_name() {
    let db = league_db();
    let player: Player = get_model(&db, 1).unwrap();
    assert!(player.to_dict().keys().is_empty());
    assert!(player.field_names().is_empty());

    let models: Vec<String> = player
        .deep_serialize(&db, true)
        .unwrap()
        .into_iter()
        .map(|s| s.model)
        .collect();
    assert_eq!(models, vec!["p.player"]);
}

// ═════════════════════════════════════════════════════════════════════
// 2. Deep serialization
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_deep_serialize_follows_foreign_key() {
    let db = club_db();
    seed_community(&db);
    let ada = member(1, "Ada", Some(1));

    let snapshots = ada.deep_serialize(&db, false).unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0], ada.serialize()[0]);
    assert_eq!(snapshots[1].model, "club.community");
    assert_eq!(snapshots[1].pk, Value::Int(1));
    assert_eq!(snapshots[1].fields.get("name"), Some(&Value::from("PyDevs")));
}

#[test]
fn test_deep_serialize_skips_dangling_reference() {
    let db = club_db();
    seed_community(&db);
    let stray = member(2, "Grace", Some(99));
    let snapshots = stray.deep_serialize(&db, false).unwrap();
    assert_eq!(snapshots, stray.serialize());
}

#[test]
fn test_deep_serialize_without_relations_equals_serialize() {
    let db = club_db();
    let loner = member(4, "Linus", None);
    assert_eq!(loner.deep_serialize(&db, true).unwrap(), loner.serialize());

    let ada = Person {
        id: 1,
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        age: 36,
    };
    assert_eq!(ada.deep_serialize(&db, false).unwrap(), ada.serialize());
}

#[test]
fn test_reverse_one_to_one_needs_flag() {
    let db = club_db();
    seed_community(&db);
    create_model(&db, &member(1, "Ada", Some(1))).unwrap();
    create_model(
        &db,
        &Profile {
            id: 5,
            member_id: 1,
            bio: "Analyst".into(),
        },
    )
    .unwrap();
    let ada: Member = get_model(&db, 1).unwrap();

    let without: Vec<String> = ada
        .deep_serialize(&db, false)
        .unwrap()
        .into_iter()
        .map(|s| s.model)
        .collect();
    assert_eq!(without, vec!["club.member", "club.community"]);

    let with: Vec<String> = ada
        .deep_serialize(&db, true)
        .unwrap()
        .into_iter()
        .map(|s| s.model)
        .collect();
    assert_eq!(with, vec!["club.member", "club.community", "club.profile"]);
}

#[test]
fn test_forward_one_to_one_emits_each_record_once() {
    let db = club_db();
    seed_community(&db);
    create_model(&db, &member(1, "Ada", Some(1))).unwrap();
    let profile = Profile {
        id: 5,
        member_id: 1,
        bio: "Analyst".into(),
    };
    create_model(&db, &profile).unwrap();

    let snapshots = profile.deep_serialize(&db, false).unwrap();
    let labels: Vec<&str> = snapshots.iter().map(|s| s.model.as_str()).collect();
    assert_eq!(labels, vec!["club.profile", "club.member", "club.community"]);
    assert_eq!(snapshots[0].pk, Value::Int(5));
}

#[test]
fn test_cycle_guard_terminates() {
    let db = club_db();
    for (id, next) in [(1, 2), (2, 1), (3, 3)] {
        create_model(
            &db,
            &Node {
                id,
                label: format!("n{id}"),
                next_id: Some(next),
            },
        )
        .unwrap();
    }
    let first: Node = get_model(&db, 1).unwrap();
    let pks: Vec<Value> = first
        .deep_serialize(&db, false)
        .unwrap()
        .into_iter()
        .map(|s| s.pk)
        .collect();
    assert_eq!(pks, vec![Value::Int(1), Value::Int(2)]);

    let own_tail: Node = get_model(&db, 3).unwrap();
    assert_eq!(own_tail.deep_serialize(&db, true).unwrap().len(), 1);
}

#[test]
fn test_deep_serialize_cost_is_one_query_per_hop() {
    let db = club_db();
    seed_community(&db);
    let ada = member(1, "Ada", Some(1));
    let (snapshots, stats) = measure("deep", db.query_log(), || ada.deep_serialize(&db, false));
    assert_eq!(snapshots.unwrap().len(), 2);
    assert_eq!(stats.count, 1);
}

// ═════════════════════════════════════════════════════════════════════
// 3. Many-to-many and the full dictionary
// ═════════════════════════════════════════════════════════════════════

fn seed_events(db: &MemoryDatabase) {
    create_model(db, &member(1, "Ada", None)).unwrap();
    create_model(db, &member(2, "Grace", None)).unwrap();
    for (id, name) in [(1, "RustConf"), (2, "PyCon")] {
        create_model(db, &Event { id, name: name.into() }).unwrap();
    }
    for (id, member_id, event_id) in [(1, 1, 1), (2, 1, 2), (3, 2, 2)] {
        create_model(
            db,
            &Registration {
                id,
                member_id,
                event_id,
            },
        )
        .unwrap();
    }
}

#[test]
fn test_related_values_through_registration() {
    let db = club_db();
    seed_events(&db);
    let ada: Member = get_model(&db, 1).unwrap();

    let before = db.query_count();
    let events = ada.related_values(&db, "events").unwrap();
    assert_eq!(db.query_count() - before, 1);
    let names: Vec<Value> = events
        .iter()
        .map(|e| e.field_value("name").unwrap())
        .collect();
    // Event ordering is by name.
    assert_eq!(names, vec![Value::from("PyCon"), Value::from("RustConf")]);

    let pycon: Event = get_model(&db, 2).unwrap();
    assert_eq!(pycon.related_values(&db, "attendees").unwrap().len(), 2);
    assert_eq!(pycon.related_values(&db, "registrations").unwrap().len(), 2);
}

#[test]
fn test_related_values_rejects_non_relation() {
    let db = club_db();
    let ada = member(1, "Ada", None);
    assert!(matches!(
        ada.related_values(&db, "first_name"),
        Err(LabsError::FieldError(_))
    ));
    assert!(ada.related_values(&db, "community").unwrap().is_empty());
}

#[test]
fn test_to_full_dict_adds_many_to_many() {
    let db = club_db();
    seed_events(&db);
    let grace: Member = get_model(&db, 2).unwrap();
    let full = grace.to_full_dict(&db).unwrap();
    assert_eq!(full.keys(), vec!["first_name", "community", "events"]);
    assert_eq!(
        full.get("events").map(Value::to_json),
        Some(serde_json::json!([{"name": "PyCon"}]))
    );
}

// ═════════════════════════════════════════════════════════════════════
// 4. Loading strategies and query counts
// ═════════════════════════════════════════════════════════════════════

fn seed_members(db: &MemoryDatabase, count: i64) {
    seed_community(db);
    for id in 1..=count {
        create_model(db, &member(id, &format!("m{id}"), Some(1))).unwrap();
    }
}

#[test]
fn test_naive_community_lookups_are_n_plus_one() {
    let db = club_db();
    seed_members(&db, 4);
    let (names, stats) = instrument("community_per_member", db.query_log(), || {
        let mut names = Vec::new();
        for m in db.all("club.member")? {
            let community = m.related_values(&db, "community")?;
            names.push(community[0].field_value("name"));
        }
        Ok::<_, LabsError>(names)
    })
    .unwrap();
    assert_eq!(names.len(), 4);
    assert_eq!(stats.count, 5);
}

#[test]
fn test_select_related_is_one_query() {
    let db = club_db();
    seed_members(&db, 4);
    create_model(&db, &member(5, "loner", None)).unwrap();

    let baseline = db.query_count();
    let loaded = db.select_related("club.member", &["community"]).unwrap();
    assert_eq!(db.query_count() - baseline, 1);
    assert_eq!(loaded.len(), 5);
    assert!(loaded[0].related_one("community").is_some());
    assert!(loaded[4].related_one("community").is_none());
    assert!(loaded[4].is_cached("community"));

    let sql = &db.query_log().events_since(baseline)[0].sql;
    assert!(sql.contains("LEFT OUTER JOIN \"club_community\""), "{sql}");
}

#[test]
fn test_select_related_rejects_reverse_relation() {
    let db = club_db();
    let err = db.select_related("club.community", &["members"]).unwrap_err();
    assert!(err.to_string().contains("Invalid field name(s) given in select_related"));
}

#[test]
fn test_prefetch_related_costs_one_query_per_relation() {
    let db = club_db();
    seed_members(&db, 3);
    let baseline = db.query_count();
    let loaded = db.prefetch_related("club.community", &["members"]).unwrap();
    assert_eq!(db.query_count() - baseline, 2);
    assert_eq!(loaded[0].related_many("members").len(), 3);

    let events_db = club_db();
    seed_events(&events_db);
    let baseline = events_db.query_count();
    let members = events_db.prefetch_related("club.member", &["events"]).unwrap();
    assert_eq!(events_db.query_count() - baseline, 2);
    assert_eq!(members[0].related_many("events").len(), 2);
    assert_eq!(members[1].related_many("events").len(), 1);
}

// ═════════════════════════════════════════════════════════════════════
// 5. Instrumentation over failures, constraints, fixtures, cleaning
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_instrument_returns_failure_verbatim() {
    let db = club_db();
    let result = instrument("missing", db.query_log(), || db.get("club.member", &Value::Int(42)));
    let err = result.unwrap_err();
    assert!(err.is_does_not_exist());
    assert_eq!(
        err.to_string(),
        "Object does not exist: club.member matching query does not exist (id=42)"
    );
    // The failed lookup still reached the store.
    assert_eq!(db.query_count(), 1);
}

#[test]
fn test_unique_together_is_enforced() {
    let db = club_db();
    seed_events(&db);
    let err = create_model(
        &db,
        &Registration {
            id: 9,
            member_id: 1,
            event_id: 1,
        },
    )
    .unwrap_err();
    assert!(matches!(err, LabsError::IntegrityError(_)));
    assert_eq!(db.row_count("club.registration").unwrap(), 3);
}

#[test]
fn test_load_fixture_by_field_name() {
    let db = club_db();
    let fixture = r#"[
        {"model": "club.community", "pk": 7, "fields": {"name": "RustFR", "logo": null}},
        {"model": "club.member", "pk": 1, "fields": {"first_name": "Ada", "community": 7}}
    ]"#;
    assert_eq!(load_fixture(&db, fixture).unwrap(), 2);
    let ada: Member = get_model(&db, 1).unwrap();
    assert_eq!(ada.community_id, Some(7));
    let snapshots = ada.deep_serialize(&db, false).unwrap();
    assert_eq!(snapshots[1].fields.get("name"), Some(&Value::from("RustFR")));
}

#[test]
fn test_load_fixture_rejects_unknown_field() {
    let db = club_db();
    let fixture = r#"[{"model": "club.event", "pk": 1, "fields": {"title": "x"}}]"#;
    assert!(matches!(
        load_fixture(&db, fixture),
        Err(LabsError::SerializationError(_))
    ));
}

#[test]
fn test_full_clean_collects_field_errors() {
    let long = Person {
        id: 1,
        first_name: "A".repeat(25),
        last_name: String::new(),
        age: 3,
    };
    let err = full_clean(&long).unwrap_err();
    assert_eq!(err.errors_for("first_name")[0].code, "max_length");
    assert_eq!(err.errors_for("last_name")[0].code, "blank");
    assert!(err.errors_for("age").is_empty());
}

#[test]
fn test_auto_primary_key_assignment() {
    let db = club_db();
    let pk = db
        .insert("club.event", Row::from_pairs([("name", Value::from("DjangoCon"))]))
        .unwrap();
    assert_eq!(pk, Value::Int(1));
    let next = db
        .insert("club.event", Row::from_pairs([("name", Value::from("EuroPython"))]))
        .unwrap();
    assert_eq!(next, Value::Int(2));
}

// ═════════════════════════════════════════════════════════════════════
// 6. Conditions, aggregates and bulk statements
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_filter_where_follows_foreign_key_in_one_query() {
    let db = club_db();
    seed_members(&db, 3);
    create_model(&db, &member(4, "loner", None)).unwrap();

    let baseline = db.query_count();
    let condition = Q::filter("community__name", Lookup::StartsWith("Py".into()));
    let found: Vec<Member> = filter_models(&db, &condition).unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(db.query_count() - baseline, 1);

    let sql = &db.query_log().events_since(baseline)[0].sql;
    assert!(sql.contains("LEFT OUTER JOIN \"club_community\""), "{sql}");
    assert!(sql.contains("\"club_community\".\"name\" LIKE 'Py%'"), "{sql}");
}

#[test]
fn test_composed_conditions() {
    let db = club_db();
    seed_members(&db, 4);
    let pattern = (Q::filter("first_name", Lookup::EndsWith("1".into()))
        | Q::filter("first_name", Lookup::IExact("M3".into())))
        & !Q::filter("community", Lookup::IsNull(true));
    assert_eq!(db.count_where("club.member", &pattern).unwrap(), 2);
    let names = db.values_list("club.member", &pattern, "first_name").unwrap();
    assert_eq!(names, vec![Value::from("m1"), Value::from("m3")]);
    assert_eq!(db.count_where("club.member", &Q::Or(Vec::new())).unwrap(), 0);
    assert_eq!(db.count_where("club.member", &Q::all()).unwrap(), 4);
}

#[test]
fn test_aggregate_and_group() {
    let db = club_db();
    seed_events(&db);
    let count = db
        .aggregate("club.registration", &Q::all(), AggregateFunc::Count, &Expression::f("id"))
        .unwrap();
    assert_eq!(count, Value::Int(3));
    let highest = db
        .aggregate(
            "club.registration",
            &Q::filter("event", Lookup::Exact(Value::Int(2))),
            AggregateFunc::Max,
            &Expression::f("member_id"),
        )
        .unwrap();
    assert_eq!(highest, Value::Int(2));

    let per_event = db
        .aggregate_by(
            "club.registration",
            &Q::all(),
            "event__name",
            AggregateFunc::Count,
            &Expression::f("id"),
        )
        .unwrap();
    assert_eq!(
        per_event,
        vec![
            (Value::from("PyCon"), Value::Int(2)),
            (Value::from("RustConf"), Value::Int(1)),
        ]
    );
    let sql = db.query_log().events().last().unwrap().sql.clone();
    assert!(sql.contains("GROUP BY \"club_event\".\"name\""), "{sql}");
    assert!(sql.contains("INNER JOIN \"club_event\""), "{sql}");
}

#[test]
fn test_bulk_insert_is_one_query() {
    let db = club_db();
    let rows: Vec<Row> = (0..50)
        .map(|i| Row::from_pairs([("name", Value::from(format!("event_{i}")))]))
        .collect();
    let (pks, stats) = measure("bulk", db.query_log(), || db.bulk_insert("club.event", rows));
    let pks = pks.unwrap();
    assert_eq!(stats.count, 1);
    assert_eq!(pks.len(), 50);
    assert_eq!(pks[49], Value::Int(50));
    assert_eq!(db.row_count("club.event").unwrap(), 50);
}

#[test]
fn test_save_overwrites_and_requires_existing_row() {
    let db = club_db();
    seed_community(&db);
    let mut pydevs: Community = get_model(&db, 1).unwrap();
    pydevs.name = "PyDevs e.V".into();
    save_model(&db, &pydevs).unwrap();
    let reread: Community = get_model(&db, 1).unwrap();
    assert_eq!(reread.name, "PyDevs e.V");

    let ghost = Community {
        id: 9,
        name: "Nobody".into(),
        logo: None,
    };
    assert!(save_model(&db, &ghost).unwrap_err().is_does_not_exist());
}

#[test]
fn test_update_where_reads_rows_before_the_statement() {
    let db = club_db();
    seed_members(&db, 3);
    let changed = db
        .update_where(
            "club.member",
            &Q::filter("first_name", Lookup::StartsWith("m".into())),
            &[(
                "first_name",
                Expression::concat([Expression::f("first_name"), Expression::value(" e.V")]),
            )],
        )
        .unwrap();
    assert_eq!(changed, 3);
    assert_eq!(db.query_count(), 5);
    let sql = db.query_log().events().last().unwrap().sql.clone();
    assert_eq!(
        sql,
        "UPDATE \"club_member\" SET \"first_name\" = CONCAT(\"club_member\".\"first_name\", ' e.V') \
         WHERE \"club_member\".\"first_name\" LIKE 'm%'"
    );
    let names = db.values_list("club.member", &Q::all(), "first_name").unwrap();
    assert_eq!(names[0], Value::from("m1 e.V"));
}

#[test]
fn test_update_where_rolls_back_on_unique_clash() {
    let db = club_db();
    seed_events(&db);
    let err = db
        .update_where(
            "club.registration",
            &Q::filter("member", Lookup::Exact(Value::Int(1))),
            &[("event", Expression::value(2))],
        )
        .unwrap_err();
    assert!(matches!(err, LabsError::IntegrityError(_)));
    let events = db.values_list("club.registration", &Q::all(), "event").unwrap();
    assert_eq!(events, vec![Value::Int(1), Value::Int(2), Value::Int(2)]);
}

#[test]
fn test_delete_where_applies_on_delete() {
    let db = club_db();
    seed_events(&db);
    seed_community(&db);
    create_model(&db, &Profile { id: 5, member_id: 1, bio: String::new() }).unwrap();
    db.update_where("club.member", &Q::all(), &[("community", Expression::value(1))])
        .unwrap();

    let baseline = db.query_count();
    let removed = db
        .delete_where("club.member", &Q::filter("first_name", Lookup::Exact("Ada".into())))
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(db.query_count() - baseline, 1);
    assert_eq!(db.row_count("club.registration").unwrap(), 1);
    assert_eq!(db.row_count("club.profile").unwrap(), 0);

    db.delete_where("club.community", &Q::all()).unwrap();
    let grace: Member = get_model(&db, 2).unwrap();
    assert_eq!(grace.community_id, None);
}

#[test]
fn test_protected_delete_leaves_rows_untouched() {
    let db = league_db();
    let err = db.delete_where("p.team", &Q::all()).unwrap_err();
    assert!(matches!(err, LabsError::IntegrityError(_)));
    assert_eq!(db.row_count("p.team").unwrap(), 1);
    assert_eq!(db.row_count("p.player").unwrap(), 1);
}

#[test]
fn test_atomic_rolls_back_every_statement() {
    let db = club_db();
    let result = db.atomic(|db| {
        db.insert("club.event", Row::from_pairs([("name", Value::from("DjangoCon"))]))?;
        db.get("club.event", &Value::Int(42))
    });
    assert!(result.unwrap_err().is_does_not_exist());
    assert_eq!(db.row_count("club.event").unwrap(), 0);
    assert_eq!(db.query_count(), 2);
}
