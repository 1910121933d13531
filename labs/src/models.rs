//! The labs models.
//!
//! Communities group members; members register to events through
//! [`Registration`], which carries the ticket details. Every model gets the
//! serialization mixin through the blanket impl over records.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use ormlabs_core::LabsResult;
use ormlabs_db::fields::{FieldDef, FieldType, OnDelete};
use ormlabs_db::validators::{
    InfoSchemaValidator, LocationSchemaValidator, MaxValueValidator, SkillsSchemaValidator,
};
use ormlabs_db::{get_model, Accessor, DbExecutor, Model, ModelMeta, ModelRegistry, Row, Value};

/// Label of [`Community`].
pub const COMMUNITY: &str = "labs.community";
/// Label of [`Member`].
pub const MEMBER: &str = "labs.member";
/// Label of [`Event`].
pub const EVENT: &str = "labs.event";
/// Label of [`Registration`].
pub const REGISTRATION: &str = "labs.registration";

/// Date format of [`Event::start_date`] and [`Event::end_date`].
pub const DATE_PATTERN: &str = "%Y-%m-%d %H:%M";

/// A group of members, optionally with meeting locations.
#[derive(Debug, Clone, PartialEq)]
pub struct Community {
    pub id: i64,
    pub name: String,
    /// `[latitude, longitude]` pairs.
    pub locations: Vec<Vec<f64>>,
}

impl Community {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            locations: Vec::new(),
        }
    }
}

impl Model for Community {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("labs", "community")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField).max_length(20))
                .field(
                    FieldDef::new(
                        "locations",
                        FieldType::ArrayField {
                            base_field: Box::new(FieldType::ArrayField {
                                base_field: Box::new(FieldType::FloatField),
                                size: Some(2),
                            }),
                            size: None,
                        },
                    )
                    .default(Vec::<Value>::new())
                    .nullable()
                    .blank()
                    .validator(LocationSchemaValidator),
                )
                .verbose_name_plural("Communities")
                .ordering(&["id"])
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Community>] = &[
            Accessor::new("id", |c| Value::from(c.id)),
            Accessor::new("name", |c| Value::from(c.name.as_str())),
            Accessor::new("locations", |c| Value::from(c.locations.clone())),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            locations: row.get_or_null("locations")?,
        })
    }

    fn display(&self) -> String {
        self.name.clone()
    }
}

/// A community member.
///
/// `contact` is never serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub age: i64,
    pub community_id: Option<i64>,
    pub skills: Vec<String>,
    /// Languages and websites, checked by [`InfoSchemaValidator`].
    pub info: serde_json::Value,
    /// Flat string map of contact details.
    pub contact: Option<serde_json::Value>,
}

impl Member {
    /// A member with the field defaults: age 20, no skills, empty info.
    pub fn new(id: i64, first_name: &str, last_name: &str, community_id: Option<i64>) -> Self {
        Self {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: None,
            age: 20,
            community_id,
            skills: Vec::new(),
            info: serde_json::json!({}),
            contact: None,
        }
    }

    #[must_use]
    pub fn email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    #[must_use]
    pub fn age(mut self, age: i64) -> Self {
        self.age = age;
        self
    }

    #[must_use]
    pub fn skills(mut self, skills: &[&str]) -> Self {
        self.skills = skills.iter().map(ToString::to_string).collect();
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Model for Member {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("labs", "member")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("first_name", FieldType::CharField).max_length(20))
                .field(FieldDef::new("last_name", FieldType::CharField).max_length(20))
                .field(FieldDef::new("email", FieldType::EmailField).nullable().blank())
                .field(FieldDef::new("age", FieldType::PositiveIntegerField).default(20))
                .field(
                    FieldDef::foreign_key("community", "Community", OnDelete::SetNull)
                        .nullable()
                        .blank()
                        .related_name("members"),
                )
                .field(
                    FieldDef::new(
                        "events",
                        FieldType::ManyToManyField {
                            to: "Event".into(),
                            through: Some("Registration".into()),
                            related_name: None,
                        },
                    )
                    .related_name("attendees")
                    .blank(),
                )
                .field(
                    FieldDef::new(
                        "skills",
                        FieldType::ArrayField {
                            base_field: Box::new(FieldType::CharField),
                            size: None,
                        },
                    )
                    .default(Vec::<Value>::new())
                    .nullable()
                    .blank()
                    .validator(SkillsSchemaValidator),
                )
                .field(
                    FieldDef::new("info", FieldType::JsonField)
                        .default(serde_json::json!({}))
                        .nullable()
                        .blank()
                        .validator(InfoSchemaValidator),
                )
                .field(FieldDef::new("contact", FieldType::HStoreField).nullable().blank())
                .serialize_exclude(&["contact"])
                .ordering(&["id"])
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Member>] = &[
            Accessor::new("id", |m| Value::from(m.id)),
            Accessor::new("first_name", |m| Value::from(m.first_name.as_str())),
            Accessor::new("last_name", |m| Value::from(m.last_name.as_str())),
            Accessor::new("email", |m| Value::from(m.email.clone())),
            Accessor::new("age", |m| Value::from(m.age)),
            Accessor::new("community_id", |m| Value::from(m.community_id)),
            Accessor::new("skills", |m| Value::from(m.skills.clone())),
            Accessor::new("info", |m| Value::from(m.info.clone())),
            Accessor::new("contact", |m| Value::from(m.contact.clone())),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            email: row.get_or_null("email")?,
            age: row.get("age")?,
            community_id: row.get_or_null("community_id")?,
            skills: row.get_or_null("skills")?,
            info: row.get_or_null("info")?,
            contact: row.get_or_null("contact")?,
        })
    }

    fn display(&self) -> String {
        self.full_name()
    }
}

/// A dated event members register to.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub ticket_number: Option<i64>,
    pub ticket_price: Option<i64>,
    pub seat_number: Option<i64>,
}

impl Event {
    pub fn new(id: i64, name: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.to_string(),
            start,
            end,
            ticket_number: None,
            ticket_price: None,
            seat_number: None,
        }
    }

    pub fn start_date(&self) -> String {
        self.start.format(DATE_PATTERN).to_string()
    }

    pub fn end_date(&self) -> String {
        self.end.format(DATE_PATTERN).to_string()
    }
}

impl Model for Event {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("labs", "event")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(FieldDef::new("name", FieldType::CharField).max_length(20))
                .field(FieldDef::new("start", FieldType::DateTimeField))
                .field(FieldDef::new("end", FieldType::DateTimeField))
                .field(FieldDef::new("ticket_number", FieldType::IntegerField).nullable().blank())
                .field(FieldDef::new("ticket_price", FieldType::IntegerField).nullable().blank())
                .field(FieldDef::new("seat_number", FieldType::IntegerField).nullable().blank())
                .ordering(&["start"])
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Event>] = &[
            Accessor::new("id", |e| Value::from(e.id)),
            Accessor::new("name", |e| Value::from(e.name.as_str())),
            Accessor::new("start", |e| Value::from(e.start)),
            Accessor::new("end", |e| Value::from(e.end)),
            Accessor::new("ticket_number", |e| Value::from(e.ticket_number)),
            Accessor::new("ticket_price", |e| Value::from(e.ticket_price)),
            Accessor::new("seat_number", |e| Value::from(e.seat_number)),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            start: row.get("start")?,
            end: row.get("end")?,
            ticket_number: row.get_or_null("ticket_number")?,
            ticket_price: row.get_or_null("ticket_price")?,
            seat_number: row.get_or_null("seat_number")?,
        })
    }

    fn display(&self) -> String {
        self.name.clone()
    }
}

/// A member's registration to an event. One per `(member, event)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub id: i64,
    pub member_id: i64,
    pub event_id: i64,
    pub ticket: i64,
    pub online: bool,
    /// Percentage, at most 100.
    pub discount: i64,
    pub registered_on: DateTime<Utc>,
}

impl Registration {
    /// A single-ticket, on-site registration made now.
    pub fn new(id: i64, member_id: i64, event_id: i64) -> Self {
        Self {
            id,
            member_id,
            event_id,
            ticket: 1,
            online: false,
            discount: 0,
            registered_on: Utc::now(),
        }
    }
}

impl Model for Registration {
    fn meta() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new("labs", "registration")
                .field(FieldDef::new("id", FieldType::AutoField).primary_key())
                .field(
                    FieldDef::foreign_key("member", "Member", OnDelete::Cascade)
                        .related_name("registrations"),
                )
                .field(
                    FieldDef::foreign_key("event", "Event", OnDelete::Cascade)
                        .related_name("registrations"),
                )
                .field(FieldDef::new("ticket", FieldType::IntegerField).default(1))
                .field(FieldDef::new("online", FieldType::BooleanField).default(false))
                .field(
                    FieldDef::new("discount", FieldType::PositiveIntegerField)
                        .default(0)
                        .validator(MaxValueValidator::new(100.0)),
                )
                .field(FieldDef::new("registered_on", FieldType::DateTimeField))
                .unique_together(&["member", "event"])
                .ordering(&["id"])
        });
        &META
    }

    fn accessors() -> &'static [Accessor<Self>] {
        static ACCESSORS: &[Accessor<Registration>] = &[
            Accessor::new("id", |r| Value::from(r.id)),
            Accessor::new("member_id", |r| Value::from(r.member_id)),
            Accessor::new("event_id", |r| Value::from(r.event_id)),
            Accessor::new("ticket", |r| Value::from(r.ticket)),
            Accessor::new("online", |r| Value::from(r.online)),
            Accessor::new("discount", |r| Value::from(r.discount)),
            Accessor::new("registered_on", |r| Value::from(r.registered_on)),
        ];
        ACCESSORS
    }

    fn from_row(row: &Row) -> LabsResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            member_id: row.get("member_id")?,
            event_id: row.get("event_id")?,
            ticket: row.get("ticket")?,
            online: row.get("online")?,
            discount: row.get("discount")?,
            registered_on: row.get("registered_on")?,
        })
    }
}

/// Renders a registration as `"<member first name> / <event name>"`.
///
/// Costs two round trips, one per side.
pub fn registration_label(db: &dyn DbExecutor, registration: &Registration) -> LabsResult<String> {
    let member: Member = get_model(db, registration.member_id)?;
    let event: Event = get_model(db, registration.event_id)?;
    Ok(format!("{} / {}", member.first_name, event.name))
}

/// Registers the labs models.
pub fn register_models(registry: &mut ModelRegistry) -> LabsResult<()> {
    registry.register::<Community>()?;
    registry.register::<Member>()?;
    registry.register::<Event>()?;
    registry.register::<Registration>()?;
    Ok(())
}

/// Returns a populated registry of the labs models.
pub fn registry() -> LabsResult<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    register_models(&mut registry)?;
    registry.populate()?;
    Ok(registry)
}
