use std::sync::{Arc, Mutex, PoisonError};

use chrono::{NaiveDate, NaiveDateTime};
use seedforge_core::providers::{auto, related, related_batch, sequence_string, template};
use seedforge_core::{
    belongs_to, has_many, has_many_through, Driver, DriverError, Factory, MemoryDriver, Payload,
    Registry, Relations, Row, Trait, Traits, Value,
};

/// Wraps another driver and records every payload it forwards, together
/// with whether the inner driver accepted it.
pub struct RecordingDriver {
    inner: Arc<dyn Driver>,
    log: Mutex<Vec<(Payload, bool)>>,
}

impl RecordingDriver {
    pub fn new(inner: Arc<dyn Driver>) -> Self {
        RecordingDriver {
            inner,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Record in front of a fresh [`MemoryDriver`].
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryDriver::new()))
    }

    /// Every payload seen, in call order.
    pub fn payloads(&self) -> Vec<Payload> {
        self.log().iter().map(|(p, _)| p.clone()).collect()
    }

    /// Entities of the payloads seen, in call order.
    pub fn entities(&self) -> Vec<String> {
        self.log().iter().map(|(p, _)| p.entity.clone()).collect()
    }

    /// Payloads the inner driver rejected.
    pub fn failures(&self) -> usize {
        self.log().iter().filter(|(_, ok)| !ok).count()
    }

    fn log(&self) -> std::sync::MutexGuard<'_, Vec<(Payload, bool)>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for RecordingDriver {
    fn create(&self, payload: &Payload) -> Result<Vec<Row>, DriverError> {
        let result = self.inner.create(payload);
        self.log().push((payload.clone(), result.is_ok()));
        result
    }
}

/// Fixed timestamp for deterministic fixtures.
pub fn test_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .and_then(|d| d.and_hms_opt(10, 30, 0))
        .expect("valid test timestamp")
}

/// Users, articles, clubs and their join entity, wired to `driver` for
/// both create and build.
///
/// Public traits:
/// - `User`: sequenced first/last name, `full_name` computed from both
/// - `UserWithArticles`: a `User` with 2 `Article`s
/// - `Article`: sequenced title, `author_id` unset
/// - `AuthoredArticle`: an `Article` with its own `User` author
/// - `Club`, `ClubWithUsers` (2 `User`s through `ClubToUser`)
/// - `ClubToUser`: bare join row; `Membership`: join row with its own club and user
pub fn blog_registry(driver: Arc<dyn Driver>) -> Registry {
    let mut registry = Registry::new("blog")
        .with_create_driver(Arc::clone(&driver))
        .with_build_driver(driver);

    registry.add(
        "users",
        Factory::new()
            .primary_key("id")
            .relations(
                Relations::new()
                    .with("articles", has_many("articles", "author_id"))
                    .with(
                        "clubs",
                        has_many_through("ClubToUser", "user_id", "club_id").of("clubs"),
                    ),
            )
            .traits(
                Traits::new()
                    .private(
                        "basic",
                        Trait::new()
                            .field("id", auto())
                            .field("first_name", sequence_string("Jon-{}", 1))
                            .field("last_name", sequence_string("Snow-{}", 1))
                            .field("full_name", template("{first_name} {last_name}"))
                            .field("created_at", test_time()),
                    )
                    .public("User", Trait::new().include("basic"))
                    .public(
                        "UserWithArticles",
                        Trait::new()
                            .include("basic")
                            .field("articles", related_batch("Article", 2)),
                    ),
            ),
    );

    registry.add(
        "articles",
        Factory::new()
            .primary_key("id")
            .relations(Relations::new().with("author", belongs_to("users").via("author_id")))
            .traits(
                Traits::new()
                    .private(
                        "basic",
                        Trait::new()
                            .field("id", auto())
                            .field("author_id", Value::Null)
                            .field("title", sequence_string("Article {}", 1)),
                    )
                    .public("Article", Trait::new().include("basic"))
                    .public(
                        "AuthoredArticle",
                        Trait::new().include("basic").field("author", related("User")),
                    ),
            ),
    );

    registry.add(
        "clubs",
        Factory::new()
            .primary_key("id")
            .relations(Relations::new().with(
                "users",
                has_many_through("ClubToUser", "club_id", "user_id").of("users"),
            ))
            .traits(
                Traits::new()
                    .public(
                        "Club",
                        Trait::new()
                            .field("id", auto())
                            .field("name", sequence_string("Club {}", 1)),
                    )
                    .public(
                        "ClubWithUsers",
                        Trait::new()
                            .include("Club")
                            .field("users", related_batch("User", 2)),
                    ),
            ),
    );

    registry.add(
        "clubs_to_users",
        Factory::new()
            .relations(
                Relations::new()
                    .with("club", belongs_to("clubs").via("club_id"))
                    .with("user", belongs_to("users").via("user_id")),
            )
            .traits(
                Traits::new()
                    .public(
                        "ClubToUser",
                        Trait::new()
                            .field("club_id", Value::Null)
                            .field("user_id", Value::Null),
                    )
                    .public(
                        "Membership",
                        Trait::new()
                            .include("ClubToUser")
                            .field("club", related("Club"))
                            .field("user", related("User")),
                    ),
            ),
    );

    registry
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
}

seedforge_core::scannable!(User { id, first_name, last_name, full_name });

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Article {
    pub id: i64,
    pub author_id: Option<i64>,
    pub title: String,
}

seedforge_core::scannable!(Article { id, author_id, title });

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Club {
    pub id: i64,
    pub name: String,
}

seedforge_core::scannable!(Club { id, name });
