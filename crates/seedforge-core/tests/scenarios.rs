//! End-to-end behavior of the registry over the in-memory drivers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use seedforge_core::providers::{
    auto, cycle, related, related_batch, related_custom, repeat_each, sequence_int,
    sequence_string,
};
use seedforge_core::{
    belongs_to, depends_on, has_many, DefinitionError, Factory, MemoryDriver, NoopDriver, Registry,
    Relations, SeedError, Trait, Traits, Value,
};
use seedforge_testutil::{blog_registry, Article, Club, RecordingDriver, User};

fn blog() -> (Registry, Arc<RecordingDriver>) {
    let driver = Arc::new(RecordingDriver::memory());
    (blog_registry(driver.clone()), driver)
}

fn loops_registry(driver: Arc<MemoryDriver>) -> Registry {
    let mut registry = Registry::new("loops").with_create_driver(driver);
    registry.add(
        "loops",
        Factory::new().primary_key("id").traits(Traits::new().public(
            "Loop",
            Trait::new()
                .field("id", auto())
                .field("a", depends_on(["b"]).generate(|_| Value::Null))
                .field("b", depends_on(["c"]).generate(|_| Value::Null))
                .field("c", depends_on(["d"]).generate(|_| Value::Null))
                .field("d", depends_on(["b"]).generate(|_| Value::Null)),
        )),
    );
    registry
}

/// Users with articles; an `Edited` article also has an editor (a parent).
fn editors_registry(create: Arc<MemoryDriver>, build: Arc<MemoryDriver>) -> Registry {
    let mut registry = Registry::new("editors")
        .with_create_driver(create)
        .with_build_driver(build);
    registry.add(
        "users",
        Factory::new()
            .primary_key("id")
            .relations(Relations::new().with("articles", has_many("articles", "author_id")))
            .traits(
                Traits::new()
                    .public("User", Trait::new().field("id", auto()))
                    .public(
                        "Writer",
                        Trait::new()
                            .field("id", auto())
                            .field("articles", related_batch("Edited", 1)),
                    ),
            ),
    );
    registry.add(
        "articles",
        Factory::new()
            .primary_key("id")
            .relations(Relations::new().with("editor", belongs_to("users").via("editor_id")))
            .traits(
                Traits::new()
                    .private(
                        "basic",
                        Trait::new().field("id", auto()).field("author_id", Value::Null),
                    )
                    .public("Article", Trait::new().include("basic"))
                    .public(
                        "Edited",
                        Trait::new().include("basic").field("editor", related("User")),
                    ),
            ),
    );
    registry
}

#[test]
fn test_user_with_two_articles() {
    let (registry, driver) = blog();
    let batch = registry
        .create_custom("User", Trait::new().field("articles", related_batch("Article", 2)))
        .unwrap();

    assert_eq!(batch.len(), 1);
    let user: User = batch.scan_one().unwrap();
    let record = batch.record(0).unwrap();
    let articles: Vec<Article> = record.scan_related("articles").unwrap();
    assert_eq!(articles.len(), 2);
    for article in &articles {
        assert_eq!(article.author_id, Some(user.id), "article must point at its author");
    }
    assert_eq!(driver.entities(), vec!["users", "articles"]);
}

#[test]
fn test_club_with_users_through_join_trait() {
    let (registry, driver) = blog();
    let batch = registry.create("ClubWithUsers").unwrap();

    let club: Club = batch.scan_one().unwrap();
    let record = batch.record(0).unwrap();
    let users: Vec<User> = record.scan_related("users").unwrap();
    assert_eq!(users.len(), 2);

    let joins = record.related("users_join").unwrap();
    assert_eq!(joins.len(), 2);
    let mut linked: Vec<Value> = Vec::new();
    for join in joins.records() {
        assert_eq!(join.get("club_id"), Some(&Value::Int(club.id)));
        linked.push(join.get("user_id").cloned().unwrap());
    }
    let expected: Vec<Value> = users.iter().map(|u| Value::Int(u.id)).collect();
    assert_eq!(linked, expected, "each join row links one distinct user");
    assert_eq!(driver.entities(), vec!["clubs", "users", "clubs_to_users"]);
}

#[test]
fn test_dependent_full_name() {
    let (registry, _) = blog();
    let user: User = registry.build("User").unwrap().scan_one().unwrap();
    assert_eq!(user.first_name, "Jon-1");
    assert_eq!(user.last_name, "Snow-1");
    assert_eq!(user.full_name, "Jon-1 Snow-1");
}

#[test]
fn test_parent_persisted_before_owner() {
    let (registry, driver) = blog();
    let batch = registry.create_batch("AuthoredArticle", 2).unwrap();

    assert_eq!(driver.entities(), vec!["users", "articles"]);
    let authors = batch.parent("author").expect("author batch");
    assert_eq!(authors.len(), 2);
    assert_eq!(batch.column("author_id"), authors.keys());

    let payload = &driver.payloads()[1];
    assert_eq!(
        payload.insert_fields.iter().filter(|f| *f == "author_id").count(),
        1
    );
}

#[test]
fn test_overridden_join_field_not_duplicated() {
    let (registry, driver) = blog();
    let overrides = Trait::new().field("author_id", cycle([Value::Int(5), Value::Int(5), Value::Int(7)]));
    let batch = registry
        .create_custom_batch("AuthoredArticle", 3, overrides)
        .unwrap();

    assert_eq!(
        driver.entities(),
        vec!["articles"],
        "an explicit join field replaces the parent relation"
    );
    let payload = &driver.payloads()[0];
    assert_eq!(
        payload.insert_fields.iter().filter(|f| *f == "author_id").count(),
        1,
        "insert fields: {:?}",
        payload.insert_fields
    );
    assert_eq!(
        batch.column("author_id"),
        vec![Value::Int(5), Value::Int(5), Value::Int(7)]
    );
    assert!(batch.parent("author").is_none());
}

#[test]
fn test_parent_override_with_shared_values() {
    let (registry, driver) = blog();
    let overrides = Trait::new()
        .field("title", cycle(["shared", "shared", "own"]))
        .field(
            "author",
            related_custom("User", Trait::new().field("first_name", "Arya")),
        );
    let batch = registry
        .create_custom_batch("AuthoredArticle", 3, overrides)
        .unwrap();

    let articles: Vec<Article> = batch.scan_all().unwrap();
    let titles: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["shared", "shared", "own"]);

    let authors: Vec<User> = batch.parent("author").unwrap().scan_all().unwrap();
    assert!(authors.iter().all(|u| u.first_name == "Arya"));
    for (article, author) in articles.iter().zip(&authors) {
        assert_eq!(article.author_id, Some(author.id));
    }
    let payload = &driver.payloads()[1];
    assert_eq!(
        payload.insert_fields.iter().filter(|f| *f == "author_id").count(),
        1
    );
}

#[test]
fn test_children_chop_into_groups_in_order() {
    let (registry, _) = blog();
    let batch = registry
        .create_custom_batch("User", 3, Trait::new().field("articles", related_batch("Article", 2)))
        .unwrap();

    let groups = batch.children("articles").unwrap();
    assert_eq!(groups.len(), 3);
    let mut titles = Vec::new();
    for (user, group) in batch.records().zip(groups) {
        assert_eq!(group.len(), 2);
        for article in group.records() {
            assert_eq!(article.get("author_id"), user.key());
            titles.push(article.get("title").cloned().unwrap());
        }
    }
    let expected: Vec<Value> = (1..=6).map(|i| Value::from(format!("Article {}", i))).collect();
    assert_eq!(titles, expected);
}

#[test]
fn test_auto_fields_are_returned_not_inserted() {
    let (registry, driver) = blog();
    registry.create("User").unwrap();

    let payload = &driver.payloads()[0];
    assert!(!payload.insert_fields.contains(&"id".to_string()));
    assert_eq!(payload.auto_fields(), ["id".to_string()]);
    assert!(payload.rows.iter().all(|row| !row.contains_key("id")));
}

#[test]
fn test_repeat_each_cycles() {
    let (registry, _) = blog();
    let batch = registry
        .build_custom_batch("Club", 10, Trait::new().field("rank", repeat_each([1, 2, 3], 2)))
        .unwrap();
    let expected: Vec<Value> = [1, 1, 2, 2, 3, 3, 1, 1, 2, 2].into_iter().map(Value::Int).collect();
    assert_eq!(batch.column("rank"), expected);
}

#[test]
fn test_include_precedence() {
    let mut registry = Registry::new("people");
    registry.add(
        "people",
        Factory::new().traits(
            Traits::new()
                .private("basic", Trait::new().field("name", "Jon").field("age", 20).field("sex", "male"))
                .private("old", Trait::new().include("basic").field("age", 80))
                .private("female", Trait::new().field("sex", "female"))
                .private("withPhone", Trait::new().field("phone", "+3802939524"))
                .private("oldWoman", Trait::new().include("basic old female").field("name", "Ann"))
                .public(
                    "Person",
                    Trait::new().include("basic oldWoman withPhone").field("active", true),
                ),
        ),
    );
    let batch = registry.build("Person").unwrap();
    let record = batch.record(0).unwrap();
    assert_eq!(record.get("name"), Some(&Value::from("Ann")));
    assert_eq!(record.get("age"), Some(&Value::Int(80)));
    assert_eq!(record.get("sex"), Some(&Value::from("female")));
    assert_eq!(record.get("phone"), Some(&Value::from("+3802939524")));
    assert_eq!(record.get("active"), Some(&Value::Bool(true)));
}

#[test]
fn test_circular_include_rejected_at_registration() {
    let mut registry = Registry::new("cycles");
    let err = registry
        .try_add(
            "users",
            Factory::new().traits(
                Traits::new()
                    .private("a", Trait::new().include("b"))
                    .private("b", Trait::new().include("a"))
                    .public("User", Trait::new().include("a")),
            ),
        )
        .unwrap_err();
    assert!(matches!(err, DefinitionError::CircularInclude { .. }), "{:?}", err);
    assert!(!registry.has_trait("User"), "failed registrations leave no traces");
}

#[test]
#[should_panic(expected = "Circular include")]
fn test_add_panics_on_circular_include() {
    let mut registry = Registry::new("cycles");
    registry.add(
        "users",
        Factory::new().traits(
            Traits::new()
                .private("a", Trait::new().include("a"))
                .public("User", Trait::new().include("a")),
        ),
    );
}

#[test]
fn test_circular_field_dependency_reaches_no_driver() {
    let driver = Arc::new(MemoryDriver::new());
    let registry = loops_registry(driver.clone());

    let err = registry.try_create("Loop", 1, None).unwrap_err();
    assert!(
        err.to_string().starts_with("Circular field dependency:"),
        "{}",
        err
    );

    let outcome = catch_unwind(AssertUnwindSafe(|| registry.create("Loop")));
    assert!(outcome.is_err(), "create must panic on a definition fault");
    assert!(driver.calls().is_empty());
}

#[test]
#[should_panic(expected = "does not exist")]
fn test_unknown_trait_panics() {
    let (registry, _) = blog();
    let _ = registry.create("Nobody");
}

#[test]
fn test_duplicate_public_trait_across_factories() {
    let (mut registry, _) = blog();
    let err = registry
        .try_add(
            "admins",
            Factory::new().traits(Traits::new().public("User", Trait::new().field("name", "root"))),
        )
        .unwrap_err();
    assert!(
        err.to_string().contains("already registered by factory 'users'"),
        "{}",
        err
    );
}

#[test]
fn test_driver_failure_is_recoverable() {
    let driver = Arc::new(RecordingDriver::new(Arc::new(
        MemoryDriver::new().failing_on("articles"),
    )));
    let registry = blog_registry(driver.clone());

    let err = registry.create("UserWithArticles").unwrap_err();
    assert!(matches!(err, SeedError::Driver { .. }), "{:?}", err);
    assert_eq!(driver.failures(), 1);

    let user = registry.create("User").unwrap();
    assert_eq!(user.len(), 1, "the registry keeps working after a driver error");
}

#[test]
fn test_build_goes_through_build_driver() {
    let created = Arc::new(MemoryDriver::new());
    let mut registry = Registry::new("modes")
        .with_create_driver(created.clone())
        .with_build_driver(Arc::new(NoopDriver));
    registry.add(
        "tags",
        Factory::new().primary_key("id").traits(Traits::new().public(
            "Tag",
            Trait::new().field("id", auto()).field("n", sequence_int(1)),
        )),
    );

    let built = registry.build_batch("Tag", 2).unwrap();
    assert!(created.calls().is_empty());
    assert_eq!(built.column("id"), vec![Value::Null, Value::Null]);

    let stored = registry.create("Tag").unwrap();
    assert_eq!(stored.column("id"), vec![Value::Int(1)]);
    assert_eq!(stored.column("n"), vec![Value::Int(3)], "sequences continue across calls");
}

#[test]
fn test_create_related_child() {
    let (registry, driver) = blog();
    let mut users = registry.create_batch("User", 2).unwrap();
    registry
        .create_related(&mut users, 1, "articles", "Article", 3, None)
        .unwrap();

    let second = users.record(1).unwrap();
    let articles: Vec<Article> = second.scan_related("articles").unwrap();
    assert_eq!(articles.len(), 3);
    let key = second.key().and_then(Value::as_int);
    assert!(articles.iter().all(|a| a.author_id == key));
    assert!(users.record(0).unwrap().related("articles").unwrap().is_empty());
    assert_eq!(driver.entities(), vec!["users", "articles"]);
}

#[test]
fn test_create_related_many_to_many() {
    let (registry, _) = blog();
    let mut users = registry.create("User").unwrap();
    registry
        .create_related(&mut users, 0, "clubs", "Club", 2, None)
        .unwrap();

    let record = users.record(0).unwrap();
    let clubs: Vec<Club> = record.scan_related("clubs").unwrap();
    assert_eq!(clubs.len(), 2);
    let joins = record.related("clubs_join").unwrap();
    assert_eq!(joins.column("user_id"), vec![record.key().cloned().unwrap(); 2]);
    assert_eq!(
        joins.column("club_id"),
        clubs.iter().map(|c| Value::Int(c.id)).collect::<Vec<_>>()
    );
}

#[test]
fn test_create_related_rejects_parent_relation() {
    let (registry, _) = blog();
    let mut articles = registry.create("Article").unwrap();
    let err = registry
        .create_related(&mut articles, 0, "author", "User", 1, None)
        .unwrap_err();
    assert!(matches!(err, SeedError::RelationNotSupported { .. }), "{:?}", err);
}

#[test]
fn test_create_related_pads_missing_parents() {
    let registry = editors_registry(Arc::new(MemoryDriver::new()), Arc::new(MemoryDriver::new()));
    let mut writer = registry.create("Writer").unwrap();
    registry
        .create_related(&mut writer, 0, "articles", "Article", 1, None)
        .unwrap();
    let group = writer.record(0).unwrap().related("articles").unwrap();
    assert_eq!(group.len(), 2);
    assert!(group.record(0).unwrap().related("editor").unwrap().keys()[0].as_int().is_some());
    assert_eq!(
        group.record(1).unwrap().related("editor").unwrap().keys(),
        vec![Value::Null]
    );
    assert_eq!(group.chop(2).unwrap().len(), 2);

    let mut user = registry.create("User").unwrap();
    registry
        .create_related(&mut user, 0, "articles", "Article", 1, None)
        .unwrap();
    registry
        .create_related(&mut user, 0, "articles", "Edited", 1, None)
        .unwrap();
    let group = user.record(0).unwrap().related("articles").unwrap();
    let editors = group.parent("editor").expect("the editor of the appended article is kept");
    assert_eq!(editors.len(), 2);
    assert_eq!(editors.keys()[0], Value::Null);
    assert!(editors.keys()[1].as_int().is_some());
}

#[test]
fn test_create_related_follows_owner_mode() {
    let created = Arc::new(MemoryDriver::new());
    let built = Arc::new(MemoryDriver::new());
    let registry = editors_registry(created.clone(), built.clone());

    let mut user = registry.build("User").unwrap();
    registry
        .create_related(&mut user, 0, "articles", "Article", 2, None)
        .unwrap();
    assert!(created.calls().is_empty(), "a built owner must not reach the create driver");
    assert_eq!(built.call_order(), vec!["users", "articles"]);

    let mut user = registry.create("User").unwrap();
    registry
        .create_related(&mut user, 0, "articles", "Article", 1, None)
        .unwrap();
    assert_eq!(created.call_order(), vec!["users", "articles"]);
}

#[test]
fn test_registries_do_not_share_generator_state() {
    let agents = Factory::new().primary_key("id").traits(
        Traits::new()
            .private(
                "basic",
                Trait::new()
                    .field("id", auto())
                    .field("name", sequence_string("Agent {}", 1)),
            )
            .public("User", Trait::new().include("basic"))
            .public("Admin", Trait::new().include("basic")),
    );
    let mut a = Registry::new("a").with_create_driver(Arc::new(MemoryDriver::new()));
    let mut b = Registry::new("b").with_create_driver(Arc::new(MemoryDriver::new()));
    a.add("users", agents.clone());
    b.add("users", agents);

    assert_eq!(a.create("User").unwrap().column("name"), vec![Value::from("Agent 1")]);
    assert_eq!(b.create("User").unwrap().column("name"), vec![Value::from("Agent 1")]);
    assert_eq!(
        a.create("Admin").unwrap().column("name"),
        vec![Value::from("Agent 2")],
        "traits of one registry share an included generator"
    );
    assert_eq!(b.create("User").unwrap().column("name"), vec![Value::from("Agent 2")]);
}

#[test]
fn test_check_reports_definition_errors() {
    let (mut registry, _) = blog();
    registry.add(
        "comments",
        Factory::new()
            .relations(Relations::new().with("article", belongs_to("articles")))
            .traits(
                Traits::new()
                    .public("Comment", Trait::new().field("post", related("Article")))
                    .public("Reply", Trait::new().field("article", related("User"))),
            ),
    );

    let errors = registry.check();
    assert_eq!(errors.len(), 2, "{:?}", errors);
    assert!(errors
        .iter()
        .any(|e| matches!(e, DefinitionError::RelationNotDefined { relation, .. } if relation == "post")));
    assert!(errors
        .iter()
        .any(|e| matches!(e, DefinitionError::RelationTargetMismatch { .. })));
}
