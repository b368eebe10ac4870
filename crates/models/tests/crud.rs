//! End-to-end CRUD behavior over the memory engine

use courtside_models::{
    BlocEchauffement, CourtsideClient, Echauffement, Filter, FindManyArgs, OrmError, Patch, Tag,
    UniqueWhere, User,
};

async fn client() -> CourtsideClient {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    CourtsideClient::connect_memory().await.unwrap()
}

#[tokio::test]
async fn create_then_find_unique_round_trips() {
    let client = client().await;
    let created = client
        .tag()
        .create(Tag {
            color: Some("#2266aa".into()),
            level: Some(2),
            ..Tag::new("Endurance", "Physique")
        })
        .await
        .unwrap();
    assert!(created.id.is_some());
    assert!(created.created_at.is_some());

    let by_id = client
        .tag()
        .find_unique(UniqueWhere::id(created.id.clone().unwrap()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_id, created);

    // the declared compound key works as a unique lookup too
    let by_compound = client
        .tag()
        .find_unique(
            UniqueWhere::field("label", "Endurance").and_field("category", "Physique"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_compound, created);

    // but a non-declared combination is a validation error, not a scan
    let err = client
        .tag()
        .find_unique(UniqueWhere::field("color", "#2266aa"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
}

#[tokio::test]
async fn find_many_with_empty_filter_returns_every_row() {
    let client = client().await;
    for i in 0..4 {
        client
            .echauffement()
            .create(Echauffement::new(format!("Routine {}", i)))
            .await
            .unwrap();
    }
    let all = client
        .echauffement()
        .find_many(FindManyArgs::new())
        .await
        .unwrap();
    assert_eq!(all.len(), 4);

    let none = client
        .echauffement()
        .find_many(FindManyArgs::new().filter(Filter::eq("nom", "absent")))
        .await
        .unwrap();
    // an empty list, never null
    assert!(none.is_empty());
}

#[tokio::test]
async fn count_matches_find_many_length() {
    let client = client().await;
    for (label, category) in [
        ("Endurance", "Physique"),
        ("Vitesse", "Physique"),
        ("Bloc", "Technique"),
    ] {
        client.tag().create(Tag::new(label, category)).await.unwrap();
    }
    let filter = Filter::eq("category", "Physique");
    let counted = client.tag().count(Some(filter.clone())).await.unwrap();
    let listed = client
        .tag()
        .find_many(FindManyArgs::new().filter(filter))
        .await
        .unwrap();
    assert_eq!(counted, listed.len() as u64);

    let total = client.tag().count(None).await.unwrap();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn create_many_skip_duplicates_inserts_all_but_the_colliding_row() {
    let client = client().await;
    client
        .tag()
        .create(Tag::new("Endurance", "Physique"))
        .await
        .unwrap();

    let batch = vec![
        Tag::new("Vitesse", "Physique"),
        Tag::new("Endurance", "Physique"), // collides with the existing row
        Tag::new("Endurance", "Tactique"),
        Tag::new("Bloc", "Technique"),
    ];
    let inserted = client.tag().create_many(batch.clone(), true).await.unwrap();
    assert_eq!(inserted, batch.len() as u64 - 1);
    assert_eq!(client.tag().count(None).await.unwrap(), 4);

    // without skip_duplicates the whole batch aborts
    let err = client
        .tag()
        .create_many(vec![Tag::new("Service", "Technique"), Tag::new("Bloc", "Technique")], false)
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::UniqueViolation { .. }));
    assert_eq!(client.tag().count(None).await.unwrap(), 4);
}

#[tokio::test]
async fn upsert_takes_exactly_one_branch() {
    let client = client().await;
    let key = UniqueWhere::field("label", "Endurance").and_field("category", "Physique");

    // absent key: the create branch runs
    let created = client
        .tag()
        .upsert(
            key.clone(),
            Tag::new("Endurance", "Physique"),
            Patch::new().set("color", "#00ff00"),
        )
        .await
        .unwrap();
    assert_eq!(created.color, None);
    assert_eq!(client.tag().count(None).await.unwrap(), 1);

    // present key: the update branch runs, no second row appears
    let updated = client
        .tag()
        .upsert(
            key,
            Tag::new("Endurance", "Physique"),
            Patch::new().set("color", "#00ff00"),
        )
        .await
        .unwrap();
    assert_eq!(updated.color.as_deref(), Some("#00ff00"));
    assert_eq!(updated.id, created.id);
    assert_eq!(client.tag().count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn delete_many_with_empty_filter_empties_the_table() {
    let client = client().await;
    for i in 0..5 {
        client
            .echauffement()
            .create(Echauffement::new(format!("Routine {}", i)))
            .await
            .unwrap();
    }
    let deleted = client.echauffement().delete_many(None).await.unwrap();
    assert_eq!(deleted, 5);
    assert_eq!(client.echauffement().count(None).await.unwrap(), 0);

    // zero matches is a valid count, not an error
    assert_eq!(client.echauffement().delete_many(None).await.unwrap(), 0);
}

#[tokio::test]
async fn bloc_order_index_is_unique_per_warm_up() {
    let client = client().await;
    let routine = client
        .echauffement()
        .create(Echauffement::new("Mise en route"))
        .await
        .unwrap();
    let routine_id = routine.id.clone().unwrap();

    let first = client
        .bloc_echauffement()
        .create(BlocEchauffement {
            repetitions: Some("3x10".into()),
            ..BlocEchauffement::new(routine_id.clone(), 1, "Talons-fesses")
        })
        .await
        .unwrap();

    let err = client
        .bloc_echauffement()
        .create(BlocEchauffement::new(routine_id.clone(), 1, "Montées de genoux"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, OrmError::UniqueViolation { ref key, .. } if key == "echauffement_ordre")
    );

    // the prior row is untouched
    let kept = client
        .bloc_echauffement()
        .find_unique(
            UniqueWhere::field("echauffement_id", routine_id.clone()).and_field("ordre", 1i64),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept, first);

    // a different order index under the same warm-up is fine
    client
        .bloc_echauffement()
        .create(BlocEchauffement::new(routine_id, 2, "Montées de genoux"))
        .await
        .unwrap();
}

#[tokio::test]
async fn tag_label_category_scenario() {
    let client = client().await;
    client
        .tag()
        .create(Tag::new("Endurance", "Physique"))
        .await
        .unwrap();

    let err = client
        .tag()
        .create(Tag::new("Endurance", "Physique"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::UniqueViolation { ref key, .. } if key == "label_category"));

    // same label under another category succeeds
    client
        .tag()
        .create(Tag::new("Endurance", "Tactique"))
        .await
        .unwrap();
    assert_eq!(client.tag().count(None).await.unwrap(), 2);
}

#[tokio::test]
async fn unique_keyed_mutations_fail_with_not_found() {
    let client = client().await;
    let err = client
        .tag()
        .update(UniqueWhere::id("missing"), Patch::new().set("color", "#fff"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::NotFound { .. }));

    let err = client.tag().delete(UniqueWhere::id("missing")).await.unwrap_err();
    assert!(matches!(err, OrmError::NotFound { .. }));

    let err = client
        .tag()
        .find_unique_or_throw(UniqueWhere::id("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::NotFound { .. }));

    // the non-throwing variants return None instead
    assert!(client
        .tag()
        .find_unique(UniqueWhere::id("missing"))
        .await
        .unwrap()
        .is_none());
    assert!(client
        .tag()
        .find_first(FindManyArgs::new().filter(Filter::eq("label", "absent")))
        .await
        .unwrap()
        .is_none());

    // batch updates over zero matches report zero, not NotFound
    let touched = client
        .tag()
        .update_many(
            Some(Filter::eq("label", "absent")),
            Patch::new().set("color", "#fff"),
        )
        .await
        .unwrap();
    assert_eq!(touched, 0);
}

#[tokio::test]
async fn user_defaults_and_updated_at_maintenance() {
    let client = client().await;
    let user = client
        .user()
        .create(User::new("coach@club.fr", "Moreau"))
        .await
        .unwrap();
    assert_eq!(user.role.as_deref(), Some("user"));
    assert_eq!(user.is_active, Some(true));
    let created_at = user.created_at.unwrap();
    let first_updated_at = user.updated_at.unwrap();
    assert!(first_updated_at >= created_at);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let updated = client
        .user()
        .update(
            UniqueWhere::field("email", "coach@club.fr"),
            Patch::new().set("prenom", "Camille"),
        )
        .await
        .unwrap();
    assert_eq!(updated.prenom.as_deref(), Some("Camille"));
    // created_at is immutable, updated_at refreshed by the engine
    assert_eq!(updated.created_at.unwrap(), created_at);
    assert!(updated.updated_at.unwrap() > first_updated_at);

    // a second account reusing the email is rejected
    let err = client
        .user()
        .create(User::new("coach@club.fr", "Autre"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::UniqueViolation { ref key, .. } if key == "email"));

    // created_at cannot be written
    let err = client
        .user()
        .update(
            UniqueWhere::field("email", "coach@club.fr"),
            Patch::new().set("created_at", courtside_models::ScalarValue::DateTime(chrono::Utc::now())),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
}
