//! Filter, ordering, pagination, distinct, aggregation and group-by
//! behavior over the memory engine

use courtside_models::{
    AggSelect, AggregateArgs, BlocEchauffement, CourtsideClient, Echauffement, Filter,
    FindManyArgs, GroupByArgs, GroupOrderBy, Having, OrderBy, OrmError, Projection, ScalarOp,
    ScalarValue, Tag, UniqueWhere,
};

async fn seeded_tags() -> CourtsideClient {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let client = CourtsideClient::connect_memory().await.unwrap();
    let rows = [
        ("Endurance", "Physique", Some(3)),
        ("Vitesse", "Physique", Some(1)),
        ("Explosivite", "Physique", None),
        ("Bloc", "Technique", Some(2)),
        ("Service flottant", "Technique", Some(4)),
        ("Lecture de jeu", "Tactique", None),
    ];
    for (label, category, level) in rows {
        client
            .tag()
            .create(Tag {
                level,
                ..Tag::new(label, category)
            })
            .await
            .unwrap();
    }
    client
}

#[tokio::test]
async fn scalar_operators() {
    let client = seeded_tags().await;
    let repo = client.tag();

    let physique = repo.count(Some(Filter::eq("category", "Physique"))).await.unwrap();
    assert_eq!(physique, 3);

    let not_physique = repo.count(Some(Filter::ne("category", "Physique"))).await.unwrap();
    assert_eq!(not_physique, 3);

    let high = repo.count(Some(Filter::gte("level", 2i64))).await.unwrap();
    assert_eq!(high, 3);

    let unlevelled = repo.count(Some(Filter::is_null("level"))).await.unwrap();
    assert_eq!(unlevelled, 2);

    let listed = repo
        .count(Some(Filter::is_in("category", vec!["Physique", "Tactique"])))
        .await
        .unwrap();
    assert_eq!(listed, 4);

    // empty `in` matches nothing, empty `notIn` everything
    assert_eq!(
        repo.count(Some(Filter::is_in("category", Vec::<&str>::new())))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        repo.count(Some(Filter::not_in("category", Vec::<&str>::new())))
            .await
            .unwrap(),
        6
    );

    let contains = repo.count(Some(Filter::contains("label", "loc"))).await.unwrap();
    assert_eq!(contains, 1);
    assert_eq!(repo.count(Some(Filter::contains("label", "BLOC"))).await.unwrap(), 0);
    assert_eq!(
        repo.count(Some(Filter::contains_insensitive("label", "BLOC"))).await.unwrap(),
        1
    );
    assert_eq!(
        repo.count(Some(Filter::starts_with("label", "Service"))).await.unwrap(),
        1
    );
    assert_eq!(repo.count(Some(Filter::ends_with("label", "jeu"))).await.unwrap(), 1);

    let composed = Filter::and(vec![
        Filter::eq("category", "Physique"),
        Filter::not(Filter::is_null("level")),
        Filter::or(vec![Filter::lte("level", 1i64), Filter::gte("level", 3i64)]),
    ]);
    assert_eq!(repo.count(Some(composed)).await.unwrap(), 2);
}

#[tokio::test]
async fn ordering_with_nulls_and_ties() {
    let client = seeded_tags().await;
    let tags = client
        .tag()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::desc("level"))
                .order_by(OrderBy::asc("label")),
        )
        .await
        .unwrap();
    let labels: Vec<&str> = tags.iter().map(|t| t.label.as_str()).collect();
    // descending puts nulls first by default, alphabetical within the tie
    assert_eq!(
        labels,
        vec![
            "Explosivite",
            "Lecture de jeu",
            "Service flottant",
            "Endurance",
            "Bloc",
            "Vitesse"
        ]
    );

    let tags = client
        .tag()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::desc("level").nulls_last())
                .order_by(OrderBy::asc("label")),
        )
        .await
        .unwrap();
    assert_eq!(tags.last().unwrap().label, "Lecture de jeu");
}

#[tokio::test]
async fn cursor_pagination_forward_and_backward() {
    let client = CourtsideClient::connect_memory().await.unwrap();
    let routine = client
        .echauffement()
        .create(Echauffement::new("Mise en route"))
        .await
        .unwrap();
    let routine_id = routine.id.clone().unwrap();
    let mut ids = Vec::new();
    for ordre in 0..6 {
        let bloc = client
            .bloc_echauffement()
            .create(BlocEchauffement::new(
                routine_id.clone(),
                ordre,
                format!("Bloc {}", ordre),
            ))
            .await
            .unwrap();
        ids.push(bloc.id.unwrap());
    }

    let ordered = FindManyArgs::new().order_by(OrderBy::asc("ordre"));

    // skip/take window without a cursor
    let page = client
        .bloc_echauffement()
        .find_many(ordered.clone().skip(1).take(2))
        .await
        .unwrap();
    assert_eq!(page.iter().map(|b| b.ordre).collect::<Vec<_>>(), vec![1, 2]);

    // cursor row included, window moves forward
    let page = client
        .bloc_echauffement()
        .find_many(ordered.clone().cursor(UniqueWhere::id(ids[2].clone())).take(2))
        .await
        .unwrap();
    assert_eq!(page.iter().map(|b| b.ordre).collect::<Vec<_>>(), vec![2, 3]);

    // negative take pages backwards, ending at the cursor
    let page = client
        .bloc_echauffement()
        .find_many(ordered.clone().cursor(UniqueWhere::id(ids[2].clone())).take(-2))
        .await
        .unwrap();
    assert_eq!(page.iter().map(|b| b.ordre).collect::<Vec<_>>(), vec![1, 2]);

    // negative take without a cursor pages from the end
    let page = client
        .bloc_echauffement()
        .find_many(ordered.clone().take(-2))
        .await
        .unwrap();
    assert_eq!(page.iter().map(|b| b.ordre).collect::<Vec<_>>(), vec![4, 5]);

    // a cursor outside the filtered set yields an empty page
    let page = client
        .bloc_echauffement()
        .find_many(
            ordered
                .clone()
                .filter(Filter::lte("ordre", 1i64))
                .cursor(UniqueWhere::id(ids[4].clone()))
                .take(2),
        )
        .await
        .unwrap();
    assert!(page.is_empty());
}

#[tokio::test]
async fn distinct_collapses_to_first_in_order() {
    let client = seeded_tags().await;
    let rows = client
        .tag()
        .find_many(
            FindManyArgs::new()
                .order_by(OrderBy::asc("label"))
                .distinct(vec!["category"]),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    let labels: Vec<&str> = rows.iter().map(|t| t.label.as_str()).collect();
    // alphabetically first label of each category wins
    assert_eq!(labels, vec!["Bloc", "Endurance", "Lecture de jeu"]);
}

#[tokio::test]
async fn aggregate_accumulators() {
    let client = seeded_tags().await;
    let result = client
        .tag()
        .aggregate(AggregateArgs {
            filter: None,
            select: AggSelect::count()
                .with_count_field("level")
                .with_avg("level")
                .with_sum("level")
                .with_min("level")
                .with_max("level"),
        })
        .await
        .unwrap();
    assert_eq!(result.count, Some(6));
    assert_eq!(result.count_fields["level"], 4);
    assert_eq!(result.sum["level"], Some(10));
    assert_eq!(result.avg["level"], Some(2.5));
    assert_eq!(result.min["level"], Some(ScalarValue::Int(1)));
    assert_eq!(result.max["level"], Some(ScalarValue::Int(4)));

    // aggregates over an empty set are null
    let result = client
        .tag()
        .aggregate(AggregateArgs {
            filter: Some(Filter::eq("category", "absent")),
            select: AggSelect::count().with_avg("level").with_min("level"),
        })
        .await
        .unwrap();
    assert_eq!(result.count, Some(0));
    assert_eq!(result.avg["level"], None);
    assert_eq!(result.min["level"], None);

    let counts = client
        .tag()
        .count_fields(None, vec!["level", "color"])
        .await
        .unwrap();
    assert_eq!(counts["_all"], 6);
    assert_eq!(counts["level"], 4);
    assert_eq!(counts["color"], 0);
}

#[tokio::test]
async fn group_by_partitions_filters_and_orders() {
    let client = seeded_tags().await;
    let groups = client
        .tag()
        .group_by(GroupByArgs::by(vec!["category"]))
        .await
        .unwrap();
    assert_eq!(groups.len(), 3);
    let total: u64 = groups.iter().map(|g| g.count.unwrap()).sum();
    assert_eq!(total, client.tag().count(None).await.unwrap());

    let groups = client
        .tag()
        .group_by(
            GroupByArgs::by(vec!["category"])
                .having(Having::count(ScalarOp::Gte(ScalarValue::Int(3))))
                .order_by(GroupOrderBy::field_asc("category")),
        )
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].keys["category"], ScalarValue::from("Physique"));

    let groups = client
        .tag()
        .group_by(
            GroupByArgs::by(vec!["category"])
                .order_by(GroupOrderBy::count_desc())
                .take(2)
                .skip(1),
        )
        .await
        .unwrap();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].count, Some(2));
}

#[tokio::test]
async fn group_by_contract_violations() {
    let client = seeded_tags().await;

    let err = client
        .tag()
        .group_by(GroupByArgs::by(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));

    let err = client
        .tag()
        .group_by(
            GroupByArgs::by(vec!["category"])
                .having(Having::field("label", ScalarOp::Equals("Bloc".into()))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));

    // take/skip without orderBy is an input error
    let err = client
        .tag()
        .group_by(GroupByArgs::by(vec!["category"]).take(1))
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
}

#[tokio::test]
async fn projection_select_and_include_rules() {
    let client = seeded_tags().await;

    let rows = client
        .tag()
        .find_many_projected(
            FindManyArgs::new().filter(Filter::eq("category", "Technique")),
            Projection::select(vec!["label", "category"]),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.fields.len(), 2);
        assert!(row.fields.get("id").is_none());
        assert!(row.relations.is_empty());
    }

    // select and include on the same operation is rejected up front
    let err = client
        .tag()
        .find_many_projected(
            FindManyArgs::new(),
            Projection::select(vec!["label"]).with_include("exercices"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
}

#[tokio::test]
async fn malformed_filters_fail_before_storage() {
    let client = seeded_tags().await;
    let repo = client.tag();

    assert!(matches!(
        repo.count(Some(Filter::eq("libelle", "x"))).await.unwrap_err(),
        OrmError::Validation(_)
    ));
    assert!(matches!(
        repo.count(Some(Filter::gt("label", 3i64))).await.unwrap_err(),
        OrmError::Validation(_)
    ));
    assert!(matches!(
        repo.count(Some(Filter::contains("level", "2"))).await.unwrap_err(),
        OrmError::Validation(_)
    ));
    assert!(matches!(
        repo.find_many(FindManyArgs::new().order_by(OrderBy::asc("libelle")))
            .await
            .unwrap_err(),
        OrmError::Validation(_)
    ));
    assert!(matches!(
        repo.find_many(FindManyArgs::new().distinct(vec!["libelle"]))
            .await
            .unwrap_err(),
        OrmError::Validation(_)
    ));
}
