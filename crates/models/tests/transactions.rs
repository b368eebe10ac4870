//! Interactive transaction semantics over the memory engine

use std::time::Duration;

use courtside_models::{
    CourtsideClient, Filter, IsolationLevel, OrmError, OrmResult, Tag, TransactionOptions,
};

async fn client() -> CourtsideClient {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    CourtsideClient::connect_memory().await.unwrap()
}

#[tokio::test]
async fn atomicity_none_of_the_effects_survive_a_failure() {
    let client = client().await;
    client
        .tag()
        .create(Tag::new("Endurance", "Physique"))
        .await
        .unwrap();

    // operation A succeeds, operation B violates a constraint
    let result: OrmResult<()> = client
        .transaction(|tx| async move {
            tx.tag().create(Tag::new("Vitesse", "Physique")).await?;
            tx.tag().create(Tag::new("Endurance", "Physique")).await?;
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(OrmError::UniqueViolation { .. })));

    // neither A's nor B's effects are visible
    assert_eq!(client.tag().count(None).await.unwrap(), 1);
    assert_eq!(
        client
            .tag()
            .count(Some(Filter::eq("label", "Vitesse")))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn committed_effects_become_visible_together() {
    let client = client().await;
    let created = client
        .transaction(|tx| async move {
            let a = tx.tag().create(Tag::new("Endurance", "Physique")).await?;
            let b = tx.tag().create(Tag::new("Bloc", "Technique")).await?;
            Ok((a, b))
        })
        .await
        .unwrap();
    assert!(created.0.id.is_some());
    assert_eq!(client.tag().count(None).await.unwrap(), 2);
}

#[tokio::test]
async fn body_timeout_aborts_and_rolls_back() {
    let client = client().await;
    let options = TransactionOptions::default().timeout(Duration::from_millis(40));
    let result: OrmResult<()> = client
        .transaction_with(options, |tx| async move {
            tx.tag().create(Tag::new("Endurance", "Physique")).await?;
            tokio::time::sleep(Duration::from_millis(250)).await;
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(OrmError::Transaction(_))));
    assert_eq!(client.tag().count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn acquisition_respects_max_wait() {
    let client = client().await;
    let blocker = client.clone();

    // hold a transaction open long enough for the second one to give up
    let hold = tokio::spawn(async move {
        blocker
            .transaction(|tx| async move {
                tx.tag().create(Tag::new("Endurance", "Physique")).await?;
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    let options = TransactionOptions::default().max_wait(Duration::from_millis(20));
    let result: OrmResult<()> = client
        .transaction_with(options, |_tx| async move { Ok(()) })
        .await;
    assert!(matches!(result, Err(OrmError::Transaction(_))));

    hold.await.unwrap().unwrap();
    assert_eq!(client.tag().count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn isolation_level_is_accepted_per_transaction() {
    let client = client().await;
    let options = TransactionOptions::default()
        .isolation_level(IsolationLevel::Serializable)
        .timeout(Duration::from_millis(2000));
    client
        .transaction_with(options, |tx| async move {
            tx.tag().create(Tag::new("Endurance", "Physique")).await?;
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(client.tag().count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn operations_outside_the_window_fail_with_initialization() {
    let client = CourtsideClient::builder().build().unwrap();
    let err = client.tag().count(None).await.unwrap_err();
    assert!(matches!(err, OrmError::Initialization(_)));

    client.connect().await.unwrap();
    client.tag().create(Tag::new("Endurance", "Physique")).await.unwrap();
    client.disconnect().await.unwrap();

    let err = client.tag().count(None).await.unwrap_err();
    assert!(matches!(err, OrmError::Initialization(_)));
}
