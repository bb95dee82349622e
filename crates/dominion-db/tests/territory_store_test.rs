//! PostgreSQL integration tests for the territory stores.
//!
//! These need a live database (`DATABASE_URL`), so they are ignored by
//! default: `cargo test -p dominion-db -- --ignored`.

use dominion_core::{
    Activity, ActivityStore, BatchCommitter, CellId, CellVisit, Credential, CredentialRepository,
    InfluenceLedger, PendingActivity, PendingBatch,
};
use dominion_db::test_fixtures::TestDatabase;

fn visit(cell: &str, count: u32) -> CellVisit {
    CellVisit {
        cell_id: CellId::new(cell),
        count,
    }
}

fn external_id() -> i64 {
    // Unique per run so parallel tests never collide on the unique index
    (uuid::Uuid::new_v4().as_u128() % (i64::MAX as u128)) as i64
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_insert_if_absent_is_atomic_per_external_id() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::new().await;
    let user = test_db.user();
    let ext = external_id();

    let first = Activity::new(user, Some(ext), "_p~iF~ps|U");
    let second = Activity::new(user, Some(ext), "_p~iF~ps|U");

    assert!(test_db.db.activities.insert_if_absent(&first).await.unwrap());
    assert!(!test_db.db.activities.insert_if_absent(&second).await.unwrap());
    assert!(test_db.db.activities.exists(ext).await.unwrap());
    assert_eq!(test_db.db.activities.count_for_user(user).await.unwrap(), 1);

    let fetched = ActivityStore::get(&test_db.db.activities, first.id)
        .await
        .unwrap()
        .expect("activity stored");
    assert_eq!(fetched.external_id, Some(ext));

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_manual_activities_never_conflict() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::new().await;
    let user = test_db.user();

    for _ in 0..2 {
        let manual = Activity::new(user, None, "_p~iF~ps|U");
        assert!(test_db.db.activities.insert_if_absent(&manual).await.unwrap());
    }
    assert_eq!(test_db.db.activities.count_for_user(user).await.unwrap(), 2);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_upsert_increment_accumulates() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::new().await;
    let user = test_db.user();
    let cell = CellId::new("89283082837ffff");

    let created = test_db
        .db
        .influence
        .upsert_increment(&cell, user, 2.0)
        .await
        .unwrap();
    assert_eq!(created.influence, 2.0);

    let updated = test_db
        .db
        .influence
        .upsert_increment(&cell, user, 3.0)
        .await
        .unwrap();
    assert_eq!(updated.influence, 5.0);

    let stats = test_db.db.influence.user_stats(user).await.unwrap();
    assert_eq!(stats.cells, 1);
    assert_eq!(stats.total_influence, 5.0);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_batch_commit_applies_only_winning_activities() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::new().await;
    let user = test_db.user();
    let taken = external_id();

    test_db
        .db
        .activities
        .save(Activity::new(user, Some(taken), "x"))
        .await
        .unwrap();

    let winner = Activity::new(user, Some(external_id()), "a");
    let loser = Activity::new(user, Some(taken), "b");
    let batch = PendingBatch {
        activities: vec![
            PendingActivity {
                activity: winner.clone(),
                visits: vec![visit("cell-a", 2), visit("cell-b", 1)],
            },
            PendingActivity {
                activity: loser.clone(),
                visits: vec![visit("cell-a", 10)],
            },
        ],
    };

    let receipt = test_db.db.commits.commit(batch).await.unwrap();
    assert_eq!(receipt.committed, vec![winner.id]);
    assert_eq!(receipt.duplicates, vec![loser.id]);

    let a = InfluenceLedger::get(&test_db.db.influence, &CellId::new("cell-a"), user)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(a.influence, 2.0);

    test_db.cleanup().await;
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_credential_upsert_and_lookup_by_athlete() {
    dotenvy::dotenv().ok();
    let test_db = TestDatabase::new().await;
    let user = test_db.user();
    let athlete = external_id();

    let mut cred = Credential {
        user_id: user,
        athlete_id: Some(athlete),
        access_token: "access-1".into(),
        refresh_token: "refresh-1".into(),
        expires_at: 1_000,
    };
    test_db.db.credentials.upsert(&cred).await.unwrap();

    cred.access_token = "access-2".into();
    cred.athlete_id = None;
    test_db.db.credentials.upsert(&cred).await.unwrap();

    let found = test_db
        .db
        .credentials
        .find_by_athlete(athlete)
        .await
        .unwrap()
        .expect("athlete id kept on refresh");
    assert_eq!(found.access_token, "access-2");

    test_db.cleanup().await;
}
