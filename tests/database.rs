//! Integration tests against a real Postgres instance, spun up with
//! `postgres-docker-utils` the way the teacher's `tests/*.rs` do.

use anchor_sequencer::database::methods::DbMethods;
use anchor_sequencer::database::types::RequestStatus;
use anchor_sequencer::database::Database;
use test_utils::random_cid;

async fn setup() -> (postgres_docker_utils::DockerContainerGuard, Database) {
    let db_container = postgres_docker_utils::setup().await.unwrap();
    let port = db_container.port();
    let db_url = format!("postgres://postgres@localhost:{port}/postgres");
    let database = Database::new(&db_url, 5).await.unwrap();
    (db_container, database)
}

async fn insert_pending_request(db: &Database, stream_id: cid::Cid, cid: cid::Cid) -> i64 {
    let row: (i64,) = sqlx::query_as("INSERT INTO requests (stream_id, cid) VALUES ($1, $2) RETURNING id")
        .bind(stream_id.to_string())
        .bind(cid.to_string())
        .fetch_one(db.pool())
        .await
        .unwrap();
    row.0
}

#[tokio::test]
async fn find_and_mark_ready_promotes_pending_requests() {
    let (_container, db) = setup().await;

    insert_pending_request(&db, random_cid(), random_cid()).await;
    insert_pending_request(&db, random_cid(), random_cid()).await;

    let promoted = db.find_and_mark_ready(1, 10).await.unwrap();
    assert_eq!(promoted.len(), 2);
    assert!(promoted.iter().all(|r| r.status == RequestStatus::Ready));

    let ready_count = db.count_by_status(RequestStatus::Ready).await.unwrap();
    assert_eq!(ready_count, 2);
}

#[tokio::test]
async fn find_and_mark_ready_respects_the_minimum() {
    let (_container, db) = setup().await;

    insert_pending_request(&db, random_cid(), random_cid()).await;

    let promoted = db.find_and_mark_ready(5, 10).await.unwrap();
    assert!(promoted.is_empty());

    let pending_count = db.count_by_status(RequestStatus::Pending).await.unwrap();
    assert_eq!(pending_count, 1);
}

#[tokio::test]
async fn batch_processing_claims_ready_requests_exactly_once() {
    let (_container, db) = setup().await;

    insert_pending_request(&db, random_cid(), random_cid()).await;
    insert_pending_request(&db, random_cid(), random_cid()).await;
    db.find_and_mark_ready(1, 10).await.unwrap();

    let claimed = db.batch_processing(1, 10).await.unwrap();
    assert_eq!(claimed.len(), 2);
    assert!(claimed.iter().all(|r| r.status == RequestStatus::Processing));

    // Already claimed, so a second call sees nothing left to take.
    let claimed_again = db.batch_processing(1, 10).await.unwrap();
    assert!(claimed_again.is_empty());
}

#[tokio::test]
async fn update_requests_marks_completed_and_pins() {
    let (_container, db) = setup().await;

    let id = insert_pending_request(&db, random_cid(), random_cid()).await;
    let request_id = anchor_sequencer::database::types::RequestId(id);

    db.update_requests(&[request_id], RequestStatus::Completed, Some("done"), true)
        .await
        .unwrap();

    let completed_count = db.count_by_status(RequestStatus::Completed).await.unwrap();
    assert_eq!(completed_count, 1);
}

#[tokio::test]
async fn find_requests_to_garbage_collect_skips_pinned_streams() {
    let (_container, db) = setup().await;

    let live_stream = random_cid();
    insert_pending_request(&db, live_stream, random_cid()).await;

    let pinned_stream = random_cid();
    let pinned_id = insert_pending_request(&db, pinned_stream, random_cid()).await;
    db.update_requests(
        &[anchor_sequencer::database::types::RequestId(pinned_id)],
        RequestStatus::Completed,
        None,
        true,
    )
    .await
    .unwrap();

    let collectible_stream = random_cid();
    let collectible_id = insert_pending_request(&db, collectible_stream, random_cid()).await;
    db.update_requests(
        &[anchor_sequencer::database::types::RequestId(collectible_id)],
        RequestStatus::Failed,
        Some("gone"),
        false,
    )
    .await
    .unwrap();

    let collectible = db.find_requests_to_garbage_collect().await.unwrap();
    assert!(!collectible.contains(&pinned_stream));
    assert!(!collectible.contains(&live_stream));
    assert!(collectible.contains(&collectible_stream));
}
