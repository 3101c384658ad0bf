//! End-to-end tests for reference counting and orphan collection

mod common;

use common::{wav_bytes, TestClient, TestServer, LIBRARY_1_ID, LIBRARY_2_ID};
use phonoteca_server::lifecycle::OrphanSweeper;
use phonoteca_server::{ContentHash, LibraryStore, ObjectStore};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

async fn upload(client: &TestClient, library_id: &str, payload: Vec<u8>) -> Value {
    let response = client
        .upload_song(library_id, "track.wav", "audio/wav", payload, &[])
        .await;
    assert!(
        response.status() == StatusCode::CREATED || response.status() == StatusCode::OK,
        "unexpected status {}",
        response.status()
    );
    response.json().await.unwrap()
}

fn sweeper_for(server: &TestServer) -> OrphanSweeper {
    OrphanSweeper::new(
        server.object_store.clone(),
        server.library_store.clone(),
        Duration::from_secs(0),
    )
}

#[tokio::test]
async fn test_reference_count_follows_song_lifecycle() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let payload = wav_bytes(8000, 4000);
    let first = upload(&client, LIBRARY_1_ID, payload.clone()).await;
    let second = upload(&client, LIBRARY_2_ID, payload.clone()).await;
    assert_eq!(first["hash"], second["hash"]);

    let hash = ContentHash::from_hex(first["hash"].as_str().unwrap()).unwrap();
    let file = server.library_store.find_file_by_hash(&hash).unwrap().unwrap();
    assert_eq!(file.reference_count, 2);

    // Delete one song: count drops to 1 and the object survives.
    let response = client
        .delete_song(first["songId"].as_str().unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["remainingReferences"], 1);

    let file = server.library_store.find_file_by_hash(&hash).unwrap().unwrap();
    assert_eq!(file.reference_count, 1);

    // Delete the last song: count reaches zero, eligible for collection.
    let response = client
        .delete_song(second["songId"].as_str().unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["remainingReferences"], 0);

    let file = server.library_store.find_file_by_hash(&hash).unwrap().unwrap();
    assert_eq!(file.reference_count, 0);

    // Not collected yet: deletion is deferred to the sweeper.
    assert_eq!(server.stored_objects().await.len(), 1);
}

#[tokio::test]
async fn test_sweep_collects_orphaned_file_and_object() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let uploaded = upload(&client, LIBRARY_1_ID, wav_bytes(8000, 2000)).await;
    let song_id = uploaded["songId"].as_str().unwrap();
    let hash = ContentHash::from_hex(uploaded["hash"].as_str().unwrap()).unwrap();

    client.delete_song(song_id).await;

    let report = sweeper_for(&server).sweep_once().await.unwrap();
    assert_eq!(report.files_collected, 1);

    assert!(server.stored_objects().await.is_empty());
    assert!(server
        .library_store
        .find_file_by_hash(&hash)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_sweep_spares_referenced_files() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let kept = upload(&client, LIBRARY_1_ID, wav_bytes(8000, 1000)).await;
    let doomed = upload(&client, LIBRARY_2_ID, wav_bytes(8000, 3000)).await;
    client.delete_song(doomed["songId"].as_str().unwrap()).await;

    let report = sweeper_for(&server).sweep_once().await.unwrap();
    assert_eq!(report.files_collected, 1);

    // The kept song still streams.
    let response = client
        .stream_song(kept["songId"].as_str().unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(server.stored_objects().await.len(), 1);
}

#[tokio::test]
async fn test_deleted_song_is_gone_from_the_api() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let uploaded = upload(&client, LIBRARY_1_ID, wav_bytes(8000, 1000)).await;
    let song_id = uploaded["songId"].as_str().unwrap();

    client.delete_song(song_id).await;

    assert_eq!(client.get_song(song_id).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        client.stream_song(song_id).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        client.delete_song(song_id).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_reupload_after_collection_stores_again() {
    let server = TestServer::spawn().await;
    let client = TestClient::authenticated(server.base_url.clone());

    let payload = wav_bytes(8000, 6000);
    let uploaded = upload(&client, LIBRARY_1_ID, payload.clone()).await;
    client
        .delete_song(uploaded["songId"].as_str().unwrap())
        .await;
    sweeper_for(&server).sweep_once().await.unwrap();
    assert!(server.stored_objects().await.is_empty());

    // The content is genuinely gone, so the re-upload is a fresh store.
    let reuploaded = upload(&client, LIBRARY_1_ID, payload).await;
    assert_eq!(reuploaded["hash"], uploaded["hash"]);
    assert_eq!(server.stored_objects().await.len(), 1);
}

#[tokio::test]
async fn test_sweep_removes_stale_temp_objects_only() {
    let server = TestServer::spawn().await;

    // Simulate crash debris from an interrupted upload.
    server
        .object_store
        .put_object("temp/debris", bytes::Bytes::from_static(b"interrupted"))
        .await
        .unwrap();

    // With a very long staleness threshold nothing is collected...
    let patient = OrphanSweeper::new(
        server.object_store.clone(),
        server.library_store.clone(),
        Duration::from_secs(3600),
    );
    let report = patient.sweep_once().await.unwrap();
    assert_eq!(report.temp_objects_removed, 0);

    // ...while a zero threshold collects it.
    let report = sweeper_for(&server).sweep_once().await.unwrap();
    assert_eq!(report.temp_objects_removed, 1);
    assert!(server.temp_objects().await.is_empty());
}
