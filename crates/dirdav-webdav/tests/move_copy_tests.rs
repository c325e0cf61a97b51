//! MOVE and COPY tests for the WebDAV server.

mod common;

use common::{assert_dir_entries, assert_file_content, assert_not_found, assert_status, TestServer};
use reqwest::StatusCode;

// ============================================================================
// MOVE
// ============================================================================

#[tokio::test]
async fn test_move_file_rename() {
    let server = TestServer::with_temp_dir().await;
    server.put_ok("/a.txt", b"payload".to_vec()).await;

    let resp = server.move_("/a.txt", "/b.txt", false).await;
    assert_status(resp.status(), StatusCode::CREATED, "MOVE /a.txt");

    assert_not_found(&server, "/a.txt").await;
    assert_file_content(&server, "/b.txt", b"payload").await;
}

#[tokio::test]
async fn test_move_file_into_directory() {
    let server = TestServer::with_temp_dir().await;
    server.mkcol_ok("/dest").await;
    server.put_ok("/a.txt", b"payload".to_vec()).await;

    let resp = server.move_("/a.txt", "/dest/a.txt", false).await;
    assert!(resp.status().is_success(), "MOVE failed: {}", resp.status());

    assert!(server.root().join("dest/a.txt").is_file());
    assert!(!server.root().join("a.txt").exists());
}

#[tokio::test]
async fn test_move_directory_with_contents() {
    let server = TestServer::with_temp_dir().await;
    server.mkcol_ok("/src").await;
    server.mkcol_ok("/src/inner").await;
    server.put_ok("/src/inner/f.txt", b"inner".to_vec()).await;

    let resp = server.move_("/src", "/moved", false).await;
    assert!(resp.status().is_success(), "MOVE failed: {}", resp.status());

    assert_file_content(&server, "/moved/inner/f.txt", b"inner").await;
    assert!(!server.root().join("src").exists());
}

#[tokio::test]
async fn test_move_no_overwrite_fails() {
    let server = TestServer::with_temp_dir().await;
    server.put_ok("/a.txt", b"a".to_vec()).await;
    server.put_ok("/b.txt", b"b".to_vec()).await;

    let resp = server.move_("/a.txt", "/b.txt", false).await;
    assert_status(resp.status(), StatusCode::PRECONDITION_FAILED, "MOVE onto existing");

    assert_file_content(&server, "/a.txt", b"a").await;
    assert_file_content(&server, "/b.txt", b"b").await;
}

#[tokio::test]
async fn test_move_nonexistent() {
    let server = TestServer::with_temp_dir().await;

    let resp = server.move_("/ghost.txt", "/b.txt", false).await;
    assert_status(resp.status(), StatusCode::NOT_FOUND, "MOVE missing source");
}

#[tokio::test]
async fn test_move_locked_source_refused() {
    let server = TestServer::with_temp_dir().await;
    server.put_ok("/a.txt", b"a".to_vec()).await;
    server.lock_ok("/a.txt").await;

    let resp = server.move_("/a.txt", "/b.txt", false).await;
    assert_status(resp.status(), StatusCode::LOCKED, "MOVE of locked item");
    assert!(server.root().join("a.txt").exists());
}

// ============================================================================
// COPY
// ============================================================================

#[tokio::test]
async fn test_copy_file() {
    let server = TestServer::with_temp_dir().await;
    server.put_ok("/orig.txt", b"copy me".to_vec()).await;

    let resp = server.copy("/orig.txt", "/dup.txt", false).await;
    assert_status(resp.status(), StatusCode::CREATED, "COPY /orig.txt");

    assert_file_content(&server, "/orig.txt", b"copy me").await;
    assert_file_content(&server, "/dup.txt", b"copy me").await;
}

#[tokio::test]
async fn test_copy_directory_recursive() {
    let server = TestServer::with_temp_dir().await;
    server.mkcol_ok("/tree").await;
    server.mkcol_ok("/tree/sub").await;
    server.put_ok("/tree/top.txt", b"top".to_vec()).await;
    server.put_ok("/tree/sub/leaf.txt", b"leaf".to_vec()).await;

    let resp = server.copy("/tree", "/clone", false).await;
    assert!(resp.status().is_success(), "COPY failed: {}", resp.status());

    assert_dir_entries(&server, "/clone/", &["/clone/top.txt", "/clone/sub"]).await;
    assert_file_content(&server, "/clone/sub/leaf.txt", b"leaf").await;
    assert_file_content(&server, "/tree/sub/leaf.txt", b"leaf").await;
}

#[tokio::test]
async fn test_copy_overwrite_replaces() {
    let server = TestServer::with_temp_dir().await;
    server.put_ok("/a.txt", b"new".to_vec()).await;
    server.put_ok("/b.txt", b"old content".to_vec()).await;

    let resp = server.copy("/a.txt", "/b.txt", true).await;
    assert!(resp.status().is_success(), "COPY failed: {}", resp.status());

    assert_file_content(&server, "/b.txt", b"new").await;
}

#[tokio::test]
async fn test_copy_into_missing_parent_conflicts() {
    let server = TestServer::with_temp_dir().await;
    server.put_ok("/a.txt", b"a".to_vec()).await;

    let resp = server.copy("/a.txt", "/nowhere/a.txt", false).await;
    assert!(!resp.status().is_success(), "COPY into missing parent must fail");
}
