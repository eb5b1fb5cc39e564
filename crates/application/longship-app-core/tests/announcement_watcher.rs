use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use longship_app_core::{AnnouncementWatcher, UpdateEvent};
use longship_infra::{default_http_client, ServerUrls};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Serves the announcement the way the sync server does: an empty body when the
/// client already holds the current hash.
#[derive(Default)]
struct Board {
    content: Mutex<String>,
    hashes_seen: Mutex<Vec<Option<String>>>,
}

async fn announcement(
    State(board): State<Arc<Board>>,
    Query(q): Query<HashMap<String, String>>,
) -> String {
    let content = board.content.lock().unwrap().clone();
    let hash = format!("h{}", content.len());
    let sent = q.get("hash").cloned();
    board.hashes_seen.lock().unwrap().push(sent.clone());
    if sent.as_deref() == Some(hash.as_str()) {
        format!(r#"{{"content":"","hash":"{hash}"}}"#)
    } else {
        format!(r#"{{"content":"{content}","hash":"{hash}"}}"#)
    }
}

async fn serve(board: Arc<Board>) -> ServerUrls {
    let app = Router::new()
        .route("/announcement", get(announcement))
        .with_state(board);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    ServerUrls::from_base(Url::parse(&format!("http://{addr}/")).unwrap()).unwrap()
}

#[tokio::test]
async fn unchanged_announcement_is_kept_via_hash() {
    let board = Arc::new(Board::default());
    *board.content.lock().unwrap() = "Server restart at 20:00".into();
    let urls = serve(board.clone()).await;

    let mut watcher = AnnouncementWatcher::new(default_http_client().unwrap(), urls, 0);
    assert_eq!(watcher.poll().await.as_deref(), Some("Server restart at 20:00"));
    assert_eq!(watcher.poll().await.as_deref(), Some("Server restart at 20:00"));

    let hashes = board.hashes_seen.lock().unwrap().clone();
    assert_eq!(hashes, vec![None, Some("h23".to_string())]);
}

#[tokio::test]
async fn cleared_announcement_hides_the_panel() {
    let board = Arc::new(Board::default());
    *board.content.lock().unwrap() = "hello".into();
    let urls = serve(board.clone()).await;

    let mut watcher = AnnouncementWatcher::new(default_http_client().unwrap(), urls, 0);
    assert_eq!(watcher.poll().await.as_deref(), Some("hello"));

    board.content.lock().unwrap().clear();
    assert_eq!(watcher.poll().await, None);
    assert_eq!(watcher.board().visible(), None);
}

#[tokio::test]
async fn unreachable_server_publishes_hidden_once() {
    let urls = ServerUrls::from_base(Url::parse("http://127.0.0.1:9/").unwrap()).unwrap();
    let watcher = AnnouncementWatcher::new(default_http_client().unwrap(), urls, 0);
    let (tx, mut rx) = mpsc::channel(8);

    watcher.run(tx, CancellationToken::new()).await;

    assert_eq!(rx.recv().await, Some(UpdateEvent::Announcement(None)));
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn watcher_stops_on_cancel() {
    let board = Arc::new(Board::default());
    *board.content.lock().unwrap() = "hi".into();
    let urls = serve(board).await;

    let watcher = AnnouncementWatcher::new(default_http_client().unwrap(), urls, 3600);
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(watcher.run(tx, cancel.clone()));

    assert_eq!(
        rx.recv().await,
        Some(UpdateEvent::Announcement(Some("hi".into())))
    );
    cancel.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .expect("watcher must stop when cancelled")
        .unwrap();
}
