//! Drives the full router over the in-memory store with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use api_lib::web::{api_router, AppState};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use branchtale_core::domain::Role;
use branchtale_core::memory::InMemoryStore;
use branchtale_core::service::ChapterService;
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    store: Arc<InMemoryStore>,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let service = ChapterService::new(store.clone().into_ports(), 20);
        let state = Arc::new(AppState::new(service, store.clone()));
        Self {
            router: api_router(state),
            store,
        }
    }

    async fn session(&self, name: &str, role: Role) -> String {
        let viewer = self.store.register_user(name, role).await;
        self.store.open_session(&viewer.id).await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        session: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = session {
            builder = builder.header(header::COOKIE, format!("session={}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn new_story(&self, session: &str, title: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/stories",
                Some(session),
                Some(json!({ "storyTitle": title, "bodyText": "Once upon a time." })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["chapterId"].as_str().unwrap().to_string()
    }

    async fn continue_story(&self, session: &str, parent: &str, title: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                &format!("/chapters/{}/continuations", parent),
                Some(session),
                Some(json!({ "chapterTitle": title, "bodyText": "And then." })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["chapterId"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn anonymous_readers_see_no_viewer_flags() {
    let app = TestApp::new();
    let alice = app.session("alice", Role::User).await;
    let story = app.new_story(&alice, "The Well").await;

    let (status, body) = app
        .send(Method::GET, &format!("/chapters/{}", story), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storyTitle"], "The Well");
    assert!(body.get("likedByViewer").is_none());
    assert_eq!(body["continuationChapters"], json!([]));

    let (_, body) = app
        .send(Method::GET, &format!("/chapters/{}", story), Some(&alice), None)
        .await;
    assert_eq!(body["likedByViewer"], false);
    assert_eq!(body["bookmarkedByViewer"], false);
}

#[tokio::test]
async fn unknown_session_cookie_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .send(Method::GET, "/chapters", Some("not-a-session"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn writing_requires_a_session() {
    let app = TestApp::new();
    let (status, _) = app
        .send(
            Method::POST,
            "/stories",
            None,
            Some(json!({ "storyTitle": "T", "bodyText": "B" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_body_text_is_a_bad_request() {
    let app = TestApp::new();
    let alice = app.session("alice", Role::User).await;
    let (status, body) = app
        .send(
            Method::POST,
            "/stories",
            Some(&alice),
            Some(json!({ "storyTitle": "T" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Body text is required.");
}

#[tokio::test]
async fn malformed_ids_and_queries_are_bad_requests() {
    let app = TestApp::new();

    let (status, body) = app
        .send(Method::GET, "/chapters/not-an-id", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid chapter id 'not-an-id'.");

    let (status, _) = app
        .send(Method::GET, "/chapters?search=o:Xx", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send(Method::GET, "/chapters?page=0", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn listing_filters_and_pages() {
    let app = TestApp::new();
    let alice = app.session("alice", Role::User).await;
    let root = app.new_story(&alice, "Dragons").await;
    app.continue_story(&alice, &root, "Wings").await;
    app.new_story(&alice, "Sea").await;

    let (status, body) = app
        .send(Method::GET, "/chapters?storiesOnly=true&search=o:sA", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["page"], 1);
    assert_eq!(body["pageSize"], 20);
    let titles: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["storyTitle"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Dragons", "Sea"]);

    let (_, body) = app.send(Method::GET, "/chapters", None, None).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 3);

    let (_, body) = app
        .send(Method::GET, "/chapters?search=c:wing", None, None)
        .await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["previousChapterId"], root.as_str());
}

#[tokio::test]
async fn liking_twice_conflicts_and_counts_once() {
    let app = TestApp::new();
    let alice = app.session("alice", Role::User).await;
    let bob = app.session("bob", Role::User).await;
    let story = app.new_story(&alice, "The Well").await;
    let like = format!("/chapters/{}/like", story);

    let (status, _) = app.send(Method::POST, &like, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send(Method::POST, &like, Some(&bob), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app
        .send(Method::GET, &format!("/chapters/{}", story), Some(&bob), None)
        .await;
    assert_eq!(body["likeCount"], 1);
    assert_eq!(body["likedByViewer"], true);

    let (status, _) = app.send(Method::DELETE, &like, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send(Method::DELETE, &like, Some(&bob), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chain_runs_from_root_to_leaf() {
    let app = TestApp::new();
    let alice = app.session("alice", Role::User).await;
    let a = app.new_story(&alice, "The Well").await;
    let b = app.continue_story(&alice, &a, "Down").await;
    let c = app.continue_story(&alice, &b, "Further").await;

    let (status, body) = app
        .send(Method::GET, &format!("/chapters/{}/chain", c), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["chapterId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![a.as_str(), b.as_str(), c.as_str()]);
}

#[tokio::test]
async fn moderator_deletes_a_subtree() {
    let app = TestApp::new();
    let alice = app.session("alice", Role::User).await;
    let moderator = app.session("mod", Role::Moderator).await;
    let a = app.new_story(&alice, "The Well").await;
    let b = app.continue_story(&alice, &a, "Down").await;
    app.continue_story(&alice, &b, "Further").await;

    let (status, _) = app
        .send(Method::DELETE, &format!("/chapters/{}", b), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(Method::DELETE, &format!("/chapters/{}", b), Some(&moderator), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 2);

    let (status, _) = app
        .send(Method::GET, &format!("/chapters/{}", b), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.store.chapter_count().await, 1);
}

#[tokio::test]
async fn keyword_changes_apply_for_owners_and_queue_for_others() {
    let app = TestApp::new();
    let alice = app.session("alice", Role::User).await;
    let bob = app.session("bob", Role::User).await;
    let story = app.new_story(&alice, "The Well").await;
    let keywords = format!("/chapters/{}/keywords", story);

    let (status, body) = app
        .send(Method::POST, &keywords, Some(&alice), Some(json!(["dark", "well"])))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keywords"], json!(["dark", "well"]));

    let (status, body) = app
        .send(Method::POST, &keywords, Some(&bob), Some(json!(["wet"])))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["action"], "add");
    assert_eq!(app.store.keyword_requests().await.len(), 1);

    let (status, _) = app
        .send(Method::DELETE, &format!("{}/dark", keywords), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = app
        .send(Method::DELETE, &format!("{}/dark", keywords), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keywords"], json!(["well"]));

    let (status, _) = app
        .send(Method::POST, &keywords, Some(&alice), Some(json!({ "k": "v" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn flags_are_open_to_all_and_reviewed_by_moderators() {
    let app = TestApp::new();
    let alice = app.session("alice", Role::User).await;
    let admin = app.session("root", Role::Admin).await;
    let story = app.new_story(&alice, "The Well").await;

    let (status, flag) = app
        .send(
            Method::POST,
            &format!("/chapters/{}/flags", story),
            None,
            Some(json!({ "reason": "spam" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(flag["userId"].is_null());

    let (status, _) = app.send(Method::GET, "/flags", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send(Method::GET, "/flags", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let flag_path = format!("/flags/{}", flag["id"].as_str().unwrap());
    let (status, _) = app.send(Method::DELETE, &flag_path, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.send(Method::DELETE, &flag_path, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
