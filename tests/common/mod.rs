//! Common test helpers for integration tests.
//!
//! Every test gets its own router over a fresh [`InMemoryStore`] with two
//! users, `alice` and `bob`, and one task owned by `alice`.
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate, and not every file uses every
//! helper.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use tasks_api::api::{AppState, create_router};
use tasks_api::domain::{NewTask, NewUser, Task, User};
use tasks_api::infrastructure::{
    InMemoryStore, Repositories, TaskRepository, UserRepository,
};

pub const ALICE_TOKEN: &str = "alice-token";
pub const BOB_TOKEN: &str = "bob-token";

pub struct TestApp {
    pub router: Router,
    pub store: InMemoryStore,
    pub alice: User,
    pub bob: User,
    /// `First task`, owned by alice.
    pub task: Task,
}

impl TestApp {
    /// Sends one request through a clone of the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Reads a task straight from the store.
    pub async fn stored_task(&self, task: &Task) -> Task {
        TaskRepository::find_by_id(&self.store, task.id)
            .await
            .unwrap()
            .unwrap()
    }

    /// `GET /tasks/{id}` and returns the `ETag` header.
    pub async fn etag(&self, task: &Task) -> String {
        let response = self
            .send(
                Request::builder()
                    .uri(format!("/tasks/{}", task.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        response
            .headers()
            .get(header::ETAG)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }
}

pub async fn create_test_app() -> TestApp {
    let store = InMemoryStore::new();
    let alice = UserRepository::insert(&store, NewUser::new("alice", ALICE_TOKEN))
        .await
        .unwrap();
    let bob = UserRepository::insert(&store, NewUser::new("bob", BOB_TOKEN))
        .await
        .unwrap();
    let task = create_task(&store, &alice, "First task", Some("This is the first task")).await;

    let router = create_router(AppState::from_repositories(Repositories::from_store(
        store.clone(),
    )));
    TestApp {
        router,
        store,
        alice,
        bob,
        task,
    }
}

pub async fn create_task(
    store: &InMemoryStore,
    owner: &User,
    name: &str,
    description: Option<&str>,
) -> Task {
    TaskRepository::insert(
        store,
        NewTask {
            owner: owner.id,
            name: name.to_string(),
            description: description.map(str::to_string),
            progression: 0,
        },
    )
    .await
    .unwrap()
}

pub fn authorization(token: &str) -> String {
    format!("Token {token}")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}
