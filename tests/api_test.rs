//! End-to-end tests of the HTTP surface over the in-memory store

use std::sync::Arc;

use serde_json::{json, Value};
use warp::http::StatusCode;

use team_agenda::auth::password::hash_password;
use team_agenda::config::ServerConfig;
use team_agenda::constants::ADMIN_ROLE_ID;
use team_agenda::handlers::{routes, AppState, SharedState};
use team_agenda::storage::{
    EventDraft, GroupDraft, GroupStorage, EventStorage, MembershipStorage, MemoryStorage, NewUser,
    RoleDraft, RoleStorage, UserStorage,
};

struct TestApp {
    state: SharedState,
    store: Arc<MemoryStorage>,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(MemoryStorage::new());
        let state = AppState::new(ServerConfig::for_testing(), store.clone()).shared();
        Self { state, store }
    }

    async fn user(&self, username: &str, password: &str, role_id: u64) -> u64 {
        self.store
            .create_user(NewUser {
                username: username.to_string(),
                password_hash: hash_password(password).unwrap(),
                role_id,
                groups: Vec::new(),
            })
            .await
            .unwrap()
    }

    async fn role(&self, label: &str, permission: &str) -> u64 {
        self.store
            .create_role(RoleDraft {
                label: label.to_string(),
                permission: permission.to_string(),
            })
            .await
            .unwrap()
    }

    async fn group(&self, label: &str) -> u64 {
        self.store
            .create_group(GroupDraft {
                label: label.to_string(),
                color: "#3366ff".to_string(),
            })
            .await
            .unwrap()
    }

    fn bearer(&self, user_id: u64) -> String {
        format!("Bearer {}", self.state.tokens.issue(user_id).unwrap())
    }

    async fn send(&self, request: warp::test::RequestBuilder) -> (StatusCode, Value) {
        let api = routes(self.state.clone());
        let response = request.reply(&api).await;
        let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
        (response.status(), body)
    }
}

fn get(path: &str, auth: &str) -> warp::test::RequestBuilder {
    warp::test::request()
        .method("GET")
        .path(path)
        .header("authorization", auth)
}

fn with_body(method: &str, path: &str, auth: &str, body: Value) -> warp::test::RequestBuilder {
    warp::test::request()
        .method(method)
        .path(path)
        .header("authorization", auth)
        .json(&body)
}

#[tokio::test]
async fn test_login_returns_usable_token() {
    let app = TestApp::new();
    let id = app.user("alice", "s3cret-pass", ADMIN_ROLE_ID).await;

    let (status, body) = app
        .send(
            warp::test::request()
                .method("POST")
                .path("/login")
                .json(&json!({"username": "alice", "password": "s3cret-pass"})),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], false);
    assert_eq!(body["messages"]["en"], "Login successful");
    let token = body["data"]["token"].as_str().unwrap();
    assert_eq!(app.state.tokens.verify(token).unwrap(), id);
}

#[tokio::test]
async fn test_login_failures() {
    let app = TestApp::new();
    app.user("alice", "s3cret-pass", ADMIN_ROLE_ID).await;

    let (status, body) = app
        .send(
            warp::test::request()
                .method("POST")
                .path("/login")
                .json(&json!({"username": "alice", "password": "wrong"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], true);
    assert_eq!(body["messages"]["en"], "Username or password is incorrect");
    assert!(body.get("data").is_none());

    // unknown user answers exactly like a bad password
    let (status, unknown) = app
        .send(
            warp::test::request()
                .method("POST")
                .path("/login")
                .json(&json!({"username": "mallory", "password": "wrong"})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown["messages"], body["messages"]);

    let (status, body) = app
        .send(
            warp::test::request()
                .method("POST")
                .path("/login")
                .json(&json!({"username": "alice"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["messages"]["en"], "Username and password are required");
}

#[tokio::test]
async fn test_admin_routes_require_token_and_admin() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let viewer_role = app.role("viewer", "read").await;
    let viewer = app.user("vic", "pw-vic-1", viewer_role).await;

    let (status, body) = app
        .send(warp::test::request().method("GET").path("/roles"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["messages"]["en"], "Missing or malformed token");

    let (status, body) = app.send(get("/roles", "Bearer not.a.jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["messages"]["en"], "Invalid token");

    let (status, _) = app.send(get("/roles", &app.bearer(viewer))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send(get("/roles", &app.bearer(admin))).await;
    assert_eq!(status, StatusCode::OK);
    let labels: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|role| role["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["admin", "viewer"]);
}

#[tokio::test]
async fn test_token_of_deleted_user_is_rejected() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let token = app.bearer(admin);
    app.store.delete_user(admin).await.unwrap();

    let (status, _) = app.send(get("/user", &token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_then_login() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let team = app.group("team").await;
    let token = app.bearer(admin);

    let (status, body) = app
        .send(with_body(
            "POST",
            "/register",
            &token,
            json!({"username": "bob", "password": "pw-bob-1", "role_id": ADMIN_ROLE_ID, "groups": [team]}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!({}));

    let (status, body) = app
        .send(with_body(
            "POST",
            "/register",
            &token,
            json!({"username": "bob", "password": "other", "role_id": ADMIN_ROLE_ID}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["messages"]["en"], "Username already taken");

    let (status, _) = app
        .send(with_body(
            "POST",
            "/register",
            &token,
            json!({"username": "carol", "password": "pw", "role_id": 99}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            warp::test::request()
                .method("POST")
                .path("/login")
                .json(&json!({"username": "bob", "password": "pw-bob-1"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let bob = app
        .state
        .tokens
        .verify(body["data"]["token"].as_str().unwrap())
        .unwrap();
    assert_eq!(app.store.group_ids(bob).await.unwrap(), vec![team]);
}

#[tokio::test]
async fn test_repeated_group_ids_are_stored_once() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let ops = app.group("ops").await;
    let sales = app.group("sales").await;
    let token = app.bearer(admin);

    let (status, _) = app
        .send(with_body(
            "POST",
            "/register",
            &token,
            json!({"username": "dana", "password": "pw-dana-1", "role_id": ADMIN_ROLE_ID, "groups": [ops, ops]}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let dana = app
        .store
        .find_credentials("dana")
        .await
        .unwrap()
        .unwrap()
        .id;
    assert_eq!(app.store.group_ids(dana).await.unwrap(), vec![ops]);

    let (status, body) = app
        .send(with_body(
            "PUT",
            &format!("/user/{}", dana),
            &token,
            json!({"username": "dana", "role_id": ADMIN_ROLE_ID, "groups": [sales, ops, sales]}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["groups"].as_array().unwrap().len(), 2);
    assert_eq!(app.store.group_ids(dana).await.unwrap(), vec![ops, sales]);

    let (status, body) = app
        .send(with_body(
            "POST",
            "/register",
            &token,
            json!({"username": "eli", "password": "pw-eli-1", "role_id": ADMIN_ROLE_ID, "groups": [ops, 404]}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["messages"]["en"], "Unknown group");
    assert!(!app.store.username_taken("eli").await.unwrap());
}

#[tokio::test]
async fn test_user_listing_and_detail() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let bob = app.user("bob", "pw-bob-1", ADMIN_ROLE_ID).await;
    let zeta = app.group("zeta").await;
    let alpha = app.group("alpha").await;
    app.store.replace_memberships(bob, &[zeta, alpha]).await.unwrap();
    let token = app.bearer(admin);

    let (status, body) = app.send(get("/users", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let users = body["data"].as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1]["username"], "bob");
    assert_eq!(users[1]["role_label"], "admin");
    assert_eq!(users[1]["groups"][0]["label"], "alpha");
    assert_eq!(users[1]["groups"][1]["label"], "zeta");

    let (status, body) = app.send(get(&format!("/user/{}", bob), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "bob");
    assert_eq!(body["data"]["groups"].as_array().unwrap().len(), 2);
    assert!(body["data"]["groups"][0].get("group_id").is_some());

    let (status, body) = app.send(get("/user/999", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["messages"]["en"], "User not found");
}

#[tokio::test]
async fn test_admin_cannot_modify_itself() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let bob = app.user("bob", "pw-bob-1", ADMIN_ROLE_ID).await;
    let team = app.group("team").await;
    let token = app.bearer(admin);

    let (status, body) = app
        .send(with_body(
            "PUT",
            &format!("/user/{}", admin),
            &token,
            json!({"username": "root2", "role_id": ADMIN_ROLE_ID}),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["messages"]["en"], "You cannot modify this user");
    let stats = app.state.security.get_event_stats().await;
    assert_eq!(stats.get("self_modification"), Some(&1));

    let (status, body) = app
        .send(with_body(
            "PUT",
            &format!("/user/{}", bob),
            &token,
            json!({"username": "robert", "role_id": ADMIN_ROLE_ID, "groups": [team]}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "robert");
    assert_eq!(body["data"]["groups"][0]["group_id"], team);
}

#[tokio::test]
async fn test_current_user_groups_depend_on_capability() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let writer_role = app.role("writer", "read,write").await;
    let writer = app.user("wendy", "pw-wendy-1", writer_role).await;
    let ops = app.group("ops").await;
    app.group("sales").await;
    app.store.replace_memberships(writer, &[ops]).await.unwrap();

    let (status, body) = app.send(get("/user", &app.bearer(admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["groups"].as_array().unwrap().len(), 2);

    let (status, body) = app.send(get("/user", &app.bearer(writer))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["groups"], json!([{"id": ops, "label": "ops"}]));
}

#[tokio::test]
async fn test_permission_probe() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let token = app.bearer(admin);

    let (status, body) = app.send(get("/permissions/WRITE", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["hasPermission"], true);

    let (status, body) = app.send(get("/permissions/delete", &token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["messages"]["en"], "Permission denied");
}

#[tokio::test]
async fn test_role_lifecycle() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let token = app.bearer(admin);

    let (status, body) = app
        .send(with_body(
            "POST",
            "/role",
            &token,
            json!({"label": "editor", "permission": "read,write"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let editor = body["data"]["id"].as_u64().unwrap();

    let (status, _) = app
        .send(with_body(
            "POST",
            "/role",
            &token,
            json!({"label": "editor", "permission": "read"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(with_body("POST", "/role", &token, json!({"label": "x"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.user("ed", "pw-ed-1", editor).await;
    let (status, _) = app
        .send(warp::test::request()
            .method("DELETE")
            .path(&format!("/role/{}", editor))
            .header("authorization", &token))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send(warp::test::request()
            .method("DELETE")
            .path("/role/1")
            .header("authorization", &token))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["messages"]["en"], "The admin role cannot be deleted");
    assert!(app.store.get_role(ADMIN_ROLE_ID).await.unwrap().is_some());

    let (status, _) = app
        .send(with_body(
            "PUT",
            "/role/42",
            &token,
            json!({"label": "ghost", "permission": "read"}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_group_lifecycle() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let token = app.bearer(admin);

    let (status, body) = app.send(get("/groups", &token)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["messages"]["en"], "No groups found");

    let (status, body) = app
        .send(with_body(
            "POST",
            "/group",
            &token,
            json!({"label": "ops", "color": "#ff0000"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let ops = body["data"]["id"].as_u64().unwrap();

    let (status, _) = app
        .send(with_body(
            "PUT",
            &format!("/group/{}", ops),
            &token,
            json!({"label": "operations", "color": "#00ff00"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send(get(&format!("/group/{}", ops), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["label"], "operations");

    app.store
        .create_event(
            EventDraft {
                title: "Retro".into(),
                group_id: ops,
                start: chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap(),
                end: chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
                    .unwrap()
                    .and_hms_opt(11, 0, 0)
                    .unwrap(),
            },
            admin,
        )
        .await
        .unwrap();
    let (status, _) = app
        .send(warp::test::request()
            .method("DELETE")
            .path(&format!("/group/{}", ops))
            .header("authorization", &token))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_calendar_scoping() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let writer_role = app.role("writer", "read,write").await;
    let reader_role = app.role("reader", "read").await;
    let writer = app.user("wendy", "pw-wendy-1", writer_role).await;
    let reader = app.user("rick", "pw-rick-1", reader_role).await;
    let loner = app.user("lou", "pw-lou-1", reader_role).await;
    let ops = app.group("ops").await;
    let sales = app.group("sales").await;
    app.store.replace_memberships(writer, &[ops]).await.unwrap();
    app.store.replace_memberships(reader, &[ops]).await.unwrap();

    let event = |group: u64| {
        json!({
            "title": "Planning",
            "group_id": group,
            "start": "2024-06-03T09:00:00.000Z",
            "end": "2024-06-03T10:30:00.000Z"
        })
    };

    let (status, _) = app
        .send(with_body("POST", "/calendar/event", &app.bearer(reader), event(ops)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(with_body("POST", "/calendar/event", &app.bearer(writer), event(sales)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(with_body("POST", "/calendar/event", &app.bearer(writer), event(ops)))
        .await;
    assert_eq!(status, StatusCode::OK);
    let ops_event = body["data"]["id"].as_u64().unwrap();

    let (status, _) = app
        .send(with_body("POST", "/calendar/event", &app.bearer(admin), event(sales)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let range = "/calendar/events?start=2024-06-01&end=2024-06-30";

    let (status, body) = app.send(get(range, &app.bearer(reader))).await;
    assert_eq!(status, StatusCode::OK);
    let events = body["data"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["id"], ops_event);
    assert_eq!(events[0]["group_label"], "ops");
    assert_eq!(events[0]["start"], "2024-06-03T09:00:00");

    let (_, body) = app.send(get(range, &app.bearer(admin))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = app.send(get(range, &app.bearer(loner))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["messages"]["en"], "No events available");

    let (status, _) = app
        .send(get("/calendar/events?start=2024-07-01&end=2024-07-31", &app.bearer(admin)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(with_body(
            "PUT",
            &format!("/calendar/event/{}", ops_event),
            &app.bearer(writer),
            event(sales),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(warp::test::request()
            .method("DELETE")
            .path(&format!("/calendar/event/{}", ops_event))
            .header("authorization", app.bearer(reader)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(warp::test::request()
            .method("DELETE")
            .path(&format!("/calendar/event/{}", ops_event))
            .header("authorization", app.bearer(writer)))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(warp::test::request()
            .method("DELETE")
            .path(&format!("/calendar/event/{}", ops_event))
            .header("authorization", app.bearer(writer)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["messages"]["en"], "Event not found");

    let (status, body) = app.send(get("/calendar/export", &app.bearer(admin))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = app.send(get("/calendar/export", &app.bearer(writer))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_event_validation() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;
    let ops = app.group("ops").await;
    let token = app.bearer(admin);

    let (status, body) = app
        .send(with_body(
            "POST",
            "/calendar/event",
            &token,
            json!({"title": "No dates", "group_id": ops}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["messages"]["en"],
        "Title, group, start date and end date are required"
    );

    let (status, _) = app
        .send(with_body(
            "POST",
            "/calendar/event",
            &token,
            json!({"title": "Bad", "group_id": ops, "start": "tomorrow", "end": "later"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(with_body(
            "PUT",
            "/calendar/event/77",
            &token,
            json!({"title": "Ghost", "group_id": ops, "start": "2024-01-01T09:00:00", "end": "2024-01-01T10:00:00"}),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_and_malformed_body() {
    let app = TestApp::new();
    let admin = app.user("root", "pw-root-1", ADMIN_ROLE_ID).await;

    let (status, body) = app
        .send(warp::test::request().method("GET").path("/nothing/here"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], true);
    assert_eq!(
        body["messages"]["en"],
        "The requested resource does not exist."
    );

    let (status, body) = app
        .send(
            warp::test::request()
                .method("POST")
                .path("/role")
                .header("authorization", app.bearer(admin))
                .header("content-type", "application/json")
                .body("{\"label\": "),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_responses_carry_security_headers() {
    let app = TestApp::new();
    let api = routes(app.state.clone());
    let response = warp::test::request()
        .method("GET")
        .path("/health")
        .reply(&api)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["X-Content-Type-Options"], "nosniff");
    assert_eq!(response.headers()["X-Frame-Options"], "DENY");
}
