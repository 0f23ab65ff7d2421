use axum::http::StatusCode;
use fiction_folder::api::{build_router, AppState};
use fiction_folder::config::{ClientConfig, Config};
use std::net::{SocketAddr, TcpListener};
use tokio::task::JoinHandle;
use uuid::Uuid;

async fn spawn_server() -> (SocketAddr, JoinHandle<()>, tempfile::TempDir) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        bind: addr.to_string(),
        data_dir: tmp.path().to_path_buf(),
        frontend_origin: "http://localhost:5173".into(),
        omdb_api_key: None,
        client: ClientConfig {
            api_key: "client-key".into(),
            auth_domain: "app.example".into(),
            project_id: "fiction-folder".into(),
            storage_bucket: "bucket".into(),
            messaging_sender_id: "42".into(),
            app_id: "1:app".into(),
        },
        logging_enabled: false,
    };
    let state = AppState::new(config).await.unwrap();
    let app = build_router(state);
    let server = tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    (addr, server, tmp)
}

async fn signup(
    client: &reqwest::Client,
    addr: &SocketAddr,
    username: &str,
) -> (String, Uuid) {
    let resp = client
        .post(format!("http://{}/api/signup", addr))
        .json(&serde_json::json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "supersecret"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let v: serde_json::Value = resp.json().await.unwrap();
    let token = v["token"].as_str().unwrap().to_string();
    let id = v["user"]["id"].as_str().unwrap().parse().unwrap();
    (token, id)
}

#[tokio::test]
async fn health_config_and_cors() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{}/api/health", addr))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .unwrap()
            .to_str()
            .unwrap(),
        "http://localhost:5173"
    );
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["message"], "Server is running");

    let resp = client
        .get(format!("http://{}/api/config/firebase", addr))
        .send()
        .await
        .unwrap();
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["apiKey"], "client-key");
    assert_eq!(v["projectId"], "fiction-folder");
    assert_eq!(v["messagingSenderId"], "42");

    server.abort();
}

#[tokio::test]
async fn signup_login_and_me() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    let (token, id) = signup(&client, &addr, "alice").await;

    // duplicate username conflicts
    let resp = client
        .post(format!("http://{}/api/signup", addr))
        .json(&serde_json::json!({
            "username": "alice",
            "email": "alice2@example.com",
            "password": "supersecret"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    // weak password rejected before any write
    let resp = client
        .post(format!("http://{}/api/signup", addr))
        .json(&serde_json::json!({
            "username": "weak",
            "email": "weak@example.com",
            "password": "short"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // wrong password
    let resp = client
        .post(format!("http://{}/api/login", addr))
        .json(&serde_json::json!({"email": "alice@example.com", "password": "wrong-pass"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // correct login
    let resp = client
        .post(format!("http://{}/api/login", addr))
        .json(&serde_json::json!({"email": "alice@example.com", "password": "supersecret"}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    // me requires and honors the token
    let resp = client
        .get(format!("http://{}/api/me", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = client
        .get(format!("http://{}/api/me", addr))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["username"], "alice");
    assert_eq!(v["id"].as_str().unwrap(), id.to_string());

    server.abort();
}

#[tokio::test]
async fn friend_request_lifecycle() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    let (alice_token, alice_id) = signup(&client, &addr, "alice").await;
    let (bob_token, bob_id) = signup(&client, &addr, "bob").await;
    signup(&client, &addr, "bonnie").await;

    // prefix search excludes the searcher
    let resp = client
        .get(format!("http://{}/api/users/search?q=bo", addr))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let hits: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["username"], "bonnie");

    // send twice: idempotent by deterministic id
    for _ in 0..2 {
        let resp = client
            .post(format!("http://{}/api/friends/requests", addr))
            .bearer_auth(&alice_token)
            .json(&serde_json::json!({ "to_id": bob_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }
    let resp = client
        .get(format!("http://{}/api/friends/requests", addr))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    let inbox: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(inbox.as_array().unwrap().len(), 1);
    let request_id = inbox[0]["id"].as_str().unwrap().to_string();
    assert_eq!(inbox[0]["from_username"], "alice");

    // accept: both sides see the friendship
    let resp = client
        .post(format!(
            "http://{}/api/friends/requests/{}/accept",
            addr, request_id
        ))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    for (token, expected) in [(&alice_token, "bob"), (&bob_token, "alice")] {
        let resp = client
            .get(format!("http://{}/api/friends", addr))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let friends: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(friends.as_array().unwrap().len(), 1);
        assert_eq!(friends[0]["username"], expected);
    }

    // accepting again is gone
    let resp = client
        .post(format!(
            "http://{}/api/friends/requests/{}/accept",
            addr, request_id
        ))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // removal clears both sides
    let resp = client
        .delete(format!("http://{}/api/friends/{}", addr, alice_id))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    for token in [&alice_token, &bob_token] {
        let resp = client
            .get(format!("http://{}/api/friends", addr))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let friends: serde_json::Value = resp.json().await.unwrap();
        assert!(friends.as_array().unwrap().is_empty());
    }

    server.abort();
}

#[tokio::test]
async fn list_and_recommendations() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    let (alice_token, _) = signup(&client, &addr, "alice").await;
    let (bob_token, bob_id) = signup(&client, &addr, "bob").await;

    // rate, then re-rate the same content id
    for rating in [6, 9] {
        let resp = client
            .post(format!("http://{}/api/list", addr))
            .bearer_auth(&alice_token)
            .json(&serde_json::json!({
                "content_id": "Y", "kind": "MANGA", "title": "Y", "rating": rating
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }
    let resp = client
        .post(format!("http://{}/api/list", addr))
        .bearer_auth(&alice_token)
        .json(&serde_json::json!({
            "content_id": "X", "kind": "FILM", "title": "X", "rating": 4
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    // out-of-range rating rejected
    let resp = client
        .post(format!("http://{}/api/list", addr))
        .bearer_auth(&alice_token)
        .json(&serde_json::json!({
            "content_id": "Z", "kind": "FILM", "title": "Z", "rating": 11
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .get(format!("http://{}/api/list", addr))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    let entries: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(entries.as_array().unwrap().len(), 2);
    let y = entries
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["content_id"] == "Y")
        .unwrap();
    assert_eq!(y["rating"], 9);

    // top-1 view
    let resp = client
        .get(format!("http://{}/api/list?top=1", addr))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    let top: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(top.as_array().unwrap().len(), 1);
    assert_eq!(top[0]["content_id"], "Y");

    // bob shares Y; alice gets him recommended
    for (id, rating) in [("Y", 8), ("Q", 5)] {
        client
            .post(format!("http://{}/api/list", addr))
            .bearer_auth(&bob_token)
            .json(&serde_json::json!({
                "content_id": id, "kind": "MANGA", "title": id, "rating": rating
            }))
            .send()
            .await
            .unwrap();
    }
    let resp = client
        .get(format!("http://{}/api/recommendations", addr))
        .bearer_auth(&alice_token)
        .send()
        .await
        .unwrap();
    let recs: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(recs.as_array().unwrap().len(), 1);
    assert_eq!(recs[0]["user_id"].as_str().unwrap(), bob_id.to_string());
    assert_eq!(recs[0]["shared_count"], 1);
    assert_eq!(recs[0]["shared_titles"][0], "Y");

    server.abort();
}

#[tokio::test]
async fn direct_messages_over_http() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    let (alice_token, alice_id) = signup(&client, &addr, "alice").await;
    let (bob_token, bob_id) = signup(&client, &addr, "bob").await;

    let resp = client
        .post(format!("http://{}/api/messages/{}", addr, bob_id))
        .bearer_auth(&alice_token)
        .json(&serde_json::json!({ "text": "hi bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let sent: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(
        sent["expire_at"].as_i64().unwrap() - sent["created_at"].as_i64().unwrap(),
        24 * 60 * 60
    );

    let resp = client
        .post(format!("http://{}/api/messages/{}", addr, alice_id))
        .bearer_auth(&bob_token)
        .json(&serde_json::json!({ "text": "hi alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    // empty text is a validation error
    let resp = client
        .post(format!("http://{}/api/messages/{}", addr, bob_id))
        .bearer_auth(&alice_token)
        .json(&serde_json::json!({ "text": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // both participants read the same ascending conversation
    for token in [&alice_token, &bob_token] {
        let other = if token == &alice_token { bob_id } else { alice_id };
        let resp = client
            .get(format!("http://{}/api/messages/{}", addr, other))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let msgs: serde_json::Value = resp.json().await.unwrap();
        let msgs = msgs.as_array().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["text"], "hi bob");
        assert_eq!(msgs[0]["from_username"], "alice");
        assert_eq!(msgs[1]["text"], "hi alice");
    }

    server.abort();
}

#[tokio::test]
async fn film_proxy_without_key() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();

    // no search term: empty OMDb-shaped response, no upstream call
    let resp = client
        .get(format!("http://{}/api/films", addr))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["Response"], "False");
    assert!(v["Search"].as_array().unwrap().is_empty());

    // with a term but no configured key
    let resp = client
        .get(format!("http://{}/api/films?search=alien", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let v: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(v["Error"], "missing_api_key");

    server.abort();
}
