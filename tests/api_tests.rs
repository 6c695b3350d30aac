// tests/api_tests.rs

mod common;

use common::spawn_app;
use serde_json::{Value, json};

#[tokio::test]
async fn health_check_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_and_login_work() {
    let app = spawn_app().await;

    let (username, token) = app.signup().await;
    assert!(!token.is_empty());

    // Duplicate usernames are rejected
    let response = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "username": username, "password": "password123" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 409);

    // Wrong password
    let response = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": username, "password": "wrong-password" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn register_fails_validation() {
    let app = spawn_app().await;

    // Username too short
    let response = app
        .client
        .post(app.url("/api/auth/register"))
        .json(&json!({ "username": "yo", "password": "password123" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn writing_requires_a_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/api/posts"))
        .json(&json!({ "title": "t", "content": "<p>x</p>" }))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status().as_u16(), 401);

    let response = app
        .create_post("not-a-jwt", json!({ "title": "t", "content": "<p>x</p>" }))
        .await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn post_content_is_sanitized_before_storage() {
    let app = spawn_app().await;
    let (_, token) = app.signup().await;

    let listing = "<pre data-preserve-content=\"true\"><code>if (a < b) { return &amp; }</code></pre>";
    let raw = format!(
        "<p onclick=\"steal()\">Hello<script>alert(1)</script> <a href=\"javascript:alert(1)\">x</a></p>{}",
        listing
    );

    let post = app.publish(&token, "Sanitized", &raw).await;
    let content = post["content"].as_str().unwrap();

    assert!(!content.contains("script"), "{content}");
    assert!(!content.contains("onclick"), "{content}");
    assert!(!content.contains("javascript:"), "{content}");
    assert!(content.starts_with("<p>Hello"), "{content}");
    assert!(content.ends_with(listing), "{content}");

    // What readers get back is exactly what was stored
    let fetched: Value = app
        .client
        .get(app.url(&format!("/api/posts/{}", post["id"])))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["content"], post["content"]);

    let stored: String = sqlx::query_scalar("SELECT content FROM posts WHERE id = ?")
        .bind(post["id"].as_i64().unwrap())
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(stored, content);
}

#[tokio::test]
async fn code_listings_are_stored_verbatim() {
    let app = spawn_app().await;
    let (_, token) = app.signup().await;

    let listing = "<pre data-preserve-content><code class=\"language-c\">#include <stdio.h>\n\nint main(void) {\n    int a = 1, b = 2;\n    if (a<b) return;\n}</code></pre>";
    let post = app.publish(&token, "Listing", listing).await;
    assert_eq!(post["content"], listing);

    let rust = "<p>Bytes:</p><pre data-preserve-content><code>let v: Vec<u8> = vec![];</code></pre>";
    let response = app
        .client
        .put(app.url(&format!("/api/posts/{}", post["id"])))
        .bearer_auth(&token)
        .json(&json!({ "content": rust }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["content"], rust);
}

#[tokio::test]
async fn editing_sanitizes_again() {
    let app = spawn_app().await;
    let (_, token) = app.signup().await;
    let post = app.publish(&token, "Edit me", "<p>first</p>").await;

    let response = app
        .client
        .put(app.url(&format!("/api/posts/{}", post["id"])))
        .bearer_auth(&token)
        .json(&json!({ "content": "<p>second<img src=x onerror=alert(1)></p>" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let updated: Value = response.json().await.unwrap();
    let content = updated["content"].as_str().unwrap();
    assert!(content.starts_with("<p>second"), "{content}");
    assert!(!content.contains("onerror"), "{content}");
    assert_eq!(updated["title"], "Edit me");
    assert_eq!(updated["slug"], post["slug"]);
}

#[tokio::test]
async fn only_the_author_or_an_admin_may_edit() {
    let app = spawn_app().await;
    let (_, author) = app.signup().await;
    let (_, stranger) = app.signup().await;
    let (_, admin) = app.signup_admin().await;
    let post = app.publish(&author, "Mine", "<p>mine</p>").await;
    let path = format!("/api/posts/{}", post["id"]);

    let response = app
        .client
        .put(app.url(&path))
        .bearer_auth(&stranger)
        .json(&json!({ "title": "Hijacked" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .client
        .delete(app.url(&path))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = app
        .client
        .put(app.url(&path))
        .bearer_auth(&admin)
        .json(&json!({ "title": "Moderated" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = app
        .client
        .delete(app.url(&path))
        .bearer_auth(&author)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = app.client.get(app.url(&path)).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn drafts_and_future_posts_stay_hidden() {
    let app = spawn_app().await;
    let (_, token) = app.signup().await;

    let draft: Value = app
        .create_post(&token, json!({ "title": "Draft", "content": "<p>wip</p>" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(draft["status"], "draft");

    let scheduled = app
        .create_post(
            &token,
            json!({
                "title": "Later",
                "content": "<p>soon</p>",
                "status": "scheduled",
                "publish_at": "2999-01-01T00:00:00Z"
            }),
        )
        .await;
    assert_eq!(scheduled.status().as_u16(), 201);

    // Scheduling needs a time
    let response = app
        .create_post(
            &token,
            json!({ "title": "Never", "content": "<p>x</p>", "status": "scheduled" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let live = app.publish(&token, "Live", "<p>now</p>").await;

    let listed: Vec<Value> = app
        .client
        .get(app.url("/api/posts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], live["id"]);

    let response = app
        .client
        .get(app.url(&format!("/api/posts/{}", draft["id"])))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let mine: Vec<Value> = app
        .client
        .get(app.url("/api/me/posts"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine.len(), 3);
}

#[tokio::test]
async fn slugs_are_unique_and_resolvable() {
    let app = spawn_app().await;
    let (_, token) = app.signup().await;

    let first = app.publish(&token, "Hello, World!", "<p>1</p>").await;
    let second = app.publish(&token, "Hello World", "<p>2</p>").await;
    assert_eq!(first["slug"], "hello-world");
    assert_eq!(second["slug"], "hello-world-2");

    let fetched: Value = app
        .client
        .get(app.url("/api/posts/slug/hello-world-2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["id"], second["id"]);

    let response = app
        .client
        .get(app.url("/api/posts/slug/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn tags_filter_and_count_visible_posts() {
    let app = spawn_app().await;
    let (_, token) = app.signup().await;

    for (title, tags, status) in [
        ("One", json!(["Rust", "web"]), "published"),
        ("Two", json!(["rust"]), "published"),
        ("Three", json!(["rust"]), "draft"),
    ] {
        let response = app
            .create_post(
                &token,
                json!({ "title": title, "content": "<p>x</p>", "tags": tags, "status": status }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201);
    }

    let rust: Vec<Value> = app
        .client
        .get(app.url("/api/posts?tag=RUST"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rust.len(), 2);

    let web: Vec<Value> = app
        .client
        .get(app.url("/api/posts?tag=web"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(web.len(), 1);
    assert_eq!(web[0]["tags"], json!(["rust", "web"]));

    let tags: Vec<Value> = app
        .client
        .get(app.url("/api/tags"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        tags,
        vec![
            json!({ "name": "rust", "posts": 2 }),
            json!({ "name": "web", "posts": 1 }),
        ]
    );
}
