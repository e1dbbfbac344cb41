// Listing, search, review, upload, favorite and admin APIs

use axum::http::StatusCode;
use serde_json::{json, Value};
use serial_test::serial;

mod common;
use common::setup_test_app;

fn listing_body() -> Value {
    json!({
        "title": "Street food walk",
        "description": "Six stops through the old town",
        "image_src": "https://example.com/food.jpg",
        "category": "food",
        "location": "Porto",
        "price_cents": 3500,
        "max_guests": 8
    })
}

#[tokio::test]
#[serial]
async fn test_create_and_fetch_listing() {
    let Some(app) = setup_test_app().await else { return };
    let (owner, token) = app.create_user("user").await;

    let created = app
        .post("/v1/listings")
        .bearer(&token)
        .json(&listing_body())
        .send()
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: Value = created.json().await;
    assert_eq!(created["user_id"], json!(owner.id));

    let detail: Value = app
        .get(&format!("/v1/listings/{}", created["id"].as_str().unwrap()))
        .send()
        .await
        .json()
        .await;
    assert_eq!(detail["title"], "Street food walk");
    assert_eq!(detail["owner"]["id"], json!(owner.id));
    assert!(detail["owner"].get("email").is_none());
    assert_eq!(detail["rating"]["count"], 0);
    assert!(detail["booked_ranges"].as_array().unwrap().is_empty());

    let mut bad_category = listing_body();
    bad_category["category"] = json!("spaceflight");
    let rejected = app
        .post("/v1/listings")
        .bearer(&token)
        .json(&bad_category)
        .send()
        .await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    let error: Value = rejected.json().await;
    assert_eq!(error["status"], 400);
}

#[tokio::test]
#[serial]
async fn test_other_users_cannot_modify_listing() {
    let Some(app) = setup_test_app().await else { return };
    let (owner, owner_token) = app.create_user("user").await;
    let (_, stranger_token) = app.create_user("user").await;
    let (_, admin_token) = app.create_user("admin").await;
    let listing = app.create_listing(owner.id, 1000, 2).await;
    let uri = format!("/v1/listings/{}", listing.id);

    let anonymous = app.put(&uri).json(&json!({ "title": "Mine now" })).send().await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let stranger = app
        .put(&uri)
        .bearer(&stranger_token)
        .json(&json!({ "title": "Mine now" }))
        .send()
        .await;
    assert_eq!(stranger.status(), StatusCode::FORBIDDEN);

    let stranger_delete = app.delete(&uri).bearer(&stranger_token).send().await;
    assert_eq!(stranger_delete.status(), StatusCode::FORBIDDEN);

    let updated = app
        .put(&uri)
        .bearer(&owner_token)
        .json(&json!({ "title": "Evening kayak tour" }))
        .send()
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    let updated: Value = updated.json().await;
    assert_eq!(updated["title"], "Evening kayak tour");
    assert_eq!(updated["price_cents"], 1000);

    // admins may remove any listing
    let removed = app.delete(&uri).bearer(&admin_token).send().await;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.get(&uri).send().await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
#[serial]
async fn test_search_caps_page_size() {
    let Some(app) = setup_test_app().await else { return };
    let (owner, _) = app.create_user("user").await;
    for _ in 0..55 {
        app.create_listing(owner.id, 1500, 4).await;
    }

    let page: Value = app
        .get(&format!("/v1/search?user_id={}&per_page=100", owner.id))
        .send()
        .await
        .json()
        .await;
    assert_eq!(page["items"].as_array().unwrap().len(), 50);
    assert_eq!(page["per_page"], 50);
    assert_eq!(page["total"], 55);
    assert_eq!(page["total_pages"], 2);

    let second: Value = app
        .get(&format!("/v1/listings?user_id={}&per_page=100&page=2", owner.id))
        .send()
        .await
        .json()
        .await;
    assert_eq!(second["items"].as_array().unwrap().len(), 5);

    let far = app
        .get(&format!("/v1/search?user_id={}&page={}", owner.id, i64::MAX))
        .send()
        .await;
    assert_eq!(far.status(), StatusCode::OK);
    let far: Value = far.json().await;
    assert!(far["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn test_search_filters() {
    let Some(app) = setup_test_app().await else { return };
    let (owner, _) = app.create_user("user").await;
    app.create_listing(owner.id, 1500, 2).await;
    app.create_listing(owner.id, 9000, 6).await;

    let crowd: Value = app
        .get(&format!("/v1/listings?user_id={}&guest_count=4", owner.id))
        .send()
        .await
        .json()
        .await;
    assert_eq!(crowd["total"], 1);
    assert_eq!(crowd["items"][0]["price_cents"], 9000);

    let cheap: Value = app
        .get(&format!("/v1/listings?user_id={}&max_price=2000", owner.id))
        .send()
        .await
        .json()
        .await;
    assert_eq!(cheap["total"], 1);

    let half_range = app
        .get("/v1/listings?start_date=2030-01-01")
        .send()
        .await;
    assert_eq!(half_range.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial]
async fn test_favorite_toggle() {
    let Some(app) = setup_test_app().await else { return };
    let (owner, _) = app.create_user("user").await;
    let (_, token) = app.create_user("user").await;
    let listing = app.create_listing(owner.id, 1500, 2).await;
    let uri = format!("/v1/favorites/{}", listing.id);

    let on: Value = app.post(&uri).bearer(&token).send().await.json().await;
    assert_eq!(on["favorited"], true);

    let favorites: Value = app.get("/v1/favorites").bearer(&token).send().await.json().await;
    assert_eq!(favorites.as_array().unwrap().len(), 1);

    let off: Value = app.post(&uri).bearer(&token).send().await.json().await;
    assert_eq!(off["favorited"], false);

    let removed = app.delete(&uri).bearer(&token).send().await;
    assert_eq!(removed.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
#[serial]
async fn test_admin_routes_require_admin_role() {
    let Some(app) = setup_test_app().await else { return };
    let (user, user_token) = app.create_user("user").await;
    let (_, admin_token) = app.create_user("admin").await;

    let anonymous = app.get("/v1/admin/stats").send().await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let forbidden = app.get("/v1/admin/stats").bearer(&user_token).send().await;
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let stats = app.get("/v1/admin/stats").bearer(&admin_token).send().await;
    assert_eq!(stats.status(), StatusCode::OK);
    let stats: Value = stats.json().await;
    assert!(stats["users"].as_i64().unwrap() >= 2);

    let users: Value = app
        .get("/v1/admin/users?per_page=500")
        .bearer(&admin_token)
        .send()
        .await
        .json()
        .await;
    assert_eq!(users["per_page"], 50);

    let deactivated = app
        .patch(&format!("/v1/admin/users/{}", user.id))
        .bearer(&admin_token)
        .json(&json!({ "is_active": false }))
        .send()
        .await;
    assert_eq!(deactivated.status(), StatusCode::OK);
    let deactivated: Value = deactivated.json().await;
    assert_eq!(deactivated["is_active"], false);
}

#[tokio::test]
#[serial]
async fn test_review_requires_finished_stay() {
    let Some(app) = setup_test_app().await else { return };
    let (host, host_token) = app.create_user("user").await;
    let (guest, guest_token) = app.create_user("user").await;
    let listing = app.create_listing(host.id, 1500, 2).await;
    let uri = format!("/v1/listings/{}/reviews", listing.id);
    let review = json!({ "rating": 5, "comment": "Great guide" });

    let no_stay = app.post(&uri).bearer(&guest_token).json(&review).send().await;
    assert_eq!(no_stay.status(), StatusCode::FORBIDDEN);

    // upcoming and cancelled stays do not count
    app.insert_booking(guest.id, &listing, 3, 4, "confirmed").await;
    app.insert_booking(guest.id, &listing, -10, -9, "cancelled").await;
    let early = app.post(&uri).bearer(&guest_token).json(&review).send().await;
    assert_eq!(early.status(), StatusCode::FORBIDDEN);

    let own = app.post(&uri).bearer(&host_token).json(&review).send().await;
    assert_eq!(own.status(), StatusCode::FORBIDDEN);

    app.insert_booking(guest.id, &listing, -5, -3, "confirmed").await;
    let created = app.post(&uri).bearer(&guest_token).json(&review).send().await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: Value = created.json().await;
    assert_eq!(created["rating"], 5);

    let second = app.post(&uri).bearer(&guest_token).json(&review).send().await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let out_of_range = app
        .post(&uri)
        .bearer(&guest_token)
        .json(&json!({ "rating": 6, "comment": "Too good" }))
        .send()
        .await;
    assert_eq!(out_of_range.status(), StatusCode::BAD_REQUEST);

    let reviews: Value = app.get(&uri).send().await.json().await;
    assert_eq!(reviews.as_array().unwrap().len(), 1);

    let detail: Value = app
        .get(&format!("/v1/listings/{}", listing.id))
        .send()
        .await
        .json()
        .await;
    assert_eq!(detail["rating"]["count"], 1);
}

#[tokio::test]
#[serial]
async fn test_image_upload() {
    let Some(app) = setup_test_app().await else { return };
    let (_, token) = app.create_user("user").await;
    let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    let anonymous = app
        .post("/v1/uploads")
        .multipart_file("file", "pic.png", "image/png", &png)
        .send()
        .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let uploaded = app
        .post("/v1/uploads")
        .bearer(&token)
        .multipart_file("file", "pic.png", "image/png", &png)
        .send()
        .await;
    assert_eq!(uploaded.status(), StatusCode::CREATED);
    let uploaded: Value = uploaded.json().await;
    let url = uploaded["url"].as_str().unwrap();
    assert!(url.ends_with(".png"));

    let path = &url[url.find("/uploads/").unwrap()..];
    let served = app.get(path).send().await;
    assert_eq!(served.status(), StatusCode::OK);

    // declared type must match the bytes
    let mislabeled = app
        .post("/v1/uploads")
        .bearer(&token)
        .multipart_file("file", "pic.jpg", "image/jpeg", &png)
        .send()
        .await;
    assert_eq!(mislabeled.status(), StatusCode::BAD_REQUEST);

    let wrong_field = app
        .post("/v1/uploads")
        .bearer(&token)
        .multipart_file("avatar", "pic.png", "image/png", &png)
        .send()
        .await;
    assert_eq!(wrong_field.status(), StatusCode::BAD_REQUEST);
    let error: Value = wrong_field.json().await;
    assert_eq!(error["error"], "Missing file field");
}
