mod common;

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::json;

use common::{id_of, TestServer};
use realty_api::access::Role;

#[tokio::test]
async fn saving_twice_conflicts_and_unsaving_unknown_is_not_found() -> Result<()> {
    let server = TestServer::spawn().await?;
    let customer = server.seed("Carla", Role::Customer).await?;
    let agent = server.seed("Sam", Role::SalesOps).await?;
    let property = server.create_property(&agent).await?;
    let path = format!("/api/saved-properties/{}", property);

    let (status, body) = server.post(&customer, &path, json!({})).await?;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["property_id"], property);

    let (status, body) = server.post(&customer, &path, json!({})).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (_, body) = server.get(&customer, "/api/saved-properties").await?;
    let saved = body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0]["property"]["title"], "Two-bedroom flat");

    let (status, _) = server.delete(&customer, &path).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = server.delete(&customer, &path).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = server
        .post(&customer, &format!("/api/saved-properties/{}", uuid::Uuid::new_v4()), json!({}))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn customers_only_browse_available_listings() -> Result<()> {
    let server = TestServer::spawn().await?;
    let customer = server.seed("Carla", Role::Customer).await?;
    let agent = server.seed("Sam", Role::SalesOps).await?;
    let listed = server.create_property(&agent).await?;
    let hidden = server.create_property(&agent).await?;
    let (status, _) = server
        .patch(&agent, &format!("/api/sales-ops/properties/{}/availability", hidden), json!({ "available": false }))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = server.get(&customer, "/api/properties?available=false").await?;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], listed);

    let (status, _) = server.get(&customer, &format!("/api/properties/{}", hidden)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = server.get(&agent, "/api/properties").await?;
    assert_eq!(body["data"]["total"], 2);

    Ok(())
}

#[tokio::test]
async fn listing_filters_and_sorting() -> Result<()> {
    let server = TestServer::spawn().await?;
    let customer = server.seed("Carla", Role::Customer).await?;
    let agent = server.seed("Sam", Role::SalesOps).await?;

    for (title, kind, location, price, bedrooms) in [
        ("Nile view", "Apartment", "Zamalek, Cairo", 300_000, 3),
        ("Garden villa", "Villa", "Sheikh Zayed", 900_000, 5),
        ("Starter flat", "Apartment", "Nasr City, CAIRO", 120_000, 1),
    ] {
        let (status, body) = server
            .post(
                &agent,
                "/api/sales-ops/properties",
                json!({ "title": title, "property_type": kind, "location": location, "price": price, "bedrooms": bedrooms }),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
    }

    let (_, body) = server.get(&customer, "/api/properties?location=cairo&sort=price_asc").await?;
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["items"][0]["title"], "Starter flat");
    assert_eq!(body["data"]["items"][1]["title"], "Nile view");

    let (_, body) = server.get(&customer, "/api/properties?property_type=Apartment&bedrooms=2").await?;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["title"], "Nile view");

    let (_, body) = server.get(&customer, "/api/properties?min_price=200000&max_price=1000000&sort=price_desc").await?;
    assert_eq!(body["data"]["items"][0]["title"], "Garden villa");

    let (_, body) = server.get(&customer, "/api/properties?limit=2&page=2&sort=price_asc").await?;
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"]["items"][0]["title"], "Garden villa");

    let (status, body) = server.get(&customer, "/api/properties?sort=cheapest").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["field_errors"]["sort"].is_string(), "{}", body);

    Ok(())
}

#[tokio::test]
async fn reading_a_listing_counts_a_view() -> Result<()> {
    let server = TestServer::spawn().await?;
    let customer = server.seed("Carla", Role::Customer).await?;
    let agent = server.seed("Sam", Role::SalesOps).await?;
    let property = server.create_property(&agent).await?;
    let path = format!("/api/properties/{}", property);

    server.get(&customer, &path).await?;
    let (status, body) = server.get(&customer, &path).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["views_count"], 2);

    Ok(())
}

#[tokio::test]
async fn staff_manage_listings() -> Result<()> {
    let server = TestServer::spawn().await?;
    let customer = server.seed("Carla", Role::Customer).await?;
    let agent = server.seed("Sam", Role::SalesOps).await?;

    let (status, body) = server
        .post(&agent, "/api/sales-ops/properties", json!({ "title": "", "price": -1 }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    for field in ["title", "property_type", "location", "price"] {
        assert!(body["error"]["field_errors"][field].is_string(), "missing {} in {}", field, body);
    }

    let (status, _) = server
        .post(&customer, "/api/sales-ops/properties", json!({ "title": "Mine", "property_type": "Flat", "location": "Giza" }))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let property = server.create_property(&agent).await?;
    let (status, body) = server
        .put(&agent, &format!("/api/sales-ops/properties/{}", property), json!({ "price": 175000, "description": "Renovated" }))
        .await?;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["price"], 175000.0);
    assert_eq!(body["data"]["description"], "Renovated");

    server.post(&customer, &format!("/api/saved-properties/{}", property), json!({})).await?;
    let (status, body) = server
        .post(&customer, "/api/scheduled-viewings", json!({ "property_id": property }))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let viewing = id_of(&body)?;

    let (status, _) = server.delete(&agent, &format!("/api/sales-ops/properties/{}", property)).await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = server.get(&customer, "/api/saved-properties").await?;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(0));
    let (status, _) = server.get(&customer, &format!("/api/scheduled-viewings/{}", viewing)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
