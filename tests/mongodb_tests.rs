//! Integration tests for the MongoDB storage backend
//!
//! # Requirements
//!
//! - Docker must be running (testcontainers launches a MongoDB container)
//! - Feature flag `mongodb_backend` must be enabled
//!
//! # Running
//!
//! ```sh
//! cargo test --features mongodb_backend --test mongodb_tests
//! ```
//!
//! # Test isolation
//!
//! All tests share a single MongoDB container (via `OnceLock`). Each test
//! gets its own database.

#![cfg(feature = "mongodb_backend")]

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use jrmart::cart::{Cart, CartItem};
use jrmart::catalog::{PaymentDetails, ProductSummary, UserProfile, UserType};
use jrmart::core::query::QueryOptions;
use jrmart::orders::{LineItem, OrderDraft, OrderPatch};
use jrmart::payments::PaymentRecordFields;
use jrmart::prelude::*;
use jrmart::storage::MongoStores;
use mongodb::Client;
use mongodb::bson::doc;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mongo::Mongo;

// ---------------------------------------------------------------------------
// Shared test environment (single container, fresh database per test)
// ---------------------------------------------------------------------------

/// Holds the testcontainer handle (keeps it alive) and the connection URL.
struct MongoTestEnv {
    /// Container handle, dropping this stops the MongoDB container.
    _container: testcontainers::ContainerAsync<Mongo>,
    connection_url: String,
}

static TEST_ENV: OnceLock<MongoTestEnv> = OnceLock::new();

async fn init_mongo_env() -> &'static MongoTestEnv {
    if let Some(env) = TEST_ENV.get() {
        return env;
    }

    let container = Mongo::default()
        .start()
        .await
        .expect("Failed to start MongoDB container, is Docker running?");

    let host = container.get_host().await.unwrap();
    let port = container.get_host_port_ipv4(27017).await.unwrap();
    let url = format!("mongodb://{}:{}", host, port);

    let env = MongoTestEnv {
        _container: container,
        connection_url: url,
    };

    let _ = TEST_ENV.set(env);
    TEST_ENV.get().unwrap()
}

static DB_COUNTER: AtomicU64 = AtomicU64::new(0);

fn database_name() -> String {
    format!("jrmart_test_{}", DB_COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// Connected stores on a database nobody else uses
async fn stores() -> (MongoStores, mongodb::Database) {
    let env = init_mongo_env().await;
    let name = database_name();
    let stores = MongoStores::connect(&env.connection_url, &name, "JR")
        .await
        .expect("Failed to connect to MongoDB");
    let client = Client::with_uri_str(&env.connection_url).await.unwrap();
    (stores, client.database(&name))
}

fn draft(buyer: Uuid, seller: Uuid) -> OrderDraft {
    OrderDraft {
        buyer_id: buyer,
        line_items: vec![LineItem {
            product_id: Uuid::new_v4(),
            seller_id: seller,
            quantity: 1,
            unit_price: 350.0,
        }],
        shipping_address: "7 Residency Road".to_string(),
        total_amount: 350.0,
        payment_method: PaymentMethod::Online,
        order_status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_and_read_back() {
    let (stores, _) = stores().await;
    let created = stores
        .orders
        .create(draft(Uuid::new_v4(), Uuid::new_v4()))
        .await
        .unwrap();

    assert!(created.human_order_id.ends_with("0001"));
    assert_eq!(created.version, 1);

    let by_id = stores.orders.get(&created.id).await.unwrap().unwrap();
    assert_eq!(by_id, created);

    let by_code = stores
        .orders
        .get_by_human_id(&created.human_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_code.id, created.id);
    assert_eq!(stores.orders.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_creates_get_unique_codes() {
    let (stores, _) = stores().await;
    let orders = stores.orders.clone();

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let orders = orders.clone();
            tokio::spawn(async move { orders.create(draft(Uuid::new_v4(), Uuid::new_v4())).await })
        })
        .collect();

    let mut codes = HashSet::new();
    for handle in handles {
        let order = handle.await.unwrap().unwrap();
        codes.insert(order.human_order_id);
    }
    assert_eq!(codes.len(), 10);
}

#[tokio::test]
async fn test_stale_update_is_conflict() {
    let (stores, _) = stores().await;
    let order = stores
        .orders
        .create(draft(Uuid::new_v4(), Uuid::new_v4()))
        .await
        .unwrap();

    let now = Utc::now();
    let first = OrderPatch::new(order.version, now)
        .order_status(OrderStatus::Cancelled)
        .track(TrackingEntry::new(OrderStatus::Cancelled, "Order cancelled", None, now));
    let updated = stores.orders.update(&order.id, first.clone()).await.unwrap();
    assert_eq!(updated.version, order.version + 1);
    assert_eq!(updated.tracking_history.len(), 2);

    let err = stores.orders.update(&order.id, first).await.unwrap_err();
    assert_eq!(err.error_code(), "ORDER_VERSION_CONFLICT");

    let missing = OrderPatch::new(1, now);
    let err = stores.orders.update(&Uuid::new_v4(), missing).await.unwrap_err();
    assert_eq!(err.error_code(), "ORDER_NOT_FOUND");
}

#[tokio::test]
async fn test_queries_by_buyer_and_seller() {
    let (stores, _) = stores().await;
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();

    for _ in 0..3 {
        stores.orders.create(draft(buyer, seller)).await.unwrap();
    }
    stores
        .orders
        .create(draft(Uuid::new_v4(), Uuid::new_v4()))
        .await
        .unwrap();

    let mine = stores
        .orders
        .query_by_buyer(&buyer, &QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(mine.len(), 3);
    assert!(mine[0].human_order_id > mine[2].human_order_id);

    let selling = stores
        .orders
        .query_by_seller(&seller, &QueryOptions::newest(2))
        .await
        .unwrap();
    assert_eq!(selling.len(), 2);
    assert!(selling.iter().all(|o| o.has_seller(&seller)));
}

#[tokio::test]
async fn test_query_all_is_newest_first() {
    let (stores, _) = stores().await;
    for _ in 0..5 {
        stores
            .orders
            .create(draft(Uuid::new_v4(), Uuid::new_v4()))
            .await
            .unwrap();
    }

    let all = stores
        .orders
        .query_all(&QueryOptions::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 5);
    assert!(all.windows(2).all(|pair| pair[0].created_at >= pair[1].created_at));
    assert!(all[0].human_order_id.ends_with("0005"));

    let newest = stores.orders.query_all(&QueryOptions::newest(2)).await.unwrap();
    assert_eq!(newest.len(), 2);
    assert_eq!(newest[0].id, all[0].id);
}

// ---------------------------------------------------------------------------
// Payment records
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_payment_record_is_one_per_order() {
    let (stores, database) = stores().await;
    let order = stores
        .orders
        .create(draft(Uuid::new_v4(), Uuid::new_v4()))
        .await
        .unwrap();

    let failed = PaymentRecordFields::from_order(&order, PaymentRecordStatus::Failed)
        .remarks(Some("blurry screenshot".to_string()));
    let first = stores.payments.upsert_for_order(&order.id, failed).await.unwrap();

    let completed = PaymentRecordFields::from_order(&order, PaymentRecordStatus::Completed)
        .verified(Some(Uuid::new_v4()), Utc::now());
    let second = stores.payments.upsert_for_order(&order.id, completed).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.status, PaymentRecordStatus::Completed);
    assert!(second.verified_at.is_some());

    let stored = stores.payments.get_for_order(&order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentRecordStatus::Completed);

    let count = database
        .collection::<mongodb::bson::Document>("payments")
        .count_documents(doc! {})
        .await
        .unwrap();
    assert_eq!(count, 1);
}

// ---------------------------------------------------------------------------
// Carts, catalog and users
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cart_save_and_clear() {
    let (stores, _) = stores().await;
    let buyer = Uuid::new_v4();

    assert!(stores.carts.get_cart(&buyer).await.unwrap().is_empty());

    let cart = Cart {
        buyer_id: buyer,
        items: vec![CartItem {
            product_id: Uuid::new_v4(),
            quantity: 3,
        }],
    };
    stores.carts.save_cart(&cart).await.unwrap();
    assert_eq!(stores.carts.get_cart(&buyer).await.unwrap(), cart);

    stores.carts.clear_cart(&buyer).await.unwrap();
    stores.carts.clear_cart(&buyer).await.unwrap();
    assert!(stores.carts.get_cart(&buyer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_catalog_returns_known_products() {
    let (stores, _) = stores().await;
    let product = ProductSummary {
        id: Uuid::new_v4(),
        name: "Brass diya".to_string(),
        price: 120.0,
        seller_id: Uuid::new_v4(),
        image: Some("/images/diya.png".to_string()),
    };
    stores.catalog.insert(&product).await.unwrap();

    let found = stores
        .catalog
        .get_products(&[product.id, Uuid::new_v4()])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[&product.id], product);
}

#[tokio::test]
async fn test_user_directory_hides_credentials() {
    let (stores, database) = stores().await;
    let id = Uuid::new_v4();
    database
        .collection::<mongodb::bson::Document>("users")
        .insert_one(doc! {
            "_id": id.to_string(),
            "name": "Asha",
            "email": "asha@example.com",
            "userType": "seller",
            "password": "$2b$10$hash",
            "paymentDetails": { "upiId": "asha@upi" }
        })
        .await
        .unwrap();

    let user: UserProfile = stores.users.get_user(&id).await.unwrap().unwrap();
    assert_eq!(user.user_type, UserType::Seller);
    assert_eq!(
        user.payment_details,
        PaymentDetails {
            upi_id: Some("asha@upi".to_string()),
            qr_code: None,
        }
    );
    assert!(stores.users.get_user(&Uuid::new_v4()).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Full flow through the HTTP layer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_checkout_and_verify_over_http() {
    let env = init_mongo_env().await;
    let mut config = MartConfig::default();
    config.storage.mongodb_uri = Some(env.connection_url.clone());
    config.storage.mongodb_database = database_name();
    config.storage.backend = jrmart::config::StorageBackend::Mongodb;
    let uploads = tempfile::tempdir().unwrap();
    config.uploads.directory = uploads.path().to_path_buf();

    let stores = MongoStores::connect(
        &env.connection_url,
        &config.storage.mongodb_database,
        "JR",
    )
    .await
    .unwrap();
    let buyer = Uuid::new_v4();
    let seller = Uuid::new_v4();
    let product = ProductSummary {
        id: Uuid::new_v4(),
        name: "Terracotta vase".to_string(),
        price: 250.0,
        seller_id: seller,
        image: None,
    };
    stores.catalog.insert(&product).await.unwrap();
    stores
        .carts
        .save_cart(&Cart {
            buyer_id: buyer,
            items: vec![CartItem {
                product_id: product.id,
                quantity: 2,
            }],
        })
        .await
        .unwrap();

    let backends = StorageBackends::from_config(&config).await.unwrap();
    let app = ServerBuilder::new()
        .with_config(config)
        .with_backends(backends)
        .build()
        .unwrap();
    let server = TestServer::new(app);

    let user = |id: Uuid| HeaderValue::from_str(&id.to_string()).unwrap();
    let id_header = HeaderName::from_static("x-user-id");
    let role_header = HeaderName::from_static("x-user-role");

    let response = server
        .post("/orders/checkout")
        .add_header(id_header.clone(), user(buyer))
        .add_header(role_header.clone(), HeaderValue::from_static("buyer"))
        .json(&json!({ "shippingAddress": "9 Lake View", "paymentMethod": "online" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let order = response.json::<Value>()["order"].clone();
    assert_eq!(order["totalAmount"], 500.0);
    let id = order["id"].as_str().unwrap().to_string();

    let form = axum_test::multipart::MultipartForm::new()
        .add_text("utrNumber", "UTR123")
        .add_text("paymentProofRef", "ref.png");
    server
        .post(&format!("/orders/{}/payment-proof", id))
        .add_header(id_header.clone(), user(buyer))
        .add_header(role_header.clone(), HeaderValue::from_static("buyer"))
        .multipart(form)
        .await
        .assert_status_ok();

    let response = server
        .patch(&format!("/orders/{}/payment-verification", id))
        .add_header(id_header.clone(), user(seller))
        .add_header(role_header.clone(), HeaderValue::from_static("seller"))
        .json(&json!({ "status": "payment_verified" }))
        .await;
    response.assert_status_ok();
    let order = &response.json::<Value>()["order"];
    assert_eq!(order["orderStatus"], "payment_verified");
    assert_eq!(order["trackingHistory"].as_array().unwrap().len(), 3);

    assert!(stores.carts.get_cart(&buyer).await.unwrap().is_empty());
}
