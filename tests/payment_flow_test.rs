use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use payu_reconciler::{
    app::{AppState, build_router},
    config::{GatewayConfig, GatewayMode, MerchantCredentials},
    error::AppError,
    models::{
        callback::{CallbackEvent, GatewayCallback, RawPayload},
        gateway::{GatewayInitiation, InitiationPayload, StatusQuery},
        transaction::TransactionStatus,
    },
    services::{
        callback_processor::CallbackProcessor, gateway_client::GatewayClient,
        hash_signer::HashSigner, payment_intent::PaymentIntentService,
        verification::VerificationClient,
    },
    store::{
        TransactionStore,
        memory::{InMemoryCustomerStore, InMemoryTransactionStore, InMemoryWebhookStore},
    },
};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Hosted-page gateway with a scripted reporting API.
#[derive(Default)]
struct FakeGateway {
    status_body: Mutex<Option<Value>>,
}

#[async_trait]
impl GatewayClient for FakeGateway {
    async fn initiate(&self, payload: &InitiationPayload) -> Result<GatewayInitiation, AppError> {
        Ok(GatewayInitiation::Redirect {
            url: format!("https://test.payu.in/pay/{}", payload.txnid),
        })
    }

    async fn query_status(&self, _query: &StatusQuery) -> Result<Value, AppError> {
        self.status_body
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::Gateway("Gateway status query timed out".to_string()))
    }
}

struct TestApp {
    router: Router,
    transactions: InMemoryTransactionStore,
    webhooks: InMemoryWebhookStore,
    gateway: Arc<FakeGateway>,
    signer: HashSigner,
}

fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        merchant_key: Some("gtKFFx".to_string()),
        merchant_salt: Some("eCwWELxi".to_string()),
        mode: GatewayMode::Test,
        base_url: None,
        public_base_url: "https://api.example.com".to_string(),
        frontend_url: "https://shop.example.com".to_string(),
        timeout: Duration::from_secs(5),
        product_label: "Payment".to_string(),
    }
}

fn test_app(reject_invalid_signatures: bool) -> TestApp {
    let config = Arc::new(gateway_config());
    let transactions = InMemoryTransactionStore::new();
    let webhooks = InMemoryWebhookStore::new();
    let gateway = Arc::new(FakeGateway::default());

    let state = AppState {
        intents: Arc::new(PaymentIntentService::new(
            config.clone(),
            Arc::new(transactions.clone()),
            Some(Arc::new(InMemoryCustomerStore::new())),
            gateway.clone(),
        )),
        callbacks: Arc::new(CallbackProcessor::new(
            config.clone(),
            Arc::new(transactions.clone()),
            Arc::new(webhooks.clone()),
        )),
        verification: Arc::new(VerificationClient::new(
            config,
            Arc::new(transactions.clone()),
            gateway.clone(),
        )),
        transactions: Arc::new(transactions.clone()),
        reject_invalid_signatures,
    };

    TestApp {
        router: build_router(state),
        transactions,
        webhooks,
        gateway,
        signer: HashSigner::new(MerchantCredentials {
            key: "gtKFFx".to_string(),
            salt: "eCwWELxi".to_string(),
        }),
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn post_json(&self, uri: &str, body: Value) -> Response {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn post_form(&self, uri: &str, fields: &RawPayload) -> Response {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter())
            .finish();
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Create a 100.00 INR intent for Jane and return its reference id.
    async fn create_intent(&self) -> String {
        let response = self
            .post_json(
                "/api/payu/payment-intent",
                json!({
                    "customerName": "Jane",
                    "customerEmail": "jane@x.com",
                    "customerPhone": "9999999999",
                    "amount": 100.00
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["amount"], "100.00");
        assert_eq!(body["gateway"]["type"], "redirect");
        body["referenceId"].as_str().unwrap().to_string()
    }

    /// Callback payload as PayU would post it, hashed with the merchant salt.
    fn signed_callback(&self, reference_id: &str, status: &str) -> RawPayload {
        let mut raw: RawPayload = [
            ("key", "gtKFFx"),
            ("txnid", reference_id),
            ("mihpayid", "403993715521937565"),
            ("status", status),
            ("amount", "100.00"),
            ("productinfo", "Payment for 100.00 INR"),
            ("firstname", "Jane"),
            ("email", "jane@x.com"),
            ("phone", "9999999999"),
            ("mode", "UPI"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let hash = self
            .signer
            .response_hash(GatewayCallback::parse(CallbackEvent::Success, &raw).form());
        raw.insert("hash".to_string(), hash);
        raw
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health_reports_connected_store() {
    let app = test_app(true);

    let response = app.get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_successful_payment_end_to_end() {
    let app = test_app(true);
    let reference_id = app.create_intent().await;

    let pending = app.transactions.find_by_reference(&reference_id).await.unwrap().unwrap();
    assert_eq!(pending.status, TransactionStatus::Pending);

    let response = app
        .post_form(
            "/api/payu/success",
            &app.signed_callback(&reference_id, "success"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(&format!(
        "https://shop.example.com/payment/success?referenceId={}&amount=100.00",
        reference_id
    )));

    let response = app
        .get(&format!("/api/payu/transaction/{}", reference_id))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["amount"], "100.00");
    assert_eq!(body["gatewayPaymentId"], "403993715521937565");
    assert_eq!(body["needsReview"], false);
    assert!(body.get("rawCallbackPayload").is_none());

    let records = app.webhooks.records().await;
    assert_eq!(records.len(), 1);
    assert!(records[0].verified);
    assert_eq!(records[0].event, "payment_success");
}

#[tokio::test]
async fn test_forged_callback_is_rejected_and_audited() {
    let app = test_app(true);
    let reference_id = app.create_intent().await;

    let mut forged = app.signed_callback(&reference_id, "success");
    forged.insert("hash".to_string(), "0".repeat(128));

    let response = app.post_form("/api/payu/success", &forged).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "invalid_signature");

    let tx = app.transactions.find_by_reference(&reference_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    let records = app.webhooks.records().await;
    assert_eq!(records.len(), 1);
    assert!(!records[0].verified);
}

#[tokio::test]
async fn test_forged_callback_redirects_when_rejection_disabled() {
    let app = test_app(false);
    let reference_id = app.create_intent().await;

    let mut forged = app.signed_callback(&reference_id, "success");
    forged.insert("amount".to_string(), "1.00".to_string());

    let response = app.post_form("/api/payu/failure", &forged).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "https://shop.example.com/payment/failure");
    let tx = app.transactions.find_by_reference(&reference_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn test_webhook_is_acknowledged_and_applied_once() {
    let app = test_app(true);
    let reference_id = app.create_intent().await;
    let payload = app.signed_callback(&reference_id, "success");

    let first = json_body(app.post_form("/api/payu/webhook", &payload).await).await;
    let second = json_body(app.post_form("/api/payu/webhook", &payload).await).await;

    assert_eq!(first["received"], true);
    assert_eq!(first["verified"], true);
    assert_eq!(first["disposition"], "transitioned");
    assert_eq!(second["disposition"], "already_terminal");
    assert_eq!(app.webhooks.records().await.len(), 2);
}

#[tokio::test]
async fn test_forged_webhook_is_rejected_when_rejection_enabled() {
    let app = test_app(true);
    let reference_id = app.create_intent().await;
    let mut forged = app.signed_callback(&reference_id, "success");
    forged.insert("status".to_string(), "failure".to_string());

    let response = app.post_form("/api/payu/webhook", &forged).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "invalid_signature");
    let tx = app.transactions.find_by_reference(&reference_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(app.webhooks.records().await.len(), 1);
}

#[tokio::test]
async fn test_forged_webhook_is_acknowledged_unverified_when_rejection_disabled() {
    let app = test_app(false);
    let reference_id = app.create_intent().await;
    let mut forged = app.signed_callback(&reference_id, "success");
    forged.insert("status".to_string(), "failure".to_string());

    let response = app.post_form("/api/payu/webhook", &forged).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["received"], true);
    assert_eq!(body["verified"], false);
    assert_eq!(body["disposition"], Value::Null);
    let tx = app.transactions.find_by_reference(&reference_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    let records = app.webhooks.records().await;
    assert_eq!(records.len(), 1);
    assert!(!records[0].verified);
}

#[tokio::test]
async fn test_callback_for_unknown_reference_redirects_to_failure() {
    let app = test_app(true);

    let response = app
        .post_form("/api/payu/success", &app.signed_callback("TXN404", "success"))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "https://shop.example.com/payment/failure");
    assert_eq!(app.webhooks.records().await.len(), 1);
}

#[tokio::test]
async fn test_verify_payment_settles_pending_transaction() {
    let app = test_app(true);
    let reference_id = app.create_intent().await;
    let mut details = serde_json::Map::new();
    details.insert(
        reference_id.clone(),
        json!({
            "mihpayid": "403993715521937565",
            "txnid": reference_id,
            "amt": "100.00",
            "status": "success"
        }),
    );
    *app.gateway.status_body.lock().unwrap() = Some(json!({
        "status": 1,
        "msg": "1 out of 1 Transactions Fetched Successfully",
        "transaction_details": details
    }));

    let response = app
        .post_json("/api/payu/verify-payment", json!({ "txnid": reference_id }))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["reconciled"], true);
    let tx = app.transactions.find_by_reference(&reference_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Success);
}

#[tokio::test]
async fn test_unreachable_gateway_reports_error_status() {
    let app = test_app(true);
    let reference_id = app.create_intent().await;

    let response = app
        .get(&format!("/api/payu/payment-status/{}", reference_id))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Gateway status query timed out");
}

#[tokio::test]
async fn test_unknown_transaction_is_404() {
    let app = test_app(true);

    let response = app.get("/api/payu/transaction/TXN404").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "transaction_not_found");
}

#[tokio::test]
async fn test_payment_redirect_sends_browser_to_gateway() {
    let app = test_app(true);

    let response = app
        .get("/api/payu/payment-redirect?customerName=Jane&amount=250")
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response);
    assert!(target.starts_with("https://test.payu.in/pay/TXN"));
    assert_eq!(app.transactions.len().await, 1);
}

#[tokio::test]
async fn test_non_positive_amount_is_400() {
    let app = test_app(true);

    let response = app
        .post_json(
            "/api/payu/payment-intent",
            json!({ "customerName": "Jane", "customerEmail": "jane@x.com", "amount": 0 }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "invalid_request");
    assert_eq!(app.transactions.len().await, 0);
}
