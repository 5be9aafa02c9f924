//! Integration Tests for the Exchange API
//!
//! These tests drive the real router with real components:
//! - SPIFFE identity extracted from rcgen-built client certificates
//! - Policy loaded from YAML
//! - ES256 tokens verified against the published JWKS
//! - Audit records captured for every policy decision

use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use rcgen::{CertificateParams, DnType, KeyPair, SanType};
use serde_json::{json, Value};
use tower::ServiceExt;

use svid_exchange_core::{
    AuditOutcome, AuditSink, Claims, ExchangeAuditEvent, JwkSet, PolicyStore, ISSUER,
};
use svid_exchange_identity::{handlers::SpiffeExtractor, TransportSession};
use svid_exchange_plane::{create_router, AppState, ExchangeResponse, ExchangeService, KeyRegistry};

const ORDER: &str = "spiffe://cluster.local/ns/default/sa/order";
const PAYMENT: &str = "spiffe://cluster.local/ns/default/sa/payment";
const INVENTORY: &str = "spiffe://cluster.local/ns/default/sa/inventory";

const POLICY: &str = r#"
policies:
  - name: order-to-payment
    subject: spiffe://cluster.local/ns/default/sa/order
    target: spiffe://cluster.local/ns/default/sa/payment
    allowed_scopes:
      - payments:charge
      - payments:refund
    max_ttl: 300
"#;

// =============================================================================
// Test Helpers
// =============================================================================

#[derive(Default)]
struct RecordingAudit {
    events: Mutex<Vec<ExchangeAuditEvent>>,
}

impl RecordingAudit {
    fn events(&self) -> Vec<ExchangeAuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: ExchangeAuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

struct TestServer {
    app: Router,
    audit: Arc<RecordingAudit>,
}

fn test_server() -> TestServer {
    let registry = KeyRegistry::generate("integration-key").unwrap();
    let audit = Arc::new(RecordingAudit::default());
    let exchange = ExchangeService::new(
        Arc::new(SpiffeExtractor::new()),
        Arc::new(PolicyStore::from_yaml(POLICY).unwrap()),
        registry.minter(),
        audit.clone(),
    );

    TestServer {
        app: create_router(Arc::new(AppState { exchange, registry })),
        audit,
    }
}

/// A TLS session whose leaf certificate carries the given URI SANs
fn session_for(uris: &[&str]) -> TransportSession {
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, "workload");
    params.subject_alt_names = uris
        .iter()
        .map(|uri| SanType::URI((*uri).try_into().unwrap()))
        .collect();

    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    TransportSession::tls(vec![cert.der().clone()])
}

fn exchange_request(session: Option<TransportSession>, body: Value) -> Request<Body> {
    let mut request = Request::builder()
        .method(Method::POST)
        .uri("/v1/exchange")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    if let Some(session) = session {
        request.extensions_mut().insert(session);
    }
    request
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn fetch_jwks(app: &Router) -> JwkSet {
    let request = Request::builder()
        .uri("/.well-known/jwks.json")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_value(body).unwrap()
}

async fn verify(app: &Router, token: &str, audience: &str) -> Claims {
    let jwks = fetch_jwks(app).await;
    let header = decode_header(token).unwrap();
    let jwk = jwks
        .keys
        .iter()
        .find(|k| Some(&k.kid) == header.kid.as_ref())
        .expect("token kid should be published");

    let key = DecodingKey::from_ec_components(&jwk.x, &jwk.y).unwrap();
    let mut validation = Validation::new(Algorithm::ES256);
    validation.set_audience(&[audience]);
    validation.set_issuer(&[ISSUER]);
    decode::<Claims>(token, &key, &validation).unwrap().claims
}

// =============================================================================
// Grant Scenarios
// =============================================================================

#[tokio::test]
async fn test_full_grant() {
    let server = test_server();
    let request = exchange_request(
        Some(session_for(&[ORDER])),
        json!({
            "target_service": PAYMENT,
            "scopes": ["payments:charge", "payments:refund"],
            "ttl_seconds": 300,
        }),
    );

    let (status, body) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::OK);

    let response: ExchangeResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.granted_scopes, vec!["payments:charge", "payments:refund"]);

    let claims = verify(&server.app, &response.token, PAYMENT).await;
    assert_eq!(claims.iss, ISSUER);
    assert_eq!(claims.sub, ORDER);
    assert_eq!(claims.aud, vec![PAYMENT.to_string()]);
    assert_eq!(claims.scope, "payments:charge payments:refund");
    assert_eq!(claims.jti, response.token_id);
    assert_eq!(claims.exp, response.expires_at);
    assert_eq!(claims.exp - claims.iat, 300);

    let events = server.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].subject, ORDER);
    assert_eq!(
        events[0].outcome,
        AuditOutcome::Granted {
            scopes_granted: vec!["payments:charge".into(), "payments:refund".into()],
            ttl: 300,
            token_id: response.token_id,
        }
    );
}

#[tokio::test]
async fn test_partial_grant() {
    let server = test_server();
    let request = exchange_request(
        Some(session_for(&[ORDER])),
        json!({
            "target_service": PAYMENT,
            "scopes": ["payments:charge", "admin:delete"],
            "ttl_seconds": 300,
        }),
    );

    let (status, body) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::OK);

    let response: ExchangeResponse = serde_json::from_value(body).unwrap();
    assert_eq!(response.granted_scopes, vec!["payments:charge"]);

    let claims = verify(&server.app, &response.token, PAYMENT).await;
    assert_eq!(claims.scope, "payments:charge");

    let events = server.audit.events();
    assert_eq!(
        events[0].scopes_requested,
        vec!["payments:charge".to_string(), "admin:delete".to_string()]
    );
}

#[tokio::test]
async fn test_ttl_clamped_to_rule_maximum() {
    for requested in [9999, 0, -5] {
        let server = test_server();
        let request = exchange_request(
            Some(session_for(&[ORDER])),
            json!({
                "target_service": PAYMENT,
                "scopes": ["payments:charge"],
                "ttl_seconds": requested,
            }),
        );

        let (status, body) = send(&server.app, request).await;
        assert_eq!(status, StatusCode::OK, "ttl {}", requested);

        let response: ExchangeResponse = serde_json::from_value(body).unwrap();
        let claims = verify(&server.app, &response.token, PAYMENT).await;
        assert_eq!(claims.exp - claims.iat, 300, "ttl {}", requested);
    }
}

#[tokio::test]
async fn test_ttl_omitted_defaults_to_maximum() {
    let server = test_server();
    let request = exchange_request(
        Some(session_for(&[ORDER])),
        json!({ "target_service": PAYMENT, "scopes": ["payments:refund"] }),
    );

    let (status, body) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::OK);

    let response: ExchangeResponse = serde_json::from_value(body).unwrap();
    let claims = verify(&server.app, &response.token, PAYMENT).await;
    assert_eq!(claims.exp - claims.iat, 300);
}

// =============================================================================
// Denials and Errors
// =============================================================================

#[tokio::test]
async fn test_full_deny() {
    let server = test_server();
    let request = exchange_request(
        Some(session_for(&[ORDER])),
        json!({ "target_service": PAYMENT, "scopes": ["admin:delete"], "ttl_seconds": 60 }),
    );

    let (status, body) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "PERMISSION_DENIED");
    assert!(body.get("token").is_none());

    let events = server.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].outcome,
        AuditOutcome::Denied {
            denial_reason: format!("no policy permits {} → {}", ORDER, PAYMENT),
        }
    );
}

#[tokio::test]
async fn test_unknown_pair_denied() {
    let server = test_server();

    // Unknown target
    let request = exchange_request(
        Some(session_for(&[ORDER])),
        json!({ "target_service": INVENTORY, "scopes": ["payments:charge"] }),
    );
    let (status, _) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Unknown subject
    let request = exchange_request(
        Some(session_for(&[INVENTORY])),
        json!({ "target_service": PAYMENT, "scopes": ["payments:charge"] }),
    );
    let (status, body) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["error"],
        format!("no policy permits {} to access {}", INVENTORY, PAYMENT)
    );

    assert_eq!(server.audit.events().len(), 2);
}

#[tokio::test]
async fn test_missing_peer_certificate_is_unauthenticated() {
    let server = test_server();

    for session in [None, Some(TransportSession::unauthenticated()), Some(TransportSession::tls(Vec::new()))] {
        let request = exchange_request(
            session,
            json!({ "target_service": PAYMENT, "scopes": ["payments:charge"] }),
        );

        let (status, body) = send(&server.app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHENTICATED");
    }

    assert!(server.audit.events().is_empty());
}

#[tokio::test]
async fn test_certificate_without_spiffe_id_is_unauthenticated() {
    let server = test_server();
    let request = exchange_request(
        Some(session_for(&["https://order.example.com"])),
        json!({ "target_service": PAYMENT, "scopes": ["payments:charge"] }),
    );

    let (status, body) = send(&server.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
    assert!(server.audit.events().is_empty());
}

#[tokio::test]
async fn test_invalid_arguments() {
    let server = test_server();

    let cases = [
        (json!({ "scopes": ["payments:charge"] }), "target_service is required"),
        (json!({ "target_service": PAYMENT }), "at least one scope is required"),
        (json!({ "target_service": PAYMENT, "scopes": [] }), "at least one scope is required"),
    ];

    for (body, message) in cases {
        let request = exchange_request(Some(session_for(&[ORDER])), body);
        let (status, body) = send(&server.app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_ARGUMENT");
        assert_eq!(body["error"], message);
    }

    assert!(server.audit.events().is_empty());
}

#[tokio::test]
async fn test_malformed_body() {
    let server = test_server();

    let request = |session: Option<TransportSession>| {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/v1/exchange")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        if let Some(session) = session {
            request.extensions_mut().insert(session);
        }
        request
    };

    // Authenticated caller: client input error
    let (status, body) = send(&server.app, request(Some(session_for(&[ORDER])))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_ARGUMENT");

    // Unauthenticated caller: identity is checked first
    let (status, body) = send(&server.app, request(None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

// =============================================================================
// Verification Key
// =============================================================================

#[tokio::test]
async fn test_jwks_endpoint() {
    let server = test_server();
    let jwks = fetch_jwks(&server.app).await;

    assert_eq!(jwks.keys.len(), 1);
    let jwk = &jwks.keys[0];
    assert_eq!(jwk.kid, "integration-key");
    assert_eq!(jwk.kty, "EC");
    assert_eq!(jwk.crv, "P-256");
    assert_eq!(jwk.alg, "ES256");
    assert_eq!(jwk.key_use, "sig");
}

#[tokio::test]
async fn test_token_ids_unique_across_requests() {
    let server = test_server();
    let mut seen = std::collections::HashSet::new();

    for _ in 0..100 {
        let request = exchange_request(
            Some(session_for(&[ORDER])),
            json!({ "target_service": PAYMENT, "scopes": ["payments:charge"] }),
        );
        let (status, body) = send(&server.app, request).await;
        assert_eq!(status, StatusCode::OK);
        let response: ExchangeResponse = serde_json::from_value(body).unwrap();
        assert!(seen.insert(response.token_id));
    }
}
