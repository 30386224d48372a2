//! Request-level tests against the in-memory backend

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use auth::PasswordService;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use board::payment::{
    PaymentError, PaymentProvider, PaymentSession, SIGNATURE_HEADER, sign_webhook_payload,
};
use board::repositories::Repositories;
use board::{AppState, create_router};
use chrono::{DateTime, Duration, Utc};
use common::BoardConfig;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

const ADMIN_PASSWORD: &str = "admin-password";

/// Provider that hands out fake sessions and counts them
#[derive(Default)]
struct RecordingCheckout {
    sessions: AtomicUsize,
}

#[async_trait]
impl PaymentProvider for RecordingCheckout {
    async fn initiate(&self, job_id: Uuid, _amount: i64) -> Result<PaymentSession, PaymentError> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentSession {
            reference: format!("cs_test_{}", job_id.simple()),
            checkout_url: format!("https://pay.test/{}", job_id),
        })
    }
}

struct Harness {
    app: Router,
    state: AppState,
    payments: Arc<RecordingCheckout>,
}

impl Harness {
    fn new() -> Self {
        let mut config = BoardConfig::defaults().unwrap();
        config.secret_key = "end-to-end-secret".to_string();
        config.admin_password_hash = Some(PasswordService::new().hash(ADMIN_PASSWORD).unwrap());

        let payments = Arc::new(RecordingCheckout::default());
        let state = AppState::new(config, Repositories::memory(), payments.clone());

        Self {
            app: create_router(state.clone()),
            state,
            payments,
        }
    }

    fn csrf(&self) -> String {
        self.state.csrf.generate().unwrap()
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Form submission carrying a valid CSRF token in the form body
    fn form(&self, method: &str, uri: &str, cookie: Option<&str>, fields: &[(&str, &str)]) -> Request<Body> {
        let token = self.csrf();
        let mut fields: Vec<(&str, &str)> = fields.to_vec();
        fields.push(("csrf_token", &token));
        form_request(method, uri, cookie, &fields)
    }

    async fn register(&self, email: &str) -> String {
        let response = self
            .send(self.form(
                "POST",
                "/employer/register",
                None,
                &[
                    ("email", email),
                    ("password", "correct horse battery"),
                    ("company_name", "Acme Corp"),
                    ("contact_name", "Jo Doe"),
                ],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        session_cookie(&response)
    }

    async fn admin_login(&self) -> String {
        let response = self
            .send(self.form(
                "POST",
                "/admin/login",
                None,
                &[("username", "admin"), ("password", ADMIN_PASSWORD)],
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/admin");
        session_cookie(&response)
    }

    async fn post_job(&self, cookie: &str) -> Uuid {
        let response = self
            .send(self.form("POST", "/employer/jobs/new", Some(cookie), &job_fields()))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        job_id(&json_body(response).await)
    }

    async fn send_webhook(&self, event: &Value) -> Response {
        let payload = event.to_string();
        let signature = sign_webhook_payload(
            payload.as_bytes(),
            &self.state.config.stripe_webhook_secret,
            Utc::now().timestamp(),
        )
        .unwrap();

        self.send(
            Request::builder()
                .method("POST")
                .uri("/stripe/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .header(SIGNATURE_HEADER, signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
    }

    async fn publish_by_payment(&self, job_id: Uuid) {
        let response = self.send_webhook(&payment_event(job_id)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    async fn listed_ids(&self, uri: &str) -> Vec<Uuid> {
        let body = json_body(self.get(uri, None).await).await;
        body["jobs"]
            .as_array()
            .unwrap()
            .iter()
            .map(|job| job["id"].as_str().unwrap().parse().unwrap())
            .collect()
    }
}

fn job_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("title", "Senior Rust Engineer"),
        ("description", "Build reliable services in Rust."),
        ("tags", "rust, backend"),
        ("salary_min", "90000"),
        ("salary_max", "120000"),
        ("apply_url", "https://acme.test/apply"),
    ]
}

fn payment_event(job_id: Uuid) -> Value {
    json!({
        "type": "checkout.session.completed",
        "data": { "object": { "metadata": { "job_id": job_id.to_string() } } }
    })
}

fn form_request(method: &str, uri: &str, cookie: Option<&str>, fields: &[(&str, &str)]) -> Request<Body> {
    let body = serde_urlencoded::to_string(fields).unwrap();

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

/// `name=value` of the first cookie the response sets
fn session_cookie(response: &Response) -> String {
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn job_id(body: &Value) -> Uuid {
    body["job"]["id"].as_str().unwrap().parse().unwrap()
}

fn timestamp(value: &Value) -> DateTime<Utc> {
    serde_json::from_value(value.clone()).unwrap()
}

#[tokio::test]
async fn test_health_and_csrf_header() {
    let harness = Harness::new();

    let response = harness.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-csrf-token"));
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_protected_pages_redirect_to_login() {
    let harness = Harness::new();

    let response = harness.get("/employer/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/employer/login");

    let response = harness.get("/admin", None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/admin/login");

    // An employer session does not open the back-office
    let cookie = harness.register("owner@acme.test").await;
    let response = harness.get("/admin", Some(&cookie)).await;
    assert_eq!(response.headers()[header::LOCATION], "/admin/login");
}

#[tokio::test]
async fn test_register_signs_in() {
    let harness = Harness::new();

    let response = harness
        .send(harness.form(
            "POST",
            "/employer/register",
            None,
            &[
                ("email", " Owner@Acme.test "),
                ("password", "correct horse battery"),
                ("company_name", "Acme Corp"),
                ("contact_name", "Jo Doe"),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/employer/dashboard");

    let cookie = session_cookie(&response);
    assert!(cookie.starts_with("employer_session="));

    let body = json_body(harness.get("/employer/dashboard", Some(&cookie)).await).await;
    assert_eq!(body["account"]["email"], "owner@acme.test");
    assert!(body["account"].get("password_hash").is_none());
    assert_eq!(body["employers"][0]["name"], "Acme Corp");

    // Signed-in employers are sent back to their dashboard
    let response = harness.get("/employer/register", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/employer/dashboard");
}

#[tokio::test]
async fn test_register_rejects_duplicate_email() {
    let harness = Harness::new();
    harness.register("owner@acme.test").await;

    let response = harness
        .send(harness.form(
            "POST",
            "/employer/register",
            None,
            &[
                ("email", "OWNER@acme.test"),
                ("password", "another password"),
                ("company_name", "Other Corp"),
                ("contact_name", "Sam Roe"),
            ],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["field"], "email");
}

#[tokio::test]
async fn test_mutations_require_csrf_token() {
    let harness = Harness::new();

    let missing = form_request(
        "POST",
        "/employer/register",
        None,
        &[("email", "owner@acme.test"), ("password", "correct horse battery")],
    );
    assert_eq!(harness.send(missing).await.status(), StatusCode::FORBIDDEN);

    let forged = form_request(
        "POST",
        "/admin/login",
        None,
        &[
            ("csrf_token", "not-a-token"),
            ("username", "admin"),
            ("password", ADMIN_PASSWORD),
        ],
    );
    let response = harness.send(forged).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!response.headers().contains_key(header::SET_COOKIE));

    // The header is accepted in place of the form field
    let mut with_header = form_request(
        "POST",
        "/admin/login",
        None,
        &[("username", "admin"), ("password", ADMIN_PASSWORD)],
    );
    with_header
        .headers_mut()
        .insert("x-csrf-token", harness.csrf().parse().unwrap());
    assert_eq!(harness.send(with_header).await.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_employer_login() {
    let harness = Harness::new();
    harness.register("owner@acme.test").await;

    let response = harness
        .send(harness.form(
            "POST",
            "/employer/login",
            None,
            &[("email", "owner@acme.test"), ("password", "wrong password")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key(header::SET_COOKIE));
    assert_eq!(json_body(response).await["error"], "Invalid email or password");

    let response = harness
        .send(harness.form(
            "POST",
            "/employer/login",
            None,
            &[("email", "owner@acme.test"), ("password", "correct horse battery")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(session_cookie(&response).starts_with("employer_session="));
}

#[tokio::test]
async fn test_invalid_salary_range_is_rejected() {
    let harness = Harness::new();
    let cookie = harness.register("owner@acme.test").await;

    let mut fields = job_fields();
    fields.retain(|(key, _)| !key.starts_with("salary"));
    fields.push(("salary_min", "150000"));
    fields.push(("salary_max", "100000"));

    let response = harness
        .send(harness.form("POST", "/employer/jobs/new", Some(&cookie), &fields))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["field"], "salary_max");

    let body = json_body(harness.get("/employer/dashboard", Some(&cookie)).await).await;
    assert!(body["jobs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_jobs_are_private_to_their_account() {
    let harness = Harness::new();
    let owner = harness.register("owner@acme.test").await;
    let other = harness.register("other@acme.test").await;
    let id = harness.post_job(&owner).await;

    let uri = format!("/employer/jobs/{}", id);
    assert_eq!(harness.get(&uri, Some(&owner)).await.status(), StatusCode::OK);
    assert_eq!(harness.get(&uri, Some(&other)).await.status(), StatusCode::NOT_FOUND);

    // Drafts are not public
    let public = harness.get(&format!("/jobs/{}", id), None).await;
    assert_eq!(public.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_publishes_job() {
    let harness = Harness::new();
    let cookie = harness.register("owner@acme.test").await;
    let id = harness.post_job(&cookie).await;

    let response = harness
        .send(harness.form(
            "POST",
            &format!("/employer/jobs/{}/checkout", id),
            Some(&cookie),
            &[],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["checkout_url"], format!("https://pay.test/{}", id));
    assert_eq!(harness.payments.sessions.load(Ordering::SeqCst), 1);
    assert!(!harness.listed_ids("/").await.contains(&id));

    harness.publish_by_payment(id).await;

    let body = json_body(harness.get(&format!("/jobs/{}", id), None).await).await;
    let job = &body["job"];
    assert_eq!(job["status"], "published");
    assert_eq!(job["payment_completed"], true);
    assert_eq!(job["payment_amount"], 1000);
    assert_eq!(job["tag_list"], json!(["rust", "backend"]));
    assert_eq!(
        timestamp(&job["expires_at"]) - timestamp(&job["published_at"]),
        Duration::days(30)
    );
    assert!(harness.listed_ids("/").await.contains(&id));

    // Redelivery of the same event changes nothing
    harness.publish_by_payment(id).await;
    let again = json_body(harness.get(&format!("/jobs/{}", id), None).await).await;
    assert_eq!(again["job"]["published_at"], job["published_at"]);

    // A published job cannot be checked out again
    let response = harness
        .send(harness.form(
            "POST",
            &format!("/employer/jobs/{}/checkout", id),
            Some(&cookie),
            &[],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let harness = Harness::new();
    let cookie = harness.register("owner@acme.test").await;
    let id = harness.post_job(&cookie).await;

    let request = Request::builder()
        .method("POST")
        .uri("/stripe/webhook")
        .header(SIGNATURE_HEADER, format!("t={},v1=00ff", Utc::now().timestamp()))
        .body(Body::from(payment_event(id).to_string()))
        .unwrap();
    assert_eq!(harness.send(request).await.status(), StatusCode::BAD_REQUEST);

    let unsigned = Request::builder()
        .method("POST")
        .uri("/stripe/webhook")
        .body(Body::from(payment_event(id).to_string()))
        .unwrap();
    assert_eq!(harness.send(unsigned).await.status(), StatusCode::BAD_REQUEST);

    let body = json_body(harness.get(&format!("/employer/jobs/{}", id), Some(&cookie)).await).await;
    assert_eq!(body["job"]["status"], "draft");

    // Unrelated events are acknowledged
    let response = harness
        .send_webhook(&json!({ "type": "customer.created", "data": { "object": {} } }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_refunds_succeed_once() {
    let harness = Harness::new();
    let cookie = harness.register("owner@acme.test").await;
    let id = harness.post_job(&cookie).await;
    harness.publish_by_payment(id).await;

    let uri = format!("/employer/jobs/{}/refund", id);
    let requests: Vec<_> = (0..2)
        .map(|_| {
            let app = harness.app.clone();
            let request = harness.form("POST", &uri, Some(&cookie), &[("reason", "Filled")]);
            tokio::spawn(async move { app.oneshot(request).await.unwrap().status() })
        })
        .collect();

    let mut statuses = Vec::new();
    for request in requests {
        statuses.push(request.await.unwrap());
    }
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

    let body = json_body(harness.get(&uri.replace("/refund", ""), Some(&cookie)).await).await;
    assert_eq!(body["job"]["status"], "refunded");
    assert_eq!(body["job"]["refund_reason"], "Filled");
    assert!(!harness.listed_ids("/").await.contains(&id));
}

#[tokio::test]
async fn test_admin_manages_jobs() {
    let harness = Harness::new();
    let cookie = harness.admin_login().await;

    let response = harness
        .send(harness.form(
            "POST",
            "/admin/employers",
            Some(&cookie),
            &[("name", "Initech")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let employer_id = json_body(response).await["employer"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = harness
        .send(harness.form(
            "POST",
            "/admin/categories",
            Some(&cookie),
            &[("name", "Platform Engineering")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let category = json_body(response).await["category"].clone();
    assert_eq!(category["slug"], "platform-engineering");

    let category_id = category["id"].as_str().unwrap().to_string();
    let mut fields: Vec<(&str, &str)> = job_fields();
    fields.push(("employer_id", &employer_id));
    fields.push(("category_id", &category_id));
    fields.push(("status", "published"));
    let response = harness
        .send(harness.form("POST", "/admin/jobs/new", Some(&cookie), &fields))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = job_id(&json_body(response).await);

    assert!(harness.listed_ids("/").await.contains(&id));
    assert_eq!(
        harness.listed_ids("/search?category=platform-engineering&tags=rust").await,
        vec![id]
    );
    assert!(harness.listed_ids("/search?category=unknown").await.is_empty());
    assert!(harness.listed_ids("/search?q=cobol").await.is_empty());

    let response = harness
        .send(harness.form(
            "PATCH",
            &format!("/admin/jobs/{}", id),
            Some(&cookie),
            &[("status", "expired")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["job"]["status"], "expired");

    assert!(!harness.listed_ids("/").await.contains(&id));
    let detail = harness.get(&format!("/jobs/{}", id), None).await;
    assert_eq!(detail.status(), StatusCode::OK);
    // The status is rewritten; the derived flag still follows expires_at
    let body = json_body(detail).await;
    assert_eq!(body["job"]["status"], "expired");
    assert_eq!(body["job"]["is_expired"], false);
}

#[tokio::test]
async fn test_admin_login_failure_keeps_form() {
    let harness = Harness::new();

    let response = harness
        .send(harness.form(
            "POST",
            "/admin/login",
            None,
            &[("username", "admin"), ("password", "guess")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key(header::SET_COOKIE));
    let body = json_body(response).await;
    assert_eq!(body["error"], "Invalid credentials");
    assert!(body["csrf_token"].is_string());
}

#[tokio::test]
async fn test_csrf_header_without_form_body() {
    let harness = Harness::new();
    let cookie = harness.admin_login().await;

    let logout = Request::builder()
        .method("POST")
        .uri("/admin/logout")
        .header(header::COOKIE, &cookie)
        .header("x-csrf-token", harness.csrf())
        .body(Body::empty())
        .unwrap();
    let response = harness.send(logout).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/admin/login");

    // A JSON body is not read, so required fields come up empty
    let category = Request::builder()
        .method("POST")
        .uri("/admin/categories")
        .header(header::COOKIE, &cookie)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-csrf-token", harness.csrf())
        .body(Body::from(json!({ "name": "Data" }).to_string()))
        .unwrap();
    let response = harness.send(category).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["field"], "name");
}

#[tokio::test]
async fn test_csrf_checked_before_body_type() {
    let harness = Harness::new();
    let cookie = harness.admin_login().await;

    let category = Request::builder()
        .method("POST")
        .uri("/admin/categories")
        .header(header::COOKIE, &cookie)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "name": "Data" }).to_string()))
        .unwrap();
    assert_eq!(harness.send(category).await.status(), StatusCode::FORBIDDEN);

    let empty = Request::builder()
        .method("POST")
        .uri("/employer/register")
        .body(Body::empty())
        .unwrap();
    assert_eq!(harness.send(empty).await.status(), StatusCode::FORBIDDEN);

    let body = json_body(harness.get("/admin", Some(&cookie)).await).await;
    assert!(body["categories"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_status_edit_keeps_fields() {
    let harness = Harness::new();
    let cookie = harness.register("owner@acme.test").await;
    let id = harness.post_job(&cookie).await;
    harness.publish_by_payment(id).await;
    let admin = harness.admin_login().await;

    let uri = format!("/admin/jobs/{}", id);
    let response = harness
        .send(harness.form(
            "PATCH",
            &uri,
            Some(&admin),
            &[("title", "Renamed by a rejected edit"), ("status", "draft")],
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = json_body(harness.get(&uri, Some(&admin)).await).await;
    assert_eq!(body["job"]["title"], "Senior Rust Engineer");
    assert_eq!(body["job"]["status"], "published");
}
