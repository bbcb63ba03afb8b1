use anyhow::{anyhow, Result};
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use memberauth::{
    api::{
        self,
        handlers::{login::LoginForm, signup::SignupForm},
    },
    auth::{password::PasswordHasher, AuthConfig, AuthService, Email, Role, Username},
    store::{
        memory::{MemoryCredentialStore, MemorySessionStore},
        CredentialStore, NewUser, SessionRecord, SessionStore, StoreFuture,
    },
};
use secrecy::SecretString;
use std::sync::Arc;
use tower::ServiceExt;

const FORM: &str = "application/x-www-form-urlencoded";

struct TestApp {
    router: Router,
    credentials: Arc<MemoryCredentialStore>,
}

impl TestApp {
    fn new() -> Result<Self> {
        Self::with_sessions(Arc::new(MemorySessionStore::new()))
    }

    fn with_sessions(sessions: Arc<dyn SessionStore>) -> Result<Self> {
        let credentials = Arc::new(MemoryCredentialStore::new());
        let service = AuthService::new(
            credentials.clone(),
            sessions,
            AuthConfig::new().with_bcrypt_cost(4),
            SecretString::from("integration-secret".to_string()),
        )?;
        Ok(Self {
            router: api::router(Arc::new(service)),
            credentials,
        })
    }

    async fn seed_admin(&self, username: &str, email: &str, password: &str) -> Result<()> {
        let hasher = PasswordHasher::new(4)?;
        self.credentials
            .insert(NewUser {
                username: Username::parse(username)?,
                email: Email::parse(email)?,
                password_hash: hasher.hash(password)?,
                role: Role::Admin,
            })
            .await?;
        Ok(())
    }

    async fn send(&self, request: Request<Body>) -> Result<Response> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> Result<Response> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(COOKIE, format!("memberauth_session={token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    async fn post(
        &self,
        uri: &str,
        content_type: &str,
        body: impl Into<Body>,
        token: Option<&str>,
    ) -> Result<Response> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, content_type);
        if let Some(token) = token {
            builder = builder.header(COOKIE, format!("memberauth_session={token}"));
        }
        self.send(builder.body(body.into())?).await
    }

    async fn signup(&self, username: &str, email: &str, password: &str) -> Result<Response> {
        let form = SignupForm {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post("/signup", "application/json", serde_json::to_vec(&form)?, None)
            .await
    }

    async fn login(&self, email: &str, password: &str) -> Result<Response> {
        let form = LoginForm {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post("/login", "application/json", serde_json::to_vec(&form)?, None)
            .await
    }
}

fn session_token(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            cookie
                .split(';')
                .next()
                .and_then(|pair| pair.strip_prefix("memberauth_session="))
                .filter(|token| !token.is_empty())
                .map(ToString::to_string)
        })
}

fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
}

async fn body_json(response: Response) -> Result<serde_json::Value> {
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[tokio::test]
async fn signup_then_login_reaches_members() -> Result<()> {
    let app = TestApp::new()?;

    let response = app.signup("alice", "a@example.com", "Secret123").await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/members"));
    assert!(session_token(&response).is_some());

    let response = app.login("a@example.com", "Secret123").await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let token = session_token(&response).ok_or_else(|| anyhow!("no session cookie"))?;

    let response = app.get("/members", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await?;
    assert_eq!(payload["username"], "alice");
    let number = payload["random_number"].as_u64().unwrap_or_default();
    assert!((1..=10_000).contains(&number));

    let response = app.get("/", Some(&token)).await?;
    let payload = body_json(response).await?;
    assert_eq!(payload["authenticated"], true);
    assert_eq!(payload["username"], "alice");
    Ok(())
}

#[tokio::test]
async fn signup_form_body_is_accepted() -> Result<()> {
    let app = TestApp::new()?;
    let response = app
        .post(
            "/signup",
            FORM,
            "username=carol&email=carol%40example.com&password=pa55word",
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(app.credentials.list_all().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn signup_lists_missing_fields() -> Result<()> {
    let app = TestApp::new()?;
    let response = app
        .post("/signup", FORM, "email=alice%40example.com", None)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(session_token(&response).is_none());

    let payload = body_json(response).await?;
    assert_eq!(
        payload["message"],
        "Username is required. Password is required"
    );
    assert_eq!(payload["errors"].as_array().map(Vec::len), Some(2));
    assert!(app.credentials.list_all().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn structured_signup_input_is_flagged() -> Result<()> {
    let app = TestApp::new()?;
    let response = app
        .post(
            "/signup",
            "application/json",
            r#"{"username":"mallory","email":{"$ne":""},"password":"x"}"#,
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = body_json(response).await?;
    assert_eq!(payload["injection_detected"], true);
    assert!(app.credentials.list_all().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_rejected() -> Result<()> {
    let app = TestApp::new()?;
    app.signup("alice", "alice@example.com", "wonderland1").await?;

    let response = app.signup("alice2", "alice@example.com", "other1").await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = body_json(response).await?;
    assert_eq!(payload["message"], "Email is already registered");
    Ok(())
}

#[tokio::test]
async fn login_failures_look_the_same() -> Result<()> {
    let app = TestApp::new()?;
    app.signup("alice", "alice@example.com", "wonderland1").await?;

    let wrong_password = app.login("alice@example.com", "nope").await?;
    let unknown_email = app.login("nobody@example.com", "wonderland1").await?;
    let injected = app
        .post(
            "/login",
            "application/json",
            r#"{"email":{"$gt":""},"password":{"$gt":""}}"#,
            None,
        )
        .await?;

    let mut bodies = Vec::new();
    for response in [wrong_password, unknown_email, injected] {
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(session_token(&response).is_none());
        bodies.push(body_json(response).await?);
    }
    assert_eq!(bodies[0]["message"], "Invalid email/password combination");
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1], bodies[2]);
    Ok(())
}

#[tokio::test]
async fn anonymous_members_redirects_to_login() -> Result<()> {
    let app = TestApp::new()?;

    let response = app.get("/members", None).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login"));

    let response = app.get("/members", Some("forged-token")).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login"));
    Ok(())
}

#[tokio::test]
async fn logout_ends_the_session() -> Result<()> {
    let app = TestApp::new()?;
    let response = app.signup("alice", "alice@example.com", "wonderland1").await?;
    let token = session_token(&response).ok_or_else(|| anyhow!("no session cookie"))?;

    let response = app.get("/logout", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/"));
    let cleared = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(cleared.contains("Max-Age=0"));

    let response = app.get("/members", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login"));
    Ok(())
}

/// Session store whose deletes always fail.
#[derive(Default)]
struct StuckSessions {
    inner: MemorySessionStore,
}

impl SessionStore for StuckSessions {
    fn get<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, Option<SessionRecord>> {
        self.inner.get(key)
    }

    fn set<'a>(&'a self, key: &'a [u8], record: SessionRecord) -> StoreFuture<'a, ()> {
        self.inner.set(key, record)
    }

    fn destroy<'a>(&'a self, _key: &'a [u8]) -> StoreFuture<'a, ()> {
        Box::pin(async { Err(anyhow!("session store unavailable")) })
    }

    fn purge_expired(&self, now: i64) -> StoreFuture<'_, u64> {
        self.inner.purge_expired(now)
    }
}

#[tokio::test]
async fn failed_logout_is_a_server_error() -> Result<()> {
    let app = TestApp::with_sessions(Arc::new(StuckSessions::default()))?;
    let response = app.signup("alice", "alice@example.com", "wonderland1").await?;
    let token = session_token(&response).ok_or_else(|| anyhow!("no session cookie"))?;

    let response = app.get("/logout", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(location(&response), None);
    let cleared = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    assert!(cleared.contains("Max-Age=0"));
    assert_eq!(body_json(response).await?["message"], "Internal server error");

    // The record survived, so the token still opens the members area.
    let response = app.get("/members", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn admin_area_is_gated_by_role() -> Result<()> {
    let app = TestApp::new()?;
    app.seed_admin("root", "root@example.com", "rootpass1").await?;

    let response = app.signup("bob", "bob@example.com", "builder1").await?;
    let bob = session_token(&response).ok_or_else(|| anyhow!("no session cookie"))?;

    let response = app.get("/admin", None).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/login"));

    let response = app.get("/admin", Some(&bob)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.login("root@example.com", "rootpass1").await?;
    let root = session_token(&response).ok_or_else(|| anyhow!("no session cookie"))?;

    let response = app.get("/admin", Some(&root)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await?;
    let users = payload["users"]
        .as_array()
        .ok_or_else(|| anyhow!("users missing"))?;
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|user| user.get("password_hash").is_none()));
    Ok(())
}

#[tokio::test]
async fn role_change_applies_on_next_login() -> Result<()> {
    let app = TestApp::new()?;
    app.seed_admin("root", "root@example.com", "rootpass1").await?;
    let response = app.signup("bob", "bob@example.com", "builder1").await?;
    let bob = session_token(&response).ok_or_else(|| anyhow!("no session cookie"))?;
    let response = app.login("root@example.com", "rootpass1").await?;
    let root = session_token(&response).ok_or_else(|| anyhow!("no session cookie"))?;

    let response = app
        .post("/admin", FORM, "username=bob&role=admin", Some(&bob))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post("/admin", FORM, "username=bob&role=superuser", Some(&root))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post("/admin", FORM, "username=bob&role=admin", Some(&root))
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/admin"));

    // The live session still carries the old role.
    let response = app.get("/admin", Some(&bob)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.login("bob@example.com", "builder1").await?;
    let bob = session_token(&response).ok_or_else(|| anyhow!("no session cookie"))?;
    let response = app.get("/admin", Some(&bob)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn nosql_injection_route() -> Result<()> {
    let app = TestApp::new()?;

    let response = app.get("/nosql-injection", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await?;
    assert!(payload["message"]
        .as_str()
        .is_some_and(|message| message.starts_with("no user provided")));

    let response = app.get("/nosql-injection?user=alice", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await?["message"], "Hello alice");

    let response = app
        .get("/nosql-injection?user%5B%24ne%5D=alice", None)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = body_json(response).await?;
    assert_eq!(payload["message"], "NoSQL injection attack detected");
    assert_eq!(payload["injection_detected"], true);

    let response = app
        .get("/nosql-injection?user=abcdefghijklmnopqrstuvwxyz", None)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await?.get("injection_detected").is_none());
    Ok(())
}

#[tokio::test]
async fn unknown_paths_are_json_404() -> Result<()> {
    let app = TestApp::new()?;
    let response = app.get("/does-not-exist", None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await?["message"], "Page not found");
    Ok(())
}

#[tokio::test]
async fn health_reports_store() -> Result<()> {
    let app = TestApp::new()?;
    let response = app.get("/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-app").is_some());
    assert!(response.headers().get("x-request-id").is_some());
    let payload = body_json(response).await?;
    assert_eq!(payload["name"], "memberauth");
    assert_eq!(payload["database"], "ok");
    Ok(())
}
