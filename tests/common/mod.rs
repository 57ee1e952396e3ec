#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use authgate::identity::{
    Account, AccountStore, Grant, IdentityClient, IdentityClientFactory, IdentityError,
    JwtClaims, MemoryDirectory, NewAccount, ScopedClientOptions, TokenKind, TokenResource,
};
use authgate::{Gateway, GatewayConfig, create_app};
use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};

pub const SECRET: &str = "integration-test-signing-secret-0123456789";
pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "correct horse";

/// What the identity double saw, and which failures it injects.
#[derive(Default)]
pub struct Recorder {
    pub user_agents: Mutex<Vec<String>>,
    pub fetch_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub fail_revocation: AtomicBool,
    pub unavailable: AtomicBool,
}

/// Memory directory wrapped with call recording and failure injection.
#[derive(Clone)]
pub struct TestDirectory {
    pub memory: MemoryDirectory,
    pub recorder: Arc<Recorder>,
}

impl TestDirectory {
    pub fn new(memory: MemoryDirectory) -> Self {
        Self {
            memory,
            recorder: Arc::new(Recorder::default()),
        }
    }

    pub fn fetch_calls(&self) -> usize {
        self.recorder.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn fail_revocation(&self) {
        self.recorder.fail_revocation.store(true, Ordering::SeqCst);
    }

    pub fn go_offline(&self) {
        self.recorder.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn user_agents(&self) -> Vec<String> {
        self.recorder.user_agents.lock().unwrap().clone()
    }

    fn check_online(&self) -> Result<(), IdentityError> {
        if self.recorder.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

impl IdentityClientFactory for TestDirectory {
    fn create(&self, options: ScopedClientOptions) -> Box<dyn IdentityClient> {
        self.recorder
            .user_agents
            .lock()
            .unwrap()
            .push(options.user_agent);
        Box::new(self.clone())
    }
}

#[async_trait]
impl IdentityClient for TestDirectory {
    async fn authenticate_access_token(&self, token: &str) -> Result<Account, IdentityError> {
        self.check_online()?;
        self.memory.authenticate_access_token(token).await
    }

    async fn password_grant(&self, login: &str, password: &str) -> Result<Grant, IdentityError> {
        self.check_online()?;
        self.memory.password_grant(login, password).await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<Grant, IdentityError> {
        self.check_online()?;
        self.memory.refresh_grant(refresh_token).await
    }

    async fn client_credentials_grant(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Grant, IdentityError> {
        self.check_online()?;
        self.memory
            .client_credentials_grant(client_id, client_secret)
            .await
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account, IdentityError> {
        self.check_online()?;
        self.memory.create_account(account).await
    }

    async fn account_stores(&self) -> Result<Vec<AccountStore>, IdentityError> {
        self.check_online()?;
        self.memory.account_stores().await
    }

    fn parse_jwt(&self, token: &str, signing_secret: &[u8]) -> Result<JwtClaims, IdentityError> {
        self.memory.parse_jwt(token, signing_secret)
    }

    async fn fetch_token(
        &self,
        kind: TokenKind,
        jti: &str,
    ) -> Result<TokenResource, IdentityError> {
        self.recorder.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fail_revocation.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("revocation endpoint down".to_string()));
        }
        self.memory.fetch_token(kind, jti).await
    }

    async fn delete_token(&self, token: &TokenResource) -> Result<(), IdentityError> {
        self.recorder.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.memory.delete_token(token).await
    }
}

pub struct TestApp {
    pub router: Router,
    pub directory: TestDirectory,
}

pub struct TestSetup {
    config: GatewayConfig,
    memory: MemoryDirectory,
}

impl TestSetup {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            memory: MemoryDirectory::new(SECRET.as_bytes()),
        }
    }

    pub fn with_config(mut self, configure: impl FnOnce(&mut GatewayConfig)) -> Self {
        configure(&mut self.config);
        self
    }

    pub fn with_email_verification(mut self) -> Self {
        self.memory = MemoryDirectory::with_email_verification(SECRET.as_bytes());
        self
    }

    pub async fn build(self) -> TestApp {
        self.build_with(|config, directory| {
            Gateway::new(config, directory).expect("valid gateway config")
        })
        .await
    }

    /// Build with a custom gateway constructor (hooks, renderer...).
    pub async fn build_with(
        self,
        build: impl FnOnce(GatewayConfig, TestDirectory) -> Gateway,
    ) -> TestApp {
        let directory = TestDirectory::new(self.memory);
        directory
            .memory
            .add_verified_account(NewAccount {
                email: EMAIL.to_string(),
                password: PASSWORD.to_string(),
                given_name: "Alice".to_string(),
                surname: "Liddell".to_string(),
                ..NewAccount::default()
            })
            .await
            .unwrap();

        let gateway = build(self.config.with_signing_secret(SECRET), directory.clone());
        TestApp {
            router: create_app(gateway),
            directory,
        }
    }
}

pub async fn app() -> TestApp {
    TestSetup::new().build().await
}

/// Issue tokens for alice directly at the directory: `(access, refresh)`.
pub async fn tokens(app: &TestApp) -> (String, String) {
    let grant = app
        .directory
        .memory
        .password_grant(EMAIL, PASSWORD)
        .await
        .unwrap();
    (
        grant.tokens.access_token,
        grant.tokens.refresh_token.unwrap(),
    )
}

pub fn get(uri: &str, accept: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::ACCEPT, accept)
        .body(Body::empty())
        .unwrap()
}

pub fn post_form(uri: &str, accept: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::ACCEPT, accept)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::ACCEPT, "application/json")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn with_cookie(mut request: Request<Body>, cookie: &str) -> Request<Body> {
    request
        .headers_mut()
        .insert(header::COOKIE, cookie.parse().unwrap());
    request
}

pub async fn body_string(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of cookie `name` among `Set-Cookie` headers.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies.iter().find_map(|c| {
        c.strip_prefix(&prefix)
            .map(|rest| rest.split(';').next().unwrap_or("").to_string())
    })
}

pub fn location(response: &Response<Body>) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}
