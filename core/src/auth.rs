//! Project user authentication.
//!
//! # Design
//! The client authenticates requests with the project API key, exactly like
//! the database client, and additionally keeps the end user's `Session`.
//! Every successful sign-up, sign-in, OTP verification or OAuth exchange
//! overwrites it. The session sits behind an `RwLock` so a shared client can
//! be used from several threads; concurrent sign-ins race and the last
//! writer wins.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{ClientConfig, DEFAULT_TIMEOUT};
use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::http::{path_segment, HttpMethod, HttpRequest, HttpResponse};
use crate::response::decode;
use crate::transport::{Transport, UreqTransport};
use crate::types::{
    AuthResult, AuthUser, MagicLinkPurpose, OAuthAuthorizeResponse, OtpPurpose, Record, Session,
};

/// Optional sign-up fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignUpOptions {
    pub full_name: Option<String>,
    pub user_metadata: Option<Record>,
}

impl SignUpOptions {
    pub fn full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    pub fn user_metadata(mut self, metadata: Record) -> Self {
        self.user_metadata = Some(metadata);
        self
    }
}

#[derive(Serialize)]
struct SignUpPayload<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_metadata: Option<&'a Record>,
}

/// Token response shared by sign-up, sign-in, OTP and OAuth endpoints.
#[derive(Deserialize)]
struct TokenWire {
    #[serde(default)]
    user: Option<AuthUser>,
    #[serde(flatten)]
    session: Session,
}

#[derive(Debug)]
pub struct AuthClient {
    dispatcher: Dispatcher,
    session: RwLock<Session>,
}

impl AuthClient {
    pub fn new(config: &ClientConfig) -> Self {
        let transport = Arc::new(UreqTransport::new(config.timeout_or(DEFAULT_TIMEOUT)));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let base = format!("{}/api/auth", config.base_url());
        Self {
            dispatcher: Dispatcher::new(&base, &config.api_key, transport),
            session: RwLock::new(Session::default()),
        }
    }

    // -- session ------------------------------------------------------------

    pub fn session(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_session(&self, access_token: impl Into<String>, refresh_token: impl Into<String>) {
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        session.access_token = access_token.into();
        session.refresh_token = refresh_token.into();
        if session.token_type.is_empty() {
            session.token_type = "bearer".to_string();
        }
    }

    pub fn clear_session(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Session::default();
    }

    fn persist(&self, session: &Session) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session.clone();
    }

    /// Decode a token response and store its session.
    pub fn parse_auth(&self, response: &HttpResponse) -> Result<AuthResult, ApiError> {
        let wire: TokenWire = decode(response)?;
        self.persist(&wire.session);
        tracing::debug!(user = ?wire.user.as_ref().map(|u| &u.id), "session updated");
        Ok(AuthResult {
            user: wire.user,
            session: wire.session,
        })
    }

    fn post(&self, path: &str, payload: &Value) -> Result<HttpResponse, ApiError> {
        let request = self.dispatcher.json(HttpMethod::Post, path, payload)?;
        self.dispatcher.send(request)
    }

    // -- password flows -----------------------------------------------------

    pub fn build_sign_up(
        &self,
        email: &str,
        password: &str,
        options: &SignUpOptions,
    ) -> Result<HttpRequest, ApiError> {
        let payload = SignUpPayload {
            email,
            password,
            full_name: options.full_name.as_deref(),
            user_metadata: options.user_metadata.as_ref(),
        };
        self.dispatcher.json(HttpMethod::Post, "/signup", &payload)
    }

    pub fn sign_up(
        &self,
        email: &str,
        password: &str,
        options: &SignUpOptions,
    ) -> Result<AuthResult, ApiError> {
        let response = self
            .dispatcher
            .send(self.build_sign_up(email, password, options)?)?;
        self.parse_auth(&response)
    }

    pub fn build_sign_in(&self, email: &str, password: &str) -> Result<HttpRequest, ApiError> {
        self.dispatcher.json(
            HttpMethod::Post,
            "/login",
            &json!({ "email": email, "password": password }),
        )
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<AuthResult, ApiError> {
        let response = self.dispatcher.send(self.build_sign_in(email, password)?)?;
        self.parse_auth(&response)
    }

    /// Profile of the signed-in user. `token_override` replaces the stored
    /// access token for this call.
    pub fn current_user(&self, token_override: Option<&str>) -> Result<AuthUser, ApiError> {
        let token = match token_override.filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None => self.session().access_token,
        };
        if token.is_empty() {
            return Err(ApiError::InvalidArgument(
                "an access token is required to fetch the user profile".to_string(),
            ));
        }
        let request = self
            .dispatcher
            .request(HttpMethod::Get, "/me")
            .with_bearer(&token);
        decode(&self.dispatcher.send(request)?)
    }

    pub fn forgot_password(&self, email: &str) -> Result<Value, ApiError> {
        decode(&self.post("/forgot-password", &json!({ "email": email }))?)
    }

    pub fn reset_password(&self, token: &str, new_password: &str) -> Result<Value, ApiError> {
        decode(&self.post(
            "/reset-password",
            &json!({ "token": token, "new_password": new_password }),
        )?)
    }

    // -- OAuth --------------------------------------------------------------

    pub fn build_oauth_authorization_url(&self, provider: &str, redirect_url: &str) -> HttpRequest {
        self.dispatcher
            .request(HttpMethod::Get, &format!("/oauth/{}", path_segment(provider)))
            .with_query("frontend_redirect_uri", redirect_url)
    }

    pub fn oauth_authorization_url(
        &self,
        provider: &str,
        redirect_url: &str,
    ) -> Result<OAuthAuthorizeResponse, ApiError> {
        let request = self.build_oauth_authorization_url(provider, redirect_url);
        decode(&self.dispatcher.send(request)?)
    }

    /// Exchange the code the provider redirected back with for a session.
    pub fn exchange_oauth_callback(
        &self,
        provider: &str,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<AuthResult, ApiError> {
        let mut payload = json!({ "code": code });
        if let Some(uri) = redirect_uri {
            payload["redirect_uri"] = Value::from(uri);
        }
        let path = format!("/oauth/{}/callback", path_segment(provider));
        let response = self.post(&path, &payload)?;
        self.parse_auth(&response)
    }

    // -- one-time codes and magic links -------------------------------------

    pub fn send_otp(&self, email: &str, purpose: OtpPurpose) -> Result<Value, ApiError> {
        decode(&self.post("/otp/send", &json!({ "email": email, "purpose": purpose }))?)
    }

    pub fn build_verify_otp(
        &self,
        email: &str,
        otp: &str,
        purpose: OtpPurpose,
        new_password: Option<&str>,
    ) -> Result<HttpRequest, ApiError> {
        if purpose == OtpPurpose::PasswordReset && new_password.is_none() {
            return Err(ApiError::InvalidArgument(
                "new_password is required for password_reset".to_string(),
            ));
        }
        let mut payload = json!({ "email": email, "otp": otp, "purpose": purpose });
        if let Some(password) = new_password {
            payload["new_password"] = Value::from(password);
        }
        self.dispatcher.json(HttpMethod::Post, "/otp/verify", &payload)
    }

    /// Verify a one-time code. Login and sign-up store the issued session;
    /// a password reset returns an empty session and leaves the stored one
    /// untouched.
    pub fn verify_otp(
        &self,
        email: &str,
        otp: &str,
        purpose: OtpPurpose,
        new_password: Option<&str>,
    ) -> Result<AuthResult, ApiError> {
        let request = self.build_verify_otp(email, otp, purpose, new_password)?;
        let response = self.dispatcher.send(request)?;
        if purpose == OtpPurpose::PasswordReset {
            decode::<Value>(&response)?;
            return Ok(AuthResult {
                user: None,
                session: Session::default(),
            });
        }
        self.parse_auth(&response)
    }

    pub fn send_magic_link(&self, email: &str, purpose: MagicLinkPurpose) -> Result<Value, ApiError> {
        decode(&self.post("/magic-link/send", &json!({ "email": email, "purpose": purpose }))?)
    }

    pub fn verify_email(&self, token: &str) -> Result<Value, ApiError> {
        decode(&self.post("/verify-email", &json!({ "token": token }))?)
    }

    pub fn resend_verification(&self, email: &str) -> Result<Value, ApiError> {
        decode(&self.post("/resend-verification", &json!({ "email": email }))?)
    }
}
