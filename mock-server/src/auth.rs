use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{api_key, bearer, Backend, Db, Failure, UserRecord, MOCK_OTP};

#[derive(Debug, Deserialize)]
pub struct SignUp {
    email: String,
    password: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    user_metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthParams {
    #[serde(default)]
    frontend_redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    code: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailOnly {
    email: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerify {
    email: String,
    otp: String,
    purpose: String,
    #[serde(default)]
    new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPassword {
    token: String,
    new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenOnly {
    token: String,
}

fn user_json(user: &UserRecord) -> Value {
    json!({
        "id": user.id,
        "email": user.email,
        "full_name": user.full_name,
        "email_verified": user.email_verified,
        "user_metadata": user.user_metadata,
        "app_metadata": {},
    })
}

/// Mint a token pair for `email` and remember the access token.
fn issue(backend: &mut Backend, email: &str) -> Value {
    let access_token = format!("at-{}", Uuid::new_v4().simple());
    let refresh_token = format!("rt-{}", Uuid::new_v4().simple());
    backend
        .sessions
        .insert(access_token.clone(), email.to_string());
    json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "token_type": "bearer",
        "expires_in": 3600,
    })
}

fn with_user(mut tokens: Value, user: &UserRecord) -> Value {
    tokens["user"] = user_json(user);
    tokens
}

fn create_user(backend: &mut Backend, email: &str, password: &str) -> UserRecord {
    let user = UserRecord {
        id: Uuid::new_v4().to_string(),
        email: email.to_string(),
        password: password.to_string(),
        full_name: None,
        email_verified: false,
        user_metadata: json!({}),
    };
    backend.users.insert(email.to_string(), user.clone());
    user
}

fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

pub async fn sign_up(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<SignUp>,
) -> Result<impl IntoResponse, Failure> {
    api_key(&headers)?;
    if body.password.len() < 8 {
        return Err(Failure::bad_request("Password must be at least 8 characters"));
    }
    let mut backend = db.write().await;
    if backend.users.contains_key(&body.email) {
        return Err(Failure::bad_request("User already exists"));
    }
    let mut user = create_user(&mut backend, &body.email, &body.password);
    user.full_name = body.full_name;
    user.user_metadata = body.user_metadata.unwrap_or_else(|| json!({}));
    backend.users.insert(body.email.clone(), user.clone());
    let tokens = issue(&mut backend, &body.email);
    Ok((StatusCode::CREATED, Json(with_user(tokens, &user))))
}

pub async fn login(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<Login>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let mut backend = db.write().await;
    let valid = backend
        .users
        .get(&body.email)
        .is_some_and(|user| user.password == body.password);
    if !valid {
        return Err(Failure::new(StatusCode::UNAUTHORIZED, "Invalid email or password"));
    }
    Ok(Json(issue(&mut backend, &body.email)))
}

/// Authenticated by the user's access token rather than the project key.
pub async fn me(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Value>, Failure> {
    let unauthorized = || Failure::new(StatusCode::UNAUTHORIZED, "Invalid or expired token");
    let token = bearer(&headers).ok_or_else(unauthorized)?;
    let backend = db.read().await;
    backend
        .sessions
        .get(token)
        .and_then(|email| backend.users.get(email))
        .map(|user| Json(user_json(user)))
        .ok_or_else(unauthorized)
}

pub async fn oauth_authorize(
    headers: HeaderMap,
    Path(provider): Path<String>,
    Query(params): Query<OAuthParams>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let redirect = params
        .frontend_redirect_uri
        .ok_or_else(|| Failure::bad_request("frontend_redirect_uri is required"))?;
    Ok(Json(json!({
        "authorization_url": format!("https://{provider}.oauth.mock.local/authorize?state=mock"),
        "provider": provider,
        "redirect_uri": redirect,
        "frontend_redirect_uri": redirect,
    })))
}

pub async fn oauth_callback(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Json(body): Json<OAuthCallback>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    if body.code.is_empty() {
        return Err(Failure::bad_request("code is required"));
    }
    let email = format!("{}@{provider}.oauth.mock.local", body.code);
    let mut backend = db.write().await;
    let existing = backend.users.get(&email).cloned();
    let user = match existing {
        Some(user) => user,
        None => create_user(&mut backend, &email, ""),
    };
    let tokens = issue(&mut backend, &email);
    Ok(Json(with_user(tokens, &user)))
}

pub async fn otp_send(
    headers: HeaderMap,
    Json(body): Json<EmailOnly>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    tracing::info!(email = %body.email, code = MOCK_OTP, "otp sent");
    Ok(message("OTP sent"))
}

pub async fn otp_verify(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<OtpVerify>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    if body.otp != MOCK_OTP {
        return Err(Failure::bad_request("Invalid or expired OTP"));
    }
    let mut backend = db.write().await;
    match body.purpose.as_str() {
        "password_reset" => {
            let password = body
                .new_password
                .ok_or_else(|| Failure::bad_request("new_password is required"))?;
            let user = backend
                .users
                .get_mut(&body.email)
                .ok_or_else(|| Failure::not_found("User not found"))?;
            user.password = password;
            Ok(message("Password reset"))
        }
        "login" => {
            let user = backend
                .users
                .get(&body.email)
                .cloned()
                .ok_or_else(|| Failure::new(StatusCode::UNAUTHORIZED, "User not found"))?;
            let tokens = issue(&mut backend, &body.email);
            Ok(Json(with_user(tokens, &user)))
        }
        "signup" => {
            let existing = backend.users.get(&body.email).cloned();
            let user = match existing {
                Some(user) => user,
                None => create_user(&mut backend, &body.email, ""),
            };
            let tokens = issue(&mut backend, &body.email);
            Ok(Json(with_user(tokens, &user)))
        }
        other => Err(Failure::bad_request(format!("unknown purpose '{other}'"))),
    }
}

/// Issues reset token `reset-{email}` for known users.
pub async fn forgot_password(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<EmailOnly>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let mut backend = db.write().await;
    if backend.users.contains_key(&body.email) {
        let token = format!("reset-{}", body.email);
        backend.reset_tokens.insert(token, body.email);
    }
    Ok(message("If that email exists, a reset link has been sent"))
}

pub async fn reset_password(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(body): Json<ResetPassword>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    let mut backend = db.write().await;
    let email = backend
        .reset_tokens
        .remove(&body.token)
        .ok_or_else(|| Failure::bad_request("Invalid or expired reset token"))?;
    if let Some(user) = backend.users.get_mut(&email) {
        user.password = body.new_password;
    }
    Ok(message("Password has been reset"))
}

pub async fn magic_link(
    headers: HeaderMap,
    Json(body): Json<EmailOnly>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    tracing::info!(email = %body.email, "magic link sent");
    Ok(message("Magic link sent"))
}

pub async fn verify_email(
    headers: HeaderMap,
    Json(body): Json<TokenOnly>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    if body.token.is_empty() {
        return Err(Failure::bad_request("token is required"));
    }
    Ok(message("Email verified"))
}

pub async fn resend_verification(
    headers: HeaderMap,
    Json(body): Json<EmailOnly>,
) -> Result<Json<Value>, Failure> {
    api_key(&headers)?;
    tracing::info!(email = %body.email, "verification email sent");
    Ok(message("Verification email sent"))
}
