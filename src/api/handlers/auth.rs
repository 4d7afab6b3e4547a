use crate::{
    api::models::auth::{
        AuthResponse, ChangePasswordRequest, CheckAccessResponse, LoginRequest, RegisterRequest, UpdateAvatarRequest,
        UpdateProfileRequest, UserProfile,
    },
    auth::{middleware::CurrentUser, password, tokens},
    errors::{Error, Result},
    storage::{NewUser, ProfileUpdate},
    AppState,
};
use axum::{extract::State, http::StatusCode, response::Json};

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(Error::bad_request("invalid email address"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.len() < 6 {
        return Err(Error::bad_request("password must be at least 6 characters"));
    }
    Ok(())
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    summary = "Register a new account",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 409, description = "Email already registered"),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(data): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    validate_email(&data.email)?;
    validate_password(&data.password)?;

    let password_hash = password::hash_string(&data.password).map_err(|e| Error::bad_request(e.to_string()))?;
    let user = state
        .users
        .create_user(&NewUser {
            email: data.email.trim().to_string(),
            password_hash,
            display_name: data.name,
        })
        .await?;

    let token = tokens::issue(&state.config.jwt_secret, state.config.token_ttl, user.id, &user.email)
        .map_err(|_| Error::unauthorized("failed to issue token"))?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserProfile::from(user),
        }),
    ))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    summary = "Log in",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
pub async fn login(State(state): State<AppState>, Json(data): Json<LoginRequest>) -> Result<Json<AuthResponse>> {
    // Same error for unknown email and wrong password, to avoid enumeration
    let invalid = || Error::unauthorized("invalid email or password");

    let user = state.users.get_user_by_email(data.email.trim()).await?.ok_or_else(invalid)?;
    if !password::verify(&data.password, &user.password_hash) {
        return Err(invalid());
    }

    let token = tokens::issue(&state.config.jwt_secret, state.config.token_ttl, user.id, &user.email)
        .map_err(|_| Error::unauthorized("failed to issue token"))?;

    Ok(Json(AuthResponse {
        token,
        user: UserProfile::from(user),
    }))
}

/// Current balance and whether the account can use paid features
#[utoipa::path(
    get,
    path = "/auth/check-access",
    tag = "auth",
    summary = "Check paid-feature access",
    responses(
        (status = 200, description = "Access status", body = CheckAccessResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = []))
)]
pub async fn check_access(State(state): State<AppState>, user: CurrentUser) -> Result<Json<CheckAccessResponse>> {
    let balance = state.ledger.balance(user.id).await?;
    Ok(Json(CheckAccessResponse {
        credits: balance.balance,
        has_access: balance.balance > 0,
    }))
}

/// Update display name and/or email
#[utoipa::path(
    post,
    path = "/auth/update-profile",
    tag = "auth",
    summary = "Update profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Email already in use"),
    ),
    security(("bearer" = []))
)]
pub async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(data): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>> {
    if let Some(email) = &data.email {
        validate_email(email)?;
    }
    let updated = state
        .users
        .update_profile(
            user.id,
            &ProfileUpdate {
                email: data.email.map(|e| e.trim().to_string()),
                display_name: data.name,
            },
        )
        .await?;
    Ok(Json(UserProfile::from(updated)))
}

/// Update avatar URL
#[utoipa::path(
    post,
    path = "/auth/update-avatar",
    tag = "auth",
    summary = "Update avatar",
    request_body = UpdateAvatarRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer" = []))
)]
pub async fn update_avatar(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(data): Json<UpdateAvatarRequest>,
) -> Result<Json<UserProfile>> {
    let updated = state.users.update_avatar(user.id, &data.avatar_url).await?;
    Ok(Json(UserProfile::from(updated)))
}

/// Change password, verifying the current one
#[utoipa::path(
    post,
    path = "/auth/change-password",
    tag = "auth",
    summary = "Change password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "New password too short"),
        (status = 401, description = "Current password is wrong"),
    ),
    security(("bearer" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(data): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    validate_password(&data.new_password)?;

    let stored = state.users.get_user(user.id).await?;
    if !password::verify(&data.current_password, &stored.password_hash) {
        return Err(Error::unauthorized("current password is incorrect"));
    }

    let password_hash = password::hash_string(&data.new_password).map_err(|e| Error::bad_request(e.to_string()))?;
    state.users.update_password(user.id, &password_hash).await?;
    Ok(StatusCode::NO_CONTENT)
}
