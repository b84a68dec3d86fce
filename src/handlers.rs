use crate::auth;
use crate::cookies::{format_set_cookie, parse_cookie_header};
use crate::error::ApiError;
use crate::input::{FormOrJson, TestItemBody, UploadForm, UserNameBody, parse_complex_object};
use crate::server::AppState;
use axum::Json;
use axum::extract::State;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use http::header::SET_COOKIE;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

pub const SESSION_COOKIE: &str = "cookie";
const SESSION_COOKIE_VALUE: &str = "hey";
const FIXED_USER_ID: &str = "some fixed id";

pub async fn index() -> Json<Value> {
    Json(json!({ "name": "frodo" }))
}

pub async fn list_items(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "array": state.store.snapshot() }))
}

pub async fn push_item(
    State(state): State<AppState>,
    FormOrJson(body): FormOrJson<TestItemBody>,
) -> &'static str {
    let len = state.store.push(body.item.unwrap_or(Value::Null));
    debug!(len, "item appended");
    "success!"
}

pub async fn get_user() -> Json<Value> {
    Json(json!({ "name": "john" }))
}

pub async fn get_user_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let credentials = auth::authenticate(&headers, &state.config.credentials)?;
    debug!(username = %credentials.username, "basic auth accepted");
    Ok(Json(json!({ "message": "Authenticated user data" })))
}

pub async fn create_user(
    body: Result<FormOrJson<UserNameBody>, ApiError>,
) -> Result<Json<Value>, ApiError> {
    // An undecodable body is just another wrong name.
    let name = body.as_ref().ok().and_then(|FormOrJson(body)| body.name_str());
    match name {
        Some("john") => Ok(Json(json!({ "message": "User john created" }))),
        _ => Err(ApiError::Validation("Invalid user data".to_string())),
    }
}

pub async fn list_users() -> Json<Value> {
    Json(json!({ "email": "foo@bar.com" }))
}

pub async fn normalize_user(
    FormOrJson(body): FormOrJson<UserNameBody>,
) -> Result<Json<Value>, ApiError> {
    let name = body.name_str().ok_or(ApiError::MissingField("name"))?;
    Ok(Json(json!({
        "id": FIXED_USER_ID,
        "name": name.to_lowercase(),
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub complex_object: Value,
    pub file_original_name: String,
}

pub async fn upload_avatar(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadReply>, ApiError> {
    // Requests that are not multipart at all carry none of the fields.
    let form = match multipart {
        Ok(multipart) => UploadForm::from_multipart(multipart).await?,
        Err(rejection) => {
            debug!(reason = %rejection.body_text(), "upload without multipart body");
            UploadForm::default()
        }
    };

    let complex_object = parse_complex_object(form.complex_object.as_deref())?;
    let avatar = form
        .avatar
        .ok_or_else(|| ApiError::ClientInput("Missing avatar file".to_string()))?;
    debug!(
        field = %avatar.field_name,
        file = %avatar.original_name,
        bytes = avatar.content.len(),
        "avatar received"
    );

    Ok(Json(UploadReply {
        name: form.name,
        complex_object,
        file_original_name: avatar.original_name,
    }))
}

pub async fn persist_cookie() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            SET_COOKIE,
            format_set_cookie(SESSION_COOKIE, SESSION_COOKIE_VALUE),
        )],
    )
}

pub async fn return_cookie(headers: HeaderMap) -> String {
    parse_cookie_header(&headers)
        .remove(SESSION_COOKIE)
        .unwrap_or_else(|| ":(".to_string())
}

pub async fn api_content(headers: HeaderMap) -> (StatusCode, &'static str) {
    let cookies = parse_cookie_header(&headers);
    let valid = cookies.get("nameOne").map(String::as_str) == Some("valueOne")
        && cookies.get("nameTwo").map(String::as_str) == Some("valueTwo");

    if valid {
        (StatusCode::OK, "hey")
    } else {
        (StatusCode::BAD_REQUEST, "Missing or invalid cookies")
    }
}
