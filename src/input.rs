use crate::error::ApiError;
use axum::body::Bytes;
use axum::extract::multipart::Multipart;
use axum::extract::{FromRequest, Request};
use axum::{Form, Json};
use http::header::CONTENT_TYPE;
use serde_json::{Map, Value};

/// Top-level fields of a request body, keyed by name.
pub type BodyFields = Map<String, Value>;

/// A route's view of the body fields it cares about.
pub trait FromBodyFields: Sized {
    fn from_fields(fields: BodyFields) -> Self;
}

/// Body decoded as JSON or as an urlencoded form, depending on `Content-Type`.
///
/// Only a JSON object carries fields. Arrays, scalars and bodies of any other
/// content type read as empty, so every field is absent.
#[derive(Debug)]
pub struct FormOrJson<T>(pub T);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
    Other,
}

impl<T, S> FromRequest<S> for FormOrJson<T>
where
    T: FromBodyFields,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let fields = match body_kind(&req) {
            BodyKind::Json => {
                let Json(value) = Json::<Value>::from_request(req, state)
                    .await
                    .map_err(|rejection| ApiError::ClientInput(rejection.body_text()))?;
                match value {
                    Value::Object(fields) => fields,
                    _ => BodyFields::new(),
                }
            }
            BodyKind::Form => {
                let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                    .await
                    .map_err(|rejection| ApiError::ClientInput(rejection.body_text()))?;
                fields_from_pairs(pairs)
            }
            BodyKind::Other => {
                // Drain the body so the connection stays reusable.
                let _ = Bytes::from_request(req, state).await;
                BodyFields::new()
            }
        };
        Ok(Self(T::from_fields(fields)))
    }
}

/// A repeated form key collects its values into an array, in order.
fn fields_from_pairs(pairs: Vec<(String, String)>) -> BodyFields {
    let mut fields = BodyFields::new();
    for (name, value) in pairs {
        match fields.get_mut(&name) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                fields.insert(name, Value::String(value));
            }
        }
    }
    fields
}

fn body_kind(req: &Request) -> BodyKind {
    let Some(media_type) = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
    else {
        return BodyKind::Other;
    };

    if media_type == "application/json" || media_type.ends_with("+json") {
        BodyKind::Json
    } else if media_type == "application/x-www-form-urlencoded" {
        BodyKind::Form
    } else {
        BodyKind::Other
    }
}

/// `POST /test`
#[derive(Debug, Default)]
pub struct TestItemBody {
    pub item: Option<Value>,
}

impl FromBodyFields for TestItemBody {
    fn from_fields(mut fields: BodyFields) -> Self {
        Self {
            item: fields.remove("item"),
        }
    }
}

/// `POST /user` and `POST /users`
#[derive(Debug, Default)]
pub struct UserNameBody {
    pub name: Option<Value>,
}

impl UserNameBody {
    /// The name when it is present and a string.
    pub fn name_str(&self) -> Option<&str> {
        self.name.as_ref().and_then(Value::as_str)
    }
}

impl FromBodyFields for UserNameBody {
    fn from_fields(mut fields: BodyFields) -> Self {
        Self {
            name: fields.remove("name"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field_name: String,
    pub original_name: String,
    pub content: Bytes,
}

/// The multipart form accepted by `POST /`.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub name: Option<String>,
    pub complex_object: Option<String>,
    pub avatar: Option<UploadedFile>,
}

pub const AVATAR_FIELD: &str = "avatar";

impl UploadForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ApiError::ClientInput(err.body_text()))?
        {
            let Some(field_name) = field.name().map(ToString::to_string) else {
                continue;
            };

            match field_name.as_str() {
                "name" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|err| ApiError::ClientInput(err.body_text()))?;
                    form.name.get_or_insert(text);
                }
                "complex_object" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|err| ApiError::ClientInput(err.body_text()))?;
                    form.complex_object.get_or_insert(text);
                }
                AVATAR_FIELD => {
                    let original_name = field.file_name().unwrap_or_default().to_string();
                    let content = field
                        .bytes()
                        .await
                        .map_err(|err| ApiError::ClientInput(err.body_text()))?;
                    if form.avatar.is_none() {
                        form.avatar = Some(UploadedFile {
                            field_name,
                            original_name,
                            content,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(form)
    }
}

/// Decodes the `complex_object` form field; an absent field fails like malformed JSON.
pub fn parse_complex_object(raw: Option<&str>) -> Result<Value, ApiError> {
    let invalid = || ApiError::ClientInput("Invalid JSON in complex_object".to_string());
    let raw = raw.ok_or_else(invalid)?;
    serde_json::from_str(raw).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::{FormOrJson, TestItemBody, UserNameBody, fields_from_pairs, parse_complex_object};
    use crate::error::ApiError;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{Method, Request};
    use serde_json::json;

    fn post(content_type: Option<&str>, body: &'static str) -> Request<Body> {
        let mut builder = Request::builder().method(Method::POST).uri("/test");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        builder.body(Body::from(body)).expect("request should build")
    }

    #[tokio::test]
    async fn decode_urlencoded_form() {
        let request = post(Some("application/x-www-form-urlencoded"), "item=hey");
        let FormOrJson(body) = FormOrJson::<TestItemBody>::from_request(request, &())
            .await
            .expect("form should decode");
        assert_eq!(body.item, Some(json!("hey")));
    }

    #[tokio::test]
    async fn decode_json_keeps_value_types() {
        let request = post(
            Some("application/json; charset=utf-8"),
            r#"{"item":{"nested":[1,2]}}"#,
        );
        let FormOrJson(body) = FormOrJson::<TestItemBody>::from_request(request, &())
            .await
            .expect("json should decode");
        assert_eq!(body.item, Some(json!({"nested": [1, 2]})));
    }

    #[tokio::test]
    async fn unknown_content_type_reads_as_empty() {
        let request = post(Some("text/plain"), "name=john");
        let FormOrJson(body) = FormOrJson::<UserNameBody>::from_request(request, &())
            .await
            .expect("body should default");
        assert_eq!(body.name, None);

        let FormOrJson(body) = FormOrJson::<UserNameBody>::from_request(post(None, ""), &())
            .await
            .expect("body should default");
        assert_eq!(body.name, None);
    }

    #[tokio::test]
    async fn json_array_carries_no_fields() {
        let request = post(Some("application/json"), r#"["john"]"#);
        let FormOrJson(body) = FormOrJson::<UserNameBody>::from_request(request, &())
            .await
            .expect("array body should decode");
        assert_eq!(body.name, None);

        let request = post(Some("application/json"), r#"["x"]"#);
        let FormOrJson(body) = FormOrJson::<TestItemBody>::from_request(request, &())
            .await
            .expect("array body should decode");
        assert_eq!(body.item, None);
    }

    #[tokio::test]
    async fn json_name_keeps_its_type() {
        let request = post(Some("application/json"), r#"{"name":5}"#);
        let FormOrJson(body) = FormOrJson::<UserNameBody>::from_request(request, &())
            .await
            .expect("body should decode");
        assert_eq!(body.name, Some(json!(5)));
        assert_eq!(body.name_str(), None);
    }

    #[test]
    fn repeated_form_keys_become_arrays() {
        let fields = fields_from_pairs(vec![
            ("name".to_string(), "john".to_string()),
            ("name".to_string(), "jane".to_string()),
            ("name".to_string(), "joe".to_string()),
            ("item".to_string(), "hey".to_string()),
        ]);
        assert_eq!(fields["name"], json!(["john", "jane", "joe"]));
        assert_eq!(fields["item"], json!("hey"));
    }

    #[tokio::test]
    async fn malformed_json_is_client_input_error() {
        let request = post(Some("application/json"), "{bad");
        let error = FormOrJson::<UserNameBody>::from_request(request, &())
            .await
            .expect_err("json should be rejected");
        assert!(matches!(error, ApiError::ClientInput(_)));
    }

    #[test]
    fn complex_object_parse_outcomes() {
        assert_eq!(
            parse_complex_object(Some(r#"{"attribute":"value"}"#)).expect("should parse"),
            json!({"attribute": "value"})
        );

        for raw in [Some("{bad"), Some(""), None] {
            let error = parse_complex_object(raw).expect_err("should fail");
            assert_eq!(error.to_string(), "Invalid JSON in complex_object");
        }
    }
}
