//! Body parsing middleware.
//!
//! Two parsers run in front of every registered route: JSON first, then
//! URL-encoded forms. A parser only touches requests whose media type it
//! owns; everything else passes through with the raw body untouched.
//! Parsed results are stored in request extensions and read back with the
//! [`ParsedBody`] extractor.

use std::borrow::Cow;
use std::convert::Infallible;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::{self, Next},
    response::Response,
    Router,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::{Map, Value};

use crate::config::{AppConfig, DEFAULT_BODY_LIMIT, DEFAULT_PARAMETER_LIMIT};
use crate::error::{AppError, AppResult};

const JSON_MEDIA_TYPE: &str = "application/json";
const URLENCODED_MEDIA_TYPE: &str = "application/x-www-form-urlencoded";
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

const JSON_CHARSETS: &[&str] = &["utf-8", "utf-16", "utf-16le", "utf-16be"];
const URLENCODED_CHARSETS: &[&str] = &["utf-8"];

/// Request body as parsed by one of the body parsers.
///
/// Requests no parser handled extract as an empty JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

impl Default for ParsedBody {
    fn default() -> Self {
        Self(Value::Object(Map::new()))
    }
}

impl<S> FromRequestParts<S> for ParsedBody
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_default())
    }
}

/// Options for the JSON body parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonOptions {
    /// Maximum body size in bytes
    pub limit: usize,
    /// Only accept objects and arrays at the top level
    pub strict: bool,
}

impl Default for JsonOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_BODY_LIMIT,
            strict: true,
        }
    }
}

impl From<&AppConfig> for JsonOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            limit: config.json_body_limit,
            strict: config.json_strict,
        }
    }
}

/// Options for the URL-encoded body parser.
///
/// Values are always flat strings (or arrays of strings for repeated keys);
/// bracketed keys are not expanded into nested objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlencodedOptions {
    /// Maximum body size in bytes
    pub limit: usize,
    /// Maximum number of `&`-separated parameters
    pub parameter_limit: usize,
}

impl Default for UrlencodedOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_BODY_LIMIT,
            parameter_limit: DEFAULT_PARAMETER_LIMIT,
        }
    }
}

impl From<&AppConfig> for UrlencodedOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            limit: config.urlencoded_body_limit,
            parameter_limit: config.urlencoded_parameter_limit,
        }
    }
}

/// Installs both body parsers in front of every route currently in `router`.
///
/// The JSON parser is the outer layer, so it sees each request first.
pub fn install_body_parsers(
    router: Router,
    json: JsonOptions,
    urlencoded: UrlencodedOptions,
) -> Router {
    router
        .layer(middleware::from_fn_with_state(
            urlencoded,
            urlencoded_body_parser,
        ))
        .layer(middleware::from_fn_with_state(json, json_body_parser))
}

/// JSON body parser middleware.
///
/// # Error Responses
///
/// - 400 Bad Request: malformed JSON, or a non-object/array root in strict mode
/// - 413 Payload Too Large: body exceeds `limit`
/// - 415 Unsupported Media Type: charset other than UTF-8/UTF-16, or unsupported content encoding
pub async fn json_body_parser(
    State(options): State<JsonOptions>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if !should_parse(&request, JSON_MEDIA_TYPE) {
        return Ok(next.run(request).await);
    }

    let (parts, bytes, charset) = read_body(request, options.limit, JSON_CHARSETS).await?;
    let text = decode_json_text(&bytes, charset.as_deref())?;
    let value = parse_json(&text, options.strict)?;
    tracing::debug!(bytes = bytes.len(), "Parsed JSON request body");

    Ok(next.run(reassemble(parts, bytes, value)).await)
}

/// URL-encoded form body parser middleware.
///
/// # Error Responses
///
/// - 413 Payload Too Large: body exceeds `limit` or has too many parameters
/// - 415 Unsupported Media Type: non UTF-8 charset or unsupported content encoding
pub async fn urlencoded_body_parser(
    State(options): State<UrlencodedOptions>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if !should_parse(&request, URLENCODED_MEDIA_TYPE) {
        return Ok(next.run(request).await);
    }

    let (parts, bytes, _) = read_body(request, options.limit, URLENCODED_CHARSETS).await?;
    let value = parse_urlencoded(&bytes, options.parameter_limit)?;
    tracing::debug!(bytes = bytes.len(), "Parsed URL-encoded request body");

    Ok(next.run(reassemble(parts, bytes, value)).await)
}

/// Media type and charset taken from a `Content-Type` header.
#[derive(Debug, PartialEq, Eq)]
struct ContentType {
    essence: String,
    charset: Option<String>,
}

impl ContentType {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let raw = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let mut segments = raw.split(';');
        let essence = segments.next()?.trim().to_ascii_lowercase();

        let charset = segments
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"').to_ascii_lowercase());

        Some(Self { essence, charset })
    }
}

/// Decides whether a parser owning `media_type` should consume this request.
///
/// A request is skipped when an earlier parser already handled it or when
/// its media type differs. A request has a body when it carries
/// `Transfer-Encoding` or a numeric `Content-Length` (zero included). A
/// request with neither header is also read: serverless events often carry
/// no framing headers at all. Only a non-numeric `Content-Length` without
/// `Transfer-Encoding` counts as bodiless.
fn should_parse(request: &Request<Body>, media_type: &str) -> bool {
    if request.extensions().get::<ParsedBody>().is_some() {
        return false;
    }

    let matches = ContentType::from_headers(request.headers())
        .is_some_and(|content_type| content_type.essence == media_type);
    if !matches {
        return false;
    }

    has_body(request.headers())
}

fn has_body(headers: &HeaderMap) -> bool {
    if headers.contains_key(header::TRANSFER_ENCODING) {
        return true;
    }

    headers.get(header::CONTENT_LENGTH).is_none() || content_length(headers).is_some()
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Validates framing headers and reads the body up to `limit` bytes.
///
/// Returns the declared charset, which is one of `charsets` or absent.
async fn read_body(
    request: Request<Body>,
    limit: usize,
    charsets: &[&str],
) -> AppResult<(Parts, Bytes, Option<String>)> {
    let (parts, body) = request.into_parts();

    let charset = ContentType::from_headers(&parts.headers).and_then(|ct| ct.charset);
    if let Some(charset) = &charset {
        if !charsets.contains(&charset.as_str()) {
            return Err(AppError::UnsupportedMediaType(format!(
                "unsupported charset \"{}\"",
                charset.to_ascii_uppercase()
            )));
        }
    }

    // Anything the decompression layer understood has already been inflated.
    if let Some(encoding) = parts.headers.get(header::CONTENT_ENCODING) {
        let encoding = encoding.to_str().unwrap_or_default().trim().to_ascii_lowercase();
        if encoding != "identity" {
            return Err(AppError::UnsupportedMediaType(format!(
                "unsupported content encoding \"{encoding}\""
            )));
        }
    }

    if content_length(&parts.headers).is_some_and(|length| length > limit) {
        return Err(too_large());
    }

    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => return Err(too_large()),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read request body");
            return Err(AppError::BadRequest("request aborted".to_string()));
        }
    };

    Ok((parts, bytes, charset))
}

fn too_large() -> AppError {
    AppError::PayloadTooLarge("request entity too large".to_string())
}

/// Rebuilds the request with its raw bytes and the parsed value attached.
fn reassemble(parts: Parts, bytes: Bytes, value: Value) -> Request<Body> {
    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(ParsedBody(value));
    request
}

/// Transcodes a UTF-16 JSON body to UTF-8.
///
/// `utf-16` without a byte order mark is read big-endian. UTF-8 bodies are
/// borrowed unchanged.
fn decode_json_text<'a>(bytes: &'a [u8], charset: Option<&str>) -> AppResult<Cow<'a, [u8]>> {
    let (payload, little_endian) = match charset {
        None | Some("utf-8") => return Ok(Cow::Borrowed(bytes)),
        Some("utf-16le") => (bytes, true),
        Some("utf-16be") => (bytes, false),
        _ => match bytes {
            [0xFF, 0xFE, rest @ ..] => (rest, true),
            [0xFE, 0xFF, rest @ ..] => (rest, false),
            _ => (bytes, false),
        },
    };

    if payload.len() % 2 != 0 {
        return Err(AppError::BadRequest("invalid UTF-16 body".to_string()));
    }

    let units: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| {
            let pair = [pair[0], pair[1]];
            if little_endian {
                u16::from_le_bytes(pair)
            } else {
                u16::from_be_bytes(pair)
            }
        })
        .collect();

    let text = String::from_utf16(&units)
        .map_err(|_| AppError::BadRequest("invalid UTF-16 body".to_string()))?;
    Ok(Cow::Owned(text.into_bytes()))
}

/// Parses a JSON body. An empty body yields an empty object.
fn parse_json(bytes: &[u8], strict: bool) -> AppResult<Value> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    if strict {
        let first = bytes
            .iter()
            .find(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r'));
        if !matches!(first, Some(b'{' | b'[')) {
            return Err(AppError::BadRequest(
                "JSON body must be an object or array".to_string(),
            ));
        }
    }

    Ok(serde_json::from_slice(bytes)?)
}

/// Parses a flat URL-encoded body into an object of strings.
///
/// Repeated keys collect their values into an array in arrival order.
fn parse_urlencoded(bytes: &[u8], parameter_limit: usize) -> AppResult<Value> {
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let parameters = bytes.iter().filter(|&&b| b == b'&').count() + 1;
    if parameters > parameter_limit {
        return Err(AppError::PayloadTooLarge("too many parameters".to_string()));
    }

    let mut fields = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        let value = Value::String(value.into_owned());
        match fields.get_mut(&*key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                fields.insert(key.into_owned(), value);
            }
        }
    }

    Ok(Value::Object(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::to_bytes,
        http::{Request, StatusCode},
        routing::post,
    };
    use serde_json::json;
    use tower::ServiceExt;

    async fn echo(ParsedBody(body): ParsedBody) -> axum::Json<Value> {
        axum::Json(body)
    }

    fn test_router() -> Router {
        install_body_parsers(
            Router::new().route("/echo", post(echo)),
            JsonOptions::default(),
            UrlencodedOptions {
                limit: 64,
                parameter_limit: 3,
            },
        )
    }

    fn request(content_type: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(request: Request<Body>) -> (StatusCode, Value) {
        let response = test_router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    // ============ ContentType ============

    #[test]
    fn test_content_type_with_charset() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "Application/JSON; Charset=\"UTF-8\"".parse().unwrap(),
        );

        let content_type = ContentType::from_headers(&headers).unwrap();
        assert_eq!(content_type.essence, "application/json");
        assert_eq!(content_type.charset.as_deref(), Some("utf-8"));
    }

    #[test]
    fn test_content_type_missing() {
        assert!(ContentType::from_headers(&HeaderMap::new()).is_none());
    }

    // ============ has_body ============

    fn headers(pairs: &[(header::HeaderName, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), header::HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_has_body_zero_content_length() {
        assert!(has_body(&headers(&[(header::CONTENT_LENGTH, "0")])));
    }

    #[test]
    fn test_has_body_transfer_encoding() {
        assert!(has_body(&headers(&[
            (header::TRANSFER_ENCODING, "chunked"),
            (header::CONTENT_LENGTH, "abc"),
        ])));
    }

    #[test]
    fn test_has_body_without_framing_headers() {
        assert!(has_body(&HeaderMap::new()));
    }

    #[test]
    fn test_has_body_non_numeric_content_length() {
        assert!(!has_body(&headers(&[(header::CONTENT_LENGTH, "abc")])));
    }

    // ============ decode_json_text ============

    fn utf16(text: &str, little_endian: bool) -> Vec<u8> {
        text.encode_utf16()
            .flat_map(|unit| {
                if little_endian {
                    unit.to_le_bytes()
                } else {
                    unit.to_be_bytes()
                }
            })
            .collect()
    }

    #[test]
    fn test_decode_json_text_utf8_is_borrowed() {
        let decoded = decode_json_text(b"{}", Some("utf-8")).unwrap();
        assert!(matches!(decoded, Cow::Borrowed(_)));
    }

    #[test]
    fn test_decode_json_text_utf16le() {
        let body = utf16(r#"{"k":"é"}"#, true);
        let decoded = decode_json_text(&body, Some("utf-16le")).unwrap();
        assert_eq!(&*decoded, r#"{"k":"é"}"#.as_bytes());
    }

    #[test]
    fn test_decode_json_text_utf16_bom_detects_order() {
        let mut body = vec![0xFF, 0xFE];
        body.extend(utf16("[1]", true));
        assert_eq!(&*decode_json_text(&body, Some("utf-16")).unwrap(), b"[1]");

        let body = utf16("[2]", false);
        assert_eq!(&*decode_json_text(&body, Some("utf-16")).unwrap(), b"[2]");
    }

    #[test]
    fn test_decode_json_text_odd_length() {
        assert!(matches!(
            decode_json_text(&[0x00, 0x7B, 0x00], Some("utf-16be")),
            Err(AppError::BadRequest(_))
        ));
    }

    // ============ parse_json ============

    #[test]
    fn test_parse_json_empty_body_is_empty_object() {
        assert_eq!(parse_json(b"", true).unwrap(), json!({}));
    }

    #[test]
    fn test_parse_json_strips_bom() {
        let body = b"\xEF\xBB\xBF{\"a\":1}";
        assert_eq!(parse_json(body, true).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_parse_json_strict_rejects_primitives() {
        assert!(matches!(
            parse_json(b"  \"text\"", true),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(parse_json(b"   ", true), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_parse_json_lenient_accepts_primitives() {
        assert_eq!(parse_json(b"42", false).unwrap(), json!(42));
    }

    #[test]
    fn test_parse_json_malformed() {
        assert!(matches!(parse_json(b"{\"a\":", true), Err(AppError::Json(_))));
    }

    // ============ parse_urlencoded ============

    #[test]
    fn test_parse_urlencoded_flat_fields() {
        let value = parse_urlencoded(b"name=Jane+Doe&city=S%C3%A3o%20Paulo", 10).unwrap();
        assert_eq!(value, json!({"name": "Jane Doe", "city": "São Paulo"}));
    }

    #[test]
    fn test_parse_urlencoded_repeated_keys() {
        let value = parse_urlencoded(b"tag=a&tag=b&tag=c", 10).unwrap();
        assert_eq!(value, json!({"tag": ["a", "b", "c"]}));
    }

    #[test]
    fn test_parse_urlencoded_brackets_stay_flat() {
        let value = parse_urlencoded(b"user[name]=x&flag", 10).unwrap();
        assert_eq!(value, json!({"user[name]": "x", "flag": ""}));
    }

    #[test]
    fn test_parse_urlencoded_parameter_limit() {
        assert!(parse_urlencoded(b"a=1&b=2", 2).is_ok());
        assert!(matches!(
            parse_urlencoded(b"a=1&b=2&c=3", 2),
            Err(AppError::PayloadTooLarge(_))
        ));
    }

    // ============ Middleware ============

    #[tokio::test]
    async fn test_json_body_reaches_handler_parsed() {
        let (status, body) = send(request("application/json", r#"{"id":7}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"id": 7}));
    }

    #[tokio::test]
    async fn test_form_body_reaches_handler_parsed() {
        let (status, body) = send(request(
            "application/x-www-form-urlencoded",
            "user=neo&role=admin",
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"user": "neo", "role": "admin"}));
    }

    #[tokio::test]
    async fn test_other_content_type_passes_through() {
        let (status, body) = send(request("text/plain", "hello")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn test_vendor_json_is_not_parsed() {
        let (status, body) = send(request("application/vnd.api+json", r#"{"id":7}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn test_malformed_json_is_rejected() {
        let (status, body) = send(request("application/json", "{oops")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("JSON error"));
    }

    #[tokio::test]
    async fn test_unsupported_charset_is_rejected() {
        let (status, body) = send(request(
            "application/x-www-form-urlencoded; charset=latin1",
            "a=1",
        ))
        .await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["error"], "unsupported charset \"LATIN1\"");
    }

    #[tokio::test]
    async fn test_unsupported_encoding_is_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_ENCODING, "compress")
            .body(Body::from("{}"))
            .unwrap();

        let (status, _) = send(request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_form_over_limit_is_rejected() {
        let (status, body) = send(request(
            "application/x-www-form-urlencoded",
            "payload=aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        ))
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "request entity too large");
    }

    #[tokio::test]
    async fn test_too_many_parameters_is_rejected() {
        let (status, body) = send(request(
            "application/x-www-form-urlencoded",
            "a=1&b=2&c=3&d=4",
        ))
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "too many parameters");
    }

    #[tokio::test]
    async fn test_zero_length_body_still_checks_charset() {
        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json; charset=latin1")
            .header(header::CONTENT_LENGTH, "0")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["error"], "unsupported charset \"LATIN1\"");
    }

    #[tokio::test]
    async fn test_utf16_json_body_is_transcoded() {
        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json; charset=utf-16le")
            .body(Body::from(utf16(r#"{"name":"Zoë"}"#, true)))
            .unwrap();

        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"name": "Zoë"}));
    }

    #[tokio::test]
    async fn test_utf32_json_body_is_rejected() {
        let (status, _) = send(request("application/json; charset=utf-32", "{}")).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_raw_bytes_remain_readable() {
        async fn raw(body: String) -> String {
            body
        }

        let router = install_body_parsers(
            Router::new().route("/raw", post(raw)),
            JsonOptions::default(),
            UrlencodedOptions::default(),
        );
        let request = Request::builder()
            .method("POST")
            .uri("/raw")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"keep":"me"}"#))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], br#"{"keep":"me"}"#);
    }
}
