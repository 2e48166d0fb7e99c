use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tracing::debug;
use url::Url;

use super::error::ExecuteError;
use crate::client::ProbeResponse;
use crate::definition::RequestDefinition;
use crate::duration::parse_duration;
use crate::variables::{resolve, VariableTable};

/// Status check: an empty expectation accepts any 2xx.
pub fn status_accepted(status: u16, expected: &[u16]) -> bool {
    if expected.is_empty() {
        (200..300).contains(&status)
    } else {
        expected.contains(&status)
    }
}

/// Per-request deadline. An empty timeout falls back to `default`; anything
/// else must parse or the request is not sent.
pub fn request_timeout(raw: &str, default: Duration) -> Result<Duration, ExecuteError> {
    if raw.trim().is_empty() {
        return Ok(default);
    }
    match parse_duration(raw) {
        Ok(timeout) if !timeout.is_zero() => Ok(timeout),
        Ok(_) => Err(ExecuteError::build(format!("timeout '{}' must be positive", raw))),
        Err(e) => Err(ExecuteError::build(e.to_string())),
    }
}

/// Render every template of `request` and assemble the outbound request.
pub fn build_request(
    request: &RequestDefinition,
    table: &VariableTable,
    client: &Client,
    default_timeout: Duration,
) -> Result<reqwest::Request, ExecuteError> {
    let subs = table.substitutions();

    let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|_| ExecuteError::build(format!("invalid method '{}'", request.method)))?;

    let rendered_url = subs.render(&request.url);
    let mut url = Url::parse(&rendered_url)
        .map_err(|e| ExecuteError::build(format!("invalid url '{}': {}", rendered_url, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExecuteError::build(format!(
            "unsupported url scheme '{}' in '{}'",
            url.scheme(),
            rendered_url
        )));
    }
    let query = subs.render_values(&request.query_params);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }

    let mut headers = HeaderMap::new();
    for (name, value) in subs.render_values(&request.headers) {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ExecuteError::build(format!("invalid header name '{}'", name)))?;
        let header_value = HeaderValue::from_str(&value)
            .map_err(|_| ExecuteError::build(format!("invalid value for header '{}'", name)))?;
        headers.append(header_name, header_value);
    }

    let timeout = request_timeout(&request.timeout, default_timeout)?;

    let mut builder = client
        .request(method, url)
        .headers(headers)
        .timeout(timeout);
    if !request.body.is_empty() {
        builder = builder.body(subs.render(&request.body));
    }

    builder
        .build()
        .map_err(|e| ExecuteError::build(e.to_string()))
}

/// Send one request and resolve its variables.
///
/// Resolved variables are appended to `table` only when every extraction
/// rule succeeds.
pub async fn execute(
    request: &RequestDefinition,
    table: &mut VariableTable,
    client: &Client,
    default_timeout: Duration,
) -> Result<ProbeResponse, ExecuteError> {
    let outbound = build_request(request, table, client, default_timeout)?;
    let url = outbound.url().to_string();
    debug!(request = %request.name, method = %outbound.method(), %url, "Sending request");

    let response = match client.execute(outbound).await {
        Ok(response) => ProbeResponse::read(response).await,
        Err(e) => Err(e),
    }
    .map_err(|e| {
        if e.is_builder() {
            ExecuteError::build(e.to_string())
        } else {
            ExecuteError::Transport {
                url: url.clone(),
                reason: e.to_string(),
                timed_out: e.is_timeout(),
            }
        }
    })?;

    if !status_accepted(response.status, &request.expected_response_codes) {
        return Err(ExecuteError::UnexpectedStatus {
            status: response.status,
            expected: request.expected_response_codes.clone(),
        });
    }

    let mut resolved = Vec::with_capacity(request.vars_from_response.len());
    for rule in &request.vars_from_response {
        let variable = resolve(rule, &response).map_err(|source| ExecuteError::Extraction {
            status: response.status,
            source,
        })?;
        resolved.push(variable);
    }
    table.extend(resolved);

    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::definition::VariableExtractionRule;
    use crate::variables::{VarSource, Variable};

    fn request(method: &str, url: String) -> RequestDefinition {
        RequestDefinition {
            name: "req".into(),
            target_service: "svc".into(),
            method: method.into(),
            url,
            timeout: String::new(),
            query_params: BTreeMap::new(),
            body: String::new(),
            headers: BTreeMap::new(),
            expected_response_codes: Vec::new(),
            vars_from_response: Vec::new(),
        }
    }

    fn rule(name: &str, from: VarSource, path: &str) -> VariableExtractionRule {
        VariableExtractionRule {
            name: name.into(),
            from,
            json_path: path.into(),
            value: String::new(),
        }
    }

    fn client() -> Client {
        crate::client::build_client(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn status_policy() {
        assert!(status_accepted(200, &[]));
        assert!(status_accepted(204, &[]));
        assert!(!status_accepted(301, &[]));
        assert!(!status_accepted(404, &[]));
        assert!(status_accepted(404, &[404]));
        assert!(!status_accepted(200, &[201]));
    }

    #[test]
    fn timeout_policy() {
        let default = Duration::from_secs(5);
        assert_eq!(request_timeout("", default).unwrap(), default);
        assert_eq!(request_timeout("250ms", default).unwrap(), Duration::from_millis(250));
        assert!(matches!(request_timeout("soon", default), Err(ExecuteError::Build { .. })));
        assert!(matches!(request_timeout("0s", default), Err(ExecuteError::Build { .. })));
    }

    #[test]
    fn build_renders_all_templates() {
        let mut table = VariableTable::new();
        table.push(Variable::provided("id", "42"));
        table.push(Variable::provided("tok", "abc"));

        let mut req = request("POST", "http://x.local/items/{id}?fixed=1".into());
        req.query_params.insert("q".into(), vec!["{id}".into(), "two".into()]);
        req.headers.insert("Authorization".into(), vec!["Bearer {tok}".into()]);
        req.body = r#"{"id":"{id}"}"#.into();

        let built = build_request(&req, &table, &client(), Duration::from_secs(5)).unwrap();
        assert_eq!(built.method(), &Method::POST);
        assert_eq!(built.url().as_str(), "http://x.local/items/42?fixed=1&q=42&q=two");
        assert_eq!(built.headers()["authorization"], "Bearer abc");
        let body = built.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, br#"{"id":"42"}"#);
        assert_eq!(built.timeout(), Some(&Duration::from_secs(5)));
    }

    #[test]
    fn build_rejects_malformed_parts() {
        let table = VariableTable::new();
        let c = client();
        let default = Duration::from_secs(5);

        let bad_url = request("GET", "not a url".into());
        assert!(matches!(build_request(&bad_url, &table, &c, default), Err(ExecuteError::Build { .. })));

        let bad_method = request("GE T", "http://x".into());
        assert!(matches!(build_request(&bad_method, &table, &c, default), Err(ExecuteError::Build { .. })));

        let mut bad_timeout = request("GET", "http://x".into());
        bad_timeout.timeout = "5 parsecs".into();
        assert!(matches!(build_request(&bad_timeout, &table, &c, default), Err(ExecuteError::Build { .. })));

        let ftp = request("GET", "ftp://example.com/x".into());
        let err = build_request(&ftp, &table, &c, default).unwrap_err();
        assert!(matches!(err, ExecuteError::Build { .. }), "{:?}", err);
        assert_eq!(err.reported_status(), None);

        let mut bad_header = request("GET", "http://x".into());
        bad_header.headers.insert("Bad Header".into(), vec!["v".into()]);
        assert!(matches!(build_request(&bad_header, &table, &c, default), Err(ExecuteError::Build { .. })));
    }

    #[tokio::test]
    async fn execute_extracts_variables_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .and(body_string(r#"{"user":"probe"}"#))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Session", "s-1")
                    .set_body_string(r#"{"token":"abc","user":{"id":7}}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut table = VariableTable::new();
        table.push(Variable::provided("user", "probe"));

        let mut req = request("POST", format!("{}/login", server.uri()));
        req.body = r#"{"user":"{user}"}"#.into();
        req.expected_response_codes = vec![200];
        req.vars_from_response = vec![
            rule("token", VarSource::BodyJson, "/token"),
            rule("uid", VarSource::BodyJson, "/user/id"),
            rule("session", VarSource::Headers, "/X-Session"),
        ];

        let response = execute(&req, &mut table, &client(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(table.get("token"), Some("abc"));
        assert_eq!(table.get("uid"), Some("7"));
        assert_eq!(table.get("session"), Some("s-1"));
        assert_eq!(table.len(), 4);
    }

    #[tokio::test]
    async fn execute_sends_query_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "abc"))
            .and(header("x-token", "abc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut table = VariableTable::new();
        table.push(Variable::provided("t", "abc"));
        let mut req = request("GET", format!("{}/search", server.uri()));
        req.query_params.insert("q".into(), vec!["{t}".into()]);
        req.headers.insert("X-Token".into(), vec!["{t}".into()]);

        let response = execute(&req, &mut table, &client(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.status, 204);
    }

    #[tokio::test]
    async fn unexpected_status_skips_extraction() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"token":"abc"}"#))
            .mount(&server)
            .await;

        let mut table = VariableTable::new();
        let mut req = request("GET", format!("{}/missing", server.uri()));
        req.expected_response_codes = vec![200];
        req.vars_from_response = vec![rule("token", VarSource::BodyJson, "/token")];

        let err = execute(&req, &mut table, &client(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::UnexpectedStatus { status: 404, .. }));
        assert_eq!(err.reported_status(), Some(404));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn first_extraction_failure_aborts_and_commits_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"a":"1"}"#))
            .mount(&server)
            .await;

        let mut table = VariableTable::new();
        let mut req = request("GET", server.uri());
        req.vars_from_response = vec![
            rule("a", VarSource::BodyJson, "/a"),
            rule("b", VarSource::BodyJson, "/b"),
            rule("c", VarSource::BodyRaw, ""),
        ];

        let err = execute(&req, &mut table, &client(), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            ExecuteError::Extraction { status, source } => {
                assert_eq!(status, 200);
                assert!(matches!(source, crate::variables::ExtractionError::NotFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn timeout_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let mut req = request("GET", server.uri());
        req.timeout = "50ms".into();

        let err = execute(&req, &mut VariableTable::new(), &client(), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            ExecuteError::Transport { timed_out, .. } => assert!(timed_out),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        let req = request("GET", "http://127.0.0.1:9/unreachable".into());
        let err = execute(&req, &mut VariableTable::new(), &client(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Transport { .. }));
        assert_eq!(err.reported_status(), Some(599));
    }
}
