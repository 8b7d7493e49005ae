//! VSC API Client HTTP Tests
//!
//! Exercises the blocking client against wiremock servers. The client
//! blocks, so every call runs on tokio's blocking pool.

use std::{
    io::{Read, Write},
    net::TcpListener,
    time::Duration,
};

use serde_json::json;
use vsc_api_client::{
    CredentialMode, ForwardRule, JobStopOptions, ListFormat, Reply, RequestSpec, VscApiClient,
    VscClientConfig, VscError,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path, path_regex, query_param},
};

async fn run_blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task panicked")
}

fn config_for(server: &MockServer) -> VscClientConfig {
    let addr = server.address();
    VscClientConfig::new(&addr.ip().to_string())
        .with_port(addr.port())
        .with_tls(false)
        .with_timeout(Duration::from_secs(5))
}

// ============== Credentials ==============

#[tokio::test(flavor = "multi_thread")]
async fn test_whoami_with_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whoami"))
        .and(header("authorization", "Basic YWxpY2U6c2VjcmV0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u-42"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server).with_auth("alice", "secret");
    let id = run_blocking(move || VscApiClient::new(config)?.whoami())
        .await
        .unwrap();

    assert_eq!(id, "u-42");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_whoami_with_plain_header_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whoami"))
        .and(header("x-vsc-username", "alice"))
        .and(header("x-vsc-password", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u-42"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server)
        .with_auth("alice", "secret")
        .with_credential_mode(CredentialMode::PlainHeaders);
    let id = run_blocking(move || VscApiClient::new(config)?.whoami())
        .await
        .unwrap();

    assert_eq!(id, "u-42");

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_auth_header_without_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image_receiver"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!(["https://rx1.vsc.com/upload"])),
        )
        .mount(&server)
        .await;

    let config = config_for(&server);
    let urls = run_blocking(move || VscApiClient::new(config)?.image_receiver_base_urls())
        .await
        .unwrap();

    assert_eq!(urls, vec!["https://rx1.vsc.com/upload"]);
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
    assert!(
        requests[0]
            .headers
            .get("user-agent")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("VscApiRustClient/")
    );
}

// ============== Success decoding ==============

#[tokio::test(flavor = "multi_thread")]
async fn test_no_content_is_unit() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/aaa/role/r1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let (reply, deleted) = run_blocking(move || {
        let client = VscApiClient::new(config)?;
        let reply = client.request(&RequestSpec::delete("aaa/role/r1"))?;
        let deleted = client.aaa_del_role("r1");
        Ok::<_, VscError>((reply, deleted))
    })
    .await
    .unwrap();

    assert_eq!(reply, Reply::NoContent);
    assert!(deleted.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_json_reply() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/aaa/user/u1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let result = run_blocking(move || VscApiClient::new(config)?.aaa_get_user_data("u1")).await;

    assert!(matches!(result, Err(VscError::InvalidResponse(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_forward_map_decoding() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/job/j1/fwd"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([["198.51.100.4", 41022, 22]])),
        )
        .mount(&server)
        .await;

    let config = config_for(&server);
    let rules = run_blocking(move || VscApiClient::new(config)?.job_get_forward_map("j1"))
        .await
        .unwrap();

    assert_eq!(
        rules,
        vec![ForwardRule {
            public_ip: "198.51.100.4".to_string(),
            public_port: 41022,
            destination_port: 22,
        }]
    );
}

// ============== Request shapes ==============

#[tokio::test(flavor = "multi_thread")]
async fn test_write_request_carries_json_body_only() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/aaa/user/u1/roles"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!(["r1", "r2"])))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    run_blocking(move || {
        VscApiClient::new(config)?
            .aaa_set_user_roles("u1", &["r1".to_string(), "r2".to_string()])
    })
    .await
    .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.query(), None);
    assert_eq!(
        requests[0].headers.get("content-length").unwrap(),
        &br#"["r1","r2"]"#.len().to_string()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_generates_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/aaa/user/[0-9a-f]{32}$"))
        .and(body_json(json!({"login": "bob"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let user_id = run_blocking(move || {
        VscApiClient::new(config)?.aaa_add_user(&json!({"login": "bob"}), None)
    })
    .await
    .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.path(), format!("/aaa/user/{user_id}"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_job_stop_uses_stop_verb_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("STOP"))
        .and(path("/job/j1"))
        .and(query_param("save", "1"))
        .and(query_param("force", "0"))
        .and(query_param("description", "nightly build"))
        .and(query_param("save_homefs", "1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let options = JobStopOptions {
        save: true,
        saved_description: Some("nightly build".to_string()),
        save_homefs: true,
        force: false,
    };
    run_blocking(move || VscApiClient::new(config)?.job_stop("j1", &options))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].body.is_empty());
}

// ============== Identity caching ==============

#[tokio::test(flavor = "multi_thread")]
async fn test_job_list_without_identity_requests_redirection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list_jobs"))
        .and(query_param("format", "basic"))
        .and(query_param("historic", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let jobs = run_blocking(move || VscApiClient::new(config)?.job_list(ListFormat::Basic, true))
        .await
        .unwrap();

    assert_eq!(jobs, json!([]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cached_identity_short_circuits_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whoami"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "u-7"}))
                .insert_header("X-VSC-User-ID", "u-7"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/job"))
        .and(query_param("user", "u-7"))
        .and(query_param("format", "ids_only"))
        .and(query_param("historic", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["j1", "j2"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list_jobs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let config = config_for(&server).with_auth("carol", "pw");
    let (user_id, jobs) = run_blocking(move || {
        let client = VscApiClient::new(config)?;
        client.whoami()?;
        let user_id = client.user_id();
        let jobs = client.job_list(ListFormat::IdsOnly, false)?;
        Ok::<_, VscError>((user_id, jobs))
    })
    .await
    .unwrap();

    assert_eq!(user_id.as_deref(), Some("u-7"));
    assert_eq!(jobs, json!(["j1", "j2"]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drop_auth_forgets_identity() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whoami"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "u-7"}))
                .insert_header("X-VSC-User-ID", "u-7"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list_packages"))
        .and(query_param("format", "full"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server).with_auth("carol", "pw");
    run_blocking(move || {
        let mut client = VscApiClient::new(config)?;
        client.whoami()?;
        client.drop_auth();
        client.package_list(ListFormat::Full)
    })
    .await
    .unwrap();
}

// ============== Redirects ==============

#[tokio::test(flavor = "multi_thread")]
async fn test_same_origin_redirect_is_followed_with_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list_jobs"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/job?format=basic&historic=0&user=u-1"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/job"))
        .and(query_param("user", "u-1"))
        .and(header("x-vsc-password", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["j1"])))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server)
        .with_auth("alice", "secret")
        .with_credential_mode(CredentialMode::PlainHeaders);
    let jobs = run_blocking(move || VscApiClient::new(config)?.job_list(ListFormat::Basic, false))
        .await
        .unwrap();

    assert_eq!(jobs, json!(["j1"]));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cross_origin_redirect_keeps_plain_credentials_home() {
    let origin = MockServer::start().await;
    let elsewhere = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list_jobs"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/job", elsewhere.uri()).as_str()),
        )
        .expect(1)
        .mount(&origin)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&elsewhere)
        .await;

    let config = config_for(&origin)
        .with_auth("alice", "secret")
        .with_credential_mode(CredentialMode::PlainHeaders);
    let result =
        run_blocking(move || VscApiClient::new(config)?.job_list(ListFormat::Basic, false)).await;

    match result {
        Err(VscError::Unclassified(raw)) => assert_eq!(raw.status().as_u16(), 302),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(elsewhere.received_requests().await.unwrap().is_empty());
}

// ============== Error decoding ==============

#[tokio::test(flavor = "multi_thread")]
async fn test_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whoami"))
        .respond_with(ResponseTemplate::new(401).set_body_string("go away"))
        .mount(&server)
        .await;

    let config = config_for(&server).with_auth("mallory", "guess");
    let result = run_blocking(move || VscApiClient::new(config)?.whoami()).await;

    assert!(matches!(result, Err(VscError::NotAuthenticated)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/package/p404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let result = run_blocking(move || VscApiClient::new(config)?.package_get_data("p404")).await;

    assert!(matches!(result, Err(VscError::NotFound)));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_forbidden_bad_argument() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/job/j1/fwd"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error_class": "bad_argument",
            "error_message": "x",
        })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let result = run_blocking(move || VscApiClient::new(config)?.job_forward("j1", &[22])).await;

    match result {
        Err(VscError::BadArgument(message)) => assert_eq!(message, "x"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_forbidden_access_denied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/aaa/user"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error_class": "access_denied",
            "error_message": "admins only",
        })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let result =
        run_blocking(move || VscApiClient::new(config)?.aaa_list_users(ListFormat::IdsOnly)).await;

    match result {
        Err(VscError::NotAuthorized(message)) => assert_eq!(message, "admins only"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_forbidden_unknown_class_is_passed_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/image/i1"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error_class": "quota_exceeded",
            "error_message": "too many images",
        })))
        .mount(&server)
        .await;

    let config = config_for(&server);
    let result = run_blocking(move || VscApiClient::new(config)?.image_get_data("i1")).await;

    match result {
        Err(VscError::Unclassified(raw)) => {
            assert_eq!(raw.status().as_u16(), 403);
            assert!(raw.body_text().contains("too many images"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unmapped_status_is_passed_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/aaa/passwd"))
        .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
        .mount(&server)
        .await;

    let config = config_for(&server).with_auth("alice", "old");
    let result = run_blocking(move || VscApiClient::new(config)?.aaa_passwd("new")).await;

    match result {
        Err(VscError::Unclassified(raw)) => {
            assert_eq!(raw.status().as_u16(), 409);
            assert_eq!(raw.body(), b"conflict");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

// ============== Transport failures ==============

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_refused_is_no_alive_servers() {
    // grab a free port and release it so nothing listens there
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = VscClientConfig::new("127.0.0.1")
        .with_port(port)
        .with_tls(false)
        .with_timeout(Duration::from_secs(2));
    let result = run_blocking(move || VscApiClient::new(config)?.whoami()).await;

    assert!(matches!(result, Err(VscError::NoAliveServers { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_is_no_alive_servers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whoami"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "slow"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = config_for(&server).with_timeout(Duration::from_millis(200));
    let result = run_blocking(move || VscApiClient::new(config)?.whoami()).await;

    assert!(matches!(result, Err(VscError::NoAliveServers { .. })));
}

/// Serve one response whose body is cut short of its Content-Length
fn serve_truncated_once(status_line: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = [0u8; 4096];
        let _ = stream.read(&mut request);
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: text/plain\r\nContent-Length: 64\r\n\r\npartial"
        );
        stream.write_all(response.as_bytes()).unwrap();
    });
    port
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreadable_error_body_keeps_status() {
    let port = serve_truncated_once("409 Conflict");

    let config = VscClientConfig::new("127.0.0.1")
        .with_port(port)
        .with_tls(false)
        .with_timeout(Duration::from_secs(2));
    let result = run_blocking(move || VscApiClient::new(config)?.whoami()).await;

    match result {
        Err(VscError::Unclassified(raw)) => {
            assert_eq!(raw.status().as_u16(), 409);
            assert!(raw.body().is_empty());
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreadable_not_found_body_still_maps() {
    let port = serve_truncated_once("404 Not Found");

    let config = VscClientConfig::new("127.0.0.1")
        .with_port(port)
        .with_tls(false)
        .with_timeout(Duration::from_secs(2));
    let result = run_blocking(move || VscApiClient::new(config)?.aaa_get_user_data("u-1")).await;

    assert!(matches!(result, Err(VscError::NotFound)));
}
