mod common;

use http::Method;
use restline::{ApiClient, CallContext, ReqwestTransport};
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const REQUESTS: usize = 300;
// Runtime bookkeeping may briefly keep a task or two alive after the burst.
const TASK_SLACK: usize = 2;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_retries_release_every_response_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_string("boom")
                .set_delay(Duration::from_millis(2)),
        )
        .mount(&mock_server)
        .await;
    let baseline = tokio::runtime::Handle::current().metrics().num_alive_tasks();

    let config = common::config_for(&mock_server)
        .max_retries(5)
        .initial_wait(Duration::from_millis(3))
        .build()
        .unwrap();
    let base = ReqwestTransport::new(config.transport()).unwrap();
    let (tracked, ledger) = common::Tracked::new(base);
    let client = ApiClient::with_transport(config, tracked);

    // Without a deadline this runs every attempt, so the pool is warm and the retry path is
    // exercised before the burst starts.
    let warm = client.execute(client.request(Method::GET, "/warm").unwrap()).await.unwrap();
    assert_eq!(warm.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    drop(warm);
    assert_eq!(ledger.opened(), 6);

    let mut handles = Vec::with_capacity(REQUESTS);
    for i in 0..REQUESTS {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let deadline = Duration::from_millis(((i * 7919) % 116 + 5) as u64);
            let mut req = client.request(Method::GET, &format!("/stress/{i}")).unwrap();
            CallContext::with_timeout(deadline).attach(&mut req);
            // Either the last 500 or a cancellation; both are fine here.
            let _ = client.execute(req).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(ledger.opened() > 6, "no burst request reached the server");
    assert_eq!(ledger.opened(), ledger.closed(), "every response body must be dropped");

    drop(client);
    let alive = common::settle_tasks(baseline + TASK_SLACK).await;
    assert!(alive <= baseline + TASK_SLACK, "{alive} tasks alive, baseline {baseline}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exhausted_retries_release_intermediate_bodies() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;
    let baseline = tokio::runtime::Handle::current().metrics().num_alive_tasks();

    let config = common::config_for(&mock_server)
        .max_retries(2)
        .initial_wait(Duration::from_millis(1))
        .build()
        .unwrap();
    let base = ReqwestTransport::new(config.transport()).unwrap();
    let (tracked, ledger) = common::Tracked::new(base);
    let client = ApiClient::with_transport(config, tracked);

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                let req = client.request(Method::GET, &format!("/flat/{i}")).unwrap();
                client.execute(req).await.unwrap().status()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap(), http::StatusCode::SERVICE_UNAVAILABLE);
    }

    assert_eq!(ledger.opened(), 150);
    assert_eq!(ledger.closed(), 150);

    drop(client);
    let alive = common::settle_tasks(baseline + TASK_SLACK).await;
    assert!(alive <= baseline + TASK_SLACK, "{alive} tasks alive, baseline {baseline}");
}
