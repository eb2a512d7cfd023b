mod common;

use chrono::Duration;
use common::{launch, now, snapshot};
use launchsync_server::adapters::{
    build_http_client, HttpCalendarService, HttpFeedSource, WebhookTransport,
};
use launchsync_server::{CalendarService, DeliveryTransport, FeedSource};
use launchsync_types::{
    CalendarEntryDraft, CalendarPatch, ErrorClass, Notification, NotificationKind,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> reqwest::Client {
    build_http_client(std::time::Duration::from_secs(5))
}

#[tokio::test]
async fn feed_reads_normalized_snapshot() {
    let server = MockServer::start().await;
    let expected = snapshot(&[launch("alpha", now() + Duration::days(1))]);
    Mock::given(method("GET"))
        .and(path("/snapshot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&expected))
        .expect(1)
        .mount(&server)
        .await;

    let feed = HttpFeedSource::new(client(), format!("{}/snapshot", server.uri()));
    let fetched = feed.fetch().await.expect("snapshot should parse");
    assert_eq!(fetched, expected);
}

#[tokio::test]
async fn feed_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let busy = HttpFeedSource::new(client(), format!("{}/busy", server.uri()));
    assert_eq!(
        busy.fetch().await.expect_err("503").class,
        ErrorClass::Transient
    );

    let garbage = HttpFeedSource::new(client(), format!("{}/garbage", server.uri()));
    assert_eq!(
        garbage.fetch().await.expect_err("undecodable").class,
        ErrorClass::Other
    );
}

#[tokio::test]
async fn calendar_create_returns_entry_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/destinations/7/entries"))
        .and(body_partial_json(json!({ "event_id": "alpha", "started": false })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "cal-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let calendar = HttpCalendarService::new(client(), format!("{}/", server.uri()));
    let draft = CalendarEntryDraft::from_event(
        &launch("alpha", now() + Duration::days(1)),
        now(),
        Duration::seconds(60),
    );
    let entry_id = calendar.create(7, &draft).await.expect("create should succeed");
    assert_eq!(entry_id, "cal-1");
}

#[tokio::test]
async fn calendar_statuses_map_to_classes() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/destinations/7/entries/revoked"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/destinations/7/entries/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/destinations/7/entries/limited"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/destinations/7/entries/bad"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let calendar = HttpCalendarService::new(client(), server.uri());
    let patch = CalendarPatch {
        name: Some("renamed".to_string()),
        ..Default::default()
    };

    let err = calendar.update(7, "revoked", &patch).await.expect_err("403");
    assert!(err.is_forbidden());
    let err = calendar.delete(7, "gone").await.expect_err("404");
    assert!(err.is_not_found());
    let err = calendar.delete(7, "limited").await.expect_err("429");
    assert_eq!(err.class, ErrorClass::Transient);
    let err = calendar.update(7, "bad", &patch).await.expect_err("400");
    assert_eq!(err.class, ErrorClass::Other);
}

#[tokio::test]
async fn unreachable_service_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let calendar = HttpCalendarService::new(client(), format!("http://{addr}"));
    let err = calendar.delete(1, "entry").await.expect_err("nothing listens");
    assert_eq!(err.class, ErrorClass::Transient);
}

#[tokio::test]
async fn webhook_posts_notification_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hooks/1"))
        .and(body_partial_json(json!({
            "event_id": "alpha",
            "kind": { "type": "countdown", "minutes": 10 }
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hooks/2"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let transport = WebhookTransport::new(client());
    let notification = Notification::for_event(
        NotificationKind::Countdown { minutes: 10 },
        &launch("alpha", now() + Duration::minutes(10)),
    );

    transport
        .send(&format!("{}/hooks/1", server.uri()), &notification)
        .await
        .expect("delivery should succeed");
    let err = transport
        .send(&format!("{}/hooks/2", server.uri()), &notification)
        .await
        .expect_err("410");
    assert!(err.is_not_found());
}
