//! End-to-end cycles against a fake statistics page and a fake Bot API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use statwatch::{CategoryNormalizer, ChangeEngine, Emphasis, Numeric, ReportStyle};
use statwatch_runtime::acquisition::{HttpClient, SelectorSet, StatPageExtractor};
use statwatch_runtime::notify::{ChannelId, Notifier, OpsSink, TelegramNotifier};
use statwatch_runtime::watcher::{CycleOutcome, Watcher};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ─────────────────────── helpers ───────────────────────

const TOKEN: &str = "42:secret";

fn page(confirmed: &str, deaths: &str, extra: Option<(&str, &str)>) -> String {
    let mut html = format!(
        r#"<html><body><div id="stat">
             <div class="tag"><strong>Confirmed (total)</strong>
               <dl><dt>Cases</dt><dd>{confirmed}</dd></dl>
               <dl><dt>Deaths</dt><dd>{deaths}</dd></dl>
             </div>"#
    );
    if let Some((category, value)) = extra {
        html.push_str(&format!(
            r#"<div class="tag"><strong>{category}</strong><dl><dt>Cases</dt><dd>{value}</dd></dl></div>"#
        ));
    }
    html.push_str("</div></body></html>");
    html
}

async fn serve_page(server: &MockServer, body: String) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_bot(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(server)
        .await;
}

async fn sent_messages(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

fn build_watcher(site: &MockServer, bot_api: &MockServer) -> Watcher<Numeric> {
    let bot: Arc<dyn Notifier> =
        Arc::new(TelegramNotifier::new(TOKEN, &bot_api.uri(), Duration::from_secs(5)).unwrap());
    let engine = ChangeEngine::new(
        CategoryNormalizer::with_affixes(["(total)"]),
        ReportStyle {
            title: "Data update".to_string(),
            emphasis: Emphasis::Markdown,
        },
    );
    Watcher::new(
        engine,
        HttpClient::new(Duration::from_secs(5)).unwrap(),
        format!("{}/stats", site.uri()),
        Box::new(StatPageExtractor::new(SelectorSet::default()).unwrap()),
        Arc::clone(&bot),
        ChannelId::new("@subscribers"),
    )
    .with_ops(OpsSink::new(bot, ChannelId::new("1001")))
}

// ─────────────────────── tests ───────────────────────

#[tokio::test]
async fn test_first_run_is_silent_and_changes_are_pushed_once() {
    let site = MockServer::start().await;
    let bot_api = MockServer::start().await;
    mount_bot(&bot_api).await;
    let mut watcher = build_watcher(&site, &bot_api);

    serve_page(&site, page("1,000", "10", None)).await;
    assert_eq!(watcher.run_cycle().await, CycleOutcome::Unchanged);
    assert!(sent_messages(&bot_api).await.is_empty());

    serve_page(&site, page("1,050", "9", Some(("Recovered", "3")))).await;
    assert_eq!(watcher.run_cycle().await, CycleOutcome::Delivered);

    let sent = sent_messages(&bot_api).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], "@subscribers");
    assert_eq!(sent[0]["parse_mode"], "Markdown");
    assert_eq!(
        sent[0]["text"],
        "*Data update*\n\
         Confirmed's Cases increased by 50 (1050)\n\
         Confirmed's Deaths decreased by 1 (9)\n\
         \n\
         *Confirmed*\n  — Cases: *1050*\n  — Deaths: *9*\n\
         \n\
         *Recovered*\n  — Cases: *3*\n"
    );

    assert_eq!(watcher.run_cycle().await, CycleOutcome::Unchanged);
    assert_eq!(sent_messages(&bot_api).await.len(), 1);
}

#[tokio::test]
async fn test_unreadable_value_goes_to_error_chat_only() {
    let site = MockServer::start().await;
    let bot_api = MockServer::start().await;
    mount_bot(&bot_api).await;
    let mut watcher = build_watcher(&site, &bot_api);

    serve_page(&site, page("1000", "10", None)).await;
    watcher.run_cycle().await;

    serve_page(&site, page("1000", "unknown", None)).await;
    assert_eq!(watcher.run_cycle().await, CycleOutcome::Unchanged);

    let sent = sent_messages(&bot_api).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], "1001");
    assert!(sent[0].get("parse_mode").is_none());
    assert!(sent[0]["text"]
        .as_str()
        .unwrap()
        .contains("cannot read Confirmed's Deaths as integer"));
    assert_eq!(
        watcher.engine().snapshot().get("Confirmed", "Deaths"),
        Some(&Numeric(10))
    );
}

#[tokio::test]
async fn test_missing_page_is_reported_and_state_kept() {
    let site = MockServer::start().await;
    let bot_api = MockServer::start().await;
    mount_bot(&bot_api).await;
    let mut watcher = build_watcher(&site, &bot_api);

    serve_page(&site, page("1000", "10", None)).await;
    watcher.run_cycle().await;

    site.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&site)
        .await;
    assert_eq!(watcher.run_cycle().await, CycleOutcome::Aborted);

    let sent = sent_messages(&bot_api).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], "1001");
    assert!(sent[0]["text"].as_str().unwrap().contains("HTTP 404"));
    assert_eq!(watcher.engine().snapshot().len(), 2);
}

#[tokio::test]
async fn test_long_report_is_delivered_in_parts() {
    let site = MockServer::start().await;
    let bot_api = MockServer::start().await;
    mount_bot(&bot_api).await;
    let mut watcher = build_watcher(&site, &bot_api);

    let regions = |cases: &str| {
        let groups: String = (0..250)
            .map(|i| {
                format!(
                    r#"<div class="tag"><strong>Region {i:03}</strong><dl><dt>Cases</dt><dd>{i}</dd></dl></div>"#
                )
            })
            .collect();
        page(cases, "10", None).replace("</div></body>", &format!("{groups}</div></body>"))
    };

    serve_page(&site, regions("1000")).await;
    assert_eq!(watcher.run_cycle().await, CycleOutcome::Unchanged);

    serve_page(&site, regions("1001")).await;
    assert_eq!(watcher.run_cycle().await, CycleOutcome::Delivered);

    let sent = sent_messages(&bot_api).await;
    assert!(sent.len() > 1, "expected a split report, got {} message(s)", sent.len());
    let mut report = String::new();
    for message in &sent {
        assert_eq!(message["chat_id"], "@subscribers");
        let text = message["text"].as_str().unwrap();
        assert!(text.encode_utf16().count() <= 4096);
        report.push_str(text);
    }
    assert!(report.starts_with("*Data update*\nConfirmed's Cases increased by 1 (1001)\n"));
    assert!(report.ends_with("*Region 249*\n  — Cases: *249*\n"));
    assert_eq!(watcher.engine().snapshot().len(), 251);
}
