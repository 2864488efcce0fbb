//! Shared fixtures: a mock forum and sessions pointing at it

use forum_harvest::config::ForumConfig;
use forum_harvest::Session;
use reqwest::Client;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Forum root of the mock server, with the trailing slash the crawler expects
pub fn base_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).unwrap()
}

pub fn forum_config(server: &MockServer) -> ForumConfig {
    ForumConfig {
        base_url: base_url(server).to_string(),
        username: "alice".to_string(),
        password: "password".to_string(),
        backoff_ms: 10,
        ..Default::default()
    }
}

/// A session that skips the login and gives up on slow pages quickly
pub fn quick_session(server: &MockServer) -> Session {
    let client = Client::builder()
        .cookie_store(true)
        .timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    Session::from_client(client, base_url(server))
}

pub fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(format!("<html><body>{}</body></html>", body))
        .insert_header("content-type", "text/html")
}

pub async fn mount_index(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(body))
        .mount(server)
        .await;
}

pub async fn mount_forum(server: &MockServer, id: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path("/forumdisplay.php"))
        .and(query_param("f", id))
        .respond_with(html(body))
        .mount(server)
        .await;
}

pub async fn mount_thread(server: &MockServer, id: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path("/showthread.php"))
        .and(query_param("t", id))
        .respond_with(html(body))
        .mount(server)
        .await;
}

/// vBulletin page-navigation cell
pub fn page_nav(pages: u32) -> String {
    format!(
        r#"<table><tr><td class="vbmenu_control">Pagina 1 de {}</td></tr></table>"#,
        pages
    )
}

/// A post with the styled username element
pub fn styled_post(id: u32, username: &str, message: &str) -> String {
    format!(
        r#"<div id="post{id}">
            <a class="bigusername" href="member.php?u=1">{username}</a>
            <div id="postmenu_{id}"><a href="member.php?u=1">{username}</a></div>
            <div id="post_message_{id}">{message}</div>
        </div>"#
    )
}

/// A guest post where only the post menu names the author
pub fn guest_post(id: u32, username: &str, message: &str) -> String {
    format!(
        r#"<div id="post{id}">
            <div id="postmenu_{id}">
                {username}
            </div>
            <div id="post_message_{id}">{message}</div>
        </div>"#
    )
}
