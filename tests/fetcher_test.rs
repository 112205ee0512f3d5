// Tests for PageFetcher against a mocked TabNet endpoint
// Uses mockito for HTTP mocking

use chrono::NaiveDate;
use mockito::{Matcher, Server};
use morbidity_scraper::fetch_error::FetchError;
use morbidity_scraper::fetcher::{PageFetcher, REFERENCE_URL};
use std::time::Duration;

const TABNET_PATH: &str = "/cgi/tabcgi.exe";

fn create_test_fetcher(base_url: String) -> PageFetcher {
    PageFetcher::new(
        format!("{base_url}{TABNET_PATH}"),
        REFERENCE_URL,
        Duration::from_secs(5),
    )
    .unwrap()
}

fn latin1(text: &str) -> Vec<u8> {
    encoding_rs::WINDOWS_1252.encode(text).0.into_owned()
}

fn jan_2020() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

#[tokio::test]
async fn test_fetch_csv_success() {
    let mut server = Server::new_async().await;

    let page = "<html><body><PRE>\r\nMunicípio;0 a 4 anos\r\n330455 Rio de Janeiro;3\r\n</PRE></body></html>";
    let mock = server
        .mock("POST", TABNET_PATH)
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_header("referer", REFERENCE_URL)
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r"Arquivos=nibr2001\.dbf".to_string()),
            Matcher::Regex(r"Linha=Munic%EDpio".to_string()),
            Matcher::Regex(r"SFaixa_Et%E1ria_2=6&SFaixa_Et%E1ria_2=7&SFaixa_Et%E1ria_2=8".to_string()),
            Matcher::Regex(r"formato=prn".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(latin1(page))
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let csv = fetcher.fetch_csv(&[jan_2020()]).await.unwrap();

    let csv = csv.expect("page has a <pre> element");
    assert!(csv.starts_with("Município;0 a 4 anos"), "got {csv:?}");
    assert!(csv.contains("330455 Rio de Janeiro;3"));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_csv_honours_declared_charset() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", TABNET_PATH)
        .with_status(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body("<pre>\nMunicípio;10+\nTotal;7\n</pre>")
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let csv = fetcher.fetch_csv(&[jan_2020()]).await.unwrap().unwrap();
    assert_eq!(csv, "Município;10+\nTotal;7\n");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_csv_decodes_declared_latin1() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", TABNET_PATH)
        .with_status(200)
        .with_header("content-type", "text/html; charset=ISO-8859-1")
        .with_body(latin1("<pre>\nMunicípio;Faixa Etária\n530010 Brasília;2\n</pre>"))
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let csv = fetcher.fetch_csv(&[jan_2020()]).await.unwrap().unwrap();
    assert_eq!(csv, "Município;Faixa Etária\n530010 Brasília;2\n");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_csv_without_pre_means_no_data() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", TABNET_PATH)
        .match_body(Matcher::Regex(r"Arquivos=nibr0701\.dbf".to_string()))
        .with_status(200)
        .with_body("<html><body><p>Nenhum registro selecionado</p></body></html>")
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let result = fetcher
        .fetch_csv(&[NaiveDate::from_ymd_opt(2007, 1, 1).unwrap()])
        .await;

    assert!(matches!(result, Ok(None)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_csv_several_months() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", TABNET_PATH)
        .match_body(Matcher::Regex(
            r"Arquivos=nibr1911\.dbf&Arquivos=nibr1912\.dbf".to_string(),
        ))
        .with_status(200)
        .with_body("<pre>\nMunicípio;0-4\nTotal;1\n</pre>")
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let dates = [
        NaiveDate::from_ymd_opt(2019, 11, 1).unwrap(),
        NaiveDate::from_ymd_opt(2019, 12, 1).unwrap(),
    ];
    assert!(fetcher.fetch_csv(&dates).await.unwrap().is_some());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_csv_server_error() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", TABNET_PATH)
        .with_status(500)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let result = fetcher.fetch_csv(&[jan_2020()]).await;

    match result {
        Err(FetchError::Request(e)) => {
            assert_eq!(e.status().map(|s| s.as_u16()), Some(500));
        }
        other => panic!("Expected request error, got {other:?}"),
    }

    mock.assert_async().await;
}

#[tokio::test]
async fn test_fetch_csv_not_found() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", TABNET_PATH)
        .with_status(404)
        .create_async()
        .await;

    let fetcher = create_test_fetcher(server.url());
    let result = fetcher.fetch_csv(&[jan_2020()]).await;
    assert!(matches!(result, Err(FetchError::Request(_))));

    mock.assert_async().await;
}
