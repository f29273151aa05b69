//! 싱크 공용 HTTP POST 헬퍼

use reqwest::header::CONTENT_TYPE;

/// `body`를 JSON으로 POST하고 2xx가 아니면 에러를 반환합니다.
pub(crate) async fn http_post(
    client: &reqwest::Client,
    url: &str,
    body: Vec<u8>,
) -> Result<(), String> {
    let response = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(format!("http status {status}: {detail}"));
    }

    Ok(())
}
