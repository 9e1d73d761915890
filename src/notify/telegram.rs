//! Telegram push for accepted signals.

use tracing::warn;

use crate::error::Result;

use super::Alert;

#[derive(Clone)]
pub struct TelegramNotifier {
    api_url: String,
    token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(api_url: &str, token: String, chat_id: String) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            chat_id,
            client: reqwest::Client::new(),
        }
    }

    pub async fn send(&self, alert: &Alert) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.token);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": format_message(alert),
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await?;
            warn!(body = %body, "telegram API error");
        }
        Ok(())
    }
}

fn format_message(alert: &Alert) -> String {
    format!(
        "📡 <b>{}</b>\n{}",
        html_escape(&alert.title),
        html_escape(&alert.body)
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
