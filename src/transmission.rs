//! Transmission client contract (spec §6.5) and its SparkPost
//! implementation, grounded in `campaign-runner/email_sender.py`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

const SPARKPOST_TRANSMISSIONS_URL: &str = "https://api.sparkpost.com/api/v1/transmissions";

#[async_trait]
pub trait TransmissionClient: Send + Sync {
    /// Sends one email. Picks html vs. text by detecting both `<` and `>` in
    /// `body`. Returns whether the transmission API reported success.
    async fn send(
        &self,
        to: &str,
        from: &str,
        subject: &str,
        body: &str,
        campaign_tag: &str,
        metadata: &HashMap<String, String>,
    ) -> bool;
}

pub struct SparkPostClient {
    http: reqwest::Client,
    api_key: String,
}

impl SparkPostClient {
    pub fn new(api_key: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds with a valid timeout");
        Self { http, api_key }
    }
}

#[derive(Serialize)]
struct Recipient<'a> {
    address: Address<'a>,
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    from: &'a str,
    subject: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Serialize)]
struct Options {
    click_tracking: bool,
}

#[derive(Serialize)]
struct TransmissionRequest<'a> {
    recipients: Vec<Recipient<'a>>,
    content: Content<'a>,
    options: Options,
    campaign_id: &'a str,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    metadata: HashMap<String, String>,
}

#[async_trait]
impl TransmissionClient for SparkPostClient {
    async fn send(
        &self,
        to: &str,
        from: &str,
        subject: &str,
        body: &str,
        campaign_tag: &str,
        metadata: &HashMap<String, String>,
    ) -> bool {
        let is_html = body.contains('<') && body.contains('>');

        let request = TransmissionRequest {
            recipients: vec![Recipient {
                address: Address { email: to },
            }],
            content: Content {
                from,
                subject,
                html: is_html.then_some(body),
                text: (!is_html).then_some(body),
            },
            options: Options {
                click_tracking: false,
            },
            campaign_id: campaign_tag,
            metadata: metadata.clone(),
        };

        let response = self
            .http
            .post(SPARKPOST_TRANSMISSIONS_URL)
            .header("Authorization", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(%status, %body, to, "sparkpost transmission failed");
                false
            }
            Err(err) => {
                tracing::error!(error = %err, to, "sparkpost request failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_detection_requires_both_angle_brackets() {
        assert!("<p>hi</p>".contains('<') && "<p>hi</p>".contains('>'));
        assert!(!("plain text".contains('<') && "plain text".contains('>')));
        assert!(!("only <".contains('<') && "only <".contains('>')));
    }
}
