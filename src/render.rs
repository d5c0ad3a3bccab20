//! Variable substitution and just-in-time HTML/text body rendering.
//!
//! Grounded in `email_renderer.py` / `shared/email.py`: `{{Var}}` placeholder
//! substitution (not handlebars), a brand-styled HTML wrapper, and an
//! HMAC-signed unsubscribe link.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use regex::Regex;
use sha2::Sha256;

use crate::models::{RecipientMetadata, Section, SectionMode, SectionType};

const BRAND_PRIMARY: &str = "#1e88e5";
const BRAND_PRIMARY_LIGHT: &str = "#bfdbfe";
const BRAND_TEXT_MUTED: &str = "#4b5563";
const BRAND_TEXT_LIGHT: &str = "#9ca3af";
const BRAND_BG_LIGHT: &str = "#f3f4f6";
const BRAND_BG_CARD: &str = "#ffffff";
const BRAND_BG_FOOTER: &str = "#f9fafb";
const BRAND_BORDER: &str = "#e5e7eb";

/// Replace `{{Var}}` placeholders with values from `data`, falling back from
/// the exact key to its lowercase then uppercase form. A placeholder with no
/// match in any case is left untouched.
pub fn replace_variables(content: &str, data: &RecipientMetadata) -> String {
    let placeholder = Regex::new(r"\{\{(\w+)\}\}").expect("static pattern is valid");
    placeholder
        .replace_all(content, |caps: &regex::Captures| {
            let var = &caps[1];
            data.get(var)
                .or_else(|| data.get(&var.to_lowercase()))
                .or_else(|| data.get(&var.to_uppercase()))
                .map(|v| v.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// `hmac-sha256(secret, email.lower())`, truncated to the first 16 hex
/// characters — matches `generate_unsubscribe_url`'s token derivation.
pub fn unsubscribe_token(secret: &str, email: &str) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(email.to_lowercase().as_bytes());
    let digest = mac.finalize().into_bytes();
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

pub fn unsubscribe_url(app_url: &str, secret: &str, email: &str) -> String {
    let token = unsubscribe_token(secret, email);
    format!(
        "{app_url}/api/unsubscribe?email={}&token={}",
        urlencode(email),
        urlencode(&token)
    )
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn strip_html_tags(s: &str) -> String {
    let re = Regex::new(r"<[^>]+>").expect("static pattern is valid");
    re.replace_all(s, "").into_owned()
}

fn rendered_text(
    section: &Section,
    metadata: &RecipientMetadata,
    generated: &HashMap<String, String>,
) -> String {
    match section.mode {
        SectionMode::Personalized => generated.get(&section.id).cloned().unwrap_or_else(|| {
            if section.section_type == SectionType::Button {
                format!("[{} - AI Generated]", section.name)
            } else {
                format!("[{} - Missing Content]", section.name)
            }
        }),
        SectionMode::Static => replace_variables(&section.content, metadata),
    }
}

/// Render the full HTML email body. `generated` holds AI-generated text
/// keyed by section id, consulted only for `mode = personalized` sections;
/// a personalized section missing from `generated` renders a visible
/// placeholder rather than silently dropping content.
pub fn generate_email_html(
    sections: &[Section],
    subject: &str,
    metadata: &RecipientMetadata,
    generated: &HashMap<String, String>,
    unsubscribe_link: &str,
) -> String {
    let processed_subject = replace_variables(subject, metadata);

    let mut sections_html = String::new();
    for section in sections {
        let text = rendered_text(section, metadata, generated);
        match section.section_type {
            SectionType::Button => {
                let url = section.button_url.as_deref().unwrap_or("#");
                sections_html.push_str(&format!(
                    r#"
        <div style="margin: 24px 0; text-align: center;">
          <a href="{url}" style="
            background-color: {BRAND_PRIMARY};
            color: #ffffff;
            padding: 14px 32px;
            border-radius: 8px;
            text-decoration: none;
            display: block;
            width: 100%;
            box-sizing: border-box;
            font-weight: 600;
            font-size: 16px;
            text-align: center;
          ">{text}</a>
        </div>
        "#
                ));
            }
            SectionType::Text => {
                for paragraph in text.split("\n\n") {
                    let processed = paragraph.replace('\n', "<br>");
                    sections_html.push_str(&format!(
                        r#"<p style="margin: 0 0 16px 0; font-size: 15px; color: {BRAND_TEXT_MUTED}; line-height: 1.6;">{processed}</p>"#
                    ));
                }
            }
        }
    }

    let body_html = if sections_html.is_empty() {
        r#"<p style="color: #9ca3af; font-style: italic;">No content available</p>"#.to_string()
    } else {
        sections_html
    };

    let title = if processed_subject.is_empty() {
        "Email Preview"
    } else {
        processed_subject.as_str()
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{processed_subject}</title>
</head>
<body style="
  font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif, 'Apple Color Emoji', 'Segoe UI Emoji', 'Segoe UI Symbol';
  background-color: {BRAND_BG_LIGHT};
  margin: 0;
  padding: 16px 0;
  font-size: 15px;
  line-height: 1.6;
">
  <div style="
    width: 100%;
    max-width: 640px;
    margin: 0 auto;
    background-color: {BRAND_BG_CARD};
    border-radius: 16px;
    border: 1px solid {BRAND_BORDER};
    overflow: hidden;
  ">
    <div style="background-color: {BRAND_PRIMARY}; padding: 18px 20px;">
      <table cellpadding="0" cellspacing="0" border="0" width="100%">
        <tr>
          <td valign="middle">
            <div style="
              margin: 0;
              font-size: 11px;
              letter-spacing: 0.14em;
              text-transform: uppercase;
              color: {BRAND_PRIMARY_LIGHT};
            ">OZListings</div>
            <div style="
              margin: 2px 0 0 0;
              font-size: 18px;
              line-height: 1.4;
              color: #ffffff;
              font-weight: 800;
            ">{title}</div>
          </td>
        </tr>
      </table>
    </div>
    <div style="padding: 20px 20px 18px 20px;">
      {body_html}
    </div>
    <div style="
      border-top: 1px solid {BRAND_BORDER};
      padding: 12px 24px 20px 24px;
      background-color: {BRAND_BG_FOOTER};
    ">
      <p style="margin: 0 0 4px 0; font-size: 11px; color: {BRAND_TEXT_LIGHT};">
        This email was sent to you because you're listed as a developer with
        an Opportunity Zone project. If you'd prefer not to receive these
        emails, you can <a href="{unsubscribe_link}" style="color: {BRAND_PRIMARY}; text-decoration: underline;">unsubscribe</a>.
      </p>
      <p style="margin: 0; font-size: 11px; color: {BRAND_TEXT_LIGHT};">
        &copy; 2024 OZListings. All rights reserved.
      </p>
    </div>
  </div>
</body>
</html>
"#
    )
}

/// Plain-text counterpart of [`generate_email_html`]. The subject line has
/// no home in a plain-text body (it's carried in the envelope), so unlike
/// [`generate_email_html`] this takes sections and metadata only.
pub fn generate_email_text(
    sections: &[Section],
    metadata: &RecipientMetadata,
    generated: &HashMap<String, String>,
    unsubscribe_link: &str,
) -> String {
    let mut lines: Vec<String> = Vec::new();

    for section in sections {
        let text = rendered_text(section, metadata, generated);
        match section.section_type {
            SectionType::Button => {
                let url = section.button_url.as_deref().unwrap_or("https://");
                lines.push(format!("{text} -> {url}"));
            }
            SectionType::Text => {
                for paragraph in text.split("\n\n") {
                    lines.push(strip_html_tags(paragraph));
                }
                lines.push(String::new());
            }
        }
    }

    lines.push(String::new());
    lines.push("----".to_string());
    lines.push(format!("To unsubscribe, visit: {unsubscribe_link}"));

    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> RecipientMetadata {
        let mut m = RecipientMetadata::default();
        for (k, v) in pairs {
            m.insert(*k, *v);
        }
        m
    }

    #[test]
    fn replaces_exact_case() {
        let data = metadata(&[("FirstName", "Ada")]);
        assert_eq!(replace_variables("Hi {{FirstName}}", &data), "Hi Ada");
    }

    #[test]
    fn falls_back_to_lowercase() {
        let data = metadata(&[("firstname", "Ada")]);
        assert_eq!(replace_variables("Hi {{FirstName}}", &data), "Hi Ada");
    }

    #[test]
    fn falls_back_to_uppercase() {
        let data = metadata(&[("FIRSTNAME", "Ada")]);
        assert_eq!(replace_variables("Hi {{FirstName}}", &data), "Hi Ada");
    }

    #[test]
    fn unmatched_placeholder_is_untouched() {
        let data = metadata(&[]);
        assert_eq!(replace_variables("Hi {{Unknown}}", &data), "Hi {{Unknown}}");
    }

    #[test]
    fn unsubscribe_token_is_16_hex_chars() {
        let token = unsubscribe_token("secret", "a@example.com");
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn unsubscribe_token_is_case_insensitive_on_email() {
        let a = unsubscribe_token("secret", "A@Example.com");
        let b = unsubscribe_token("secret", "a@example.com");
        assert_eq!(a, b);
    }

    #[test]
    fn personalized_section_without_generated_text_shows_placeholder() {
        let sections = vec![Section {
            id: "s1".into(),
            order: 0,
            section_type: SectionType::Text,
            mode: SectionMode::Personalized,
            name: "Intro".into(),
            content: String::new(),
            button_url: None,
            reference_fields: vec![],
        }];
        let data = metadata(&[]);
        let html = generate_email_html(&sections, "Hi", &data, &HashMap::new(), "https://x/unsub");
        assert!(html.contains("[Intro - Missing Content]"));
    }

    #[test]
    fn text_body_ends_with_unsubscribe_footer() {
        let data = metadata(&[]);
        let text = generate_email_text(&[], &data, &HashMap::new(), "https://x/unsub");
        assert!(text.ends_with("To unsubscribe, visit: https://x/unsub"));
    }
}
