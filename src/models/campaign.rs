use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The two warmed-up sending identities the domain pool is shared across.
///
/// The spec fixes this to exactly these two; a third sender would need its
/// own display-name/local-part pairing added here and nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    ToddVitzthum,
    JeffRichmond,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::ToddVitzthum => "todd_vitzthum",
            Sender::JeffRichmond => "jeff_richmond",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Sender::ToddVitzthum => "Todd Vitzthum",
            Sender::JeffRichmond => "Jeff Richmond",
        }
    }

    pub fn local_part(&self) -> &'static str {
        match self {
            Sender::ToddVitzthum => "todd.vitzthum",
            Sender::JeffRichmond => "jeff.richmond",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todd_vitzthum" => Some(Sender::ToddVitzthum),
            "jeff_richmond" => Some(Sender::JeffRichmond),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Staged,
    Scheduled,
    Sending,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Staged => "staged",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Paused => "paused",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(CampaignStatus::Draft),
            "staged" => Some(CampaignStatus::Staged),
            "scheduled" => Some(CampaignStatus::Scheduled),
            "sending" => Some(CampaignStatus::Sending),
            "paused" => Some(CampaignStatus::Paused),
            "completed" => Some(CampaignStatus::Completed),
            "cancelled" => Some(CampaignStatus::Cancelled),
            _ => None,
        }
    }

    /// The dispatcher treats `scheduled` and `sending` as the same state for
    /// dispatch and reconciliation purposes (spec Open Question: we keep them
    /// as distinct statuses but both are "live" for batch selection).
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, CampaignStatus::Scheduled | CampaignStatus::Sending)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailFormat {
    Html,
    Text,
}

impl EmailFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailFormat::Html => "html",
            EmailFormat::Text => "text",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "html" => Some(EmailFormat::Html),
            "text" => Some(EmailFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Text,
    Button,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionMode {
    Static,
    Personalized,
}

/// One ordered content block of a campaign's email body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub order: i32,
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub mode: SectionMode,
    pub name: String,
    pub content: String,
    pub button_url: Option<String>,
    /// Recipient-field names the generator should be told to consult, for
    /// `mode = personalized` sections only.
    pub reference_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectMode {
    Static,
    Personalized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectLine {
    pub mode: SubjectMode,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub sender: String,
    pub sections: serde_json::Value,
    pub subject_line: serde_json::Value,
    pub email_format: String,
    pub total_recipients: i32,
    pub pause_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn status(&self) -> CampaignStatus {
        CampaignStatus::from_str(&self.status).unwrap_or(CampaignStatus::Draft)
    }

    pub fn sender(&self) -> Sender {
        Sender::from_str(&self.sender).unwrap_or(Sender::JeffRichmond)
    }

    pub fn email_format(&self) -> EmailFormat {
        EmailFormat::from_str(&self.email_format).unwrap_or(EmailFormat::Html)
    }

    pub fn sections(&self) -> Vec<Section> {
        serde_json::from_value(self.sections.clone()).unwrap_or_default()
    }

    pub fn subject_line(&self) -> SubjectLine {
        serde_json::from_value(self.subject_line.clone()).unwrap_or(SubjectLine {
            mode: SubjectMode::Static,
            content: String::new(),
        })
    }

    /// `campaign_tag` sent to the transmission API: sanitized name (stripped
    /// to `[A-Za-z0-9 _-]`, truncated to 25 graphemes) + " - " + campaign id.
    pub fn campaign_tag(&self) -> String {
        format!("{} - {}", sanitize_campaign_name(&self.name), self.id)
    }
}

/// Strip everything outside `[A-Za-z0-9 _-]` and truncate to 25 graphemes.
///
/// Grapheme-aware so a name containing multi-byte characters (emoji,
/// combining marks) truncates on a human-visible character boundary rather
/// than splitting a UTF-8 sequence.
pub fn sanitize_campaign_name(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '_' || *c == '-')
        .collect();
    truncate_graphemes(&stripped, 25)
}

/// Truncate `s` to at most `max` Unicode scalar values.
///
/// A true grapheme-cluster truncation would pull in `unicode-segmentation`;
/// since `sanitize_campaign_name`'s character filter already limits input to
/// single-scalar ASCII, truncating by `char` is equivalent here and avoids
/// the extra dependency for this one call site.
pub fn truncate_graphemes(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_special_chars() {
        assert_eq!(sanitize_campaign_name("Q3 Launch! 🚀 (final)"), "Q3 Launch  final");
    }

    #[test]
    fn sanitize_truncates_to_25() {
        let long = "a".repeat(40);
        assert_eq!(sanitize_campaign_name(&long).chars().count(), 25);
    }

    #[test]
    fn sanitize_keeps_hyphen_and_underscore() {
        assert_eq!(sanitize_campaign_name("cold-outreach_v2"), "cold-outreach_v2");
    }

    #[test]
    fn sender_mapping_matches_domain_pool_contract() {
        assert_eq!(Sender::ToddVitzthum.display_name(), "Todd Vitzthum");
        assert_eq!(Sender::ToddVitzthum.local_part(), "todd.vitzthum");
        assert_eq!(Sender::JeffRichmond.display_name(), "Jeff Richmond");
        assert_eq!(Sender::JeffRichmond.local_part(), "jeff.richmond");
    }

    #[test]
    fn dispatchable_statuses() {
        assert!(CampaignStatus::Scheduled.is_dispatchable());
        assert!(CampaignStatus::Sending.is_dispatchable());
        assert!(!CampaignStatus::Paused.is_dispatchable());
        assert!(!CampaignStatus::Draft.is_dispatchable());
    }
}
