//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::phone::PhoneNumber;
use crate::{Error, Result};

/// Longest display name accepted, in characters
pub const NAME_MAX_CHARS: usize = 30;
/// Longest guestbook message accepted, in characters
pub const MESSAGE_MAX_CHARS: usize = 500;
/// Largest single contribution accepted, in KRW
pub const AMOUNT_MAX_KRW: i64 = 100_000_000;

/// Invitation event identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One of the two independently duplicate-checked entry spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Guestbook,
    Contribution,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Guestbook => "guestbook",
            Domain::Contribution => "contribution",
        }
    }

    /// Table holding this domain's rows
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Domain::Guestbook => "guestbook_entries",
            Domain::Contribution => "contributions",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "guestbook" => Ok(Domain::Guestbook),
            "contribution" => Ok(Domain::Contribution),
            other => Err(Error::InvalidInput(format!("Unknown domain: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Wedding,
    Funeral,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Wedding => "wedding",
            EventKind::Funeral => "funeral",
        }
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wedding" => Ok(EventKind::Wedding),
            "funeral" => Ok(EventKind::Funeral),
            other => Err(Error::InvalidInput(format!("Unknown event kind: {}", other))),
        }
    }
}

/// Read-only event reference data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub kind: EventKind,
    pub title: String,
    /// Host of side A (groom, or the first mourning family)
    pub side_a_host: String,
    /// Host of side B (bride, or the second mourning family)
    pub side_b_host: String,
}

/// Which hosting party a contribution is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::A => "a",
            Side::B => "b",
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "a" => Ok(Side::A),
            "b" => Ok(Side::B),
            other => Err(Error::InvalidInput(format!("Unknown side: {}", other))),
        }
    }
}

/// Contributor's relationship to the hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    Family,
    Relative,
    Friend,
    Colleague,
    Acquaintance,
    Other,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Family => "family",
            Relationship::Relative => "relative",
            Relationship::Friend => "friend",
            Relationship::Colleague => "colleague",
            Relationship::Acquaintance => "acquaintance",
            Relationship::Other => "other",
        }
    }
}

impl FromStr for Relationship {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "family" => Ok(Relationship::Family),
            "relative" => Ok(Relationship::Relative),
            "friend" => Ok(Relationship::Friend),
            "colleague" => Ok(Relationship::Colleague),
            "acquaintance" => Ok(Relationship::Acquaintance),
            "other" => Ok(Relationship::Other),
            other => Err(Error::InvalidInput(format!("Unknown relationship: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestbookEntry {
    pub id: Uuid,
    pub event_id: EventId,
    pub phone: PhoneNumber,
    pub name: String,
    pub message: String,
    pub is_public: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionEntry {
    pub id: Uuid,
    pub event_id: EventId,
    pub phone: PhoneNumber,
    pub name: String,
    pub amount: i64,
    pub relationship: Relationship,
    pub side: Side,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// A stored entry from either domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum Entry {
    Guestbook(GuestbookEntry),
    Contribution(ContributionEntry),
}

impl Entry {
    pub fn domain(&self) -> Domain {
        match self {
            Entry::Guestbook(_) => Domain::Guestbook,
            Entry::Contribution(_) => Domain::Contribution,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Entry::Guestbook(e) => e.id,
            Entry::Contribution(e) => e.id,
        }
    }

    pub fn phone(&self) -> &PhoneNumber {
        match self {
            Entry::Guestbook(e) => &e.phone,
            Entry::Contribution(e) => &e.phone,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entry::Guestbook(e) => &e.name,
            Entry::Contribution(e) => &e.name,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Entry::Guestbook(e) => e.created_at,
            Entry::Contribution(e) => e.created_at,
        }
    }

    /// Editable fields, used to prefill the composer in edit mode
    pub fn content(&self) -> EntryContent {
        match self {
            Entry::Guestbook(e) => EntryContent::Guestbook(GuestbookContent {
                name: e.name.clone(),
                message: e.message.clone(),
                is_public: e.is_public,
            }),
            Entry::Contribution(e) => EntryContent::Contribution(ContributionContent {
                name: e.name.clone(),
                amount: e.amount,
                relationship: e.relationship,
                side: e.side,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestbookContent {
    pub name: String,
    pub message: String,
    #[serde(default = "default_public")]
    pub is_public: bool,
}

fn default_public() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionContent {
    pub name: String,
    pub amount: i64,
    pub relationship: Relationship,
    pub side: Side,
}

/// Guest-composed fields for either domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum EntryContent {
    Guestbook(GuestbookContent),
    Contribution(ContributionContent),
}

impl EntryContent {
    pub fn domain(&self) -> Domain {
        match self {
            EntryContent::Guestbook(_) => Domain::Guestbook,
            EntryContent::Contribution(_) => Domain::Contribution,
        }
    }

    /// Trim text fields and check required/limit rules
    pub fn normalized(self) -> Result<Self> {
        match self {
            EntryContent::Guestbook(c) => {
                let name = required_text(&c.name, "name", NAME_MAX_CHARS)?;
                let message = required_text(&c.message, "message", MESSAGE_MAX_CHARS)?;
                Ok(EntryContent::Guestbook(GuestbookContent {
                    name,
                    message,
                    is_public: c.is_public,
                }))
            }
            EntryContent::Contribution(c) => {
                let name = required_text(&c.name, "name", NAME_MAX_CHARS)?;
                if c.amount <= 0 {
                    return Err(Error::InvalidInput("Please enter an amount.".to_string()));
                }
                if c.amount > AMOUNT_MAX_KRW {
                    return Err(Error::InvalidInput(format!(
                        "The amount may not exceed {} KRW.",
                        AMOUNT_MAX_KRW
                    )));
                }
                Ok(EntryContent::Contribution(ContributionContent { name, ..c }))
            }
        }
    }
}

fn required_text(value: &str, field: &str, max_chars: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("Please enter your {}.", field)));
    }
    if trimmed.chars().count() > max_chars {
        return Err(Error::InvalidInput(format!(
            "Your {} may be at most {} characters.",
            field, max_chars
        )));
    }
    Ok(trimmed.to_string())
}

/// Guestbook entry as shown on the public invitation page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicGuestbookEntry {
    pub id: Uuid,
    pub name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guestbook_content_trimmed() {
        let content = EntryContent::Guestbook(GuestbookContent {
            name: "  Kim ".into(),
            message: " Congrats\n".into(),
            is_public: true,
        })
        .normalized()
        .unwrap();

        match content {
            EntryContent::Guestbook(c) => {
                assert_eq!(c.name, "Kim");
                assert_eq!(c.message, "Congrats");
            }
            _ => panic!("domain changed"),
        }
    }

    #[test]
    fn test_empty_fields_rejected() {
        let blank_message = EntryContent::Guestbook(GuestbookContent {
            name: "Kim".into(),
            message: "   ".into(),
            is_public: true,
        });
        assert!(matches!(blank_message.normalized(), Err(Error::InvalidInput(_))));

        let zero_amount = EntryContent::Contribution(ContributionContent {
            name: "Kim".into(),
            amount: 0,
            relationship: Relationship::Friend,
            side: Side::A,
        });
        assert!(matches!(zero_amount.normalized(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        // 30 Hangul syllables are 90 bytes but within the limit
        let name: String = std::iter::repeat('김').take(NAME_MAX_CHARS).collect();
        let ok = EntryContent::Guestbook(GuestbookContent {
            name: name.clone(),
            message: "축하해요".into(),
            is_public: false,
        });
        assert!(ok.normalized().is_ok());

        let too_long = EntryContent::Guestbook(GuestbookContent {
            name: format!("{}김", name),
            message: "축하해요".into(),
            is_public: false,
        });
        assert!(too_long.normalized().is_err());
    }

    #[test]
    fn test_content_json_is_tagged_by_domain() {
        let json = r#"{"domain":"contribution","name":"Lee","amount":50000,"relationship":"colleague","side":"b"}"#;
        let content: EntryContent = serde_json::from_str(json).unwrap();
        assert_eq!(content.domain(), Domain::Contribution);

        let json = r#"{"domain":"guestbook","name":"Lee","message":"Hi"}"#;
        match serde_json::from_str::<EntryContent>(json).unwrap() {
            EntryContent::Guestbook(c) => assert!(c.is_public),
            _ => panic!("expected guestbook"),
        }
    }

    #[test]
    fn test_domain_parse() {
        assert_eq!("guestbook".parse::<Domain>().unwrap(), Domain::Guestbook);
        assert_eq!("contribution".parse::<Domain>().unwrap(), Domain::Contribution);
        assert!("photos".parse::<Domain>().is_err());
    }
}
