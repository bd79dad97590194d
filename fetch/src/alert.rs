//! Turns raw mail and extractor output into alert records.

use crate::extractor::Extraction;
use crate::mail::RawMail;
use shared::types::{Alert, AlertLite};
use uuid::Uuid;

const INSTANCE_ID_HEADER: &str = "X-InstanceId";

/// Builds a new alert for a message whose [`extractor_text`] produced
/// `extraction`.
pub fn new_alert(mail: &RawMail, extraction: Extraction, mailbox_address: &str) -> Alert {
    let sender = find_sender(&mail.from_name, &mail.from_address);

    // default to HTML, but grab text if we must
    let body = if mail.html.trim().is_empty() {
        &mail.text
    } else {
        &mail.html
    };

    Alert {
        lite: AlertLite {
            id: Uuid::new_v4(),
            instance_id: mail.header(INSTANCE_ID_HEADER).unwrap_or_default().to_string(),
            article_url: find_article_url(body).unwrap_or_default(),
            sender,
            timestamp: mail.date,
            tags: extraction.tags,
            subject: mail.subject.trim().to_string(),
            top_sentence: extraction.top_sentence,
        },
        raw_body: body.clone(),
        body: scrub_body(body, mailbox_address),
        source_text: extractor_text(mail).to_string(),
        sentences: extraction.sentences,
    }
}

/// Re-derives the extracted fields of a stored alert, keeping its identity.
pub fn reparse_alert(alert: &Alert, extraction: Extraction) -> Alert {
    let mut reparsed = alert.clone();
    reparsed.lite.tags = extraction.tags;
    reparsed.lite.top_sentence = extraction.top_sentence;
    reparsed.sentences = extraction.sentences;
    reparsed
}

/// The text handed to the extractor: plain text when available, else HTML.
pub fn extractor_text(mail: &RawMail) -> &str {
    if mail.text.trim().is_empty() {
        &mail.html
    } else {
        &mail.text
    }
}

/// Derives the outlet name from the From header. By default this is the
/// first word of the display name.
pub fn find_sender(from_name: &str, from_address: &str) -> String {
    let name = from_name.trim();
    let Some(first) = name.split_whitespace().next() else {
        return from_address.trim().to_string();
    };

    match first.to_lowercase().as_str() {
        "la" => "Los Angeles Times".to_string(),
        "the" | "los" => name.to_string(),
        _ => first.to_string(),
    }
}

/// Removes the mailbox's own address and user name from a body.
pub fn scrub_body(body: &str, address: &str) -> String {
    let address = address.trim();
    if address.is_empty() {
        return body.to_string();
    }

    let scrubbed = body.replace(address, "");
    match address.split('@').next() {
        Some(user) if !user.is_empty() => scrubbed.replace(user, ""),
        _ => scrubbed,
    }
}

/// Finds the first article link in a body, dropping ad links and query
/// parameters.
pub fn find_article_url(body: &str) -> Option<String> {
    body.split("href=")
        .skip(1)
        .filter_map(|rest| {
            let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
            let value = rest[1..].split(quote).next()?;
            Some(value.trim())
        })
        .find(|url| url.starts_with("http") && !url.contains("doubleclick"))
        .map(|url| url.split('?').next().unwrap_or(url).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::types::Sentence;
    use std::collections::HashMap;

    #[test]
    fn test_find_sender() {
        assert_eq!(find_sender("CNN Breaking News", "cnn@example.com"), "CNN");
        assert_eq!(find_sender("LA Times", "la@example.com"), "Los Angeles Times");
        assert_eq!(
            find_sender("The Washington Post", "wp@example.com"),
            "The Washington Post"
        );
        assert_eq!(find_sender("  ", "npr@example.com"), "npr@example.com");
    }

    #[test]
    fn test_scrub_body() {
        assert_eq!(
            scrub_body("sent to hound@example.com, hi hound", "hound@example.com"),
            "sent to , hi "
        );
        assert_eq!(scrub_body("untouched", ""), "untouched");
    }

    #[test]
    fn test_find_article_url() {
        let body = r#"<a href="http://ad.doubleclick.net/x">ad</a>
            <a class="x" href='https://news.example.com/story?utm=1'>story</a>"#;
        assert_eq!(
            find_article_url(body),
            Some("https://news.example.com/story".to_string())
        );
        assert_eq!(find_article_url("no links here"), None);
    }

    #[test]
    fn test_extractor_input_survives_html() {
        let mail = RawMail {
            from_name: "CNN".into(),
            from_address: "cnn@example.com".into(),
            date: Utc.with_ymd_and_hms(2016, 6, 1, 12, 0, 0).unwrap(),
            html: "<p>Orlando <b>shooting</b></p>".into(),
            text: "Orlando shooting".into(),
            ..Default::default()
        };

        let alert = new_alert(&mail, Extraction::default(), "hound@example.com");
        assert_eq!(alert.raw_body, mail.html);
        // a reparse sees the same text as the first extraction
        assert_eq!(alert.extractor_input(), "Orlando shooting");
    }

    #[test]
    fn test_new_alert() {
        let mail = RawMail {
            from_name: "NYTimes.com News Alert".into(),
            from_address: "nytdirect@example.com".into(),
            subject: " Breaking News ".into(),
            date: Utc.with_ymd_and_hms(2016, 6, 1, 12, 0, 0).unwrap(),
            html: String::new(),
            text: "Something happened. Sent to hound@example.com".into(),
            headers: HashMap::from([("X-InstanceId".into(), "42".into())]),
        };
        let extraction = Extraction {
            tags: vec!["something".into()],
            sentences: vec![Sentence::new("Something happened.", ["something"])],
            top_sentence: "Something happened.".into(),
        };

        let alert = new_alert(&mail, extraction, "hound@example.com");
        assert_eq!(alert.sender(), "NYTimes.com");
        assert_eq!(alert.lite.subject, "Breaking News");
        assert_eq!(alert.lite.instance_id, "42");
        assert_eq!(alert.raw_body, mail.text);
        assert_eq!(alert.body, "Something happened. Sent to ");
        assert_eq!(alert.tags(), ["something"]);
        assert_eq!(extractor_text(&mail), mail.text);
        assert_eq!(alert.extractor_input(), mail.text);

        let reparsed = reparse_alert(
            &alert,
            Extraction {
                tags: vec!["happened".into()],
                ..Default::default()
            },
        );
        assert_eq!(reparsed.id(), alert.id());
        assert_eq!(reparsed.tags(), ["happened"]);
        assert!(reparsed.sentences.is_empty());
    }
}
