use wadriver_core::ChatSummary;

use super::{ensure_success, load_engine, print_json};

pub async fn run(
    keywords: Vec<String>,
    all: bool,
    check_archived: bool,
    limit: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let engine = load_engine()?;
    let config = engine.config();
    let keywords = if all {
        Vec::new()
    } else if keywords.is_empty() {
        config.engine.filter_keywords.clone()
    } else {
        keywords
    };
    let limit = limit.unwrap_or(config.scan.default_limit);

    let result = engine
        .check_messages(Some(&keywords), check_archived, limit)
        .await;
    if json {
        print_json(&result)?;
        return ensure_success(&result);
    }
    ensure_success(&result)?;

    if result.payload.messages.is_empty() {
        println!("No matching chats.");
        return Ok(());
    }
    for chat in &result.payload.messages {
        println!("{}", format_chat(chat));
    }
    println!();
    println!("{} chat(s)", result.payload.count);
    Ok(())
}

fn format_chat(chat: &ChatSummary) -> String {
    let mut line = format!("[{}] {}", chat.source.as_str(), chat.title);
    if chat.unread_count > 0 {
        line.push_str(&format!(" ({} unread)", chat.unread_count));
    }
    if !chat.last_message_preview.is_empty() {
        line.push_str(&format!(" - {}", chat.last_message_preview));
    }
    if let Some(keyword) = &chat.matched_keyword {
        line.push_str(&format!("  [{}]", keyword));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use wadriver_core::ChatSource;

    #[test]
    fn test_format_chat() {
        let chat = ChatSummary {
            title: "PIAIC".into(),
            last_message_preview: "Quiz on Friday".into(),
            unread_count: 2,
            source: ChatSource::Archived,
            matched_keyword: Some("Quiz".into()),
        };
        assert_eq!(
            format_chat(&chat),
            "[archived] PIAIC (2 unread) - Quiz on Friday  [Quiz]"
        );

        let quiet = ChatSummary {
            unread_count: 0,
            last_message_preview: String::new(),
            matched_keyword: None,
            source: ChatSource::Main,
            ..chat
        };
        assert_eq!(format_chat(&quiet), "[main] PIAIC");
    }
}
