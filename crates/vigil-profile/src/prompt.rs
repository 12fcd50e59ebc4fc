//! Prompt construction and response parsing helpers.

use vigil_llm::ChatMessage;
use vigil_store::Tweet;

/// Longest topic label kept, in characters.
const MAX_LABEL_CHARS: usize = 60;

pub fn label_messages(samples: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You name the topic shared by a group of social media posts. \
             Reply with a short label of two to five words and nothing else.",
        ),
        ChatMessage::user(format!("Posts:\n{}", bullet_list(samples))),
    ]
}

pub fn sentiment_messages(samples: &[String]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You estimate the sentiment of a group of social media posts. \
             Reply with a JSON object {\"positive\": p, \"neutral\": n, \"negative\": g} \
             where the three fractions sum to 1.",
        ),
        ChatMessage::user(format!("Posts:\n{}", bullet_list(samples))),
    ]
}

pub fn personality_messages(username: &str, tweets: &[Tweet]) -> Vec<ChatMessage> {
    let lines: Vec<String> = tweets.iter().map(tweet_line).collect();
    vec![
        ChatMessage::system(
            "You assess the personality expressed in a person's social media posts. \
             Reply with only a JSON object of the form \
             {\"scores\": {\"openness\": 0-100, \"conscientiousness\": 0-100, \
             \"extraversion\": 0-100, \"agreeableness\": 0-100, \"neuroticism\": 0-100, \
             \"optimism\": 0-100, \"assertiveness\": 0-100}, \
             \"values\": [up to five short value tags], \"summary\": \"two sentences\"}.",
        ),
        ChatMessage::user(format!(
            "Recent posts by @{}:\n{}",
            username,
            bullet_list(&lines)
        )),
    ]
}

pub fn explanation_messages(username: &str, title: &str, details: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "You explain detected changes in a monitored social media account. \
             Reply with one or two plain sentences for a human analyst.",
        ),
        ChatMessage::user(format!(
            "Account: @{}\nChange: {}\nDetails: {}",
            username, title, details
        )),
    ]
}

/// One prompt line per tweet. Quote tweets carry the quoted text.
fn tweet_line(tweet: &Tweet) -> String {
    match (&tweet.quoted_text, tweet.is_quote) {
        (Some(quoted), true) => format!("{} [quoting: \"{}\"]", tweet.text, quoted),
        _ => tweet.text.clone(),
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item.replace('\n', " ")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Normalize a model-written label: first line, quotes and trailing
/// punctuation stripped, length capped. `None` when nothing is left.
pub fn clean_label(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .trim_start_matches("Label:")
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim_end_matches(['.', '!'])
        .trim();
    if line.is_empty() {
        return None;
    }
    Some(line.chars().take(MAX_LABEL_CHARS).collect())
}

/// Extract the outermost JSON object from a response that may be wrapped in
/// a code fence or prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}
