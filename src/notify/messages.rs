//! Notification and comment text

/// Chat message for a cherry-pick PR that was opened
pub fn cherry_pick_succeeded(
    head: &str,
    target: &str,
    new_pr_url: &str,
    origin_url: &str,
) -> String {
    format!(
        "✅ Create cherry pick pull request from '{head}' to '{target}'\n{new_pr_url}\n\
         From: {origin_url}"
    )
}

/// Chat message for a cherry pick that could not be opened
///
/// The diagnostic line is omitted when empty.
pub fn cherry_pick_failed(
    head: &str,
    target: &str,
    origin_url: &str,
    diagnostic: &str,
) -> String {
    let mut message = format!(
        "❌ Create cherry pick pull request from '{head}' to '{target}'\norigin PR\n{origin_url}"
    );
    if !diagnostic.is_empty() {
        message.push('\n');
        message.push_str(diagnostic);
    }
    message
}

/// Chat message for a successful auto merge
pub fn merge_succeeded(number: i64, title: &str, url: &str) -> String {
    format!("✅ Auto merge PR #{number} '{title}' succeeded\n{url}")
}

/// Chat message for a failed auto merge
pub fn merge_failed(number: i64, title: &str, url: &str) -> String {
    format!("❌ Auto merge PR #{number} '{title}' failed\n{url}")
}

/// Source-PR comment after a cherry-pick attempt
pub fn cherry_pick_comment(target: &str, new_pr: Option<i64>) -> String {
    match new_pr {
        Some(number) => format!("cherry pick to {target} in PR #{number}"),
        None => format!("cherry pick to {target} failed"),
    }
}

/// PR comment when CI fails during an auto merge
pub fn merge_failed_comment(author: &str) -> String {
    format!("@{author} merge failed.")
}

/// PR comment when a PR joins the merge queue
pub fn queued_comment(queue_position: usize) -> String {
    if queue_position == 0 {
        "Your auto merge job has been accepted, it will start on the next poll.".to_string()
    } else {
        format!(
            "Your auto merge job has been accepted, \
             {queue_position} job(s) ahead of it in the queue."
        )
    }
}
