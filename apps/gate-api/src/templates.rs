//! Message templating.
//!
//! Templates carry `{name}`, `{username}`, `{channel}` and `{timeout}`
//! placeholders. Rendering is a single left-to-right pass: substituted values
//! are written straight to the output and never scanned again, so a display
//! name containing `{channel}` stays literal.

use chrono::{DateTime, Utc};

pub const DEFAULT_WELCOME_TEMPLATE: &str = "Welcome {username} to {channel}! 🎉";

pub const DEFAULT_APPROVAL_TEMPLATE: &str = "Hi {name}! You asked to join {channel}.\n\n\
     Tap the button below to confirm your request. You have {timeout} hours to respond.";

pub const DEFAULT_APPROVAL_TIMEOUT_HOURS: i32 = 24;

/// Shown in place of `{channel}` when the title is unknown.
const FALLBACK_CHANNEL_TITLE: &str = "the channel";

/// Process-wide fallbacks for channels without their own configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultTemplates {
    pub welcome: String,
    pub approval: String,
    pub timeout_hours: i32,
}

impl Default for DefaultTemplates {
    fn default() -> Self {
        Self {
            welcome: DEFAULT_WELCOME_TEMPLATE.to_string(),
            approval: DEFAULT_APPROVAL_TEMPLATE.to_string(),
            timeout_hours: DEFAULT_APPROVAL_TIMEOUT_HOURS,
        }
    }
}

/// Values available to a template.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderContext<'a> {
    /// The user's display name.
    pub name: Option<&'a str>,
    /// Platform handle without the leading `@`.
    pub handle: Option<&'a str>,
    pub channel_title: Option<&'a str>,
    pub timeout_hours: Option<i32>,
}

enum Placeholder {
    Name,
    Username,
    Channel,
    Timeout,
}

impl Placeholder {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "name" => Some(Self::Name),
            "username" => Some(Self::Username),
            "channel" => Some(Self::Channel),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }
}

/// Render `template` against `ctx`.
///
/// Unrecognized placeholders, and `{timeout}` when no timeout is known, are
/// copied through unchanged.
pub fn render(template: &str, ctx: &RenderContext<'_>) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after
            .find(|c: char| c == '{' || c == '}')
            .filter(|&i| after.as_bytes()[i] == b'}')
        else {
            // No closing brace before the next opening one: the brace is literal.
            out.push('{');
            rest = after;
            continue;
        };

        let token = &after[..close];
        match Placeholder::parse(token) {
            Some(Placeholder::Name) => out.push_str(ctx.name.unwrap_or("")),
            Some(Placeholder::Username) => match ctx.handle.filter(|h| !h.is_empty()) {
                Some(handle) => {
                    out.push('@');
                    out.push_str(handle);
                }
                None => out.push_str(ctx.name.unwrap_or("")),
            },
            Some(Placeholder::Channel) => {
                out.push_str(ctx.channel_title.unwrap_or(FALLBACK_CHANNEL_TITLE))
            }
            Some(Placeholder::Timeout) => match ctx.timeout_hours {
                Some(hours) => out.push_str(&hours.to_string()),
                None => out.push_str("{timeout}"),
            },
            None => {
                out.push('{');
                out.push_str(token);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Human-readable time left until `expires_at`, e.g. `3 hours and 45 minutes`.
///
/// Returns `None` once the expiry has passed. Days hide the minutes segment;
/// hours appear whenever they are non-zero.
pub fn format_time_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<String> {
    if expires_at <= now {
        return None;
    }

    let total = (expires_at - now).num_seconds();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;

    let mut text = String::new();
    if days > 0 {
        text.push_str(&format!("{days} days"));
    }
    if hours > 0 {
        if !text.is_empty() {
            text.push_str(", ");
        }
        text.push_str(&format!("{hours} hours"));
    }
    if days == 0 && minutes > 0 {
        if !text.is_empty() {
            text.push_str(" and ");
        }
        text.push_str(&format!("{minutes} minutes"));
    }
    if text.is_empty() {
        text.push_str("less than a minute");
    }

    Some(text)
}

/// Render the approval prompt, appending the time-remaining suffix when the
/// pending request has a known, future expiry.
pub fn render_approval_prompt(
    template: &str,
    ctx: &RenderContext<'_>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    let mut text = render(template, ctx);
    if let Some(remaining) = expires_at.and_then(|exp| format_time_remaining(exp, now)) {
        text.push_str("\n\n⏰ Your request expires in ");
        text.push_str(&remaining);
        text.push('.');
    }
    text
}

pub fn render_expired_message(channel_title: &str) -> String {
    format!(
        "⏰ Your join request for {channel_title} has expired.\n\n\
         You can request to join the channel again if you're still interested."
    )
}

pub fn render_declined_message(channel_title: &str) -> String {
    format!("❌ Your join request for {channel_title} was declined.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ctx<'a>() -> RenderContext<'a> {
        RenderContext {
            name: Some("Ada"),
            handle: Some("ada_l"),
            channel_title: Some("Rustaceans"),
            timeout_hours: Some(24),
        }
    }

    #[test]
    fn substitutes_all_known_placeholders() {
        let out = render("{name} ({username}) joined {channel}, {timeout}h", &ctx());
        assert_eq!(out, "Ada (@ada_l) joined Rustaceans, 24h");
    }

    #[test]
    fn repeated_placeholders_are_all_replaced() {
        assert_eq!(render("{name}{name}", &ctx()), "AdaAda");
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        assert_eq!(render("Hi {nick} {}", &ctx()), "Hi {nick} {}");
    }

    #[test]
    fn unbalanced_braces_stay_verbatim() {
        assert_eq!(render("{ {name} }", &ctx()), "{ Ada }");
        assert_eq!(render("trailing {name", &ctx()), "trailing {name");
        assert_eq!(render("}{{name}", &ctx()), "}{Ada");
    }

    #[test]
    fn username_falls_back_to_display_name() {
        let c = RenderContext {
            handle: None,
            ..ctx()
        };
        assert_eq!(render("{username}", &c), "Ada");
    }

    #[test]
    fn missing_name_renders_empty() {
        let c = RenderContext {
            name: None,
            handle: None,
            ..ctx()
        };
        assert_eq!(render("[{name}|{username}]", &c), "[|]");
    }

    #[test]
    fn missing_channel_title_uses_fallback() {
        let c = RenderContext {
            channel_title: None,
            ..ctx()
        };
        assert_eq!(render("{channel}", &c), "the channel");
    }

    #[test]
    fn missing_timeout_leaves_placeholder() {
        let c = RenderContext {
            timeout_hours: None,
            ..ctx()
        };
        assert_eq!(render("{timeout} hours", &c), "{timeout} hours");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let c = RenderContext {
            name: Some("{channel}"),
            ..ctx()
        };
        assert_eq!(render("{name} in {channel}", &c), "{channel} in Rustaceans");
    }

    #[test]
    fn rendering_is_deterministic() {
        let t = "{username} -> {channel} {other}";
        assert_eq!(render(t, &ctx()), render(t, &ctx()));
    }

    #[test]
    fn time_remaining_without_days() {
        let now = Utc::now();
        let exp = now + Duration::hours(3) + Duration::minutes(45);
        assert_eq!(
            format_time_remaining(exp, now).as_deref(),
            Some("3 hours and 45 minutes")
        );
    }

    #[test]
    fn time_remaining_with_days_hides_minutes() {
        let now = Utc::now();
        let exp = now + Duration::days(1) + Duration::minutes(30);
        assert_eq!(format_time_remaining(exp, now).as_deref(), Some("1 days"));

        let exp = now + Duration::days(2) + Duration::hours(5) + Duration::minutes(10);
        assert_eq!(
            format_time_remaining(exp, now).as_deref(),
            Some("2 days, 5 hours")
        );
    }

    #[test]
    fn time_remaining_minutes_only() {
        let now = Utc::now();
        let exp = now + Duration::minutes(12) + Duration::seconds(5);
        assert_eq!(format_time_remaining(exp, now).as_deref(), Some("12 minutes"));
    }

    #[test]
    fn time_remaining_none_once_expired() {
        let now = Utc::now();
        assert_eq!(format_time_remaining(now, now), None);
        assert_eq!(format_time_remaining(now - Duration::hours(1), now), None);
    }

    #[test]
    fn approval_prompt_appends_suffix_only_when_pending() {
        let now = Utc::now();
        let exp = now + Duration::hours(2);

        let with = render_approval_prompt("Join {channel}", &ctx(), Some(exp), now);
        assert_eq!(
            with,
            "Join Rustaceans\n\n⏰ Your request expires in 2 hours."
        );

        let expired = render_approval_prompt("Join {channel}", &ctx(), Some(now), now);
        assert_eq!(expired, "Join Rustaceans");

        let unknown = render_approval_prompt("Join {channel}", &ctx(), None, now);
        assert_eq!(unknown, "Join Rustaceans");
    }

    #[test]
    fn expired_message_names_channel() {
        assert!(render_expired_message("Rustaceans").contains("join request for Rustaceans"));
    }
}
