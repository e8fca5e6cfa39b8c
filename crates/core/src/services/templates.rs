//! Notification email templates.

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use meetpoll_db::entities::notification::NotificationType;
use url::Url;

/// Values interpolated into every template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    pub poll_title: String,
    pub recipient_name: String,
    pub poll_url: String,
    /// Already formatted for display.
    pub final_date: Option<String>,
}

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Public link to a poll: `{frontend_url}/poll/{access_code}`.
#[must_use]
pub fn poll_url(frontend_url: &str, access_code: &str) -> String {
    if let Ok(mut url) = Url::parse(frontend_url) {
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("poll").push(access_code);
        }
        return url.to_string();
    }
    format!("{}/poll/{access_code}", frontend_url.trim_end_matches('/'))
}

/// Display form of an event start in the given zone.
#[must_use]
pub fn format_date(start: DateTime<FixedOffset>, tz: Tz) -> String {
    start
        .with_timezone(&tz)
        .format("%A %d %B %Y at %H:%M (%Z)")
        .to_string()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(heading: &str, paragraphs: &[String], ctx: &TemplateContext) -> String {
    let mut html = String::from("<html><body style=\"font-family: sans-serif;\">");
    html.push_str(&format!("<h2>{heading}</h2>"));
    html.push_str(&format!("<p>Hello {},</p>", escape(&ctx.recipient_name)));
    for paragraph in paragraphs {
        html.push_str(&format!("<p>{paragraph}</p>"));
    }
    html.push_str(&format!(
        "<p><a href=\"{url}\">{url}</a></p>",
        url = escape(&ctx.poll_url)
    ));
    html.push_str("</body></html>");
    html
}

/// Render the email for a notification kind.
///
/// `None` stands for a kind this build does not know; it renders an empty
/// body under a generic subject.
#[must_use]
pub fn render(kind: Option<NotificationType>, ctx: &TemplateContext) -> RenderedEmail {
    let title = escape(&ctx.poll_title);
    let date_line = ctx
        .final_date
        .as_deref()
        .map(|date| format!("The event takes place on <strong>{}</strong>.", escape(date)));

    match kind {
        Some(NotificationType::EventReminder) => {
            let mut paragraphs = vec![format!("This is a reminder for <strong>{title}</strong>.")];
            paragraphs.extend(date_line);
            RenderedEmail {
                subject: format!("Reminder: {}", ctx.poll_title),
                html: layout("Event reminder", &paragraphs, ctx),
            }
        }
        Some(NotificationType::NewVote) => RenderedEmail {
            subject: format!("New vote on {}", ctx.poll_title),
            html: layout(
                "New vote",
                &[format!("Someone voted on your poll <strong>{title}</strong>.")],
                ctx,
            ),
        },
        Some(NotificationType::NewComment) => RenderedEmail {
            subject: format!("New comment on {}", ctx.poll_title),
            html: layout(
                "New comment",
                &[format!("Someone commented on your poll <strong>{title}</strong>.")],
                ctx,
            ),
        },
        Some(NotificationType::FinalDate) => {
            let mut paragraphs =
                vec![format!("A date has been chosen for <strong>{title}</strong>.")];
            paragraphs.extend(date_line);
            RenderedEmail {
                subject: format!("Date set for {}", ctx.poll_title),
                html: layout("Date confirmed", &paragraphs, ctx),
            }
        }
        None => RenderedEmail {
            subject: ctx.poll_title.clone(),
            html: String::new(),
        },
    }
}
