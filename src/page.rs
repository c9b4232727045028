//! HTML rendering of the leaderboard page

use crate::leaderboard::{Leaderboard, ReviewerActivity};
use std::io::{self, Write};

pub fn write<W: Write>(writer: &mut W, board: &Leaderboard) -> io::Result<()> {
    let project_options = options(&board.project_choices);
    let period_options = options(&board.time_window_choices);
    let rows = table_rows(&board.reviewers);

    write!(writer, r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Gerrit Review Leaderboard</title>
    <style>
        :root {{
            --bg: #f5f5f7;
            --card: #ffffff;
            --border: #d2d2d7;
            --text: #1d1d1f;
            --dim: #86868b;
            --accent: #007aff;
            --shadow: 0 2px 8px rgba(0,0,0,0.08), 0 1px 2px rgba(0,0,0,0.04);
        }}
        * {{ box-sizing: border-box; margin: 0; padding: 0; }}
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Helvetica Neue', Helvetica, Arial, sans-serif;
            background: var(--bg);
            color: var(--text);
            line-height: 1.5;
        }}
        .container {{ max-width: 900px; margin: 0 auto; padding: 3rem 2rem; }}
        .header {{
            margin-bottom: 2rem;
            padding-bottom: 1.5rem;
            border-bottom: 1px solid var(--border);
        }}
        .logo {{ font-size: 2rem; font-weight: 700; letter-spacing: -0.02em; }}
        .subtitle {{ color: var(--dim); font-size: 0.9375rem; }}
        form {{ display: flex; gap: 1rem; margin-bottom: 1.5rem; }}
        select {{
            font-size: 1rem;
            padding: 0.4rem 0.75rem;
            border: 1px solid var(--border);
            border-radius: 8px;
            background: var(--card);
        }}
        table {{
            width: 100%;
            border-collapse: collapse;
            background: var(--card);
            border-radius: 16px;
            box-shadow: var(--shadow);
            overflow: hidden;
        }}
        th, td {{ padding: 0.75rem 1rem; text-align: left; }}
        th {{ color: var(--dim); font-weight: 600; border-bottom: 1px solid var(--border); }}
        td.num, th.num {{ text-align: right; font-variant-numeric: tabular-nums; }}
        tr + tr td {{ border-top: 1px solid var(--bg); }}
        .empty {{ color: var(--dim); text-align: center; padding: 2rem; }}
    </style>
</head>
<body>
<div class="container">
    <div class="header">
        <div class="logo">Review Leaderboard</div>
        <div class="subtitle">Changes reviewed since {since}</div>
    </div>
    <form method="post" action="/">
        <select name="project_name" onchange="this.form.submit()">
{project_options}
        </select>
        <select name="time_period" onchange="this.form.submit()">
{period_options}
        </select>
        <noscript><button type="submit">Show</button></noscript>
    </form>
    <table>
        <thead>
            <tr><th class="num">#</th><th>Reviewer</th><th class="num">Reviews</th><th class="num">Comments</th></tr>
        </thead>
        <tbody>
{rows}
        </tbody>
    </table>
</div>
</body>
</html>
"#,
        since = board.window_start.format("%Y-%m-%d"),
        project_options = project_options,
        period_options = period_options,
        rows = rows,
    )?;

    Ok(())
}

/// Render the page to a string
pub fn render(board: &Leaderboard) -> io::Result<String> {
    let mut out = Vec::new();
    write(&mut out, board)?;
    String::from_utf8(out).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

// First choice is the current selection
fn options(choices: &[String]) -> String {
    choices
        .iter()
        .enumerate()
        .map(|(i, choice)| {
            let value = escape_html(choice);
            let selected = if i == 0 { " selected" } else { "" };
            format!(r#"            <option value="{}"{}>{}</option>"#, value, selected, value)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn table_rows(reviewers: &[ReviewerActivity]) -> String {
    if reviewers.is_empty() {
        return r#"            <tr><td class="empty" colspan="4">No reviews in this period</td></tr>"#.to_string();
    }
    reviewers
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                r#"            <tr><td class="num">{}</td><td>{}</td><td class="num">{}</td><td class="num">{}</td></tr>"#,
                i + 1,
                escape_html(&r.name),
                r.review_count,
                r.comment_count
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn board(reviewers: Vec<ReviewerActivity>) -> Leaderboard {
        Leaderboard {
            project: "all".to_string(),
            time_period: "1 Week".to_string(),
            window_start: Utc.with_ymd_and_hms(2016, 2, 16, 8, 0, 0).unwrap(),
            project_choices: vec!["all".to_string(), "a&b".to_string()],
            time_window_choices: vec!["1 Week".to_string(), "1 Month".to_string()],
            reviewers,
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<b>"O'Neil" & co</b>"#), "&lt;b&gt;&quot;O&#39;Neil&quot; &amp; co&lt;/b&gt;");
    }

    #[test]
    fn test_render_table_in_given_order() {
        let html = render(&board(vec![
            ReviewerActivity::new("Foo Bar", 7, 1),
            ReviewerActivity::new("<script>", 2, 0),
        ]))
        .unwrap();
        assert!(html.contains("<td>Foo Bar</td><td class=\"num\">7</td><td class=\"num\">1</td>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<td><script>"));
        let first = html.find("Foo Bar").unwrap();
        let second = html.find("&lt;script&gt;").unwrap();
        assert!(first < second);
        assert!(html.contains("since 2016-02-16"));
    }

    #[test]
    fn test_render_current_selection_first_and_selected() {
        let html = render(&board(vec![])).unwrap();
        assert!(html.contains(r#"<option value="all" selected>all</option>"#));
        assert!(html.contains(r#"<option value="a&amp;b">a&amp;b</option>"#));
        assert!(html.contains(r#"<option value="1 Week" selected>1 Week</option>"#));
        assert!(html.contains(r#"name="project_name""#));
        assert!(html.contains(r#"name="time_period""#));
        assert!(html.contains("No reviews in this period"));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_error_is_returned() {
        let err = write(&mut BrokenPipe, &board(vec![])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
