use std::fmt::Write;

use uuid::Uuid;

use crate::core::package::PackagedStem;

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; max-width: 40rem; margin: 3rem auto; }}
.flash {{ background: #fdecea; border: 1px solid #f5c2c0; padding: .5rem 1rem; list-style: none; }}
</style>
</head>
<body>
{body}
</body>
</html>
"#,
        title = escape(title),
    )
}

fn flashes(messages: &[String]) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let mut out = String::from("<ul class=\"flash\">\n");
    for m in messages {
        let _ = writeln!(out, "<li>{}</li>", escape(m));
    }
    out.push_str("</ul>\n");
    out
}

pub fn upload_page(messages: &[String], max_duration_secs: f64) -> String {
    let body = format!(
        r#"<h1>Stem splitter</h1>
{flashes}<p>Upload an mp3 or wav file. Only the first {secs} seconds are separated.</p>
<form method="post" action="/" enctype="multipart/form-data">
<input type="file" name="file" accept=".mp3,.wav">
<input type="submit" value="Separate">
</form>"#,
        flashes = flashes(messages),
        secs = max_duration_secs,
    );
    page("Stem splitter", &body)
}

pub fn download_page(job: Uuid, track: &str, stems: &[PackagedStem], truncated: bool) -> String {
    let mut links = String::new();
    for stem in stems {
        let _ = writeln!(
            links,
            r#"<li><a href="/download/{job}/{file}" download>{file}</a></li>"#,
            job = job,
            file = escape(&stem.file_name),
        );
    }
    let note = if truncated {
        "<p>The upload was longer than the limit and was cut before separation.</p>\n"
    } else {
        ""
    };
    let body = format!(
        r#"<h1>Stems for {track}</h1>
{note}<ul>
{links}</ul>
<p><a href="/">Separate another file</a></p>"#,
        track = escape(track),
    );
    page(&format!("Stems for {track}"), &body)
}
