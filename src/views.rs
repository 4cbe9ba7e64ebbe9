//! Server-rendered HTML pages
//!
//! Pages are deliberately plain; the live view and tag wizard pull their
//! data over the websocket.

use chrono::{DateTime, Local, Utc};

use crate::models::lab_session::{format_hours, LabSession};
use crate::models::mentor::Mentor;
use crate::models::student::{Student, StudentHours};
use crate::models::tag::{Tag, TagOwner};
use crate::trends::StrikeReport;

/// Escape text for HTML and XML bodies and attributes
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Local wall-clock time as shown in tables
pub fn display_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Local time in the format of `datetime-local` inputs
pub fn input_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%dT%H:%M").to_string()
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title} - Hours</title></head>
<body>
<nav><a href="/">Home</a> | <a href="/leader_board">Leader Board</a> | <a href="/mentors">Mentors</a> | <a href="/tag/live">Live</a> | <a href="/logout">Log out</a></nav>
<h1>{title}</h1>
{body}
</body>
</html>
"#,
        title = escape(title),
        body = body
    )
}

fn open_sessions_table(sessions: &[(LabSession, Student)]) -> String {
    let mut rows = String::new();
    for (session, student) in sessions {
        rows.push_str(&format!(
            r#"<tr><td><a href="/students/{id}">{name}</a></td><td>{time_in}</td><td><a href="/lab_sessions/{session_id}/sign_out">Sign out</a></td></tr>
"#,
            id = student.id,
            name = escape(&student.full_name()),
            time_in = display_time(session.time_in),
            session_id = session.id
        ));
    }

    format!("<table>\n<tr><th>Student</th><th>Signed in</th><th></th></tr>\n{rows}</table>")
}

/// `GET /`: sign-in form and who is in the lab
pub fn index(sessions: &[(LabSession, Student)]) -> String {
    let body = format!(
        r#"<form method="post" action="/signin">
<label>Student ID <input type="text" name="student_id" autofocus></label>
<button type="submit">Sign in</button>
</form>
<h2>Signed in ({count})</h2>
{table}"#,
        count = sessions.len(),
        table = open_sessions_table(sessions)
    );
    layout("Lab Sign-In", &body)
}

/// `GET /lab_sessions/open`
pub fn signed_in_list(sessions: &[(LabSession, Student)]) -> String {
    layout("Signed In", &open_sessions_table(sessions))
}

/// `GET /leader_board`; rows are expected in display order
pub fn leader_board(students: &[StudentHours]) -> String {
    let mut rows = String::new();
    for (rank, entry) in students.iter().enumerate() {
        rows.push_str(&format!(
            r#"<tr><td>{rank}</td><td><a href="/students/{id}">{name}</a></td><td>{hours}</td></tr>
"#,
            rank = rank + 1,
            id = entry.student.id,
            name = escape(&entry.student.full_name()),
            hours = format_hours(entry.project_hours)
        ));
    }

    let body = format!("<table>\n<tr><th>#</th><th>Student</th><th>Hours</th></tr>\n{rows}</table>");
    layout("Leader Board", &body)
}

/// `GET /students/:id`
pub fn student(student: &Student, sessions: &[LabSession], project_hours: f64) -> String {
    let mut rows = String::new();
    for session in sessions {
        rows.push_str(&format!(
            r#"<tr><td>{time_in}</td><td>{time_out}</td><td>{hours}</td><td>{by}</td><td>{notes}</td><td><a href="/lab_sessions/{id}/edit">Edit</a> <a href="/lab_sessions/{id}/delete">Delete</a></td></tr>
"#,
            time_in = display_time(session.time_in),
            time_out = session.time_out.map(display_time).unwrap_or_default(),
            hours = session.duration_hours().map(format_hours).unwrap_or_default(),
            by = escape(session.signed_out_by.as_deref().unwrap_or("")),
            notes = escape(session.notes.as_deref().unwrap_or("")),
            id = session.id
        ));
    }

    let body = format!(
        r#"<p>Student ID {id}: {hours} project hours</p>
<p><a href="/students/{id}/new_lab_session">Add lab session</a></p>
<table>
<tr><th>In</th><th>Out</th><th>Hours</th><th>Signed out by</th><th>Notes</th><th></th></tr>
{rows}</table>"#,
        id = student.id,
        hours = format_hours(project_hours)
    );
    layout(&student.full_name(), &body)
}

/// Values shown in the lab session create/edit form
#[derive(Debug, Default)]
pub struct LabSessionFormView {
    pub title: String,
    pub action: String,
    pub time_in: Option<DateTime<Utc>>,
    pub time_out: Option<DateTime<Utc>>,
    pub notes: String,
    pub referrer: String,
}

pub fn edit_lab_session(form: &LabSessionFormView) -> String {
    let body = format!(
        r#"<form method="post" action="{action}">
<label>Time in <input type="datetime-local" name="time_in" value="{time_in}"></label>
<label>Time out <input type="datetime-local" name="time_out" value="{time_out}"></label>
<label>Notes <input type="text" name="notes" value="{notes}"></label>
<input type="hidden" name="referrer" value="{referrer}">
<button type="submit">Save</button>
</form>"#,
        action = escape(&form.action),
        time_in = form.time_in.map(input_time).unwrap_or_default(),
        time_out = form.time_out.map(input_time).unwrap_or_default(),
        notes = escape(&form.notes),
        referrer = escape(&form.referrer)
    );
    layout(&form.title, &body)
}

pub fn delete_lab_session(session: &LabSession, student: &Student, referrer: &str) -> String {
    let body = format!(
        r#"<p>Delete the lab session of {name} starting {time_in}?</p>
<form method="post" action="/lab_sessions/{id}/delete">
<input type="hidden" name="referrer" value="{referrer}">
<button type="submit">Delete</button>
</form>"#,
        name = escape(&student.full_name()),
        time_in = display_time(session.time_in),
        id = session.id,
        referrer = escape(referrer)
    );
    layout("Delete Lab Session", &body)
}

/// `GET /mentors`
pub fn mentors(mentors: &[Mentor]) -> String {
    let mut rows = String::new();
    for mentor in mentors {
        rows.push_str(&format!(
            r#"<tr><td>{name}</td><td>{phone}</td><td><a href="/mentors/{id}/delete">Delete</a></td></tr>
"#,
            name = escape(&mentor.full_name()),
            phone = escape(&mentor.phone_number),
            id = mentor.id
        ));
    }

    let body = format!(
        r#"<p><a href="/new_mentor">Add mentor</a></p>
<table>
<tr><th>Name</th><th>Phone</th><th></th></tr>
{rows}</table>"#
    );
    layout("Mentors", &body)
}

/// `GET /new_mentor`
pub fn new_mentor() -> String {
    let body = r#"<form method="post" action="/mentors">
<label>First name <input type="text" name="first_name"></label>
<label>Last name <input type="text" name="last_name"></label>
<label>Phone number <input type="tel" name="phone_number"></label>
<button type="submit">Create</button>
</form>"#;
    layout("New Mentor", body)
}

pub fn delete_mentor(mentor: &Mentor) -> String {
    let body = format!(
        r#"<p>Delete mentor {name}?</p>
<form method="post" action="/mentors/{id}/delete">
<button type="submit">Delete</button>
</form>"#,
        name = escape(&mentor.full_name()),
        id = mentor.id
    );
    layout("Delete Mentor", &body)
}

/// `GET /strike_report`
pub fn strike_report(report: &StrikeReport) -> String {
    let mut header = String::from("<tr><th>Student</th><th>Strikes</th>");
    for week in &report.weeks {
        header.push_str(&format!("<th>{}</th>", week.start.format("%m/%d")));
    }
    header.push_str("</tr>\n");

    let mut rows = String::new();
    for entry in &report.students {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td>",
            escape(&entry.student.full_name()),
            entry.strikes
        ));
        for (week, hours) in report.weeks.iter().zip(&entry.weekly_hours) {
            let class = if week.complete && *hours < report.min_hours { " class=\"strike\"" } else { "" };
            rows.push_str(&format!("<td{class}>{}</td>", format_hours(*hours)));
        }
        rows.push_str("</tr>\n");
    }

    let body = format!(
        r#"<style>.strike {{ background: #f99; }}</style>
<p>Minimum {min} hours per week.</p>
<table>
{header}{rows}</table>"#,
        min = format_hours(report.min_hours)
    );
    layout("Strike Report", &body)
}

/// `GET /tag/manage`: assign the most recently scanned tag
pub fn tag_manage(tags: &[Tag], students: &[Student], mentors: &[Mentor]) -> String {
    let mut rows = String::new();
    for tag in tags {
        let owner = match tag.owner() {
            TagOwner::Student(id) => students
                .iter()
                .find(|s| s.id == id)
                .map(|s| format!("Student: {}", s.full_name()))
                .unwrap_or_else(|| format!("Student #{id}")),
            TagOwner::Mentor(id) => mentors
                .iter()
                .find(|m| m.id == id)
                .map(|m| format!("Mentor: {}", m.full_name()))
                .unwrap_or_else(|| format!("Mentor #{id}")),
            TagOwner::Neither => "Unassigned".to_string(),
        };
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>\n",
            escape(&tag.tag_id),
            escape(&owner)
        ));
    }

    let mut options = String::new();
    for student in students {
        options.push_str(&format!(
            "<option value=\"student:{}\">{}</option>",
            student.id,
            escape(&student.full_name())
        ));
    }
    for mentor in mentors {
        options.push_str(&format!(
            "<option value=\"mentor:{}\">Mentor {}</option>",
            mentor.id,
            escape(&mentor.full_name())
        ));
    }

    let body = format!(
        r#"<p>Scan a tag, then pick its owner.</p>
<p>Last scanned tag: <span id="tag"></span></p>
<select id="owner">{options}</select>
<button onclick="assign()">Assign</button>
<p id="result"></p>
<h2>Known tags</h2>
<table>
<tr><th>Tag</th><th>Owner</th></tr>
{rows}</table>
<script>
var ws = new WebSocket((location.protocol === "https:" ? "wss://" : "ws://") + location.host + "/tag_ws");
ws.onmessage = function (event) {{
  var msg = JSON.parse(event.data);
  if (msg.state === "in") {{ document.getElementById("tag").textContent = msg.tag; }}
}};
function assign() {{
  var parts = document.getElementById("owner").value.split(":");
  var tag = document.getElementById("tag").textContent;
  fetch("/tag/manage/assign?tag=" + encodeURIComponent(tag) + "&mode=" + parts[0] + "&id=" + parts[1])
    .then(function (r) {{ return r.text().then(function (t) {{ document.getElementById("result").textContent = r.ok ? "Assigned " + tag : t; }}); }});
}}
</script>"#
    );
    layout("Manage Tags", &body)
}

/// `GET /tag/live`
pub fn live_tag_view() -> String {
    let body = r#"<ul id="present"></ul>
<p id="signin"></p>
<script>
var ws = new WebSocket((location.protocol === "https:" ? "wss://" : "ws://") + location.host + "/tag_ws");
ws.onmessage = function (event) {
  var msg = JSON.parse(event.data);
  if (msg.signin) { document.getElementById("signin").textContent = msg.signin; return; }
  if (!msg.state) { return; }
  var id = "tag-" + msg.tag;
  var existing = document.getElementById(id);
  if (msg.state === "out") { if (existing) { existing.remove(); } return; }
  if (existing) { return; }
  var item = document.createElement("li");
  item.id = id;
  item.textContent = msg.user && msg.user.name ? msg.user.name + " (" + msg.user.type + ")" : "Unassigned tag " + msg.tag;
  document.getElementById("present").appendChild(item);
};
</script>"#;
    layout("Live Tags", body)
}
