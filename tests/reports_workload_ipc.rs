use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    fn spawn() -> Sidecar {
        let exe = env!("CARGO_BIN_EXE_attendanced");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn attendanced");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 1,
        }
    }

    fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.next_id.to_string();
        self.next_id += 1;
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "expected ok for {}: {}",
            method,
            value
        );
        value.get("result").cloned().expect("result")
    }
}

fn mark(sc: &mut Sidecar, period: &str, subject: &str, date: &str, time: &str) {
    sc.request_ok(
        "attendance.mark",
        json!({
            "section": "Sec1",
            "period": period,
            "subject": subject,
            "recorder": "Dr.X",
            "date": date,
            "time": time,
            "assignments": { "H1": "P" }
        }),
    );
}

fn seeded_workspace(prefix: &str) -> (Sidecar, PathBuf) {
    let workspace = temp_dir(prefix);
    let mut sc = Sidecar::spawn();
    sc.request_ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    sc.request_ok(
        "students.bulkUpload",
        json!({ "rows": [
            { "htNumber": "H1", "studentName": "Alice", "originalSection": "Sec1" }
        ] }),
    );
    sc.request_ok(
        "mapping.set",
        json!({ "section": "Sec1", "subjects": ["Math", "Physics"] }),
    );
    sc.request_ok("faculty.create", json!({ "facultyName": "Dr.X" }));
    sc.request_ok("faculty.create", json!({ "facultyName": "Dr.Y" }));
    (sc, workspace)
}

#[test]
fn workload_reflects_marked_classes() {
    let (mut sc, workspace) = seeded_workspace("attendanced-workload");

    mark(&mut sc, "P1", "Math", "02/12/2024", "9:00AM");
    mark(&mut sc, "P3", "Math", "02/12/2024", "11:00AM");
    mark(&mut sc, "P1", "Physics", "06/01/2025", "9:00AM");

    let w = sc.request_ok(
        "reports.facultyWorkload",
        json!({ "facultyName": "Dr.X" }),
    );
    let summary = w.get("summary").unwrap();
    assert_eq!(
        summary.get("totalClasses").and_then(|v| v.as_u64()),
        Some(3)
    );
    assert_eq!(summary.get("daysEngaged").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        summary.get("dailyAverage").and_then(|v| v.as_f64()),
        Some(1.5)
    );
    assert_eq!(
        summary.get("uniqueSubjects").and_then(|v| v.as_u64()),
        Some(2)
    );
    assert_eq!(
        summary
            .pointer("/subjectDistribution/Math")
            .and_then(|v| v.as_u64()),
        Some(2)
    );

    let records = w.get("records").and_then(|v| v.as_array()).unwrap();
    assert_eq!(records.len(), 3);
    // Newest first, spanning the month columns.
    assert_eq!(
        records[0].get("date").and_then(|v| v.as_str()),
        Some("06/01/2025")
    );
    assert_eq!(
        records[0].get("month").and_then(|v| v.as_str()),
        Some("Jan2025")
    );
    assert_eq!(
        records[2].get("month").and_then(|v| v.as_str()),
        Some("Dec2024")
    );

    // Date filter trims to the December classes.
    let december = sc.request_ok(
        "reports.facultyWorkload",
        json!({
            "facultyName": "Dr.X",
            "fromDate": "01/12/2024",
            "toDate": "31/12/2024"
        }),
    );
    assert_eq!(
        december
            .pointer("/summary/totalClasses")
            .and_then(|v| v.as_u64()),
        Some(2)
    );

    // The all-faculty view skips Dr.Y, who taught nothing.
    let all = sc.request_ok("reports.facultyWorkloadAll", json!({}));
    let rows = all.get("faculty").and_then(|v| v.as_array()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("facultyName").and_then(|v| v.as_str()),
        Some("Dr.X")
    );

    drop(sc.stdin);
    let _ = sc.child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn subject_breakdown_over_ipc_excludes_untouched_subject() {
    let (mut sc, workspace) = seeded_workspace("attendanced-breakdown");

    mark(&mut sc, "P1", "Math", "02/12/2024", "9:00AM");

    let math = sc.request_ok(
        "reports.subjectBreakdown",
        json!({ "section": "Sec1", "subject": "Math" }),
    );
    let rows = math.get("students").and_then(|v| v.as_array()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("pct").and_then(|v| v.as_f64()), Some(100.0));

    let physics = sc.request_ok(
        "reports.subjectBreakdown",
        json!({ "section": "Sec1", "subject": "Physics" }),
    );
    assert_eq!(
        physics
            .get("students")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    drop(sc.stdin);
    let _ = sc.child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn stats_survive_sidecar_restart() {
    let (mut sc, workspace) = seeded_workspace("attendanced-restart");
    mark(&mut sc, "P1", "Math", "02/12/2024", "9:00AM");
    drop(sc.stdin);
    let _ = sc.child.wait();

    // Everything is re-read from storage; a fresh process sees the same ledger.
    let mut sc2 = Sidecar::spawn();
    sc2.request_ok(
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let stats = sc2.request_ok("reports.sectionStats", json!({ "section": "Sec1" }));
    let alice = &stats.get("students").and_then(|v| v.as_array()).unwrap()[0];
    assert_eq!(
        alice.get("totalConducted").and_then(|v| v.as_u64()),
        Some(1)
    );

    drop(sc2.stdin);
    let _ = sc2.child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
