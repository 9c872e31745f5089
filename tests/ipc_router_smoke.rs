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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_attendanced");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn attendanced");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("attendanced-router-smoke");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({
            "htNumber": "H100",
            "studentName": "Smoke Student",
            "originalSection": "Sec1"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "4",
        "students.update",
        json!({ "htNumber": "H100", "patch": { "studentName": "Renamed" } }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "students.list",
        json!({ "section": "Sec1", "population": "home" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "sections.list",
        json!({ "population": "teaching" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.bulkUpload",
        json!({ "rows": [
            { "htNumber": "H101", "studentName": "Second", "originalSection": "Sec1" }
        ] }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "mapping.set",
        json!({ "section": "Sec1", "subjects": ["Math"] }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "mapping.get",
        json!({ "section": "Sec1" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "faculty.create",
        json!({ "facultyName": "Dr. Smoke" }),
    );
    let _ = request(&mut stdin, &mut reader, "11", "faculty.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "attendance.checkDuplicate",
        json!({ "section": "Sec1", "period": "P1", "date": "01/01/2024" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "attendance.mark",
        json!({
            "section": "Sec1",
            "period": "P1",
            "subject": "Math",
            "recorder": "Dr. Smoke",
            "date": "01/01/2024",
            "time": "9:00AM",
            "assignments": { "H100": "P", "H101": "A" }
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "reports.sectionStats",
        json!({ "section": "Sec1" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "reports.subjectBreakdown",
        json!({ "section": "Sec1", "subject": "Math" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "reports.studentDetails",
        json!({ "htNumber": "H100" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "reports.facultyWorkload",
        json!({ "facultyName": "Dr. Smoke" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "reports.facultyWorkloadAll",
        json!({}),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "19",
        "students.delete",
        json!({ "htNumber": "H101" }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

fn request_any(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

#[test]
fn unknown_method_reports_not_implemented() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request_any(&mut stdin, &mut reader, "1", "feedback.submit", json!({}));
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn methods_require_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let resp = request_any(
        &mut stdin,
        &mut reader,
        "1",
        "students.list",
        json!({ "section": "Sec1" }),
    );
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("no_workspace")
    );
    drop(stdin);
    let _ = child.wait();
}
