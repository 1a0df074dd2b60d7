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
    seq: usize,
}

impl Sidecar {
    fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_facultyd");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn facultyd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Sidecar {
            child,
            stdin,
            reader: BufReader::new(stdout),
            seq: 0,
        }
    }

    fn call(
        &mut self,
        actor: Option<(&str, bool)>,
        method: &str,
        params: serde_json::Value,
    ) -> serde_json::Value {
        self.seq += 1;
        let id = format!("r{}", self.seq);
        let mut payload = json!({ "id": id, "method": method, "params": params });
        if let Some((username, is_admin)) = actor {
            payload["actor"] = json!({ "username": username, "isAdmin": is_admin });
        }
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
        assert_eq!(value["id"], json!(id));
        value
    }

    fn finish(mut self) {
        drop(self.stdin);
        let _ = self.child.wait();
    }
}

const ADMIN: Option<(&str, bool)> = Some(("admin", true));

fn code(v: &serde_json::Value) -> &str {
    v["error"]["code"].as_str().unwrap_or("")
}

#[test]
fn seeded_admin_and_self_service_accounts() {
    let workspace = temp_dir("facultyd-accounts-self");
    let mut s = Sidecar::spawn();
    s.call(None, "workspace.select", json!({ "path": workspace.to_string_lossy() }));

    let admin = s.call(
        None,
        "accounts.authenticate",
        json!({ "username": "admin", "password": "admin123" }),
    );
    assert_eq!(admin["result"]["isAdmin"], json!(true));
    assert_eq!(admin["result"]["fullName"], json!("System Administrator"));
    assert!(admin["result"].get("password").is_none());

    let wrong = s.call(
        None,
        "accounts.authenticate",
        json!({ "username": "admin", "password": "nope" }),
    );
    assert_eq!(code(&wrong), "auth_failed");

    let registered = s.call(
        None,
        "accounts.register",
        json!({
            "username": "carol",
            "fullName": "Carol C",
            "email": "carol@example.org",
            "password": "secret1",
            "confirmPassword": "secret1",
            "isAdmin": true
        }),
    );
    assert_eq!(registered["result"]["isAdmin"], json!(false));

    let dup = s.call(
        None,
        "accounts.register",
        json!({
            "username": "carol",
            "fullName": "Carol Again",
            "email": "carol2@example.org",
            "password": "secret1",
            "confirmPassword": "secret1"
        }),
    );
    assert_eq!(code(&dup), "conflict");

    let short = s.call(
        None,
        "accounts.register",
        json!({
            "username": "dan",
            "fullName": "Dan",
            "email": "dan@example.org",
            "password": "abc",
            "confirmPassword": "abc"
        }),
    );
    assert_eq!(code(&short), "bad_params");

    let carol = Some(("carol", false));
    let profile = s.call(
        carol,
        "accounts.updateProfile",
        json!({ "fullName": "Carol Cooper", "email": "cc@example.org" }),
    );
    assert_eq!(profile["result"]["fullName"], json!("Carol Cooper"));

    let bad_current = s.call(
        carol,
        "accounts.changePassword",
        json!({ "currentPassword": "wrong", "newPassword": "secret2", "confirmPassword": "secret2" }),
    );
    assert_eq!(code(&bad_current), "auth_failed");
    let changed = s.call(
        carol,
        "accounts.changePassword",
        json!({ "currentPassword": "secret1", "newPassword": "secret2", "confirmPassword": "secret2" }),
    );
    assert_eq!(changed["ok"], json!(true));

    let peek = s.call(carol, "accounts.get", json!({ "username": "admin" }));
    assert_eq!(code(&peek), "forbidden");
    let me = s.call(carol, "accounts.get", json!({}));
    assert_eq!(me["result"]["email"], json!("cc@example.org"));

    let reset = s.call(
        None,
        "accounts.requestReset",
        json!({ "username": "carol", "email": "cc@example.org" }),
    );
    let token = reset["result"]["token"].as_str().expect("token").to_string();
    let done = s.call(
        None,
        "accounts.resetPassword",
        json!({ "token": token, "newPassword": "secret3", "confirmPassword": "secret3" }),
    );
    assert_eq!(done["result"]["username"], json!("carol"));
    let reused = s.call(
        None,
        "accounts.resetPassword",
        json!({ "token": token, "newPassword": "secret4", "confirmPassword": "secret4" }),
    );
    assert_eq!(code(&reused), "auth_failed");
    let login = s.call(
        None,
        "accounts.authenticate",
        json!({ "username": "carol", "password": "secret3" }),
    );
    assert_eq!(login["ok"], json!(true));

    let no_actor = s.call(None, "accounts.list", json!({}));
    assert_eq!(code(&no_actor), "bad_params");

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn admin_rules_protect_the_last_admin() {
    let workspace = temp_dir("facultyd-accounts-admin");
    let mut s = Sidecar::spawn();
    s.call(None, "workspace.select", json!({ "path": workspace.to_string_lossy() }));

    let denied = s.call(Some(("eve", false)), "accounts.list", json!({}));
    assert_eq!(code(&denied), "forbidden");

    let self_delete = s.call(ADMIN, "accounts.delete", json!({ "username": "admin" }));
    assert_eq!(code(&self_delete), "forbidden");

    // Another admin deleting the sole admin account is refused too.
    let sole = s.call(Some(("ghost", true)), "accounts.delete", json!({ "username": "admin" }));
    assert_eq!(code(&sole), "forbidden");

    let demote = s.call(
        ADMIN,
        "accounts.update",
        json!({
            "username": "admin",
            "fullName": "System Administrator",
            "email": "admin@system.com",
            "isAdmin": false
        }),
    );
    assert_eq!(code(&demote), "forbidden");

    let list = s.call(ADMIN, "accounts.list", json!({}));
    let users = list["result"]["users"].as_array().expect("users");
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["isAdmin"], json!(true));

    let created = s.call(
        ADMIN,
        "accounts.create",
        json!({
            "username": "frank",
            "fullName": "Frank F",
            "email": "frank@example.org",
            "password": "frankpw",
            "confirmPassword": "frankpw",
            "isAdmin": true
        }),
    );
    assert_eq!(created["result"]["isAdmin"], json!(true));
    assert_eq!(created["result"]["createdBy"], json!("admin"));

    let updated = s.call(
        ADMIN,
        "accounts.update",
        json!({
            "username": "frank",
            "fullName": "Frank Fisher",
            "email": "frank@example.org",
            "isAdmin": true,
            "newPassword": "newfrank",
            "confirmPassword": "newfrank"
        }),
    );
    assert_eq!(updated["result"]["fullName"], json!("Frank Fisher"));
    let login = s.call(
        None,
        "accounts.authenticate",
        json!({ "username": "frank", "password": "newfrank" }),
    );
    assert_eq!(login["ok"], json!(true));

    let removed = s.call(Some(("frank", true)), "accounts.delete", json!({ "username": "admin" }));
    assert_eq!(removed["ok"], json!(true));
    let remaining = s.call(Some(("frank", true)), "accounts.list", json!({}));
    assert_eq!(remaining["result"]["users"].as_array().map(|a| a.len()), Some(1));

    let missing = s.call(Some(("frank", true)), "accounts.delete", json!({ "username": "nobody" }));
    assert_eq!(code(&missing), "not_found");

    s.finish();
    let _ = std::fs::remove_dir_all(workspace);
}
