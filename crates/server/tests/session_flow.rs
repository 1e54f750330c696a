//! End-to-end protocol tests.
//!
//! Each test drives real connections through the full transport/pump/
//! dispatcher path over in-memory duplex streams; only the TLS layer is
//! absent. Confirmation codes are read back from the capture mailer.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use {
    serde_json::{Value, json},
    tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf},
        sync::watch,
        time::timeout,
    },
};

use {
    comcore_mail::CaptureMailer,
    comcore_protocol::Frame,
    comcore_server::{ServerState, conn::run_connection},
    comcore_store::{MemStore, Store},
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    state: Arc<ServerState>,
    mailer: Arc<CaptureMailer>,
    store: Arc<MemStore>,
    shutdown: watch::Sender<bool>,
    _upload_dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemStore::new());
        let mailer = Arc::new(CaptureMailer::new());
        let upload_dir = tempfile::tempdir().unwrap();
        let state = ServerState::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&mailer) as Arc<dyn comcore_mail::Mailer>,
            upload_dir.path().to_path_buf(),
        );
        let (shutdown, _) = watch::channel(false);
        Self {
            state,
            mailer,
            store,
            shutdown,
            _upload_dir: upload_dir,
        }
    }

    fn client(&self) -> Client {
        let (ours, theirs) = tokio::io::duplex(256 * 1024);
        tokio::spawn(run_connection(
            theirs,
            Arc::clone(&self.state),
            self.shutdown.subscribe(),
        ));
        let (read, write) = tokio::io::split(ours);
        Client {
            read: BufReader::new(read),
            write,
        }
    }

    /// Create and confirm an account; returns a logged-in client and the
    /// user id.
    async fn account(&self, name: &str, email: &str, pass: &str) -> (Client, i64) {
        let mut client = self.client();
        let reply = client
            .request("createAccount", json!({ "name": name, "email": email, "pass": pass }))
            .await;
        assert_eq!(reply.data["created"], true);

        let code = self.mailer.last_code_for(email).await.unwrap();
        let reply = client.request("enterCode", json!({ "code": code })).await;
        assert_eq!(reply.data["correct"], true);

        let push = client.recv().await;
        assert_eq!(push.kind, "login");
        let id = push.data["id"].as_i64().unwrap();
        (client, id)
    }
}

struct Client {
    read: BufReader<ReadHalf<DuplexStream>>,
    write: WriteHalf<DuplexStream>,
}

impl Client {
    async fn send(&mut self, kind: &str, data: Value) {
        let line = serde_json::to_string(&json!({ "kind": kind, "data": data })).unwrap();
        self.write.write_all(line.as_bytes()).await.unwrap();
        self.write.write_all(b"\n").await.unwrap();
    }

    async fn recv(&mut self) -> Frame {
        let mut line = String::new();
        let n = timeout(RECV_TIMEOUT, self.read.read_line(&mut line))
            .await
            .expect("timed out waiting for a frame")
            .unwrap();
        assert!(n > 0, "connection closed");
        serde_json::from_str(&line).unwrap()
    }

    /// Send a request and return its reply, asserting it is not an error.
    async fn request(&mut self, kind: &str, data: Value) -> Frame {
        self.send(kind, data).await;
        let frame = self.recv().await;
        assert_eq!(frame.kind, "REPLY", "unexpected {}: {}", frame.kind, frame.data);
        frame
    }

    /// Send a request and return the error message it is rejected with.
    async fn request_err(&mut self, kind: &str, data: Value) -> String {
        self.send(kind, data).await;
        let frame = self.recv().await;
        assert_eq!(frame.kind, "ERROR", "expected an error, got {}", frame.data);
        frame.data["message"].as_str().unwrap_or_default().to_string()
    }
}

/// A logged-in group with a chat module, shared by several tests.
async fn group_with_chat(client: &mut Client) -> (i64, i64) {
    let reply = client.request("createGroup", json!({ "name": "G" })).await;
    let group = reply.data["id"].as_i64().unwrap();
    let reply = client
        .request("createModule", json!({ "group": group, "name": "main", "type": "chat" }))
        .await;
    let module = reply.data["id"].as_i64().unwrap();
    (group, module)
}

// ── Scenario 1: account creation ─────────────────────────────────────────────

#[tokio::test]
async fn account_creation_flow() {
    let h = Harness::new();
    let mut client = h.client();

    let reply = client
        .request(
            "createAccount",
            json!({ "name": "Alice", "email": "alice@x", "pass": "p" }),
        )
        .await;
    assert_eq!(reply.data, json!({ "created": true }));

    let code = h.mailer.last_code_for("alice@x").await.unwrap();
    let wrong = if code == "000000" { "000001" } else { "000000" };
    let reply = client.request("enterCode", json!({ "code": wrong })).await;
    assert_eq!(reply.data, json!({ "correct": false }));

    let reply = client.request("enterCode", json!({ "code": code })).await;
    assert_eq!(reply.data, json!({ "correct": true }));

    let push = client.recv().await;
    assert_eq!(push.kind, "login");
    assert_eq!(push.data["name"], "Alice");
    assert!(push.data["token"].as_str().unwrap().len() >= 64);
}

#[tokio::test]
async fn duplicate_account_creation_refused() {
    let h = Harness::new();
    let (_alice, _) = h.account("Alice", "alice@x", "p").await;
    let mut other = h.client();
    let reply = other
        .request(
            "createAccount",
            json!({ "name": "Imposter", "email": "alice@x", "pass": "q" }),
        )
        .await;
    assert_eq!(reply.data, json!({ "created": false }));
}

// ── Scenario 2: group, module, message ───────────────────────────────────────

#[tokio::test]
async fn first_message_gets_id_one() {
    let h = Harness::new();
    let (mut alice, alice_id) = h.account("Alice", "alice@x", "p").await;
    let (group, module) = group_with_chat(&mut alice).await;

    let reply = alice
        .request(
            "sendMessage",
            json!({ "group": group, "chat": module, "contents": "hello" }),
        )
        .await;
    assert_eq!(reply.data["id"], 1);
    assert_eq!(reply.data["sender"], alice_id);
    assert_eq!(reply.data["contents"], "hello");
    assert_eq!(reply.data["reactions"], json!([]));
    let sent_at = reply.data["timestamp"].as_i64().unwrap();
    assert!(sent_at > 0);
    // Exactly the enumerated entry shape, nothing extra.
    let mut keys: Vec<_> = reply.data.as_object().unwrap().keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, ["contents", "id", "reactions", "sender", "timestamp"]);

    let reply = alice
        .request(
            "getMessages",
            json!({ "group": group, "chat": module, "after": 0, "before": 0 }),
        )
        .await;
    let messages = reply.data["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["id"], 1);
    assert_eq!(messages[0]["contents"], "hello");
    assert_eq!(messages[0]["timestamp"], sent_at);
}

// ── Scenario 3: role changes ─────────────────────────────────────────────────

#[tokio::test]
async fn role_change_requires_authority_and_pushes() {
    let h = Harness::new();
    let (mut alice, _) = h.account("Alice", "alice@x", "p").await;
    let (mut bob, bob_id) = h.account("Bob", "bob@x", "p").await;
    let (group, _) = group_with_chat(&mut alice).await;
    h.store.join_group(bob_id, group).await.unwrap();

    // Bob (a plain user) cannot promote himself.
    let err = bob
        .request_err(
            "setRole",
            json!({ "group": group, "target": bob_id, "role": "moderator" }),
        )
        .await;
    assert!(err.contains("yourself") || err.contains("permissions"));

    // A second session of Bob observes the change Alice makes.
    let mut bob2 = h.client();
    let reply = bob2
        .request("login", json!({ "email": "bob@x", "pass": "p" }))
        .await;
    assert_eq!(reply.data["status"], "SUCCESS");
    assert_eq!(bob2.recv().await.kind, "login");

    let reply = alice
        .request(
            "setRole",
            json!({ "group": group, "target": bob_id, "role": "moderator" }),
        )
        .await;
    assert_eq!(reply.data, json!({}));

    for session in [&mut bob, &mut bob2] {
        let push = session.recv().await;
        assert_eq!(push.kind, "roleChanged");
        assert_eq!(push.data, json!({ "group": group, "role": "moderator" }));
    }
}

// ── Scenario 4: muting ───────────────────────────────────────────────────────

#[tokio::test]
async fn muted_user_cannot_post() {
    let h = Harness::new();
    let (mut alice, _) = h.account("Alice", "alice@x", "p").await;
    let (mut bob, bob_id) = h.account("Bob", "bob@x", "p").await;
    let (group, module) = group_with_chat(&mut alice).await;
    h.store.join_group(bob_id, group).await.unwrap();

    let reply = alice
        .request("setMuted", json!({ "group": group, "target": bob_id, "muted": true }))
        .await;
    assert_eq!(reply.data, json!({}));
    let push = bob.recv().await;
    assert_eq!(push.kind, "mutedChanged");
    assert_eq!(push.data["muted"], true);

    let err = bob
        .request_err(
            "sendMessage",
            json!({ "group": group, "chat": module, "contents": "x" }),
        )
        .await;
    assert_eq!(err, "user is muted");
}

#[tokio::test]
async fn only_the_owner_can_grant_ownership() {
    let h = Harness::new();
    let (mut alice, alice_id) = h.account("Alice", "alice@x", "p").await;
    let (mut bob, bob_id) = h.account("Bob", "bob@x", "p").await;
    let (_carol, carol_id) = h.account("Carol", "carol@x", "p").await;
    let (group, _) = group_with_chat(&mut alice).await;
    h.store.join_group(bob_id, group).await.unwrap();
    h.store.join_group(carol_id, group).await.unwrap();

    alice
        .request("setRole", json!({ "group": group, "target": bob_id, "role": "moderator" }))
        .await;
    assert_eq!(bob.recv().await.kind, "roleChanged");

    // A moderator outranks a plain user, but ownership is not theirs to
    // give away.
    let err = bob
        .request_err(
            "setRole",
            json!({ "group": group, "target": carol_id, "role": "owner" }),
        )
        .await;
    assert!(err.contains("permissions"));
    assert_eq!(
        h.store.get_role(group, alice_id).await.unwrap(),
        comcore_store::Role::Owner
    );
}

// ── Scenario 5: ownership transfer ───────────────────────────────────────────

#[tokio::test]
async fn ownership_transfer_demotes_previous_owner() {
    let h = Harness::new();
    let (mut alice, alice_id) = h.account("Alice", "alice@x", "p").await;
    let (mut bob, bob_id) = h.account("Bob", "bob@x", "p").await;
    let (group, _) = group_with_chat(&mut alice).await;
    h.store.join_group(bob_id, group).await.unwrap();

    let reply = alice
        .request("setRole", json!({ "group": group, "target": bob_id, "role": "owner" }))
        .await;
    assert_eq!(reply.data, json!({}));

    let push = bob.recv().await;
    assert_eq!(push.kind, "roleChanged");
    assert_eq!(push.data["role"], "owner");
    let push = alice.recv().await;
    assert_eq!(push.kind, "roleChanged");
    assert_eq!(push.data["role"], "moderator");

    assert_eq!(
        h.store.get_role(group, bob_id).await.unwrap(),
        comcore_store::Role::Owner
    );
    assert_eq!(
        h.store.get_role(group, alice_id).await.unwrap(),
        comcore_store::Role::Moderator
    );
}

// ── Scenario 6: password reset ───────────────────────────────────────────────

#[tokio::test]
async fn password_reset_logs_out_other_sessions() {
    let h = Harness::new();
    let (mut other_session, _) = h.account("Alice", "alice@x", "p").await;

    let mut resetter = h.client();
    let reply = resetter
        .request("requestReset", json!({ "email": "alice@x" }))
        .await;
    assert_eq!(reply.data, json!({ "sent": true }));

    let code = h.mailer.last_code_for("alice@x").await.unwrap();
    let reply = resetter.request("enterCode", json!({ "code": code })).await;
    assert_eq!(reply.data, json!({ "correct": true }));

    let reply = resetter
        .request("finishReset", json!({ "pass": "newpass" }))
        .await;
    assert_eq!(reply.data, json!({ "reset": true }));
    assert_eq!(resetter.recv().await.kind, "login");

    // Every other session of Alice is told to log out.
    let push = other_session.recv().await;
    assert_eq!(push.kind, "logout");

    // The old password no longer works; the new one does.
    let mut fresh = h.client();
    let reply = fresh
        .request("login", json!({ "email": "alice@x", "pass": "p" }))
        .await;
    assert_eq!(reply.data["status"], "INVALID_PASSWORD");
    let reply = fresh
        .request("login", json!({ "email": "alice@x", "pass": "newpass" }))
        .await;
    assert_eq!(reply.data["status"], "SUCCESS");
}

// ── State machine guard rails ────────────────────────────────────────────────

#[tokio::test]
async fn authenticated_request_while_logged_out_forces_logout() {
    let h = Harness::new();
    let mut client = h.client();
    client
        .send("sendMessage", json!({ "group": 1, "chat": 1, "contents": "x" }))
        .await;
    let frame = client.recv().await;
    assert_eq!(frame.kind, "ERROR");
    let frame = client.recv().await;
    assert_eq!(frame.kind, "logout");
}

#[tokio::test]
async fn unknown_kind_while_logged_in_is_plain_error() {
    let h = Harness::new();
    let (mut alice, _) = h.account("Alice", "alice@x", "p").await;
    let err = alice.request_err("frobnicate", json!({})).await;
    assert!(err.contains("unknown request kind"));
    // Still logged in: an authenticated request succeeds.
    let reply = alice.request("getGroups", json!({})).await;
    assert_eq!(reply.data, json!([]));
}

#[tokio::test]
async fn ping_echoes_in_any_state() {
    let h = Harness::new();
    let mut client = h.client();
    let reply = client.request("PING", json!({ "nonce": 42 })).await;
    assert_eq!(reply.data, json!({ "nonce": 42 }));
}

#[tokio::test]
async fn login_works_while_already_logged_in() {
    let h = Harness::new();
    let (mut alice, _) = h.account("Alice", "alice@x", "p").await;
    let (_bob, _) = h.account("Bob", "bob@x", "p").await;

    // logout-first: the connection silently leaves its session, then logs
    // in as the other account.
    let reply = alice
        .request("login", json!({ "email": "bob@x", "pass": "p" }))
        .await;
    assert_eq!(reply.data["status"], "SUCCESS");
    let push = alice.recv().await;
    assert_eq!(push.kind, "login");
    assert_eq!(push.data["name"], "Bob");
}

// ── Tokens ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn only_latest_token_reconnects() {
    let h = Harness::new();
    let (mut alice, alice_id) = h.account("Alice", "alice@x", "p").await;
    let first_token = h.store.get_auth_token(alice_id).await.unwrap().unwrap();

    // A second login rotates the token.
    let reply = alice
        .request("login", json!({ "email": "alice@x", "pass": "p" }))
        .await;
    assert_eq!(reply.data["status"], "SUCCESS");
    let push = alice.recv().await;
    let second_token = push.data["token"].as_str().unwrap().to_string();
    assert_ne!(first_token, second_token);

    let mut stale = h.client();
    let reply = stale
        .request("connect", json!({ "id": alice_id, "token": first_token }))
        .await;
    assert_eq!(reply.data, json!({ "connected": false }));
    assert_eq!(stale.recv().await.kind, "logout");

    let mut fresh = h.client();
    let reply = fresh
        .request("connect", json!({ "id": alice_id, "token": second_token }))
        .await;
    assert_eq!(reply.data, json!({ "connected": true }));
    let push = fresh.recv().await;
    assert_eq!(push.kind, "login");
    // connect reuses the token rather than rotating it.
    assert_eq!(push.data["token"], second_token);
}

// ── Invites ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn invite_flow_with_push_and_dedupe() {
    let h = Harness::new();
    let (mut alice, _) = h.account("Alice", "alice@x", "p").await;
    let (mut bob, bob_id) = h.account("Bob", "bob@x", "p").await;
    let (group, module) = group_with_chat(&mut alice).await;

    let reply = alice
        .request("sendInvite", json!({ "group": group, "email": "bob@x" }))
        .await;
    assert_eq!(reply.data, json!({ "sent": true }));
    let push = bob.recv().await;
    assert_eq!(push.kind, "invite");
    assert_eq!(push.data["groupName"], "G");
    assert_eq!(push.data["inviterName"], "Alice");

    // A repeat invite succeeds without a second push.
    let reply = alice
        .request("sendInvite", json!({ "group": group, "email": "bob@x" }))
        .await;
    assert_eq!(reply.data, json!({ "sent": true }));

    let reply = bob.request("getInvites", json!({})).await;
    assert_eq!(reply.data.as_array().unwrap().len(), 1);

    let reply = bob
        .request("replyToInvite", json!({ "group": group, "accept": true }))
        .await;
    assert_eq!(reply.data, json!({}));
    assert!(h.store.check_user_in_group(bob_id, group).await.is_ok());

    // No interleaved push pending for Bob beyond the invite he consumed:
    // the next frame he sees is the message Alice now sends.
    let reply = alice
        .request(
            "sendMessage",
            json!({ "group": group, "chat": module, "contents": "welcome" }),
        )
        .await;
    assert_eq!(reply.data["id"], 1);
    let push = bob.recv().await;
    assert_eq!(push.kind, "message");
    assert_eq!(push.data["message"]["contents"], "welcome");
}

#[tokio::test]
async fn invite_link_grace_window() {
    let h = Harness::new();
    let (mut alice, _) = h.account("Alice", "alice@x", "p").await;
    let (mut bob, _) = h.account("Bob", "bob@x", "p").await;
    let (group, _) = group_with_chat(&mut alice).await;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;
    // Expired 10 s ago: still inside the 30 s skew window.
    h.store
        .add_group_invite_code(group, "graceperiod", now - 10_000)
        .await
        .unwrap();
    // Expired 40 s ago: dead.
    h.store
        .add_group_invite_code(group, "wayexpired1", now - 40_000)
        .await
        .unwrap();

    let reply = bob
        .request("checkInviteLink", json!({ "link": "graceperiod" }))
        .await;
    assert_eq!(reply.data["valid"], true);
    assert_eq!(reply.data["name"], "G");

    let reply = bob
        .request("useInviteLink", json!({ "link": "wayexpired1" }))
        .await;
    assert_eq!(reply.data, json!({ "id": null }));

    let reply = bob
        .request("useInviteLink", json!({ "link": "graceperiod" }))
        .await;
    assert_eq!(reply.data["id"], group);
}

#[tokio::test]
async fn created_invite_link_round_trips() {
    let h = Harness::new();
    let (mut alice, _) = h.account("Alice", "alice@x", "p").await;
    let (mut bob, bob_id) = h.account("Bob", "bob@x", "p").await;
    let (group, _) = group_with_chat(&mut alice).await;

    let reply = alice
        .request("createInviteLink", json!({ "group": group, "expire": 0 }))
        .await;
    let link = reply.data["link"].as_str().unwrap().to_string();
    assert_eq!(link.len(), 10);

    let reply = bob.request("useInviteLink", json!({ "link": link })).await;
    assert_eq!(reply.data["id"], group);
    assert!(h.store.check_user_in_group(bob_id, group).await.is_ok());
}

// ── Paging limit ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_messages_caps_at_fifty() {
    let h = Harness::new();
    let (mut alice, _) = h.account("Alice", "alice@x", "p").await;
    let (group, module) = group_with_chat(&mut alice).await;

    for i in 0..55 {
        alice
            .request(
                "sendMessage",
                json!({ "group": group, "chat": module, "contents": format!("m{i}") }),
            )
            .await;
    }
    let reply = alice
        .request("getMessages", json!({ "group": group, "chat": module }))
        .await;
    let messages = reply.data["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 50);
    // Most recent fifty, ascending.
    assert_eq!(messages[0]["id"], 6);
    assert_eq!(messages[49]["id"], 55);
}

// ── Event approval ───────────────────────────────────────────────────────────

#[tokio::test]
async fn event_approval_depends_on_role() {
    let h = Harness::new();
    let (mut alice, _) = h.account("Alice", "alice@x", "p").await;
    let (mut bob, bob_id) = h.account("Bob", "bob@x", "p").await;

    let reply = alice.request("createGroup", json!({ "name": "G" })).await;
    let group = reply.data["id"].as_i64().unwrap();
    let reply = alice
        .request("createModule", json!({ "group": group, "name": "cal", "type": "cal" }))
        .await;
    let cal = reply.data["id"].as_i64().unwrap();
    alice
        .request("setRequireApproval", json!({ "group": group, "require": true }))
        .await;
    h.store.join_group(bob_id, group).await.unwrap();

    // A plain user's event awaits approval.
    let reply = bob
        .request(
            "addEvent",
            json!({ "group": group, "calendar": cal, "description": "standup", "start": 100, "end": 200 }),
        )
        .await;
    assert_eq!(reply.data["approved"], false);
    // Bob's event was pushed to Alice; drain it before her next reply.
    assert_eq!(alice.recv().await.kind, "event");

    // The owner's own event is approved immediately.
    let reply = alice
        .request(
            "addEvent",
            json!({ "group": group, "calendar": cal, "description": "review", "start": 300, "end": 400 }),
        )
        .await;
    assert_eq!(reply.data["approved"], true);
}

// ── Message editing rules ────────────────────────────────────────────────────

#[tokio::test]
async fn moderators_delete_but_do_not_edit_others_messages() {
    let h = Harness::new();
    let (mut alice, _) = h.account("Alice", "alice@x", "p").await;
    let (mut bob, bob_id) = h.account("Bob", "bob@x", "p").await;
    let (group, module) = group_with_chat(&mut alice).await;
    h.store.join_group(bob_id, group).await.unwrap();

    let reply = bob
        .request(
            "sendMessage",
            json!({ "group": group, "chat": module, "contents": "mine" }),
        )
        .await;
    let id = reply.data["id"].as_i64().unwrap();
    // Alice now has a message push pending; drain it.
    assert_eq!(alice.recv().await.kind, "message");

    // Even the owner cannot rewrite someone else's words.
    let err = alice
        .request_err(
            "updateMessage",
            json!({ "group": group, "chat": module, "id": id, "newContents": "rewritten" }),
        )
        .await;
    assert!(err.contains("author"));

    // Deletion with greater authority is allowed; the wire shows the
    // tombstone as empty contents.
    let reply = alice
        .request(
            "updateMessage",
            json!({ "group": group, "chat": module, "id": id }),
        )
        .await;
    assert_eq!(reply.data["contents"], "");
    assert!(reply.data.get("deleted").is_none());
    let push = bob.recv().await;
    assert_eq!(push.kind, "messageUpdated");

    // Bob cannot touch the tombstone.
    let err = bob
        .request_err(
            "updateMessage",
            json!({ "group": group, "chat": module, "id": id, "newContents": "back" }),
        )
        .await;
    assert!(err.contains("deleted"));
}
