//! End-to-end wire scenarios over mock streams.

#![allow(clippy::unwrap_used)]

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_test::io::{Builder, Mock};

use mailway_imap::{
    Callback, CommandState, Config, Connection, NoopCallback, Result, SearchCriteria,
    StatusAttribute, Tag, TlsMode, TlsUpgrade, command::typed, types,
};

/// Mock stream wrapper so the local TLS upgrade trait can be
/// implemented for it; the upgrade itself is a no-op.
struct TestStream(Mock);

impl AsyncRead for TestStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

impl AsyncWrite for TestStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_shutdown(cx)
    }
}

impl TlsUpgrade for TestStream {
    async fn upgrade_tls(self, _host: &str, _accept_invalid: bool) -> Result<Self> {
        Ok(self)
    }
}

async fn connect(mock: Mock) -> Connection<TestStream> {
    let config = Config::builder("imap.example.com")
        .tls(TlsMode::Disabled)
        .build();
    Connection::from_stream(TestStream(mock), config, Box::new(NoopCallback))
        .await
        .unwrap()
}

#[tokio::test]
async fn greeting_then_login() {
    let mock = Builder::new()
        .read(b"* OK IMAP4rev1 Service Ready\r\n")
        .write(b"1 LOGIN \"alice\" \"pw\"\r\n")
        .read(b"1 OK LOGIN completed\r\n")
        .build();
    let mut conn = connect(mock).await;
    assert_eq!(conn.greeting(), Some("OK IMAP4rev1 Service Ready"));

    let id = conn.login("alice", "pw").await.unwrap();
    let command = conn.command(id).unwrap();
    assert_eq!(command.state(), CommandState::Completed);
    assert!(command.succeeded());

    let reply = command.reply().unwrap();
    assert_eq!(reply.status().unwrap().to_string(), "OK");
    assert_eq!(reply.message(), "LOGIN completed");
}

#[tokio::test]
async fn capability_cache() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"1 LOGIN \"alice\" \"pw\"\r\n")
        .read(b"1 OK done\r\n")
        .write(b"2 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1 NAMESPACE UIDPLUS QUOTA ACL\r\n")
        .read(b"2 OK\r\n")
        .build();
    let mut conn = connect(mock).await;
    conn.login("alice", "pw").await.unwrap();

    assert!(conn.has_capability("QUOTA").await.unwrap());
    assert!(conn.has_capability("quota").await.unwrap());
    // Cached: any further wire traffic would trip the mock.
    let caps = conn.capabilities().await.unwrap();
    assert_eq!(caps.len(), 5);
    assert!(caps.contains(&"UIDPLUS".to_string()));
}

#[tokio::test]
async fn literal_append() {
    let payload = "Hëllo wörld".as_bytes();
    assert_eq!(payload.len(), 13);

    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"1 LOGIN \"alice\" \"pw\"\r\n")
        .read(b"1 OK done\r\n")
        .write(b"2 CAPABILITY\r\n")
        .read(b"* CAPABILITY IMAP4rev1\r\n")
        .read(b"2 OK\r\n")
        .write(b"3 APPEND INBOX {13}\r\n")
        .read(b"+ go ahead\r\n")
        .write(payload)
        .write(b"\r\n")
        .read(b"3 OK APPEND\r\n")
        .build();
    let mut conn = connect(mock).await;
    conn.login("alice", "pw").await.unwrap();
    conn.capabilities().await.unwrap();

    let id = conn.create("APPEND").unwrap();
    {
        let command = conn.command_mut(id).unwrap();
        command.add_atom(Some("INBOX")).unwrap();
        command.add_quoted("Hëllo wörld", true).unwrap();
        assert!(command.has_literals());
    }
    conn.execute(id, true).await.unwrap();

    let command = conn.command(id).unwrap();
    assert_eq!(command.tag(), Some(Tag::new(3)));
    assert!(command.succeeded());
}

#[test]
fn sequence_set_encoding() {
    assert_eq!(
        types::encode_ids(&[1, 2, 3, 5, 7, 8, 9]).unwrap(),
        "1:3,5,7:9"
    );
}

#[tokio::test]
async fn pipelined_fetches_dispatch_by_tag() {
    let mut builder = Builder::new();
    builder.read(b"* OK ready\r\n");
    // Burn tags 1..=9 so the fetches land on hex tags a..e.
    for n in 1..=9u32 {
        builder.write(format!("{n:x} NOOP\r\n").as_bytes());
    }
    for n in 1..=9u32 {
        builder.read(format!("{n:x} OK\r\n").as_bytes());
    }
    for n in 1..=5u32 {
        let tag = Tag::new(9 + n);
        builder.write(format!("{tag} FETCH {n} BODY.PEEK[HEADER]\r\n").as_bytes());
    }
    // Replies arrive out of order: 12, 10, 13, 11, 14.
    for (tag, name) in [(12, "three"), (10, "one"), (13, "four"), (11, "two"), (14, "five")] {
        builder.read(format!("{:x} OK {name}\r\n", tag).as_bytes());
    }
    let mock = builder.build();

    let mut conn = connect(mock).await;
    let mut noops = Vec::new();
    for _ in 0..9 {
        let id = conn.create("NOOP").unwrap();
        conn.command_mut(id).unwrap().set_auto_dispose(false);
        conn.queue(id).unwrap();
        noops.push(id);
    }
    conn.execute_all(true).await.unwrap();

    let mut fetches = Vec::new();
    for n in 1..=5u32 {
        let id = conn.create("FETCH").unwrap();
        let command = conn.command_mut(id).unwrap();
        command.set_auto_dispose(false);
        command.add_sequence(&[n]).unwrap();
        command.add_raw("BODY.PEEK[HEADER]").unwrap();
        conn.queue(id).unwrap();
        fetches.push(id);
    }
    conn.execute_all(true).await.unwrap();

    // Tags 10..=14 were assigned in issue order, and each command's
    // reply carries its own tag regardless of arrival order.
    let expected = ["one", "two", "three", "four", "five"];
    for (n, id) in fetches.iter().enumerate() {
        let command = conn.command(*id).unwrap();
        let tag = Tag::new(10 + n as u32);
        assert_eq!(command.tag(), Some(tag));
        let reply = command.reply().unwrap();
        assert_eq!(reply.tag(), tag);
        assert_eq!(reply.message(), expected[n]);
    }
}

#[tokio::test]
async fn starttls_refused_automatic_continues_cleartext() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"1 STARTTLS\r\n")
        .read(b"1 NO not available\r\n")
        .write(b"2 NOOP\r\n")
        .read(b"2 OK alive\r\n")
        .build();
    let config = Config::builder("imap.example.com")
        .tls(TlsMode::Automatic)
        .build();
    let mut conn = Connection::from_stream(TestStream(mock), config, Box::new(NoopCallback))
        .await
        .unwrap();

    // No exception was thrown and the mode degraded to Disabled.
    assert_eq!(conn.tls_mode(), TlsMode::Disabled);

    // The connection keeps working in cleartext.
    let id = conn.create("NOOP").unwrap();
    conn.execute(id, true).await.unwrap();
    assert!(conn.command(id).unwrap().succeeded());
}

/// Records EXISTS and closed events for inspection after the fact.
#[derive(Clone, Default)]
struct EventRecorder {
    exists: Arc<Mutex<Vec<u32>>>,
    closed: Arc<Mutex<u32>>,
}

impl Callback for EventRecorder {
    fn message(&mut self, exists: u32) -> bool {
        self.exists.lock().unwrap().push(exists);
        false
    }

    fn closed(&mut self) -> bool {
        *self.closed.lock().unwrap() += 1;
        false
    }
}

#[tokio::test]
async fn untagged_exists_reports_once() {
    let recorder = EventRecorder::default();
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"1 NOOP\r\n")
        .read(b"* 42 EXISTS\r\n")
        .read(b"* 3 RECENT\r\n")
        .read(b"1 OK NOOP completed\r\n")
        .build();
    let config = Config::builder("imap.example.com")
        .tls(TlsMode::Disabled)
        .build();
    let mut conn = Connection::from_stream(TestStream(mock), config, Box::new(recorder.clone()))
        .await
        .unwrap();
    conn.set_exists_reporting(true);

    let id = conn.create("NOOP").unwrap();
    conn.command_mut(id).unwrap().set_auto_dispose(false);
    conn.execute(id, true).await.unwrap();

    // Exactly one Message(42) callback, the cached count updated, and
    // the reply still dispatched normally.
    assert_eq!(*recorder.exists.lock().unwrap(), vec![42]);
    assert_eq!(conn.exists(), Some(42));
    let command = conn.command(id).unwrap();
    assert!(command.succeeded());
    assert_eq!(typed::exists_count(command.reply().unwrap()), Some(42));
    assert_eq!(typed::recent_count(command.reply().unwrap()), Some(3));
}

#[tokio::test]
async fn logout_fires_closed_callback() {
    let recorder = EventRecorder::default();
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"1 LOGOUT\r\n")
        .read(b"* BYE see you\r\n")
        .read(b"1 OK LOGOUT completed\r\n")
        .build();
    let config = Config::builder("imap.example.com")
        .tls(TlsMode::Disabled)
        .build();
    let mut conn = Connection::from_stream(TestStream(mock), config, Box::new(recorder.clone()))
        .await
        .unwrap();

    conn.logout().await.unwrap();
    assert!(conn.is_closed());
    assert_eq!(*recorder.closed.lock().unwrap(), 1);
}

#[tokio::test]
async fn list_reply_parses_mailboxes() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"1 LIST \"\" \"*\"\r\n")
        .read(b"* LIST (\\HasNoChildren) \"/\" \"INBOX\"\r\n")
        .read(b"* LIST (\\Noselect \\HasChildren) \"/\" \"Archive\"\r\n")
        .read(b"* LIST () \"/\" \"&U,BTFw-\"\r\n")
        .read(b"1 OK LIST completed\r\n")
        .build();
    let mut conn = connect(mock).await;

    let id = conn.create("LIST").unwrap();
    {
        let command = conn.command_mut(id).unwrap();
        command.set_auto_dispose(false);
        command.add_quoted("", false).unwrap();
        command.add_quoted("*", false).unwrap();
    }
    conn.execute(id, true).await.unwrap();

    let reply = conn.command(id).unwrap().reply().unwrap();
    let items = typed::list_items(reply);
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].name, "INBOX");
    assert_eq!(items[1].attributes, vec!["\\Noselect", "\\HasChildren"]);
    assert_eq!(items[2].name, "台北");
    assert_eq!(typed::hierarchy_delimiter(reply), Some('/'));
}

#[tokio::test]
async fn uid_fetch_and_copyuid() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"1 UID COPY 304,319:320 \"Archive\"\r\n")
        .read(b"1 OK [COPYUID 38505 304,319:320 3956:3958] Done\r\n")
        .build();
    let mut conn = connect(mock).await;

    let id = conn.create("COPY").unwrap();
    {
        let command = conn.command_mut(id).unwrap();
        command.set_auto_dispose(false);
        command.set_uid(true).unwrap();
        command.add_sequence(&[304, 319, 320]).unwrap();
        command.add_mailbox("Archive").unwrap();
    }
    conn.execute(id, true).await.unwrap();

    let reply = conn.command(id).unwrap().reply().unwrap();
    let copied = typed::copy_uid(reply).unwrap();
    assert_eq!(copied.uid_validity, 38505);
    assert_eq!(copied.destination, vec![3956, 3957, 3958]);
}

#[tokio::test]
async fn quota_round_trip() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"1 GETQUOTAROOT \"INBOX\"\r\n")
        .read(b"* QUOTAROOT INBOX \"User quota\"\r\n")
        .read(b"* QUOTA \"User quota\" (STORAGE 1024 4096)\r\n")
        .read(b"1 OK completed\r\n")
        .build();
    let mut conn = connect(mock).await;

    let id = conn.create("GETQUOTAROOT").unwrap();
    {
        let command = conn.command_mut(id).unwrap();
        command.set_auto_dispose(false);
        command.add_mailbox("INBOX").unwrap();
    }
    conn.execute(id, true).await.unwrap();

    let reply = conn.command(id).unwrap().reply().unwrap();
    let quotas = typed::quota_roots(reply);
    assert_eq!(quotas[0].root, "User quota");
    assert_eq!(quotas[0].resources[0].usage, 1024);
    assert_eq!(quotas[0].resources[0].limit, 4096);
}

#[tokio::test]
async fn status_and_search_round_trip() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"1 STATUS \"INBOX\" (MESSAGES UNSEEN)\r\n")
        .read(b"* STATUS \"INBOX\" (MESSAGES 231 UNSEEN 5)\r\n")
        .read(b"1 OK STATUS completed\r\n")
        .write(b"2 UID SEARCH UNSEEN SINCE 1-Feb-2024\r\n")
        .read(b"* SEARCH 4827 4828 4850\r\n")
        .read(b"2 OK SEARCH completed\r\n")
        .build();
    let mut conn = connect(mock).await;

    let status = conn.create("STATUS").unwrap();
    {
        let command = conn.command_mut(status).unwrap();
        command.set_auto_dispose(false);
        command.add_mailbox("INBOX").unwrap();
        command
            .add_status_items(&[StatusAttribute::Messages, StatusAttribute::Unseen])
            .unwrap();
    }
    conn.execute(status, true).await.unwrap();

    let counts = typed::status_counts(conn.command(status).unwrap().reply().unwrap()).unwrap();
    assert_eq!(counts.mailbox, "INBOX");
    assert_eq!(counts.items[0], ("MESSAGES".to_string(), 231));

    let search = conn.create("SEARCH").unwrap();
    {
        let command = conn.command_mut(search).unwrap();
        command.set_auto_dispose(false);
        command.set_uid(true).unwrap();
        command
            .add_search(&SearchCriteria::And(vec![
                SearchCriteria::Unseen,
                SearchCriteria::Since("1-Feb-2024".to_string()),
            ]))
            .unwrap();
    }
    conn.execute(search, true).await.unwrap();

    let ids = typed::search_ids(conn.command(search).unwrap().reply().unwrap());
    assert_eq!(ids, vec![4827, 4828, 4850]);
}

#[tokio::test]
async fn fetch_literal_lands_on_reply() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"1 FETCH 1 BODY.PEEK[HEADER]\r\n")
        .read(b"* 1 FETCH (BODY[HEADER] {27}\r\nSubject: hello\r\nFrom: bob\r\n)\r\n")
        .read(b"1 OK FETCH completed\r\n")
        .build();
    let mut conn = connect(mock).await;

    let id = conn.create("FETCH").unwrap();
    {
        let command = conn.command_mut(id).unwrap();
        command.set_auto_dispose(false);
        command.add_sequence(&[1]).unwrap();
        command.add_raw("BODY.PEEK[HEADER]").unwrap();
    }
    conn.execute(id, true).await.unwrap();

    let reply = conn.command(id).unwrap().reply().unwrap();
    let literals: Vec<&[u8]> = reply.literals().collect();
    assert_eq!(literals, vec![&b"Subject: hello\r\nFrom: bob\r\n"[..]]);
    // The info line's message no longer carries the marker.
    assert!(!reply.infos()[0].message.contains('{'));
}
