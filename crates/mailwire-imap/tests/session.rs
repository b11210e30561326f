//! Session tests against scripted server exchanges.
//!
//! Each test drives a [`Session`] over a `tokio_test` mock that checks every
//! command byte-for-byte and replays canned server responses.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use mailwire_imap::{Error, Session};
use tokio_test::io::Builder;

const SUMMARY_ITEMS: &str =
    "(UID ENVELOPE BODYSTRUCTURE BODY.PEEK[HEADER.FIELDS (MESSAGE-ID IN-REPLY-TO REFERENCES)])";

fn literal(content: &str) -> String {
    format!("{{{}}}\r\n{content}", content.len())
}

fn envelope(subject: &str, message_id: &str) -> String {
    format!(
        r#"("Mon, 3 Feb 2025 10:00:00 +0000" "{subject}" (("Ada Lovelace" NIL "ada" "example.com")) (("Ada Lovelace" NIL "ada" "example.com")) NIL NIL NIL NIL NIL "{message_id}")"#
    )
}

fn headers(block: &str) -> String {
    format!(
        "BODY[HEADER.FIELDS (MESSAGE-ID IN-REPLY-TO REFERENCES)] {}",
        literal(block)
    )
}

const REPLY_BODY: &str = "caf=C3=A9 tomorrow?";
const PLAIN_BODY: &str = "Hello";

fn reply_structure() -> String {
    format!(
        r#"(("TEXT" "PLAIN" ("CHARSET" "utf-8") NIL NIL "QUOTED-PRINTABLE" {} 1 NIL NIL NIL NIL)("APPLICATION" "PDF" ("NAME" "report.pdf") NIL NIL "BASE64" 4096 NIL ("ATTACHMENT" ("FILENAME" "report.pdf")) NIL NIL) "MIXED" ("BOUNDARY" "b1") NIL NIL NIL)"#,
        REPLY_BODY.len()
    )
}

fn plain_structure() -> String {
    format!(
        r#"("TEXT" "PLAIN" ("CHARSET" "us-ascii") NIL NIL "7BIT" {} 1 NIL NIL NIL NIL)"#,
        PLAIN_BODY.len()
    )
}

fn summary_responses(tag: &str) -> String {
    let first = format!(
        "* 1 FETCH (UID 10 ENVELOPE {} BODYSTRUCTURE {} {})\r\n",
        envelope("Budget", "<m1@example.com>"),
        plain_structure(),
        headers("Message-ID: <m1@example.com>\r\n\r\n"),
    );
    let second = format!(
        "* 2 FETCH (UID 11 ENVELOPE {} BODYSTRUCTURE {} {})\r\n",
        envelope("Re: Budget", "<m2@example.com>"),
        reply_structure(),
        headers(
            "Message-ID: <m2@example.com>\r\nIn-Reply-To: <m1@example.com>\r\nReferences:\r\n <m1@example.com>\r\n\r\n"
        ),
    );
    format!("{first}{second}{tag} OK FETCH completed\r\n")
}

fn body_response(seq: u32, uid: u32, section: &str, origin: Option<u32>, tag: &str, text: &str) -> String {
    let origin = origin.map(|o| format!("<{o}>")).unwrap_or_default();
    format!(
        "* {seq} FETCH (UID {uid} BODY[{section}]{origin} {})\r\n{tag} OK FETCH completed\r\n",
        literal(text)
    )
}

#[tokio::test]
async fn test_recent_summaries_newest_first() {
    let mock = Builder::new()
        .read(b"* OK IMAP4rev1 ready\r\n")
        .write(b"A0000 LOGIN \"ada@example.com\" \"secret\"\r\n")
        .read(b"A0000 OK LOGIN completed\r\n")
        .write(b"A0001 SELECT \"INBOX\"\r\n")
        .read(b"* 2 EXISTS\r\n* 0 RECENT\r\nA0001 OK [READ-WRITE] SELECT completed\r\n")
        .write(format!("A0002 FETCH 1:2 {SUMMARY_ITEMS}\r\n").as_bytes())
        .read(summary_responses("A0002").as_bytes())
        .write(b"A0003 UID FETCH 11 (UID BODY.PEEK[1]<0.2048>)\r\n")
        .read(body_response(2, 11, "1", Some(0), "A0003", REPLY_BODY).as_bytes())
        .write(b"A0004 UID FETCH 10 (UID BODY.PEEK[1]<0.2048>)\r\n")
        .read(body_response(1, 10, "1", Some(0), "A0004", PLAIN_BODY).as_bytes())
        .write(b"A0005 LOGOUT\r\n")
        .read(b"* BYE logging out\r\nA0005 OK LOGOUT completed\r\n")
        .build();

    let mut session = Session::from_stream(mock).await.unwrap();
    session.login("ada@example.com", "secret").await.unwrap();
    let total = session.select("INBOX").await.unwrap();
    assert_eq!(total, 2);

    let messages = session.fetch_recent(total, 20).await.unwrap();
    session.logout().await;

    assert_eq!(messages.len(), 2);

    let reply = &messages[0];
    assert_eq!(reply.uid, 11);
    assert_eq!(reply.subject, "Re: Budget");
    assert_eq!(reply.from, "Ada Lovelace");
    assert_eq!(reply.message_id, "<m2@example.com>");
    assert_eq!(reply.in_reply_to.as_deref(), Some("<m1@example.com>"));
    assert_eq!(reply.thread_id, "<m1@example.com>");
    assert_eq!(reply.body, "café tomorrow?");
    assert!(!reply.truncated);
    assert_eq!(reply.attachments.len(), 1);
    assert_eq!(reply.attachments[0].locator, "2");
    assert_eq!(reply.attachments[0].filename, "report.pdf");

    let original = &messages[1];
    assert_eq!(original.uid, 10);
    assert_eq!(original.thread_id, "<m1@example.com>");
    assert_eq!(original.body, "Hello");
    assert!(original.attachments.is_empty());
}

#[tokio::test]
async fn test_empty_mailbox_short_circuits() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0000 SELECT \"INBOX\"\r\n")
        .read(b"* 0 EXISTS\r\nA0000 OK SELECT completed\r\n")
        .build();

    let mut session = Session::from_stream(mock).await.unwrap();
    let total = session.select("INBOX").await.unwrap();
    let messages = session.fetch_recent(total, 20).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_full_fetch_keeps_requested_order() {
    let fetched = summary_responses("A0000");

    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(format!("A0000 UID FETCH 10,11 {SUMMARY_ITEMS}\r\n").as_bytes())
        .read(fetched.as_bytes())
        .write(b"A0001 UID FETCH 10 (UID BODY.PEEK[1])\r\n")
        .read(body_response(1, 10, "1", None, "A0001", PLAIN_BODY).as_bytes())
        .write(b"A0002 UID FETCH 11 (UID BODY.PEEK[1])\r\n")
        .read(body_response(2, 11, "1", None, "A0002", REPLY_BODY).as_bytes())
        .build();

    let mut session = Session::from_stream(mock).await.unwrap();
    let messages = session.fetch_uids(&[10, 11], true).await.unwrap();

    let uids: Vec<u32> = messages.iter().map(|m| m.uid).collect();
    assert_eq!(uids, vec![10, 11]);
    assert!(messages.iter().all(|m| !m.truncated));
}

#[tokio::test]
async fn test_refused_preview_leaves_body_empty() {
    let summary = format!(
        "* 5 FETCH (UID 42 ENVELOPE {} BODYSTRUCTURE {})\r\nA0000 OK done\r\n",
        envelope("Hi", "<m42@example.com>"),
        plain_structure(),
    );

    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(format!("A0000 UID FETCH 42 {SUMMARY_ITEMS}\r\n").as_bytes())
        .read(summary.as_bytes())
        .write(b"A0001 UID FETCH 42 (UID BODY.PEEK[1]<0.2048>)\r\n")
        .read(b"A0001 NO part unavailable\r\n")
        .build();

    let mut session = Session::from_stream(mock).await.unwrap();
    let messages = session.fetch_uids(&[42], false).await.unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].subject, "Hi");
    assert_eq!(messages[0].body, "");
    // no header section was returned, so the id is synthesized
    assert_eq!(messages[0].message_id, "<uid-42@mailwire.invalid>");
}

#[tokio::test]
async fn test_search_and_part_fetch() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0000 UID SEARCH FROM \"ada\" SINCE 1-Feb-2025\r\n")
        .read(b"* SEARCH 10 11\r\nA0000 OK SEARCH completed\r\n")
        .write(b"A0001 UID FETCH 11 (UID BODYSTRUCTURE)\r\n")
        .read(format!("* 2 FETCH (UID 11 BODYSTRUCTURE {})\r\nA0001 OK\r\n", reply_structure()).as_bytes())
        .write(b"A0002 UID FETCH 11 (UID BODY.PEEK[2])\r\n")
        .read(body_response(2, 11, "2", None, "A0002", "JVBERi0xLjQ=").as_bytes())
        .build();

    let mut session = Session::from_stream(mock).await.unwrap();
    let uids = session
        .search(
            mailwire_imap::command::SearchCriteria::new()
                .from("ada")
                .since("1-Feb-2025"),
        )
        .await
        .unwrap();
    assert_eq!(uids, vec![10, 11]);

    let structure = session.fetch_structure(11).await.unwrap().unwrap();
    let part = structure.find("2").unwrap();
    assert_eq!(part.encoding, "base64");

    let raw = session.fetch_part(11, "2").await.unwrap();
    assert_eq!(raw, b"JVBERi0xLjQ=");
}

#[tokio::test]
async fn test_transport_error_propagates() {
    let mock = Builder::new()
        .read(b"* OK ready\r\n")
        .write(b"A0000 SELECT \"INBOX\"\r\n")
        .read(b"* 3 EXISTS\r\n")
        .build();

    let mut session = Session::from_stream(mock).await.unwrap();
    let err = session.select("INBOX").await.unwrap_err();
    assert!(err.is_transport());
    assert!(matches!(err, Error::Read(_)));
}
