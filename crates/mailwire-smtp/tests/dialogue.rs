//! Submission dialogue tests against a scripted server.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use mailwire_smtp::{Dialogue, Error, Submission};
use tokio_test::io::Builder;

fn submission() -> Submission {
    Submission {
        username: "ada@example.com".to_string(),
        password: "hunter2".to_string(),
        sender: "ada@example.com".to_string(),
        recipients: vec![
            "bob@example.com".to_string(),
            "carol@example.com".to_string(),
            "BOB@EXAMPLE.COM".to_string(),
        ],
        message: b"Subject: hi\r\n\r\nHello\r\n.signature\r\n".to_vec(),
    }
}

fn authenticated() -> Builder {
    let mut builder = Builder::new();
    builder
        .read(b"220 smtp.example.com ESMTP ready\r\n")
        .write(b"EHLO localhost\r\n")
        .read(b"250-smtp.example.com\r\n250-AUTH LOGIN PLAIN\r\n250 8BITMIME\r\n")
        .write(b"AUTH LOGIN\r\n")
        .read(b"334 VXNlcm5hbWU6\r\n")
        .write(b"YWRhQGV4YW1wbGUuY29t\r\n")
        .read(b"334 UGFzc3dvcmQ6\r\n")
        .write(b"aHVudGVyMg==\r\n");
    builder
}

#[tokio::test]
async fn test_full_submission() {
    let mock = authenticated()
        .read(b"235 2.7.0 Authentication successful\r\n")
        .write(b"MAIL FROM:<ada@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<bob@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<carol@example.com>\r\n")
        .read(b"251 User not local; will forward\r\n")
        .write(b"DATA\r\n")
        .read(b"354 End data with <CR><LF>.<CR><LF>\r\n")
        .write(b"Subject: hi\r\n\r\nHello\r\n..signature\r\n.\r\n")
        .read(b"250 2.0.0 queued as 1234\r\n")
        .write(b"QUIT\r\n")
        .read(b"221 Bye\r\n")
        .build();

    Dialogue::submission(&submission()).run(mock).await.unwrap();
}

#[tokio::test]
async fn test_bad_credentials_abort() {
    let mock = authenticated()
        .read(b"535 5.7.8 Authentication credentials invalid\r\n")
        .build();

    let err = Dialogue::submission(&submission()).run(mock).await.unwrap_err();
    assert!(matches!(err, Error::Auth { step: "password", code: 535, .. }));
    assert!(err.is_permanent());
}

#[tokio::test]
async fn test_rejected_recipient_aborts() {
    let mock = authenticated()
        .read(b"235 OK\r\n")
        .write(b"MAIL FROM:<ada@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<bob@example.com>\r\n")
        .read(b"550 5.1.1 No such user\r\n")
        .build();

    let err = Dialogue::submission(&submission()).run(mock).await.unwrap_err();
    assert!(matches!(err, Error::Rejected { step: "RCPT TO", code: 550, .. }));
}

#[tokio::test]
async fn test_quit_failure_tolerated() {
    let mock = authenticated()
        .read(b"235 OK\r\n")
        .write(b"MAIL FROM:<ada@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<bob@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<carol@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"DATA\r\n")
        .read(b"354 go ahead\r\n")
        .write(b"Subject: hi\r\n\r\nHello\r\n..signature\r\n.\r\n")
        .read(b"250 queued\r\n")
        .write(b"QUIT\r\n")
        .build();

    // the server hangs up instead of answering QUIT
    Dialogue::submission(&submission()).run(mock).await.unwrap();
}

#[tokio::test]
async fn test_greeting_rejection() {
    let mock = Builder::new().read(b"554 no service\r\n").build();

    let err = Dialogue::submission(&submission()).run(mock).await.unwrap_err();
    assert!(matches!(err, Error::Rejected { step: "greeting", code: 554, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_step_timeout() {
    let mock = Builder::new()
        .read(b"220 ready\r\n")
        .write(b"EHLO localhost\r\n")
        .wait(Duration::from_secs(45))
        .build();

    let err = Dialogue::submission(&submission())
        .with_timeouts(Duration::from_secs(10), Duration::from_secs(60))
        .run(mock)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(10)));
}

#[tokio::test(start_paused = true)]
async fn test_dialogue_deadline() {
    let mock = Builder::new()
        .read(b"220 ready\r\n")
        .write(b"EHLO localhost\r\n")
        .wait(Duration::from_secs(45))
        .build();

    let err = Dialogue::submission(&submission())
        .with_timeouts(Duration::from_secs(30), Duration::from_secs(20))
        .run(mock)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(20)));
}

#[tokio::test(start_paused = true)]
async fn test_accepted_message_survives_stalled_quit() {
    let mock = authenticated()
        .read(b"235 OK\r\n")
        .write(b"MAIL FROM:<ada@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<bob@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<carol@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"DATA\r\n")
        .wait(Duration::from_secs(25))
        .read(b"354 go ahead\r\n")
        .write(b"Subject: hi\r\n\r\nHello\r\n..signature\r\n.\r\n")
        .wait(Duration::from_secs(25))
        .read(b"250 queued\r\n")
        .write(b"QUIT\r\n")
        .wait(Duration::from_secs(120))
        .build();

    let started = tokio::time::Instant::now();
    Dialogue::submission(&submission())
        .with_timeouts(Duration::from_secs(30), Duration::from_secs(60))
        .run(mock)
        .await
        .unwrap();
    // Delivery took 50s and the stalled QUIT another 30s, past the deadline.
    assert!(started.elapsed() >= Duration::from_secs(60));
}
