//! Integration tests for sessions over loopback TCP.

use std::io::ErrorKind;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crypt_cipher::PublicKeyParts;
use crypt_net::{Connector, KeyPair, Listener, Role, RsaPublicKey, SessionConfig, SessionError};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

fn server_keys() -> KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| KeyPair::generate(1024).unwrap()).clone()
}

fn client_keys() -> KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| KeyPair::generate(1024).unwrap()).clone()
}

/// Test the request/response exchange over real sockets
#[tokio::test]
async fn test_hello_world_over_tcp() {
    let listener = Listener::bind("127.0.0.1:0", Some(server_keys()), SessionConfig::default())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut session = listener
            .accept_session(Some(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(session.role(), Role::Acceptor);
        assert!(session.peer_addr().is_some());

        let request = session.recv(Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(request, "HELLO");
        session.send("WORLD").await.unwrap();
        session.close().await;
    });

    let connector = Connector::new(SessionConfig::default()).with_keys(client_keys());
    let mut session = connector
        .connect(addr, Some(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(session.role(), Role::Initiator);
    assert_eq!(session.peer_public_key(), server_keys().public_key());

    session.send("HELLO").await.unwrap();
    let reply = session.recv(Some(Duration::from_secs(10))).await.unwrap();
    assert_eq!(reply, "WORLD");

    server.await.unwrap();

    // Server closed its side
    assert!(matches!(
        session.recv(Some(Duration::from_secs(10))).await,
        Err(SessionError::PeerDisconnected(_))
    ));
    assert!(session.is_closed());
}

/// A client that sends right after the handshake must not lose its first frame
#[tokio::test]
async fn test_first_frame_follows_handshake_immediately() {
    let listener = Listener::bind("127.0.0.1:0", Some(server_keys()), SessionConfig::default())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let client = tokio::spawn(async move {
        let connector = Connector::new(SessionConfig::default()).with_keys(client_keys());
        let mut session = connector.connect(addr, None).await.unwrap();
        session.send("first").await.unwrap();
        session.send("second").await.unwrap();
        session
    });

    // Let the client send its frames before the server reads message 4
    let stream = listener.accept(Some(Duration::from_secs(10))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut session = listener.handshake(stream, None).await.unwrap();
    assert_eq!(session.recv(None).await.unwrap(), "first");
    assert_eq!(session.recv(None).await.unwrap(), "second");
    client.await.unwrap();
}

#[tokio::test]
async fn test_many_clients_share_the_server_key() {
    let listener = Arc::new(
        Listener::bind("127.0.0.1:0", Some(server_keys()), SessionConfig::default())
            .await
            .unwrap(),
    );
    let addr = listener.local_addr().unwrap();

    let server = {
        let listener = listener.clone();
        tokio::spawn(async move {
            let mut tokens = Vec::new();
            for _ in 0..3 {
                let mut session = listener.accept_session(None).await.unwrap();
                let message = session.recv(None).await.unwrap();
                session.send(&message.to_uppercase()).await.unwrap();
                tokens.push(session.own_token().clone());
            }
            tokens
        })
    };

    let connector = Connector::new(SessionConfig::default()).with_keys(client_keys());
    for name in ["alpha", "beta", "gamma"] {
        let mut session = connector.connect(addr, None).await.unwrap();
        session.send(name).await.unwrap();
        assert_eq!(session.recv(None).await.unwrap(), name.to_uppercase());
    }

    let tokens = server.await.unwrap();
    assert_ne!(tokens[0], tokens[1]);
    assert_ne!(tokens[1], tokens[2]);
}

#[tokio::test]
async fn test_generated_client_keys() {
    let listener = Listener::bind("127.0.0.1:0", Some(server_keys()), SessionConfig::default())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut session = listener.accept_session(None).await.unwrap();
        let modulus_bytes = session.peer_public_key().size();
        session.send("ok").await.unwrap();
        modulus_bytes
    });

    let connector = Connector::new(SessionConfig::default());
    let mut session = connector.connect(addr, None).await.unwrap();
    assert_eq!(session.recv(None).await.unwrap(), "ok");
    assert_eq!(server.await.unwrap(), 128);
}

#[tokio::test]
async fn test_invalid_client_key_size_fails_before_io() {
    let config = SessionConfig::default().with_client_key_bits(1000);
    let connector = Connector::new(config);

    // Nothing listens here; a key size error must win over a connect error
    let err = connector.connect("127.0.0.1:9", None).await.unwrap_err();
    assert!(matches!(err, SessionError::InvalidKeySize { bits: 1000 }));
}

#[tokio::test]
async fn test_invalid_server_key_size() {
    let config = SessionConfig::default().with_server_key_bits(2044);
    let result = Listener::bind("127.0.0.1:0", None, config).await;
    assert!(matches!(result, Err(SessionError::InvalidKeySize { bits: 2044 })));
}

#[tokio::test]
async fn test_accept_timeout() {
    let listener = Listener::bind("127.0.0.1:0", Some(server_keys()), SessionConfig::default())
        .await
        .unwrap();

    let err = listener
        .accept(Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    match err {
        SessionError::Io(e) => assert_eq!(e.kind(), ErrorKind::TimedOut),
        other => panic!("expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_server_key_closes_connection() {
    let listener = Listener::bind("127.0.0.1:0", Some(server_keys()), SessionConfig::default())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move { listener.accept_session(None).await });

    let connector = Connector::new(SessionConfig::default())
        .with_keys(client_keys())
        .with_verifier(Arc::new(|_: Role, _: &RsaPublicKey| {
            Err::<(), String>("unknown server".to_string())
        }));
    let err = connector.connect(addr, None).await.unwrap_err();
    assert!(matches!(err, SessionError::KeyExchangeFailed(_)));

    assert!(matches!(
        server.await.unwrap(),
        Err(SessionError::KeyExchangeFailed(_))
    ));
}

#[tokio::test]
async fn test_raw_client_sees_plaintext_public_key() {
    let listener = Listener::bind("127.0.0.1:0", Some(server_keys()), SessionConfig::default())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        listener
            .accept_session(Some(Duration::from_millis(500)))
            .await
    });

    let mut raw = TcpStream::connect(addr).await.unwrap();
    let expected = server_keys().public_key_pem().unwrap();
    let mut received = vec![0u8; expected.len()];
    raw.read_exact(&mut received).await.unwrap();
    assert_eq!(received, expected.as_bytes());

    // Never answer; the server gives up and closes
    assert!(matches!(
        server.await.unwrap(),
        Err(SessionError::KeyExchangeFailed(_))
    ));
    let mut buf = [0u8; 1];
    assert_eq!(raw.read(&mut buf).await.unwrap(), 0);
}
