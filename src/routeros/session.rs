use futures_util::{SinkExt, StreamExt};
use md5::{Digest, Md5};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::codec::{self, Record, Sentence, SentenceCodec};
use super::{ApiError, DEFAULT_API_PORT};

/// Where and how to log in, plus the retry policy for the connect phase.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_API_PORT,
            username: username.into(),
            password: password.into(),
            timeout: Duration::from_secs(5),
            attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// `"00" + hex(MD5(0x00 ++ password ++ unhex(challenge)))`, the pre-6.43 login response.
pub fn challenge_response(password: &str, challenge_hex: &str) -> Result<String, ApiError> {
    let challenge = hex::decode(challenge_hex.trim())
        .map_err(|e| ApiError::LoginFailed(format!("invalid challenge: {e}")))?;
    let mut hasher = Md5::new();
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hasher.update(&challenge);
    Ok(format!("00{}", hex::encode(hasher.finalize())))
}

/// One logged-in API connection.
///
/// A session serves a single caller: commands run strictly in the order
/// issued with one request in flight. Any I/O failure or read timeout poisons
/// the session; later calls fail with `NotConnected` instead of reading a
/// half-consumed reply. Dropping the session closes the socket.
pub struct ApiSession {
    framed: Option<Framed<TcpStream, SentenceCodec>>,
    host: String,
    timeout: Duration,
}

impl ApiSession {
    /// Connects and logs in, retrying up to `attempts` times with a fixed delay.
    pub async fn connect(options: &ConnectOptions) -> Result<Self, ApiError> {
        let attempts = options.attempts.max(1);
        let mut last_error = ApiError::NotConnected;
        for attempt in 1..=attempts {
            match Self::connect_once(options).await {
                Ok(session) => {
                    info!(host = %options.host, attempt = attempt, "Connected to router API.");
                    return Ok(session);
                }
                Err(e) => {
                    warn!(host = %options.host, attempt = attempt, error = %e, "Router API connect attempt failed.");
                    last_error = e;
                    if attempt < attempts {
                        sleep(options.retry_delay).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    async fn connect_once(options: &ConnectOptions) -> Result<Self, ApiError> {
        let stream = timeout(
            options.timeout,
            TcpStream::connect((options.host.as_str(), options.port)),
        )
        .await
        .map_err(|_| ApiError::Timeout("connect"))??;
        stream.set_nodelay(true)?;

        let mut session = Self {
            framed: Some(Framed::new(stream, SentenceCodec::default())),
            host: options.host.clone(),
            timeout: options.timeout,
        };
        session.login(&options.username, &options.password).await?;
        Ok(session)
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<(), ApiError> {
        let reply = self
            .exchange("/login", &[("name", username), ("password", password)])
            .await?;
        let records = codec::parse_records(&flatten(&reply));

        if login_accepted(&reply) {
            // Post-6.43 firmware accepts plaintext credentials straight away;
            // older firmware answers `!done =ret=<challenge>`.
            let challenge = records.iter().find_map(|r| r.get("ret").cloned());
            let Some(challenge) = challenge else {
                return Ok(());
            };
            let response = challenge_response(password, &challenge)?;
            let reply = self
                .exchange("/login", &[("name", username), ("response", response.as_str())])
                .await?;
            if login_accepted(&reply) {
                return Ok(());
            }
            return Err(ApiError::LoginFailed(reply_message(&reply)));
        }
        Err(ApiError::LoginFailed(reply_message(&reply)))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_connected(&self) -> bool {
        self.framed.is_some()
    }

    /// Runs one command and returns its records; failures surface as an empty list.
    ///
    /// Callers that must tell "no rows" from "device unreachable" use [`Self::try_comm`].
    pub async fn comm(&mut self, command: &str, args: &[(&str, &str)]) -> Vec<Record> {
        match self.try_comm(command, args).await {
            Ok(records) => records,
            Err(e) => {
                warn!(host = %self.host, command = command, error = %e, "Router API command failed.");
                Vec::new()
            }
        }
    }

    pub async fn try_comm(
        &mut self,
        command: &str,
        args: &[(&str, &str)],
    ) -> Result<Vec<Record>, ApiError> {
        let reply = self.exchange(command, args).await?;
        Ok(codec::parse_records(&flatten(&reply)))
    }

    /// Closes the connection. Safe to call more than once.
    pub async fn disconnect(&mut self) {
        if let Some(framed) = self.framed.take() {
            let mut stream = framed.into_inner();
            if let Err(e) = stream.shutdown().await {
                debug!(host = %self.host, error = %e, "Error shutting down router API socket.");
            }
        }
    }

    /// Writes one command and reads sentences until `!done` or `!fatal`.
    async fn exchange(
        &mut self,
        command: &str,
        args: &[(&str, &str)],
    ) -> Result<Vec<Sentence>, ApiError> {
        let result = self.exchange_inner(command, args).await;
        if result.is_err() {
            // The stream position is unknown after a failure.
            self.framed = None;
        }
        result
    }

    async fn exchange_inner(
        &mut self,
        command: &str,
        args: &[(&str, &str)],
    ) -> Result<Vec<Sentence>, ApiError> {
        let io_timeout = self.timeout;
        let framed = self.framed.as_mut().ok_or(ApiError::NotConnected)?;

        timeout(io_timeout, framed.send(codec::command_sentence(command, args)))
            .await
            .map_err(|_| ApiError::Timeout("write"))??;

        let mut sentences = Vec::new();
        loop {
            let sentence = timeout(io_timeout, framed.next())
                .await
                .map_err(|_| ApiError::Timeout("read"))?
                .ok_or(ApiError::ConnectionClosed)??;

            let status = sentence.first().cloned().unwrap_or_default();
            sentences.push(sentence);
            match status.as_str() {
                "!done" => return Ok(sentences),
                "!fatal" => {
                    let reason = reply_message(&sentences);
                    return Err(ApiError::Fatal(reason));
                }
                _ => {}
            }
        }
    }
}

fn flatten(sentences: &[Sentence]) -> Vec<String> {
    sentences.iter().flatten().cloned().collect()
}

/// A login reply is accepted when it leads with `!done`.
fn login_accepted(reply: &[Sentence]) -> bool {
    reply
        .first()
        .and_then(|s| s.first())
        .is_some_and(|w| w == "!done")
}

fn reply_message(reply: &[Sentence]) -> String {
    codec::parse_records(&flatten(reply))
        .into_iter()
        .find_map(|r| r.get("message").cloned())
        .unwrap_or_else(|| "rejected by device".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn fake_router<F, Fut>(handler: F) -> u16
    where
        F: FnOnce(Framed<TcpStream, SentenceCodec>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handler(Framed::new(stream, SentenceCodec::default())).await;
        });
        port
    }

    fn options(port: u16) -> ConnectOptions {
        ConnectOptions {
            port,
            timeout: Duration::from_millis(500),
            attempts: 1,
            retry_delay: Duration::from_millis(10),
            ..ConnectOptions::new("127.0.0.1", "admin", "secret")
        }
    }

    fn words(ws: &[&str]) -> Sentence {
        ws.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn challenge_response_is_md5_of_zero_password_challenge() {
        let challenge = "0123456789abcdef0123456789abcdef";
        let mut hasher = Md5::new();
        hasher.update([0u8]);
        hasher.update(b"secret");
        hasher.update(hex::decode(challenge).unwrap());
        let expected = format!("00{}", hex::encode(hasher.finalize()));

        assert_eq!(challenge_response("secret", challenge).unwrap(), expected);
        assert_eq!(expected.len(), 34);
        assert!(challenge_response("secret", "zz").is_err());
    }

    #[tokio::test]
    async fn plain_login_succeeds_in_one_round() {
        let port = fake_router(|mut framed| async move {
            let login = framed.next().await.unwrap().unwrap();
            assert_eq!(login, words(&["/login", "=name=admin", "=password=secret"]));
            framed.send(words(&["!done"])).await.unwrap();
            // A second login would show up here; the client must not send one.
            let next = framed.next().await;
            assert!(next.is_none());
        })
        .await;

        let mut session = ApiSession::connect(&options(port)).await.unwrap();
        assert!(session.is_connected());
        session.disconnect().await;
        session.disconnect().await;
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn challenge_login_sends_md5_response() {
        let challenge = "a1b2c3d4e5f60718293a4b5c6d7e8f90";
        let port = fake_router(move |mut framed| async move {
            let _ = framed.next().await.unwrap().unwrap();
            framed
                .send(words(&["!done", &format!("=ret={challenge}")]))
                .await
                .unwrap();
            let second = framed.next().await.unwrap().unwrap();
            let expected = challenge_response("secret", challenge).unwrap();
            assert_eq!(
                second,
                words(&["/login", "=name=admin", &format!("=response={expected}")])
            );
            framed.send(words(&["!done"])).await.unwrap();
            let _ = framed.next().await;
        })
        .await;

        assert!(ApiSession::connect(&options(port)).await.is_ok());
    }

    #[tokio::test]
    async fn rejected_login_fails() {
        let port = fake_router(|mut framed| async move {
            let _ = framed.next().await.unwrap().unwrap();
            framed
                .send(words(&["!trap", "=message=invalid user name or password"]))
                .await
                .unwrap();
            framed.send(words(&["!done"])).await.unwrap();
        })
        .await;

        match ApiSession::connect(&options(port)).await {
            Err(ApiError::LoginFailed(msg)) => assert!(msg.contains("invalid user name")),
            other => panic!("expected login failure, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn comm_collects_records_until_done() {
        let port = fake_router(|mut framed| async move {
            let _ = framed.next().await.unwrap().unwrap();
            framed.send(words(&["!done"])).await.unwrap();

            let cmd = framed.next().await.unwrap().unwrap();
            assert_eq!(cmd, words(&["/interface/print", "?running=true"]));
            framed.send(words(&["!re", "=name=foo", "=state=established"])).await.unwrap();
            framed.send(words(&["!re", "=name=bar"])).await.unwrap();
            framed.send(words(&["!done"])).await.unwrap();

            let cmd = framed.next().await.unwrap().unwrap();
            assert_eq!(cmd[0], "/bogus");
            framed.send(words(&["!trap", "=message=no such command"])).await.unwrap();
            framed.send(words(&["!done"])).await.unwrap();
            let _ = framed.next().await;
        })
        .await;

        let mut session = ApiSession::connect(&options(port)).await.unwrap();
        let records = session.comm("/interface/print", &[("?running", "true")]).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["name"], "foo");
        assert_eq!(records[0]["state"], "established");
        assert_eq!(records[1]["name"], "bar");

        let trapped = session.comm("/bogus", &[]).await;
        assert_eq!(trapped.len(), 1);
        assert!(codec::is_error(&trapped[0]));
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn read_timeout_is_a_failure_and_poisons_the_session() {
        let port = fake_router(|mut framed| async move {
            let _ = framed.next().await.unwrap().unwrap();
            framed.send(words(&["!done"])).await.unwrap();
            let _ = framed.next().await;
            // Never answer.
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;

        let mut session = ApiSession::connect(&options(port)).await.unwrap();
        let result = session.try_comm("/system/resource/print", &[]).await;
        assert!(matches!(result, Err(ApiError::Timeout("read"))));
        assert!(!session.is_connected());
        assert!(matches!(
            session.try_comm("/system/resource/print", &[]).await,
            Err(ApiError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn connect_retries_then_gives_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut opts = options(port);
        opts.attempts = 2;
        let started = std::time::Instant::now();
        assert!(ApiSession::connect(&opts).await.is_err());
        assert!(started.elapsed() >= Duration::from_millis(10));
    }
}
