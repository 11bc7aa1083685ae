//! Credential retry state machine.
//!
//! One [`CredentialAttempt`] lives in each repository context and is reset at
//! the start of every clone / fetch / pull / push. Each authentication
//! challenge from the transport is answered by [`CredentialAttempt::next_credential`]:
//!
//! 1. Local remotes never receive credentials beyond one pass-through.
//! 2. Username-only challenge → configured username, once.
//! 3. HTTPS plaintext challenge → username + password, once.
//! 4. SSH key challenge → the SSH agent once, then each candidate key file
//!    once, in order.
//! 5. Nothing tried yet → pass through to the transport's defaults, once.
//! 6. Otherwise → [`CredentialError::Exhausted`].
//!
//! A mechanism is never offered twice within one attempt, which keeps a
//! server that re-challenges forever from looping us.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::AuthMechanisms;
use crate::errors::CredentialError;
use crate::models::ConnectionType;

const DEFAULT_SSH_USER: &str = "git";

/// Where the negotiator gets usernames, passwords, and key candidates.
pub trait CredentialSource {
    fn connection_type(&self) -> ConnectionType;
    fn username(&self) -> String;
    /// May hit the secret store on first use.
    fn password(&self) -> String;
    /// Ordered candidate private-key paths.
    fn ssh_keys(&self) -> Vec<PathBuf>;
}

/// One authentication challenge raised by the transport.
#[derive(Debug, Clone, Copy)]
pub struct CredentialRequest<'a> {
    pub url: &'a str,
    pub username_from_url: Option<&'a str>,
    /// Mechanisms the server will accept.
    pub allowed: AuthMechanisms,
    /// Last transport-level error, reported when negotiation gives up.
    pub last_error: Option<&'a str>,
}

/// The credential handed back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Let the transport proceed with its own defaults.
    Passthrough,
    Username(String),
    UserPass { username: String, password: String },
    SshAgent { username: String },
    SshKey {
        username: String,
        private_key: PathBuf,
        public_key: Option<PathBuf>,
    },
}

impl Credential {
    /// Tracking mechanism this credential consumes.
    pub fn mechanism(&self) -> AuthMechanisms {
        match self {
            Self::Passthrough => AuthMechanisms::DEFAULT,
            Self::Username(_) => AuthMechanisms::USERNAME,
            Self::UserPass { .. } => AuthMechanisms::USER_PASS_PLAINTEXT,
            Self::SshAgent { .. } => AuthMechanisms::SSH_AGENT,
            Self::SshKey { .. } => AuthMechanisms::SSH_KEY,
        }
    }

    /// Log-safe description; never includes the password.
    pub fn describe(&self) -> String {
        match self {
            Self::Passthrough => "default credentials".to_string(),
            Self::Username(user) => format!("username '{user}'"),
            Self::UserPass { username, .. } => format!("password for '{username}'"),
            Self::SshAgent { username } => format!("ssh agent identities for '{username}'"),
            Self::SshKey { private_key, .. } => format!("ssh key {}", private_key.display()),
        }
    }
}

/// Per-connection-attempt negotiation state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialAttempt {
    tried: AuthMechanisms,
    key_cursor: usize,
}

impl CredentialAttempt {
    /// Forget everything tried so far and rewind the key cursor.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Mechanisms consumed so far in this attempt.
    pub fn tried(&self) -> AuthMechanisms {
        self.tried
    }

    /// Index of the next candidate key file.
    pub fn key_cursor(&self) -> usize {
        self.key_cursor
    }

    /// Answer one challenge.
    pub fn next_credential(
        &mut self,
        request: &CredentialRequest<'_>,
        source: &dyn CredentialSource,
    ) -> Result<Credential, CredentialError> {
        let connection = source.connection_type();
        debug!(
            allowed = ?request.allowed,
            tried = ?self.tried,
            %connection,
            "credential challenge"
        );

        if connection == ConnectionType::Local {
            return self.passthrough_or_fail(request);
        }

        if request.allowed.contains(AuthMechanisms::USERNAME)
            && !self.tried.contains(AuthMechanisms::USERNAME)
        {
            self.tried.insert(AuthMechanisms::USERNAME);
            return Ok(Credential::Username(ssh_username(source, request)));
        }

        if connection == ConnectionType::Https
            && request.allowed.contains(AuthMechanisms::USER_PASS_PLAINTEXT)
            && !self.tried.contains(AuthMechanisms::USER_PASS_PLAINTEXT)
        {
            self.tried.insert(AuthMechanisms::USER_PASS_PLAINTEXT);
            let username = non_empty(source.username())
                .or_else(|| request.username_from_url.map(str::to_string))
                .unwrap_or_default();
            return Ok(Credential::UserPass {
                username,
                password: source.password(),
            });
        }

        if connection == ConnectionType::Ssh
            && request.allowed.contains(AuthMechanisms::SSH_KEY)
            && !self.tried.contains(AuthMechanisms::SSH_KEY)
        {
            if let Some(credential) = self.next_ssh_credential(request, source) {
                return Ok(credential);
            }
        }

        self.passthrough_or_fail(request)
    }

    /// SSH sub-negotiation: agent first, then key files in order. Marks the
    /// key mechanism exhausted once the candidate list runs out.
    fn next_ssh_credential(
        &mut self,
        request: &CredentialRequest<'_>,
        source: &dyn CredentialSource,
    ) -> Option<Credential> {
        let username = ssh_username(source, request);

        if !self.tried.contains(AuthMechanisms::SSH_AGENT) {
            self.tried.insert(AuthMechanisms::SSH_AGENT);
            return Some(Credential::SshAgent { username });
        }

        let keys = source.ssh_keys();
        match keys.get(self.key_cursor) {
            Some(private_key) => {
                self.key_cursor += 1;
                debug!(key = %private_key.display(), "offering ssh key file");
                Some(Credential::SshKey {
                    username,
                    public_key: public_key_for(private_key),
                    private_key: private_key.clone(),
                })
            }
            None => {
                self.tried.insert(AuthMechanisms::SSH_KEY);
                None
            }
        }
    }

    fn passthrough_or_fail(
        &mut self,
        request: &CredentialRequest<'_>,
    ) -> Result<Credential, CredentialError> {
        if self.tried.is_empty() {
            self.tried.insert(AuthMechanisms::DEFAULT);
            return Ok(Credential::Passthrough);
        }

        warn!(url = request.url, tried = ?self.tried, "credential mechanisms exhausted");
        Err(CredentialError::Exhausted {
            url: request.url.to_string(),
            last_error: request.last_error.map(str::to_string),
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

fn ssh_username(source: &dyn CredentialSource, request: &CredentialRequest<'_>) -> String {
    non_empty(source.username())
        .or_else(|| request.username_from_url.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_SSH_USER.to_string())
}

/// `<private>.pub`, when it exists.
fn public_key_for(private_key: &Path) -> Option<PathBuf> {
    let mut name = OsString::from(private_key.as_os_str());
    name.push(".pub");
    let public = PathBuf::from(name);
    public.is_file().then_some(public)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct FakeSource {
        connection: ConnectionType,
        username: String,
        password: String,
        keys: Vec<PathBuf>,
    }

    impl FakeSource {
        fn new(connection: ConnectionType) -> Self {
            Self {
                connection,
                username: "alice".into(),
                password: "s3cret".into(),
                keys: vec![PathBuf::from("/keys/id_work"), PathBuf::from("/keys/id_rsa")],
            }
        }
    }

    impl CredentialSource for FakeSource {
        fn connection_type(&self) -> ConnectionType {
            self.connection
        }
        fn username(&self) -> String {
            self.username.clone()
        }
        fn password(&self) -> String {
            self.password.clone()
        }
        fn ssh_keys(&self) -> Vec<PathBuf> {
            self.keys.clone()
        }
    }

    fn request(allowed: AuthMechanisms) -> CredentialRequest<'static> {
        CredentialRequest {
            url: "remote",
            username_from_url: None,
            allowed,
            last_error: Some("auth rejected"),
        }
    }

    #[test]
    fn test_https_offers_plaintext_once() {
        let source = FakeSource::new(ConnectionType::Https);
        let mut attempt = CredentialAttempt::default();
        let req = request(AuthMechanisms::USER_PASS_PLAINTEXT);

        let first = attempt.next_credential(&req, &source).unwrap();
        assert_eq!(
            first,
            Credential::UserPass {
                username: "alice".into(),
                password: "s3cret".into()
            }
        );

        let second = attempt.next_credential(&req, &source);
        assert!(matches!(
            second,
            Err(CredentialError::Exhausted { ref last_error, .. })
                if last_error.as_deref() == Some("auth rejected")
        ));
    }

    #[test]
    fn test_ssh_sequence_username_agent_keys_then_exhausted() {
        let source = FakeSource::new(ConnectionType::Ssh);
        let mut attempt = CredentialAttempt::default();

        let user = attempt
            .next_credential(
                &request(AuthMechanisms::USERNAME | AuthMechanisms::SSH_KEY),
                &source,
            )
            .unwrap();
        assert_eq!(user, Credential::Username("alice".into()));

        let key_req = request(AuthMechanisms::SSH_KEY);
        assert!(matches!(
            attempt.next_credential(&key_req, &source).unwrap(),
            Credential::SshAgent { .. }
        ));
        assert!(matches!(
            attempt.next_credential(&key_req, &source).unwrap(),
            Credential::SshKey { ref private_key, .. } if private_key == Path::new("/keys/id_work")
        ));
        assert!(matches!(
            attempt.next_credential(&key_req, &source).unwrap(),
            Credential::SshKey { ref private_key, .. } if private_key == Path::new("/keys/id_rsa")
        ));
        assert!(attempt.next_credential(&key_req, &source).is_err());
        assert!(attempt.tried().contains(AuthMechanisms::SSH_KEY));
    }

    #[test]
    fn test_reset_rewinds_key_cursor() {
        let source = FakeSource::new(ConnectionType::Ssh);
        let mut attempt = CredentialAttempt::default();
        let key_req = request(AuthMechanisms::SSH_KEY);

        attempt.next_credential(&key_req, &source).unwrap();
        attempt.next_credential(&key_req, &source).unwrap();
        assert_eq!(attempt.key_cursor(), 1);

        attempt.reset();
        assert_eq!(attempt.key_cursor(), 0);
        assert!(attempt.tried().is_empty());
        assert!(matches!(
            attempt.next_credential(&key_req, &source).unwrap(),
            Credential::SshAgent { .. }
        ));
    }

    #[test]
    fn test_local_passes_through_once() {
        let source = FakeSource::new(ConnectionType::Local);
        let mut attempt = CredentialAttempt::default();
        let req = request(AuthMechanisms::USER_PASS_PLAINTEXT);

        assert_eq!(
            attempt.next_credential(&req, &source).unwrap(),
            Credential::Passthrough
        );
        assert!(attempt.next_credential(&req, &source).is_err());
    }

    #[test]
    fn test_unsupported_challenge_passes_through_first() {
        let source = FakeSource::new(ConnectionType::Https);
        let mut attempt = CredentialAttempt::default();
        let req = request(AuthMechanisms::SSH_KEY);

        assert_eq!(
            attempt.next_credential(&req, &source).unwrap(),
            Credential::Passthrough
        );
        assert!(attempt.next_credential(&req, &source).is_err());
    }

    #[test]
    fn test_ssh_username_falls_back_to_url_then_git() {
        let mut source = FakeSource::new(ConnectionType::Ssh);
        source.username.clear();
        let mut attempt = CredentialAttempt::default();

        let req = CredentialRequest {
            username_from_url: Some("deploy"),
            ..request(AuthMechanisms::SSH_KEY)
        };
        assert_eq!(
            attempt.next_credential(&req, &source).unwrap(),
            Credential::SshAgent {
                username: "deploy".into()
            }
        );

        attempt.reset();
        assert_eq!(
            attempt
                .next_credential(&request(AuthMechanisms::SSH_KEY), &source)
                .unwrap(),
            Credential::SshAgent {
                username: "git".into()
            }
        );
    }

    fn connection_strategy() -> impl Strategy<Value = ConnectionType> {
        prop_oneof![
            Just(ConnectionType::Local),
            Just(ConnectionType::Ssh),
            Just(ConnectionType::Https),
        ]
    }

    proptest! {
        #[test]
        fn prop_never_offers_same_mechanism_twice(
            connection in connection_strategy(),
            challenges in prop::collection::vec(0u8..32, 1..40),
            key_count in 0usize..4,
        ) {
            let mut source = FakeSource::new(connection);
            source.keys = (0..key_count)
                .map(|i| PathBuf::from(format!("/keys/id_{i}")))
                .collect();
            let mut attempt = CredentialAttempt::default();
            let mut offered: Vec<Credential> = Vec::new();

            for bits in challenges {
                let req = request(AuthMechanisms::from_bits(bits));
                match attempt.next_credential(&req, &source) {
                    Ok(credential) => {
                        prop_assert!(
                            !offered.contains(&credential),
                            "offered {:?} twice", credential
                        );
                        if !matches!(credential, Credential::SshKey { .. }) {
                            let mechanism = credential.mechanism();
                            prop_assert!(
                                !offered.iter().any(|c| c.mechanism() == mechanism),
                                "mechanism {:?} repeated", mechanism
                            );
                        }
                        offered.push(credential);
                    }
                    Err(_) => {}
                }
            }

            // agent + each key + username + plaintext + default
            prop_assert!(offered.len() <= key_count + 4);
        }
    }
}
