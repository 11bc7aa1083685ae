//! Network operations: clone, fetch and push.
//!
//! Every transfer resets the context's credential attempt, runs a pre-flight
//! cancellation check, and wires three things into the transport callbacks:
//! the credential negotiator, the progress adapter, and the cancel flag.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions, PushOptions, RemoteCallbacks};
use tracing::{debug, info, instrument, warn};

use super::open;
use super::remote_url::redact_url;
use crate::context::RepositoryContext;
use crate::credentials::{AuthMechanisms, Credential};
use crate::errors::GitError;
use crate::progress::ProgressAdapter;

/// Map the transport's allowed-type bits onto ours.
pub(crate) fn mechanisms_from(allowed: CredentialType) -> AuthMechanisms {
    let mut set = AuthMechanisms::NONE;
    if allowed.contains(CredentialType::USERNAME) {
        set |= AuthMechanisms::USERNAME;
    }
    if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
        set |= AuthMechanisms::USER_PASS_PLAINTEXT;
    }
    if allowed.contains(CredentialType::SSH_KEY) {
        set |= AuthMechanisms::SSH_KEY;
    }
    if allowed.contains(CredentialType::DEFAULT) {
        set |= AuthMechanisms::DEFAULT;
    }
    set
}

fn auth_error(message: &str) -> git2::Error {
    git2::Error::new(ErrorCode::Auth, ErrorClass::Callback, message)
}

fn to_cred(credential: Credential, allowed: CredentialType) -> Result<Cred, git2::Error> {
    match credential {
        Credential::Passthrough if allowed.contains(CredentialType::DEFAULT) => Cred::default(),
        Credential::Passthrough => Err(auth_error("remote requires credentials")),
        Credential::Username(username) => Cred::username(&username),
        Credential::UserPass { username, password } => Cred::userpass_plaintext(&username, &password),
        Credential::SshAgent { username } => Cred::ssh_key_from_agent(&username),
        Credential::SshKey {
            username,
            private_key,
            public_key,
        } => Cred::ssh_key(&username, public_key.as_deref(), &private_key, None),
    }
}

/// Callbacks shared by every transfer direction.
fn transfer_callbacks<'a>(
    ctx: &'a RepositoryContext,
    progress: &'a ProgressAdapter,
) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();

    callbacks.credentials(move |url, username_from_url, allowed| {
        let mechanisms = mechanisms_from(allowed);
        match ctx.negotiate(url, username_from_url, mechanisms) {
            Ok(credential) => {
                debug!(offer = %credential.describe(), "answering credential challenge");
                // Only read if the remote challenges again, i.e. rejects this offer.
                ctx.record_transport_error(&format!("remote rejected {}", credential.describe()));
                to_cred(credential, allowed)
            }
            Err(e) => {
                warn!(error = %e, "credential negotiation gave up");
                Err(auth_error(&e.to_string()))
            }
        }
    });

    callbacks.transfer_progress(move |stats| {
        if stats.received_objects() < stats.total_objects() {
            progress.transfer(
                stats.received_objects() as u64,
                stats.total_objects() as u64,
                &format!(
                    "Receiving objects: {}/{}",
                    stats.received_objects(),
                    stats.total_objects()
                ),
            )
        } else {
            progress.transfer(
                stats.indexed_deltas() as u64,
                stats.total_deltas() as u64,
                &format!(
                    "Resolving deltas: {}/{}",
                    stats.indexed_deltas(),
                    stats.total_deltas()
                ),
            )
        }
    });

    callbacks.sideband_progress(move |data| {
        let text = String::from_utf8_lossy(data);
        progress.pulse(text.trim())
    });

    callbacks.pack_progress(move |_stage, current, total| {
        progress.transfer(
            current as u64,
            total as u64,
            &format!("Packing objects: {current}/{total}"),
        );
    });

    callbacks.push_transfer_progress(move |current, total, _bytes| {
        progress.transfer(
            current as u64,
            total as u64,
            &format!("Writing objects: {current}/{total}"),
        );
    });

    callbacks
}

/// Reset negotiation state and give the caller a chance to cancel before any
/// connection is opened.
fn preflight(
    ctx: &RepositoryContext,
    progress: &ProgressAdapter,
    operation: &str,
    url: &str,
) -> Result<(), GitError> {
    ctx.reset_attempt();
    if !progress.pulse(&format!("Connecting to {}", redact_url(url))) {
        info!(operation, "cancelled before connecting");
        return Err(GitError::Cancelled {
            operation: operation.to_string(),
        });
    }
    Ok(())
}

fn classify(
    ctx: &RepositoryContext,
    progress: &ProgressAdapter,
    operation: &str,
    err: git2::Error,
) -> GitError {
    let classified = GitError::from_transport(operation, err, progress.is_cancelled());
    if !classified.is_cancelled() {
        ctx.record_transport_error(&classified.to_string());
    }
    classified
}

// ---------------------------------------------------------------------------
// Clone
// ---------------------------------------------------------------------------

/// Clone `url` into `dest`, creating the directory tree first.
#[instrument(skip_all, fields(url = %redact_url(url), dest = %dest.display()))]
pub(crate) fn clone(
    ctx: &RepositoryContext,
    url: &str,
    dest: &Path,
    progress: &ProgressAdapter,
) -> Result<(), GitError> {
    std::fs::create_dir_all(dest)?;
    preflight(ctx, progress, "clone", url)?;

    let mut fetch_opts = FetchOptions::new();
    fetch_opts.remote_callbacks(transfer_callbacks(ctx, progress));

    let mut checkout = CheckoutBuilder::new();
    checkout.progress(|path, current, total| {
        let message = match path {
            Some(p) => format!("Checking out {}", p.display()),
            None => "Checking out files".to_string(),
        };
        progress.transfer(current as u64, total as u64, &message);
    });

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_opts);
    builder.with_checkout(checkout);
    builder
        .clone(url, dest)
        .map_err(|e| classify(ctx, progress, "clone", e))?;

    info!("clone completed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Fetch the configured refspecs of the conventional remote.
#[instrument(skip(ctx, progress), fields(remote = ctx.remote_name()))]
pub(crate) fn fetch(ctx: &RepositoryContext, progress: &ProgressAdapter) -> Result<(), GitError> {
    let repo = open(ctx)?;
    let mut remote = repo
        .find_remote(ctx.remote_name())
        .map_err(|_| GitError::RemoteNotFound(ctx.remote_name().to_string()))?;
    let url = remote.url().unwrap_or_default().to_string();

    preflight(ctx, progress, "fetch", &url)?;

    let mut opts = FetchOptions::new();
    opts.remote_callbacks(transfer_callbacks(ctx, progress));
    remote
        .fetch(&[] as &[&str], Some(&mut opts), Some("gitsync: fetch"))
        .map_err(|e| classify(ctx, progress, "fetch", e))?;

    let stats = remote.stats();
    info!(
        received_objects = stats.received_objects(),
        received_bytes = stats.received_bytes(),
        "fetch completed"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

/// Push the current HEAD branch to the conventional remote.
#[instrument(skip(ctx, progress), fields(remote = ctx.remote_name()))]
pub(crate) fn push(ctx: &RepositoryContext, progress: &ProgressAdapter) -> Result<(), GitError> {
    let repo = open(ctx)?;
    let head = repo.head().map_err(|_| GitError::UnbornHead)?;
    let refname = head
        .name()
        .ok_or_else(|| GitError::RefNotFound("HEAD has a non-UTF-8 name".into()))?
        .to_string();
    let mut remote = repo
        .find_remote(ctx.remote_name())
        .map_err(|_| GitError::RemoteNotFound(ctx.remote_name().to_string()))?;
    let url = remote.url().unwrap_or_default().to_string();

    preflight(ctx, progress, "push", &url)?;

    let rejection: Mutex<Option<(String, String)>> = Mutex::new(None);
    let result = {
        let mut callbacks = transfer_callbacks(ctx, progress);
        callbacks.push_update_reference(|refname, status| {
            if let Some(message) = status {
                warn!(refname, message, "push rejected");
                *rejection.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some((refname.to_string(), message.to_string()));
            }
            Ok(())
        });

        let mut opts = PushOptions::new();
        opts.remote_callbacks(callbacks);
        let refspec = format!("{refname}:{refname}");
        debug!(%refspec, "pushing");
        remote.push(&[refspec.as_str()], Some(&mut opts))
    };

    if let Err(e) = remote.disconnect() {
        debug!(error = %e, "disconnect after push failed");
    }
    result.map_err(|e| classify(ctx, progress, "push", e))?;

    if let Some((refname, detail)) = rejection
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
    {
        return Err(GitError::PushRejected { refname, detail });
    }

    info!(%refname, "push completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mechanisms_from_credential_type() {
        let set = mechanisms_from(CredentialType::USERNAME | CredentialType::SSH_KEY);
        assert!(set.contains(AuthMechanisms::USERNAME));
        assert!(set.contains(AuthMechanisms::SSH_KEY));
        assert!(!set.contains(AuthMechanisms::USER_PASS_PLAINTEXT));

        assert_eq!(
            mechanisms_from(CredentialType::USER_PASS_PLAINTEXT),
            AuthMechanisms::USER_PASS_PLAINTEXT
        );
    }

    #[test]
    fn test_passthrough_refused_without_default_type() {
        let err = to_cred(Credential::Passthrough, CredentialType::USER_PASS_PLAINTEXT)
            .err()
            .expect("passthrough should fail");
        assert_eq!(err.code(), ErrorCode::Auth);
    }

    #[test]
    fn test_preflight_honours_cancel() {
        let ctx = RepositoryContext::new("/tmp/gitsync-preflight");
        let progress = ProgressAdapter::silent(ctx.cancel_flag());
        ctx.cancel();
        let err = preflight(&ctx, &progress, "fetch", "/srv/remote").unwrap_err();
        assert!(err.is_cancelled());
    }
}
