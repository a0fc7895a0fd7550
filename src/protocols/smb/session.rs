//! Share handle establishment
//!
//! Runs the connect → session setup → tree connect handshake and hands back
//! a [`ShareHandle`] only when all three steps succeeded. Whatever was
//! acquired before a failing step is released before the error is returned.

use super::error::{Result, SmbError};
use super::types::{AuthenticationContext, ShareTarget};
use super::{DiskShare, SmbConnection, SmbSession, SmbTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An authenticated attachment to one remote share
///
/// Owns the connection, the session and the attached tree. Dropping the
/// handle without [`ShareHandle::close`] leaves the remote resources to the
/// transport's own cleanup.
pub struct ShareHandle {
    target: ShareTarget,
    principal: String,
    connection: Box<dyn SmbConnection>,
    session: Box<dyn SmbSession>,
    share: Arc<dyn DiskShare>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ShareHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareHandle")
            .field("target", &self.target)
            .field("principal", &self.principal)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ShareHandle {
    pub fn target(&self) -> &ShareTarget {
        &self.target
    }

    /// User the session was authenticated as (`DOMAIN\user`)
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// The attached share
    pub fn share(&self) -> &Arc<dyn DiskShare> {
        &self.share
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Tear down share, session and connection, in that order
    ///
    /// Every step runs even if an earlier one fails; the first failure is
    /// returned. Closing an already closed handle is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::debug!("Closing share handle {}", self.target.unc());

        let share = self.share.disconnect().await;
        let session = self.session.logoff().await;
        let connection = self.connection.close().await;

        share.and(session).and(connection)
    }
}

/// Validate the target before any network work
fn validate_target(target: &ShareTarget) -> Result<()> {
    if target.host.is_empty() {
        return Err(SmbError::InvalidPath("host cannot be empty".to_string()));
    }
    if target.share.is_empty() {
        return Err(SmbError::InvalidPath("share cannot be empty".to_string()));
    }
    Ok(())
}

/// Establish an attached, authenticated share handle
///
/// Errors are kept distinct: [`SmbError::Connection`] (or `Timeout`) when the
/// host cannot be reached, [`SmbError::Auth`] when credentials are rejected,
/// and [`SmbError::ShareAttach`] when the tree connect fails.
#[tracing::instrument(
    skip(transport, auth),
    fields(
        host = %target.host,
        port = target.port,
        share = %target.share,
        user = %auth.principal()
    )
)]
pub async fn establish(
    transport: &dyn SmbTransport,
    target: &ShareTarget,
    auth: &AuthenticationContext,
) -> Result<ShareHandle> {
    validate_target(target)?;

    let connection = transport
        .connect(&target.host, target.port)
        .await
        .map_err(|e| match e {
            SmbError::Connection(_) | SmbError::Timeout | SmbError::Io(_) => e,
            other => SmbError::Connection(other.to_string()),
        })?;
    tracing::debug!("Connected to {}:{}", target.host, target.port);

    let session = match connection.authenticate(auth).await {
        Ok(session) => session,
        Err(e) => {
            release_connection(connection.as_ref()).await;
            tracing::error!("SMB session setup failed: {}", e);
            return Err(match e {
                SmbError::Permission(_) => SmbError::Auth(auth.principal()),
                other => other,
            });
        }
    };
    tracing::debug!("Session established for {}", auth.principal());

    let share = match session.connect_share(&target.share).await {
        Ok(share) => share,
        Err(e) => {
            if let Err(logoff) = session.logoff().await {
                tracing::warn!("Logoff after failed tree connect failed: {}", logoff);
            }
            release_connection(connection.as_ref()).await;
            tracing::error!("SMB tree connect to {} failed: {}", target.unc(), e);
            return Err(match e {
                SmbError::Connection(_) | SmbError::Timeout => e,
                other => SmbError::ShareAttach {
                    share: target.share.clone(),
                    source: Box::new(other),
                },
            });
        }
    };

    tracing::info!("Successfully connected to {}", target.unc());

    Ok(ShareHandle {
        target: target.clone(),
        principal: auth.principal(),
        connection,
        session,
        share,
        closed: AtomicBool::new(false),
    })
}

async fn release_connection(connection: &dyn SmbConnection) {
    if let Err(e) = connection.close().await {
        tracing::warn!("Closing connection after failed handshake failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::smb::{MemoryTransport, ResourceCounts, DEFAULT_SMB_PORT};

    fn create_test_transport() -> MemoryTransport {
        let transport = MemoryTransport::new();
        transport.add_host("fileserver");
        transport.add_user("fileserver", "jdoe", "secret");
        transport.add_share("fileserver", "projects");
        transport
    }

    fn target(share: &str) -> ShareTarget {
        ShareTarget::new("fileserver", DEFAULT_SMB_PORT, share)
    }

    #[tokio::test]
    async fn test_establish_and_close() {
        let transport = create_test_transport();
        let auth = AuthenticationContext::new("jdoe", "secret", "ACME");

        let handle = establish(&transport, &target("projects"), &auth).await.unwrap();
        assert_eq!(handle.principal(), r"ACME\jdoe");
        assert_eq!(
            transport.counts(),
            ResourceCounts { connections: 1, sessions: 1, trees: 1, handles: 0, connects_total: 1 }
        );

        handle.close().await.unwrap();
        handle.close().await.unwrap();
        assert!(handle.is_closed());
        assert_eq!(transport.counts().live(), 0);
    }

    #[tokio::test]
    async fn test_rejected_credentials_release_connection() {
        let transport = create_test_transport();
        let auth = AuthenticationContext::new("jdoe", "wrong", "");

        let err = establish(&transport, &target("projects"), &auth).await.unwrap_err();
        assert!(matches!(err, SmbError::Auth(_)));
        assert_eq!(transport.counts().live(), 0);
        assert_eq!(transport.counts().connects_total, 1);
    }

    #[tokio::test]
    async fn test_missing_share_releases_session_and_connection() {
        let transport = create_test_transport();
        let auth = AuthenticationContext::new("jdoe", "secret", "");

        let err = establish(&transport, &target("nope"), &auth).await.unwrap_err();
        assert!(matches!(err, SmbError::ShareAttach { ref share, .. } if share == "nope"));
        assert_eq!(transport.counts().live(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let transport = create_test_transport();
        let auth = AuthenticationContext::anonymous();
        let target = ShareTarget::new("elsewhere", DEFAULT_SMB_PORT, "projects");

        let err = establish(&transport, &target, &auth).await.unwrap_err();
        assert!(matches!(err, SmbError::Connection(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_host_rejected_without_network() {
        let transport = create_test_transport();
        let auth = AuthenticationContext::anonymous();
        let target = ShareTarget::new("", DEFAULT_SMB_PORT, "projects");

        let err = establish(&transport, &target, &auth).await.unwrap_err();
        assert!(matches!(err, SmbError::InvalidPath(_)));
        assert_eq!(transport.counts().connects_total, 0);
    }
}
